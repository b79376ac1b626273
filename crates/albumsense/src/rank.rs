//! Turning raw per-variant scores into a ranked, thresholded result list.
//!
//! The steps run in a fixed order: sort by raw score, keep the best score of
//! every catalog item, convert to a 0–100 percentage, drop anything under the
//! threshold, then number the survivors 1, 2, 3, ...

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::similarity::{Metric, Orientation};
use crate::types::{RankedMatch, ScoredMatch};

/// Default minimum percentage a match needs to be reported.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 75.0;

/// How raw scores become percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    /// Min-max over the deduplicated scores of this query.
    #[default]
    MinMax,
    /// Similarity as a fraction of the metric's maximum score. Distances fall
    /// back to min-max.
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub threshold: f64,
    pub scale: ScoreScale,
    pub max_results: Option<usize>,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            scale: ScoreScale::MinMax,
            max_results: None,
        }
    }
}

fn by_orientation(orientation: Orientation) -> impl Fn(&f64, &f64) -> Ordering {
    move |a, b| {
        let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
        match orientation {
            Orientation::LowerIsBetter => ord,
            Orientation::HigherIsBetter => ord.reverse(),
        }
    }
}

/// Pair owner ids with scores and sort best first. Ties keep index order.
pub fn sort_scores(
    owner_ids: &[String],
    scores: &[f64],
    orientation: Orientation,
) -> Vec<(String, f64)> {
    let cmp = by_orientation(orientation);
    let mut pairs: Vec<(String, f64)> = owner_ids
        .iter()
        .cloned()
        .zip(scores.iter().copied())
        .filter(|(_, s)| !s.is_nan())
        .collect();
    pairs.sort_by(|a, b| cmp(&a.1, &b.1));
    pairs
}

/// Keep the best score per owner, in order of first appearance.
pub fn dedupe_best(pairs: &[(String, f64)], orientation: Orientation) -> Vec<(String, f64)> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut best: Vec<(String, f64)> = Vec::new();
    for (owner, score) in pairs {
        match position.get(owner.as_str()) {
            Some(&i) => {
                if orientation.better(*score, best[i].1) {
                    best[i].1 = *score;
                }
            }
            None => {
                position.insert(owner.as_str(), best.len());
                best.push((owner.clone(), *score));
            }
        }
    }
    best
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Convert deduplicated scores to percentages in `[0, 100]`.
///
/// With min-max scaling the best item is 100 and the worst 0; if every score
/// is equal, every item is 100.
pub fn normalize(
    deduped: &[(String, f64)],
    metric: &Metric,
    scale: ScoreScale,
) -> Vec<ScoredMatch> {
    if deduped.is_empty() {
        return Vec::new();
    }

    let orientation = metric.orientation();
    let min = deduped.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = deduped
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let absolute_max = match scale {
        ScoreScale::Absolute => metric.max_score().filter(|m| *m > 0.0),
        ScoreScale::MinMax => None,
    };

    deduped
        .iter()
        .map(|(owner, score)| {
            let pct = if let Some(top) = absolute_max {
                100.0 * score / top
            } else if range == 0.0 {
                100.0
            } else {
                match orientation {
                    Orientation::LowerIsBetter => 100.0 * (max - score) / range,
                    Orientation::HigherIsBetter => 100.0 * (score - min) / range,
                }
            };
            ScoredMatch {
                owner_id: owner.clone(),
                raw_score: *score,
                percentage: round2(pct.clamp(0.0, 100.0)),
            }
        })
        .collect()
}

/// Drop matches under the threshold and number the rest by descending
/// percentage. Ties keep their incoming order.
pub fn threshold_and_rank(mut scored: Vec<ScoredMatch>, config: &RankConfig) -> Vec<RankedMatch> {
    scored.retain(|m| m.percentage >= config.threshold);
    scored.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(Ordering::Equal)
    });
    if let Some(limit) = config.max_results {
        scored.truncate(limit);
    }
    scored
        .into_iter()
        .enumerate()
        .map(|(i, m)| RankedMatch {
            rank: i + 1,
            owner_id: m.owner_id,
            raw_score: m.raw_score,
            percentage: m.percentage,
        })
        .collect()
}

/// Full pipeline from per-variant scores to ranked matches.
pub fn rank(
    owner_ids: &[String],
    scores: &[f64],
    metric: &Metric,
    config: &RankConfig,
) -> Vec<RankedMatch> {
    let orientation = metric.orientation();
    let sorted = sort_scores(owner_ids, scores, orientation);
    let deduped = dedupe_best(&sorted, orientation);
    let scored = normalize(&deduped, metric, config.scale);
    let ranked = threshold_and_rank(scored, config);
    tracing::debug!(
        "Ranked {} variants into {} items, {} above {:.1}%",
        scores.len(),
        deduped.len(),
        ranked.len(),
        config.threshold
    );
    ranked
}

/// Renumber ranks 1..=n after items were removed.
pub fn rerank(matches: &mut [RankedMatch]) {
    for (i, m) in matches.iter_mut().enumerate() {
        m.rank = i + 1;
    }
}
