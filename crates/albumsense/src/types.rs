//! Core data types for catalog items, variants, and ranked results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::augment::Transform;
use crate::mapper::{AlbumRecord, SongRecord};

/// Which kind of media a catalog item or feature space holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Image,
    Audio,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Audio => "audio",
        }
    }

    /// Single-byte tag used by the on-disk format.
    pub(crate) fn code(self) -> u8 {
        match self {
            Modality::Image => 1,
            Modality::Audio => 2,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Modality::Image),
            2 => Some(Modality::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" | "picture" => Ok(Modality::Image),
            "audio" | "melody" => Ok(Modality::Audio),
            other => Err(RetrievalError::InvalidInput(format!(
                "Unknown modality: {other}. Use 'image' or 'audio'."
            ))),
        }
    }
}

/// A catalog entry. The id is the source file path and stays stable until the
/// catalog is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub modality: Modality,
}

/// One feature vector derived from a catalog item.
#[derive(Debug, Clone)]
pub struct Variant {
    pub owner_id: String,
    pub transform: Transform,
    pub features: Vec<f64>,
}

/// Best raw score of one catalog item together with its percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub owner_id: String,
    pub raw_score: f64,
    pub percentage: f64,
}

/// A scored match that survived the threshold, before the metadata join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub rank: usize,
    pub owner_id: String,
    pub raw_score: f64,
    pub percentage: f64,
}

/// A ranked match joined against its album record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(rename = "similarity_rank")]
    pub rank: usize,
    #[serde(rename = "similarity_percentage")]
    pub percentage: f64,
    pub owner_id: String,
    pub id: String,
    pub title: String,
    #[serde(rename = "imageSrc")]
    pub image_src: String,
    pub songs: Vec<SongRecord>,
}

impl RankedResult {
    pub fn from_match(matched: &RankedMatch, album: &AlbumRecord) -> Self {
        Self {
            rank: matched.rank,
            percentage: matched.percentage,
            owner_id: matched.owner_id.clone(),
            id: album.id.clone(),
            title: album.title.clone(),
            image_src: album.image_src.clone(),
            songs: album.songs.clone(),
        }
    }
}

/// What happened to one catalog item during a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Processed { id: String, variants: usize },
    Skipped { id: String, reason: String },
}

impl ItemOutcome {
    pub fn id(&self) -> &str {
        match self {
            ItemOutcome::Processed { id, .. } | ItemOutcome::Skipped { id, .. } => id,
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, ItemOutcome::Processed { .. })
    }
}

/// Summary of a feature-space build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub processed: usize,
    pub skipped: Vec<(String, String)>,
    pub variants: usize,
    pub dimensions: usize,
    pub components: usize,
}

impl BuildReport {
    /// Fold per-item outcomes into a report.
    pub fn from_outcomes(outcomes: &[ItemOutcome]) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Processed { variants, .. } => {
                    report.processed += 1;
                    report.variants += variants;
                }
                ItemOutcome::Skipped { id, reason } => {
                    report.skipped.push((id.clone(), reason.clone()));
                }
            }
        }
        report
    }
}

/// Errors that can occur in the retrieval library.
#[derive(thiserror::Error, Debug)]
pub enum RetrievalError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Mapper error: {0}")]
    Mapper(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Catalog is empty: no {0} items could be processed")]
    EmptyCatalog(Modality),

    #[error("No {0} index is available; build or load one first")]
    IndexUnavailable(Modality),

    #[error("Numeric error: {0}")]
    Numeric(String),
}

/// Convenience result type.
pub type RetrievalResult<T> = Result<T, RetrievalError>;
