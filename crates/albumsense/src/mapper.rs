//! Album metadata and the join from matched catalog files to albums.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::rank::rerank;
use crate::types::{Modality, RankedMatch, RankedResult, RetrievalError, RetrievalResult};

/// One song of an album. `file` is a bare file name under the audio folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One album in the mapper file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "imageSrc")]
    pub image_src: String,
    #[serde(default)]
    pub songs: Vec<SongRecord>,
}

/// Parse a mapper document: a JSON array of album records.
pub fn parse_mapper(bytes: &[u8]) -> RetrievalResult<Vec<AlbumRecord>> {
    serde_json::from_slice(bytes).map_err(|e| RetrievalError::Mapper(format!("Invalid mapper: {e}")))
}

/// Load the mapper file from disk.
pub fn load_mapper(path: &Path) -> RetrievalResult<Vec<AlbumRecord>> {
    let bytes = std::fs::read(path).map_err(|e| {
        RetrievalError::Mapper(format!("Cannot read mapper {}: {e}", path.display()))
    })?;
    let albums = parse_mapper(&bytes)?;
    tracing::info!("Loaded {} album records from {}", albums.len(), path.display());
    Ok(albums)
}

fn file_name(id: &str) -> Option<&str> {
    Path::new(id).file_name().and_then(|n| n.to_str())
}

fn file_stem(name: &str) -> Option<&str> {
    Path::new(name).file_stem().and_then(|n| n.to_str())
}

/// Find the album a matched catalog file belongs to.
///
/// Images match when the album's `imageSrc` ends with the file name; audio
/// matches when one of the album's song files has the same stem.
pub fn find_album<'a>(
    owner_id: &str,
    modality: Modality,
    albums: &'a [AlbumRecord],
) -> Option<&'a AlbumRecord> {
    let name = file_name(owner_id)?;
    match modality {
        Modality::Image => albums.iter().find(|a| a.image_src.ends_with(name)),
        Modality::Audio => {
            let stem = file_stem(name)?;
            albums
                .iter()
                .find(|a| a.songs.iter().any(|s| file_stem(&s.file) == Some(stem)))
        }
    }
}

/// Attach album metadata to ranked matches.
///
/// Matches without an album are logged and dropped; the remaining results
/// are renumbered so ranks stay contiguous.
pub fn join(
    matches: &[RankedMatch],
    albums: &[AlbumRecord],
    modality: Modality,
) -> Vec<RankedResult> {
    let mut kept: Vec<(RankedMatch, &AlbumRecord)> = Vec::with_capacity(matches.len());
    for m in matches {
        match find_album(&m.owner_id, modality, albums) {
            Some(album) => kept.push((m.clone(), album)),
            None => tracing::warn!("No album record for {} match {}", modality, m.owner_id),
        }
    }

    let mut ranked: Vec<RankedMatch> = kept.iter().map(|(m, _)| m.clone()).collect();
    rerank(&mut ranked);
    ranked
        .iter()
        .zip(kept.iter())
        .map(|(m, (_, album))| RankedResult::from_match(m, album))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPER: &str = r#"[
        {"id": "1", "title": "Blue Train", "imageSrc": "/covers/blue_train.jpg",
         "songs": [{"file": "blue_train.mid", "title": "Blue Train"}, {"file": "moments_notice.mid"}]},
        {"id": "2", "title": "Kind of Blue", "imageSrc": "kind_of_blue.png",
         "songs": [{"file": "so_what.mp3"}]},
        {"id": "3", "title": "No Songs", "imageSrc": "empty.jpg"}
    ]"#;

    fn albums() -> Vec<AlbumRecord> {
        parse_mapper(MAPPER.as_bytes()).unwrap()
    }

    fn m(rank: usize, owner: &str, pct: f64) -> RankedMatch {
        RankedMatch {
            rank,
            owner_id: owner.to_string(),
            raw_score: 0.0,
            percentage: pct,
        }
    }

    #[test]
    fn test_parse_mapper() {
        let a = albums();
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].image_src, "/covers/blue_train.jpg");
        assert_eq!(a[0].songs[1].title, None);
        assert!(a[2].songs.is_empty());
        assert!(parse_mapper(b"{\"not\": \"an array\"}").is_err());
    }

    #[test]
    fn test_record_missing_required_field_fails() {
        let no_image = br#"[
            {"id": "1", "title": "Giant Steps", "imageSrc": "covers/giant_steps.jpg"},
            {"id": "2", "title": "Kind of Blue"}
        ]"#;
        match parse_mapper(no_image) {
            Err(RetrievalError::Mapper(msg)) => assert!(msg.contains("imageSrc")),
            other => panic!("expected mapper error, got {other:?}"),
        }

        let no_title = br#"[{"id": "3", "imageSrc": "covers/blue_train.jpg"}]"#;
        assert!(matches!(
            parse_mapper(no_title),
            Err(RetrievalError::Mapper(_))
        ));

        let no_id = br#"[{"title": "Blue Train", "imageSrc": "covers/blue_train.jpg"}]"#;
        assert!(matches!(parse_mapper(no_id), Err(RetrievalError::Mapper(_))));
    }

    #[test]
    fn test_load_mapper_reports_bad_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapper.json");
        std::fs::write(&path, r#"[{"id": "1", "imageSrc": "a.png"}]"#).unwrap();
        assert!(matches!(load_mapper(&path), Err(RetrievalError::Mapper(_))));
    }

    #[test]
    fn test_image_join_by_suffix() {
        let a = albums();
        let album = find_album("/data/picture/kind_of_blue.png", Modality::Image, &a).unwrap();
        assert_eq!(album.id, "2");
        assert!(find_album("/data/picture/unknown.png", Modality::Image, &a).is_none());
    }

    #[test]
    fn test_audio_join_by_stem() {
        let a = albums();
        // extension differs from the mapper entry
        let album = find_album("/data/audio/moments_notice.wav", Modality::Audio, &a).unwrap();
        assert_eq!(album.id, "1");
        assert_eq!(
            find_album("/data/audio/so_what.mid", Modality::Audio, &a).map(|a| a.id.as_str()),
            Some("2")
        );
    }

    #[test]
    fn test_join_drops_misses_and_reranks() {
        let a = albums();
        let matches = vec![
            m(1, "/p/missing.jpg", 100.0),
            m(2, "/p/blue_train.jpg", 90.0),
            m(3, "/p/kind_of_blue.png", 80.0),
        ];
        let results = join(&matches, &a, Modality::Image);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].title, "Blue Train");
        assert_eq!(results[0].percentage, 90.0);
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[1].id, "2");
    }

    #[test]
    fn test_result_serializes_with_wire_names() {
        let a = albums();
        let results = join(&[m(1, "/p/kind_of_blue.png", 100.0)], &a, Modality::Image);
        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["similarity_rank"], 1);
        assert_eq!(json["similarity_percentage"], 100.0);
        assert_eq!(json["imageSrc"], "kind_of_blue.png");
        assert_eq!(json["songs"][0]["file"], "so_what.mp3");
    }
}
