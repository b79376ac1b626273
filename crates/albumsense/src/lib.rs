//! AlbumSense — perceptual retrieval over album catalogs: eigen-image search for
//! covers and melody-histogram matching for songs.

pub mod augment;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod index;
pub mod linalg;
pub mod mapper;
pub mod melody;
pub mod rank;
pub mod results;
pub mod similarity;
pub mod storage;
pub mod subspace;
pub mod types;
pub mod vectorize;

pub use augment::{AugmentPlan, Transform};
pub use capture::{decode_base64, decode_from_bytes, decode_from_file};
pub use catalog::{list_items, modality_dir, AUDIO_DIR, PICTURE_DIR};
pub use config::EngineConfig;
pub use engine::{Engine, SnapshotSlot};
pub use index::{project, FeatureSpace, Preprocessing, ProjectionIndex};
pub use mapper::{join, load_mapper, AlbumRecord, SongRecord};
pub use melody::{extract, JsonNotesSource, MelodyConfig, MelodyFeatures, PitchSource};
pub use rank::{rank, RankConfig, ScoreScale};
pub use results::{export_media, FsMediaSink, MediaKind, MediaSink, ResultArtifact};
pub use similarity::{cosine_similarity, Metric};
pub use storage::{FeatureSpaceReader, FeatureSpaceWriter, FSPACE_EXTENSION};
pub use subspace::{fit, ComponentSelection, SubspaceModel};
pub use types::*;
pub use vectorize::{vectorize, VectorizerConfig};
