//! Retrieval service: engine lifecycle, index files, and result output.

pub mod manager;

pub use manager::{join_rebuild, RebuildHandle, RetrievalService, ServiceInfo, SpaceInfo};
