//! AlbumSense CLI — build catalog indexes and search albums by cover or melody.

pub mod config;
pub mod error;
pub mod repl;
pub mod service;

pub use config::{resolve_config_path, resolve_data_dir, DataPaths};
pub use error::{CliError, CliResult};
pub use service::RetrievalService;
