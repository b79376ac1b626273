//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use albumsense::{EngineConfig, Modality, FSPACE_EXTENSION};

use crate::error::CliResult;

/// Environment variable naming the data directory.
pub const DATA_ENV: &str = "ALBUMSENSE_DATA";

/// Environment variable naming the engine config file.
pub const CONFIG_ENV: &str = "ALBUMSENSE_CONFIG";

const DOT_DIR: &str = ".albumsense";
const CONFIG_FILE: &str = "config.json";
const MAPPER_FILE: &str = "mapper.json";
const INDEX_DIR: &str = "index";
const RESULT_DIR: &str = "result";
const NOTES_DIR: &str = "notes";

/// Resolve the data directory: explicit flag, then `ALBUMSENSE_DATA`, then
/// `./.albumsense` if it exists, then `$HOME/.albumsense`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(env_path) = std::env::var(DATA_ENV) {
        return PathBuf::from(env_path);
    }

    let cwd_dir = PathBuf::from(DOT_DIR);
    if cwd_dir.is_dir() {
        return cwd_dir;
    }

    resolve_default_data_dir()
}

fn resolve_default_data_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(DOT_DIR)
}

/// Resolve the engine config file: explicit flag, then `ALBUMSENSE_CONFIG`,
/// then `config.json` in the data directory if present.
pub fn resolve_config_path(explicit: Option<&Path>, data_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let in_data = data_dir.join(CONFIG_FILE);
    in_data.is_file().then_some(in_data)
}

/// Load the engine config, falling back to defaults when no file is found.
pub fn load_engine_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading engine config from {}", path.display());
            Ok(EngineConfig::from_file(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Well-known locations inside a data directory.
///
/// The data directory doubles as the catalog root: covers live in
/// `picture/`, songs in `audio/`, album metadata in `mapper.json`.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    /// Folder of pitch sidecars, when they are not kept next to the songs.
    pub notes: Option<PathBuf>,
}

impl DataPaths {
    pub fn resolve(data: Option<&Path>, config: Option<&Path>) -> Self {
        let root = resolve_data_dir(data);
        let config = resolve_config_path(config, &root);
        let notes_dir = root.join(NOTES_DIR);
        let notes = notes_dir.is_dir().then_some(notes_dir);
        Self {
            root,
            config,
            notes,
        }
    }

    pub fn catalog_dir(&self, modality: Modality) -> PathBuf {
        albumsense::modality_dir(&self.root, modality)
    }

    pub fn mapper(&self) -> PathBuf {
        self.root.join(MAPPER_FILE)
    }

    pub fn index_file(&self, modality: Modality) -> PathBuf {
        self.root
            .join(INDEX_DIR)
            .join(format!("{}.{FSPACE_EXTENSION}", modality.as_str()))
    }

    pub fn result_dir(&self) -> PathBuf {
        self.root.join(RESULT_DIR)
    }

    pub fn result_file(&self) -> PathBuf {
        self.result_dir().join(albumsense::results::RESULT_FILE)
    }
}
