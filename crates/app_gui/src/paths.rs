use directories_next::ProjectDirs;
use std::path::{Path, PathBuf};

/// Where the config file and downloaded data live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Platform directories, or the working directory when none exist.
    pub fn resolve() -> Self {
        match ProjectDirs::from("io", "TubePilot", "TubePilot") {
            Some(dirs) => Self::new(dirs.config_dir(), dirs.data_dir()),
            None => {
                tracing::warn!("no platform config directory; using working directory");
                Self::new(Path::new("."), Path::new("."))
            }
        }
    }

    pub fn new(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            data_dir: data_dir.to_path_buf(),
        }
    }
}
