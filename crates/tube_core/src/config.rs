use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::inference::ClassifierConfig;

/// Browser and timer settings for the playback controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub webdriver_url: String,
    /// Start `chromedriver` ourselves when nothing answers on `webdriver_url`.
    pub spawn_chromedriver: bool,
    pub chromedriver_path: String,
    /// e.g. `host:port` or `socks5://host:port`.
    pub proxy: Option<String>,
    /// Browser profile name; becomes a folder below `profiles_dir`.
    pub profile: Option<String>,
    pub profiles_dir: PathBuf,
    pub connect_timeout_secs: u64,
    pub page_load_timeout_secs: u64,
    pub auto_skip_ads: bool,
    pub ad_skip_interval_ms: u64,
    pub refresh_interval_ms: u64,
    pub error_check_interval_ms: u64,
    pub error_reload_cooldown_secs: u64,
    pub annotate_frames: bool,
    pub frame_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            spawn_chromedriver: true,
            chromedriver_path: "chromedriver".to_string(),
            proxy: None,
            profile: None,
            profiles_dir: PathBuf::from("profiles"),
            connect_timeout_secs: 30,
            page_load_timeout_secs: 30,
            auto_skip_ads: true,
            ad_skip_interval_ms: 700,
            refresh_interval_ms: 1500,
            error_check_interval_ms: 3000,
            error_reload_cooldown_secs: 20,
            annotate_frames: false,
            frame_interval_ms: 5000,
        }
    }
}

impl PlayerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn ad_skip_interval(&self) -> Duration {
        Duration::from_millis(self.ad_skip_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn error_check_interval(&self) -> Duration {
        Duration::from_millis(self.error_check_interval_ms)
    }

    pub fn error_reload_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_reload_cooldown_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub player: PlayerConfig,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    /// Defaults with browser profiles and model weights placed below `dir`.
    pub fn with_data_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut config = Self::default();
        config.player.profiles_dir = dir.join("profiles");
        config.classifier.weights_path = dir.join("models").join("resnet18.safetensors");
        config
    }

    pub fn read(file: &mut impl Read, path: &Path) -> Result<Self, ConfigError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn read_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read(&mut file, path)
    }

    /// Reads `path` when it exists, otherwise returns `fallback`.
    pub fn load_or(path: impl AsRef<Path>, fallback: Self) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("using config file {}", path.display());
            Self::read_path(path)
        } else {
            tracing::warn!("no config file at {}; using defaults", path.display());
            Ok(fallback)
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TEST_CONFIG: &str = r#"
[player]
webdriver_url = "http://127.0.0.1:4444"
proxy = "socks5://127.0.0.1:1080"
ad_skip_interval_ms = 500

[classifier]
input_size = 160
"#;

    #[test]
    fn partial_config_fills_in_defaults() {
        let config =
            AppConfig::read(&mut Cursor::new(TEST_CONFIG), Path::new("test.toml")).unwrap();
        assert_eq!(config.player.webdriver_url, "http://127.0.0.1:4444");
        assert_eq!(config.player.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.player.ad_skip_interval(), Duration::from_millis(500));
        assert!(config.player.auto_skip_ads);
        assert_eq!(config.classifier.input_size, 160);
        assert_eq!(config.classifier.num_classes, 1000);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = AppConfig::read(&mut Cursor::new("[player"), Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn save_then_load_preserves_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::with_data_dir(dir.path());
        config.player.profile = Some("work".into());
        config.player.annotate_frames = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load_or(&path, AppConfig::default()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_returns_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = AppConfig::with_data_dir(dir.path());
        let loaded = AppConfig::load_or(dir.path().join("none.toml"), fallback.clone()).unwrap();
        assert_eq!(loaded, fallback);
        assert!(loaded.classifier.weights_path.starts_with(dir.path()));
    }
}
