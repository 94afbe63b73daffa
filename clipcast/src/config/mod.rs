//! Application configuration.
//!
//! Values come from an optional TOML file, then environment overrides.
//! Every field has a default so an empty file (or no file) is valid.

mod profile;

pub use profile::{BroadcastConfig, EncodingProfile};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "clipcast";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tools: ToolsConfig,
    /// Directory for temp files, the composed output and `stream_info.json`.
    pub work_dir: PathBuf,
    pub profile: EncodingProfile,
    pub overlay: OverlayConfig,
    pub broadcast: BroadcastConfig,
    pub notifier: NotifierConfig,
    pub acquisition: AcquisitionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            work_dir: PathBuf::from("."),
            profile: EncodingProfile::default(),
            overlay: OverlayConfig::default(),
            broadcast: BroadcastConfig::default(),
            notifier: NotifierConfig::default(),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

/// Overlay placement and animation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Margin in pixels between the logo and the top-right corner.
    pub logo_margin: u32,
    /// Playback time (seconds) at which the animated overlay enters.
    pub entry_secs: f64,
    /// How long the animated overlay stays on screen.
    pub window_secs: f64,
    /// Duration of the slide-in and slide-out phases.
    pub slide_secs: f64,
    pub text_width: u32,
    pub text_height: u32,
    pub font_size: u32,
    pub font_color: String,
    pub font_file: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            logo_margin: 20,
            entry_secs: 360.0,
            window_secs: 60.0,
            slide_secs: 1.0,
            text_width: 1280,
            text_height: 120,
            font_size: 48,
            font_color: "white".to_string(),
            font_file: None,
        }
    }
}

/// Status coordinator endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// When unset, status events are only logged.
    pub status_url: Option<String>,
    pub timeout_secs: u64,
    pub bearer_token: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            status_url: None,
            timeout_secs: 30,
            bearer_token: None,
            headers: Vec::new(),
        }
    }
}

/// Remote asset download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Template turning an opaque storage identifier into a download URL; `{id}` is replaced.
    pub download_url_template: String,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            download_url_template: "https://drive.google.com/uc?export=download&id={id}"
                .to_string(),
            timeout_secs: 600,
            user_agent: None,
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the per-user config file is
    /// read if present. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Per-user config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading config", path, e))?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FFMPEG_PATH").filter(|v| !v.is_empty()) {
            self.tools.ffmpeg_path = v;
        }
        if let Some(v) = lookup("FFPROBE_PATH").filter(|v| !v.is_empty()) {
            self.tools.ffprobe_path = v;
        }
        if let Some(v) = lookup("CLIPCAST_WORK_DIR").filter(|v| !v.is_empty()) {
            self.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLIPCAST_STATUS_URL").filter(|v| !v.is_empty()) {
            self.notifier.status_url = Some(v);
        }
    }

    /// Reject settings that would produce nonsensical engine invocations.
    pub fn validate(&self) -> Result<()> {
        self.profile.validate()?;
        if self.broadcast.grace_period_secs == 0 {
            return Err(Error::config("broadcast.grace_period_secs must be positive"));
        }
        let overlay = &self.overlay;
        if overlay.entry_secs < 0.0 {
            return Err(Error::config("overlay.entry_secs must not be negative"));
        }
        if overlay.slide_secs <= 0.0 || overlay.slide_secs * 2.0 >= overlay.window_secs {
            return Err(Error::config(
                "overlay.slide_secs must be positive and shorter than half of overlay.window_secs",
            ));
        }
        if overlay.text_width == 0 || overlay.text_height == 0 {
            return Err(Error::config("overlay text image dimensions must be positive"));
        }
        if !self.acquisition.download_url_template.contains("{id}") {
            return Err(Error::config(
                "acquisition.download_url_template must contain '{id}'",
            ));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.broadcast.grace_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tools.ffmpeg_path, "ffmpeg");
        assert_eq!(config.overlay.entry_secs, 360.0);
        assert_eq!(config.overlay.window_secs, 60.0);
        assert_eq!(config.grace_period(), Duration::from_secs(60));
        assert!(config.notifier.status_url.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            work_dir = "/var/clipcast"

            [overlay]
            entry_secs = 120.0

            [notifier]
            status_url = "https://coordinator.example/status"
            "#,
        )
        .unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/var/clipcast"));
        assert_eq!(config.overlay.entry_secs, 120.0);
        assert_eq!(config.overlay.window_secs, 60.0);
        assert_eq!(
            config.notifier.status_url.as_deref(),
            Some("https://coordinator.example/status")
        );
        assert_eq!(config.profile.width, 1920);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("overlay = 3").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "FFMPEG_PATH" => Some("/opt/ffmpeg/bin/ffmpeg".to_string()),
            "CLIPCAST_STATUS_URL" => Some("http://localhost:9000/status".to_string()),
            "FFPROBE_PATH" => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.tools.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.tools.ffprobe_path, "ffprobe");
        assert_eq!(
            config.notifier.status_url.as_deref(),
            Some("http://localhost:9000/status")
        );
    }

    #[test]
    fn test_validate_rejects_overlong_slide() {
        let mut config = AppConfig::default();
        config.overlay.slide_secs = 30.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.broadcast.grace_period_secs = 0;
        assert!(config.validate().is_err());
    }
}
