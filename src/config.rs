//! Configuration management for headline-reader.
//!
//! Loads config from YAML files in standard locations. Every section is
//! optional; missing keys take their defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn default_headlines() -> Vec<String> {
    [
        "Breaking News: Scientists discover new renewable energy source",
        "Sports Update: National team qualifies for world cup finals",
        "Technology: New smartphone breaks sales records worldwide",
        "Weather Alert: Heavy rainfall expected in coastal regions",
        "Business: Stock markets reach all-time high",
        "Health: Breakthrough in cancer treatment research",
        "Entertainment: Award-winning movie releases globally",
        "Politics: International summit addresses climate change",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub tap_slop_px: f32,
    pub double_tap_ms: u64,
    pub long_press_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            tap_slop_px: 10.0,
            double_tap_ms: 300,
            long_press_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForegroundConfig {
    pub poll_interval_ms: u64,
    /// Matched case-insensitively against the active window title.
    pub host_app: String,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            host_app: "Headline Reader".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub screen_width: f32,
    pub edge_inset: f32,
    pub top_offset: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            screen_width: 1080.0,
            edge_inset: 200.0,
            top_offset: 300.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub title: String,
    pub preview_chars: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: "Headline Reader".into(),
            preview_chars: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub engine: String,
    pub voice: Option<String>,
    pub words_per_minute: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: "espeak-ng".into(),
            voice: None,
            words_per_minute: 175,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8768,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub headlines: Vec<String>,
    pub gesture: GestureConfig,
    pub foreground: ForegroundConfig,
    pub overlay: OverlayConfig,
    pub notification: NotificationConfig,
    pub tts: TtsConfig,
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headlines: default_headlines(),
            gesture: GestureConfig::default(),
            foreground: ForegroundConfig::default(),
            overlay: OverlayConfig::default(),
            notification: NotificationConfig::default(),
            tts: TtsConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/headline-reader/config.yaml
    /// 3. /etc/headline-reader/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/headline-reader/config.yaml")),
                Some(PathBuf::from("/etc/headline-reader/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config.validated()
                }
                Err(e) => {
                    warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }
}

impl Config {
    /// Replace values the service cannot run with by their defaults.
    fn validated(mut self) -> Self {
        if self.foreground.poll_interval_ms == 0 {
            let fallback = ForegroundConfig::default().poll_interval_ms;
            warn!("foreground.poll_interval_ms must be positive, using {fallback}");
            self.foreground.poll_interval_ms = fallback;
        }
        let slop = self.gesture.tap_slop_px;
        if slop.is_nan() || slop < 0.0 {
            let fallback = GestureConfig::default().tap_slop_px;
            warn!("gesture.tap_slop_px must be non-negative, using {fallback}");
            self.gesture.tap_slop_px = fallback;
        }
        if self.tts.words_per_minute == 0 {
            let fallback = TtsConfig::default().words_per_minute;
            warn!("tts.words_per_minute must be positive, using {fallback}");
            self.tts.words_per_minute = fallback;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = Config::default();
        assert_eq!(config.headlines.len(), 8);
        assert_eq!(config.gesture.tap_slop_px, 10.0);
        assert_eq!(config.gesture.double_tap_ms, 300);
        assert_eq!(config.gesture.long_press_ms, 500);
        assert_eq!(config.foreground.poll_interval_ms, 1000);
        assert_eq!(config.notification.preview_chars, 30);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let (_dir, path) = write_config(
            "headlines:\n  - One\n  - Two\noverlay:\n  enabled: false\ntts:\n  voice: en-us\n",
        );
        let config = Config::load(Some(path.as_path()));

        assert_eq!(config.headlines, vec!["One".to_string(), "Two".to_string()]);
        assert!(!config.overlay.enabled);
        assert_eq!(config.overlay.edge_inset, 200.0);
        assert_eq!(config.tts.voice.as_deref(), Some("en-us"));
        assert_eq!(config.tts.engine, "espeak-ng");
        assert_eq!(config.api.port, 8768);
    }

    #[test]
    fn unusable_values_are_replaced_by_defaults() {
        let (_dir, path) = write_config(
            "foreground:\n  poll_interval_ms: 0\n  host_app: Reader\ngesture:\n  tap_slop_px: -4\n  double_tap_ms: 250\ntts:\n  words_per_minute: 0\n",
        );
        let config = Config::load(Some(path.as_path()));

        assert_eq!(config.foreground.poll_interval_ms, 1000);
        assert_eq!(config.foreground.host_app, "Reader");
        assert_eq!(config.gesture.tap_slop_px, 10.0);
        assert_eq!(config.gesture.double_tap_ms, 250);
        assert_eq!(config.tts.words_per_minute, 175);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let (_dir, path) = write_config("gesture: [not, a, map\n");
        let config = Config::load(Some(path.as_path()));
        assert_eq!(config.gesture.double_tap_ms, 300);
        assert_eq!(config.headlines.len(), 8);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.yaml").as_path()));
        assert!(config.notification.enabled);
    }
}
