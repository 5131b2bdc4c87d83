//! Process-wide editor configuration.
//!
//! Settings that used to live in ambient globals (theme, tutorial flag,
//! storage key) are gathered in one [`EditorConfig`]. An application installs
//! its config once at startup; components receive a config by value so tests
//! can hand in their own without touching the global.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static GLOBAL: OnceLock<EditorConfig> = OnceLock::new();

/// Canvas color scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Maximum number of undo steps kept. Default: **50**.
    pub max_history: usize,
    /// Quiet period before an autosave fires. Default: **1000 ms**.
    pub autosave_debounce_ms: u64,
    /// Key the document is stored under in the key-value store.
    pub storage_key: String,
    /// Version string injected into saved documents.
    pub app_version: String,
    pub theme: Theme,
    /// Whether the first-run tutorial overlay should be shown.
    pub show_tutorial: bool,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Multiplicative step used by zoom in/out.
    pub zoom_step: f32,
    /// Initialization attempts before the fallback state is shown.
    pub init_retry_attempts: u32,
    /// First retry delay; doubles on every further attempt.
    pub init_retry_base_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            autosave_debounce_ms: 1000,
            storage_key: "flowchart-data".into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
            theme: Theme::Light,
            show_tutorial: true,
            min_zoom: 0.1,
            max_zoom: 5.0,
            zoom_step: 1.1,
            init_retry_attempts: 3,
            init_retry_base_ms: 200,
        }
    }
}

impl EditorConfig {
    /// Parse a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Install the process-wide config. Returns the rejected config if one
    /// was already installed.
    pub fn install(config: EditorConfig) -> Result<(), EditorConfig> {
        GLOBAL.set(config)
    }

    /// The installed config, or the defaults if none was installed.
    pub fn global() -> &'static EditorConfig {
        GLOBAL.get_or_init(EditorConfig::default)
    }

    /// Clamp a zoom level into the configured range.
    pub fn clamp_zoom(&self, level: f32) -> f32 {
        if level.is_nan() {
            return 1.0;
        }
        level.clamp(self.min_zoom, self.max_zoom)
    }
}
