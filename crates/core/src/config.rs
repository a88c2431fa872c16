use serde::Deserialize;

use crate::model::ModelType;

/// Root application configuration. Loaded from environment variables
/// with the prefix `TRACKFLOW__` and an optional TOML config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub attribution: AttributionSettings,
}

/// Site-wide attribution settings, the counterpart of the host's
/// "TrackFlow Settings" single document.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributionSettings {
    /// Horizon the touchpoint source uses when collecting a visitor's journey.
    #[serde(default = "default_attribution_window_days")]
    pub attribution_window_days: u32,
    #[serde(default = "default_fallback_model_type")]
    pub fallback_model_type: ModelType,
    #[serde(default = "default_fallback_lookback_days")]
    pub fallback_lookback_days: u32,
    #[serde(default = "default_decay_rate")]
    pub default_decay_rate: f64,
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: u32,
}

fn default_attribution_window_days() -> u32 {
    90
}
fn default_fallback_model_type() -> ModelType {
    ModelType::LastTouch
}
fn default_fallback_lookback_days() -> u32 {
    30
}
fn default_decay_rate() -> f64 {
    0.1
}
fn default_max_lookback_days() -> u32 {
    365
}

impl Default for AttributionSettings {
    fn default() -> Self {
        Self {
            attribution_window_days: default_attribution_window_days(),
            fallback_model_type: default_fallback_model_type(),
            fallback_lookback_days: default_fallback_lookback_days(),
            default_decay_rate: default_decay_rate(),
            max_lookback_days: default_max_lookback_days(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("TRACKFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
