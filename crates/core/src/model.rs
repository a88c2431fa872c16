//! Attribution model configuration: model types, the model value object and
//! the validated custom weight tables.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{TrackflowError, TrackflowResult};

/// Decay rate applied by time-decay models that do not set one.
pub const DEFAULT_DECAY_RATE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    FirstTouch,
    LastTouch,
    Linear,
    TimeDecay,
    PositionBased,
    Custom,
    /// Any type name the host stored that this engine does not know.
    #[serde(other)]
    Unrecognized,
}

impl ModelType {
    pub const ALL: [ModelType; 6] = [
        ModelType::FirstTouch,
        ModelType::LastTouch,
        ModelType::Linear,
        ModelType::TimeDecay,
        ModelType::PositionBased,
        ModelType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::FirstTouch => "first_touch",
            ModelType::LastTouch => "last_touch",
            ModelType::Linear => "linear",
            ModelType::TimeDecay => "time_decay",
            ModelType::PositionBased => "position_based",
            ModelType::Custom => "custom",
            ModelType::Unrecognized => "unrecognized",
        }
    }

    /// Parses a stored type name. Unknown names map to `Unrecognized`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name.trim())
            .unwrap_or(ModelType::Unrecognized)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ModelType::Unrecognized)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Custom Weights ─────────────────────────────────────────────────────────

/// Channel weight table, normalized to sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChannelWeights {
    channel_to_weight: BTreeMap<String, f64>,
}

impl ChannelWeights {
    /// Normalized weight of `channel`; channels missing from the table weigh 0.
    pub fn weight(&self, channel: &str) -> f64 {
        self.channel_to_weight.get(channel).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.channel_to_weight.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// First/middle/last position shares, normalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionalWeights {
    first_touch: f64,
    middle_touches: f64,
    last_touch: f64,
}

impl PositionalWeights {
    pub fn first_touch(&self) -> f64 {
        self.first_touch
    }

    pub fn middle_touches(&self) -> f64 {
        self.middle_touches
    }

    pub fn last_touch(&self) -> f64 {
        self.last_touch
    }
}

const POSITION_KEYS: [&str; 3] = ["first_touch", "middle_touches", "last_touch"];

/// Weight table for the custom model. Built only through the validating
/// constructors, so every value held here is finite, non-negative and
/// normalized.
///
/// Accepted blob shapes:
/// - `{"channel": {"email": 2, "paid": 1}}`
/// - `{"positional": {"first_touch": 40, "middle_touches": 20, "last_touch": 40}}`
/// - a bare object whose keys are exactly the position names (positional)
/// - any other bare object of numbers (channel table)
/// - a JSON string holding one of the above
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomWeights {
    Channel(ChannelWeights),
    Positional(PositionalWeights),
}

fn check_weight(label: &str, weight: f64) -> TrackflowResult<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(TrackflowError::invalid_config(format!(
            "custom weight for {label} must be a non-negative number, got {weight}"
        )));
    }
    Ok(())
}

impl CustomWeights {
    pub fn channels<K: Into<String>>(
        weights: impl IntoIterator<Item = (K, f64)>,
    ) -> TrackflowResult<Self> {
        let mut table = BTreeMap::new();
        for (channel, weight) in weights {
            let channel = channel.into();
            check_weight(&channel, weight)?;
            *table.entry(channel).or_insert(0.0) += weight;
        }
        if table.is_empty() {
            return Err(TrackflowError::invalid_config("custom channel weights are empty"));
        }
        let total: f64 = table.values().sum();
        if total <= 0.0 {
            return Err(TrackflowError::invalid_config(
                "custom channel weights sum to zero",
            ));
        }
        for weight in table.values_mut() {
            *weight /= total;
        }
        Ok(Self::Channel(ChannelWeights {
            channel_to_weight: table,
        }))
    }

    pub fn positional(first_touch: f64, middle_touches: f64, last_touch: f64) -> TrackflowResult<Self> {
        check_weight("first_touch", first_touch)?;
        check_weight("middle_touches", middle_touches)?;
        check_weight("last_touch", last_touch)?;
        let total = first_touch + middle_touches + last_touch;
        if total <= 0.0 {
            return Err(TrackflowError::invalid_config(
                "custom positional weights sum to zero",
            ));
        }
        Ok(Self::Positional(PositionalWeights {
            first_touch: first_touch / total,
            middle_touches: middle_touches / total,
            last_touch: last_touch / total,
        }))
    }

    /// Parses a raw weight blob, reporting why it was rejected.
    pub fn try_from_value(value: &Value) -> TrackflowResult<Self> {
        match value {
            Value::String(raw) => {
                let inner: Value = serde_json::from_str(raw).map_err(|e| {
                    TrackflowError::invalid_config(format!("custom weights are not JSON: {e}"))
                })?;
                if inner.is_string() {
                    return Err(TrackflowError::invalid_config(
                        "custom weights are doubly encoded",
                    ));
                }
                Self::try_from_value(&inner)
            }
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(table) = map.get("channel") {
                        return Self::channels(numeric_entries(table)?);
                    }
                    if let Some(table) = map.get("positional") {
                        return Self::positional_from_table(table);
                    }
                }
                if !map.is_empty() && map.keys().all(|k| POSITION_KEYS.contains(&k.as_str())) {
                    return Self::positional_from_table(value);
                }
                Self::channels(numeric_entries(value)?)
            }
            other => Err(TrackflowError::invalid_config(format!(
                "custom weights must be an object, got {other}"
            ))),
        }
    }

    /// Lenient variant used when reading stored models: malformed blobs are
    /// logged and dropped so the model degrades to linear.
    pub fn from_value(value: &Value) -> Option<Self> {
        match Self::try_from_value(value) {
            Ok(weights) => Some(weights),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed custom attribution weights");
                None
            }
        }
    }

    fn positional_from_table(table: &Value) -> TrackflowResult<Self> {
        let entries: BTreeMap<String, f64> = numeric_entries(table)?.into_iter().collect();
        if let Some(key) = entries.keys().find(|k| !POSITION_KEYS.contains(&k.as_str())) {
            return Err(TrackflowError::invalid_config(format!(
                "unknown position {key} in custom weights"
            )));
        }
        let get = |key: &str| entries.get(key).copied().unwrap_or(0.0);
        Self::positional(get("first_touch"), get("middle_touches"), get("last_touch"))
    }
}

fn numeric_entries(table: &Value) -> TrackflowResult<Vec<(String, f64)>> {
    let map = table
        .as_object()
        .ok_or_else(|| TrackflowError::invalid_config("custom weight table must be an object"))?;
    map.iter()
        .map(|(key, weight)| {
            weight.as_f64().map(|w| (key.clone(), w)).ok_or_else(|| {
                TrackflowError::invalid_config(format!("custom weight for {key} is not a number"))
            })
        })
        .collect()
}

impl<'de> Deserialize<'de> for CustomWeights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::try_from_value(&raw).map_err(serde::de::Error::custom)
    }
}

fn lenient_custom_weights<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<CustomWeights>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| CustomWeights::from_value(&v)))
}

// ─── Attribution Model ──────────────────────────────────────────────────────

/// One attribution model configuration. Supplied fresh to every calculation;
/// `is_default` and `is_active` only matter to the model registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model_type: Option<ModelType>,
    /// Unset means no lookback limit.
    #[serde(default)]
    pub lookback_days: Option<u32>,
    #[serde(default)]
    pub decay_rate: Option<f64>,
    #[serde(default = "default_minimum_touchpoints")]
    pub minimum_touchpoints: u32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    #[serde(
        default,
        deserialize_with = "lenient_custom_weights",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_weights: Option<CustomWeights>,
}

fn default_minimum_touchpoints() -> u32 {
    1
}
fn default_is_active() -> bool {
    true
}

impl Default for AttributionModel {
    fn default() -> Self {
        Self {
            name: String::new(),
            model_type: None,
            lookback_days: None,
            decay_rate: None,
            minimum_touchpoints: default_minimum_touchpoints(),
            is_default: false,
            is_active: default_is_active(),
            custom_weights: None,
        }
    }
}

impl AttributionModel {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            model_type: Some(model_type),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = Some(days);
        self
    }

    pub fn with_decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = Some(rate);
        self
    }

    pub fn with_minimum_touchpoints(mut self, minimum: u32) -> Self {
        self.minimum_touchpoints = minimum;
        self
    }

    pub fn with_custom_weights(mut self, weights: CustomWeights) -> Self {
        self.custom_weights = Some(weights);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Type the engine dispatches on. Unset and unrecognized types run as
    /// last touch.
    pub fn effective_type(&self) -> ModelType {
        match self.model_type {
            Some(t) if t.is_recognized() => t,
            _ => ModelType::LastTouch,
        }
    }

    pub fn decay_rate_or_default(&self) -> f64 {
        self.decay_rate.unwrap_or(DEFAULT_DECAY_RATE)
    }

    /// Minimum touchpoint count, never below 1.
    pub fn minimum_touchpoints(&self) -> usize {
        self.minimum_touchpoints.max(1) as usize
    }

    /// Bounds every calculation re-checks: `decay_rate` in (0, 1] and
    /// `lookback_days` at least 1, when present.
    pub fn validate(&self) -> TrackflowResult<()> {
        if let Some(rate) = self.decay_rate {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(TrackflowError::invalid_config(format!(
                    "decay_rate must be in (0, 1], got {rate}"
                )));
            }
        }
        if let Some(days) = self.lookback_days {
            if days < 1 {
                return Err(TrackflowError::invalid_config(
                    "lookback_days must be at least 1",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_type_names_round_trip() {
        for t in ModelType::ALL {
            assert_eq!(ModelType::from_name(t.as_str()), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        assert_eq!(ModelType::from_name("markov"), ModelType::Unrecognized);
    }

    #[test]
    fn test_unknown_model_type_deserializes_as_unrecognized() {
        let model: AttributionModel =
            serde_json::from_value(json!({"name": "odd", "model_type": "shapley"})).unwrap();
        assert_eq!(model.model_type, Some(ModelType::Unrecognized));
        assert_eq!(model.effective_type(), ModelType::LastTouch);
    }

    #[test]
    fn test_unset_model_type_runs_as_last_touch() {
        let model: AttributionModel = serde_json::from_value(json!({})).unwrap();
        assert_eq!(model.model_type, None);
        assert_eq!(model.effective_type(), ModelType::LastTouch);
        assert_eq!(model.minimum_touchpoints, 1);
        assert!(model.is_active);
    }

    #[test]
    fn test_zero_minimum_is_treated_as_one() {
        let model = AttributionModel::new(ModelType::Linear).with_minimum_touchpoints(0);
        assert_eq!(model.minimum_touchpoints(), 1);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(AttributionModel::new(ModelType::TimeDecay)
            .with_decay_rate(1.0)
            .validate()
            .is_ok());
        for rate in [0.0, -0.2, 1.5, f64::NAN] {
            let err = AttributionModel::new(ModelType::TimeDecay)
                .with_decay_rate(rate)
                .validate()
                .unwrap_err();
            assert!(matches!(err, TrackflowError::InvalidConfig(_)));
        }
        let err = AttributionModel::new(ModelType::Linear)
            .with_lookback_days(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, TrackflowError::InvalidConfig(_)));
    }

    #[test]
    fn test_channel_weights_are_normalized() {
        let weights = CustomWeights::channels([("email", 3.0), ("paid", 1.0)]).unwrap();
        match weights {
            CustomWeights::Channel(table) => {
                assert!((table.weight("email") - 0.75).abs() < 1e-12);
                assert!((table.weight("paid") - 0.25).abs() < 1e-12);
                assert_eq!(table.weight("organic"), 0.0);
            }
            other => panic!("expected channel weights, got {other:?}"),
        }
    }

    #[test]
    fn test_channel_weights_reject_bad_tables() {
        assert!(CustomWeights::channels(Vec::<(String, f64)>::new()).is_err());
        assert!(CustomWeights::channels([("email", -1.0)]).is_err());
        assert!(CustomWeights::channels([("email", 0.0), ("paid", 0.0)]).is_err());
        assert!(CustomWeights::channels([("email", f64::INFINITY)]).is_err());
    }

    #[test]
    fn test_positional_weights_from_percentages() {
        let weights = CustomWeights::try_from_value(
            &json!({"first_touch": 30, "middle_touches": 40, "last_touch": 30}),
        )
        .unwrap();
        match weights {
            CustomWeights::Positional(p) => {
                assert!((p.first_touch() - 0.3).abs() < 1e-12);
                assert!((p.middle_touches() - 0.4).abs() < 1e-12);
                assert!((p.last_touch() - 0.3).abs() < 1e-12);
            }
            other => panic!("expected positional weights, got {other:?}"),
        }
    }

    #[test]
    fn test_weight_blob_shapes() {
        let tagged = CustomWeights::try_from_value(&json!({"channel": {"email": 1, "paid": 1}}));
        assert!(matches!(tagged, Ok(CustomWeights::Channel(_))));

        let bare = CustomWeights::try_from_value(&json!({"email": 2, "organic": 1}));
        assert!(matches!(bare, Ok(CustomWeights::Channel(_))));

        let stringly = CustomWeights::try_from_value(&json!(
            r#"{"positional": {"first_touch": 50, "last_touch": 50}}"#
        ));
        assert!(matches!(stringly, Ok(CustomWeights::Positional(_))));

        assert!(CustomWeights::try_from_value(&json!([1, 2, 3])).is_err());
        assert!(CustomWeights::try_from_value(&json!({"email": "lots"})).is_err());
        assert!(CustomWeights::try_from_value(&json!("not json")).is_err());
        assert!(CustomWeights::try_from_value(&json!({"positional": {"opening": 10}})).is_err());
    }

    #[test]
    fn test_malformed_weights_are_dropped_when_reading_models() {
        let model: AttributionModel = serde_json::from_value(json!({
            "name": "weighted",
            "model_type": "custom",
            "custom_weights": {"email": "heavy"}
        }))
        .unwrap();
        assert_eq!(model.model_type, Some(ModelType::Custom));
        assert!(model.custom_weights.is_none());

        let model: AttributionModel = serde_json::from_value(json!({
            "model_type": "custom",
            "custom_weights": null
        }))
        .unwrap();
        assert!(model.custom_weights.is_none());
    }

    #[test]
    fn test_serialized_weights_read_back() {
        let model = AttributionModel::new(ModelType::Custom)
            .with_custom_weights(CustomWeights::channels([("email", 1.0), ("paid", 3.0)]).unwrap());
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["custom_weights"]["channel"]["paid"], 0.75);
        let back: AttributionModel = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }
}
