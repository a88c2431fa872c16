//! Attribution model registry — the configuration store in front of the
//! engine. Validates model definitions, keeps at most one default, and
//! resolves which model a calculation should run with.

use dashmap::DashMap;
use tracing::{info, warn};

use trackflow_core::config::AttributionSettings;
use trackflow_core::error::{TrackflowError, TrackflowResult};
use trackflow_core::model::{AttributionModel, ModelType};

pub struct ModelRegistry {
    models: DashMap<String, AttributionModel>,
    settings: AttributionSettings,
}

impl ModelRegistry {
    pub fn new(settings: &AttributionSettings) -> Self {
        Self {
            models: DashMap::new(),
            settings: settings.clone(),
        }
    }

    /// Validates and stores a model, replacing any model with the same name.
    /// Registering a default model clears the flag on every other model.
    pub fn register(&self, mut model: AttributionModel) -> TrackflowResult<()> {
        self.validate(&model)?;

        if model.model_type == Some(ModelType::TimeDecay) && model.decay_rate.is_none() {
            model.decay_rate = Some(self.settings.default_decay_rate);
        }

        if model.is_default {
            for mut other in self.models.iter_mut() {
                if other.key() != &model.name && other.is_default {
                    other.is_default = false;
                    info!(model = %other.key(), "Cleared previous default attribution model");
                }
            }
        }

        info!(
            model = %model.name,
            model_type = ?model.model_type,
            is_default = model.is_default,
            "Registered attribution model"
        );
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    fn validate(&self, model: &AttributionModel) -> TrackflowResult<()> {
        if model.name.trim().is_empty() {
            return Err(TrackflowError::invalid_config("model name must not be blank"));
        }
        match model.model_type {
            Some(t) if t.is_recognized() => {}
            other => {
                return Err(TrackflowError::invalid_config(format!(
                    "invalid model type for {}: {}",
                    model.name,
                    other.map_or("<unset>", |t| t.as_str())
                )));
            }
        }
        model.validate()?;
        if let Some(days) = model.lookback_days {
            if days > self.settings.max_lookback_days {
                return Err(TrackflowError::invalid_config(format!(
                    "lookback window cannot exceed {} days",
                    self.settings.max_lookback_days
                )));
            }
        }
        if model.model_type == Some(ModelType::Custom) && model.custom_weights.is_none() {
            return Err(TrackflowError::invalid_config(format!(
                "custom model {} needs a valid weight table",
                model.name
            )));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<AttributionModel> {
        self.models.get(name).map(|m| m.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<AttributionModel> {
        self.models.remove(name).map(|(_, m)| m)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// All registered models, sorted by name.
    pub fn list(&self) -> Vec<AttributionModel> {
        let mut models: Vec<_> = self.models.iter().map(|m| m.value().clone()).collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    /// The active default model, or the configured fallback when none is set.
    pub fn default_model(&self) -> AttributionModel {
        let default = self
            .models
            .iter()
            .find(|m| m.is_default && m.is_active)
            .map(|m| m.value().clone());
        default.unwrap_or_else(|| self.fallback_model())
    }

    fn fallback_model(&self) -> AttributionModel {
        let model_type = self.settings.fallback_model_type;
        let mut model = AttributionModel::new(model_type)
            .with_name(format!("{model_type}_default"))
            .with_lookback_days(self.settings.fallback_lookback_days);
        if model_type == ModelType::TimeDecay {
            model.decay_rate = Some(self.settings.default_decay_rate);
        }
        model
    }

    /// The named active model, or the default model when the name is absent,
    /// unknown or inactive.
    pub fn resolve(&self, name: Option<&str>) -> AttributionModel {
        let Some(name) = name else {
            return self.default_model();
        };
        match self.get(name) {
            Some(model) if model.is_active => model,
            Some(_) => {
                warn!(model = %name, "Attribution model is inactive, using default");
                self.default_model()
            }
            None => {
                warn!(model = %name, "Unknown attribution model, using default");
                self.default_model()
            }
        }
    }

    /// Registers every model in a JSON array, stopping at the first invalid one.
    pub fn load_json(&self, json: &str) -> TrackflowResult<usize> {
        let models: Vec<AttributionModel> = serde_json::from_str(json)?;
        let count = models.len();
        for model in models {
            self.register(model)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackflow_core::model::CustomWeights;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(&AttributionSettings::default())
    }

    fn named(name: &str, model_type: ModelType) -> AttributionModel {
        AttributionModel::new(model_type)
            .with_name(name)
            .with_lookback_days(30)
    }

    #[test]
    fn test_fallback_default_is_last_touch_thirty_days() {
        let model = registry().default_model();
        assert_eq!(model.name, "last_touch_default");
        assert_eq!(model.model_type, Some(ModelType::LastTouch));
        assert_eq!(model.lookback_days, Some(30));
    }

    #[test]
    fn test_only_one_default_survives() {
        let reg = registry();
        reg.register(named("Linear", ModelType::Linear).as_default()).unwrap();
        reg.register(named("Decay", ModelType::TimeDecay).as_default()).unwrap();

        let defaults: Vec<_> = reg.list().into_iter().filter(|m| m.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name, "Decay");
        assert_eq!(reg.default_model().name, "Decay");
    }

    #[test]
    fn test_inactive_default_is_skipped() {
        let reg = registry();
        let mut model = named("Paused", ModelType::Linear).as_default();
        model.is_active = false;
        reg.register(model).unwrap();
        assert_eq!(reg.default_model().name, "last_touch_default");
    }

    #[test]
    fn test_resolve_named_and_missing() {
        let reg = registry();
        reg.register(named("Linear", ModelType::Linear)).unwrap();
        reg.register(named("Position", ModelType::PositionBased).as_default())
            .unwrap();

        assert_eq!(reg.resolve(Some("Linear")).name, "Linear");
        assert_eq!(reg.resolve(Some("Nope")).name, "Position");
        assert_eq!(reg.resolve(None).name, "Position");
    }

    #[test]
    fn test_registration_validation() {
        let reg = registry();
        let cases = vec![
            named("  ", ModelType::Linear),
            AttributionModel::default().with_name("untyped"),
            named("weird", ModelType::Unrecognized),
            named("too-long", ModelType::Linear).with_lookback_days(400),
            named("zero", ModelType::Linear).with_lookback_days(0),
            named("hot", ModelType::TimeDecay).with_decay_rate(2.0),
            named("custom", ModelType::Custom),
        ];
        for model in cases {
            let name = model.name.clone();
            let err = reg.register(model).unwrap_err();
            assert!(
                matches!(err, TrackflowError::InvalidConfig(_)),
                "expected InvalidConfig for {name:?}"
            );
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn test_time_decay_gets_configured_rate() {
        let reg = registry();
        reg.register(named("Decay", ModelType::TimeDecay)).unwrap();
        assert_eq!(reg.get("Decay").unwrap().decay_rate, Some(0.1));
    }

    #[test]
    fn test_load_json_registers_models() {
        let reg = registry();
        let json = r#"[
            {"name": "Last Touch", "model_type": "last_touch", "lookback_days": 30},
            {"name": "Weighted", "model_type": "custom", "lookback_days": 60,
             "custom_weights": {"first_touch": 40, "middle_touches": 20, "last_touch": 40},
             "is_default": true}
        ]"#;
        assert_eq!(reg.load_json(json).unwrap(), 2);
        let weighted = reg.default_model();
        assert_eq!(weighted.name, "Weighted");
        assert!(matches!(
            weighted.custom_weights,
            Some(CustomWeights::Positional(_))
        ));
    }

    #[test]
    fn test_remove() {
        let reg = registry();
        reg.register(named("Linear", ModelType::Linear)).unwrap();
        assert!(reg.remove("Linear").is_some());
        assert!(reg.get("Linear").is_none());
    }
}
