//! Conversion journeys as delivered by a touchpoint source: the conversion
//! value plus raw touchpoint records, prepared into the ordered touchpoint
//! list the engine expects.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use trackflow_core::config::AttributionSettings;
use trackflow_core::error::TrackflowResult;
use trackflow_core::types::{touchpoints_from_records, Touchpoint, TouchpointRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJourney {
    pub conversion_value: f64,
    /// When the conversion happened. Defaults to the latest touchpoint.
    #[serde(default)]
    pub converted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub touchpoints: Vec<TouchpointRecord>,
}

impl ConversionJourney {
    /// Validates the records, orders them by timestamp (stable, so ties keep
    /// their recorded order) and keeps only those inside the site-wide
    /// attribution window before the conversion.
    pub fn collect_touchpoints(&self, settings: &AttributionSettings) -> TrackflowResult<Vec<Touchpoint>> {
        let mut touchpoints = touchpoints_from_records(self.touchpoints.iter().cloned())?;
        touchpoints.sort_by_key(|t| t.timestamp);

        let Some(converted_at) = self
            .converted_at
            .or_else(|| touchpoints.last().map(|t| t.timestamp))
        else {
            return Ok(touchpoints);
        };
        let window_start =
            converted_at.checked_sub_signed(Duration::days(i64::from(settings.attribution_window_days)));

        let total = touchpoints.len();
        touchpoints.retain(|t| {
            window_start.map_or(true, |start| t.timestamp >= start) && t.timestamp <= converted_at
        });
        debug!(
            total,
            kept = touchpoints.len(),
            window_days = settings.attribution_window_days,
            "Collected journey touchpoints"
        );
        Ok(touchpoints)
    }
}
