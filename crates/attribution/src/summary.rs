//! Journey summaries — credit rolled up by channel, source and campaign.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use trackflow_core::error::TrackflowResult;
use trackflow_core::model::{AttributionModel, ModelType};
use trackflow_core::types::AttributionResult;
use trackflow_core::Touchpoint;

use crate::engine::{calculate_touchpoint_credits, eligible_touchpoints};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionSummary {
    /// Model the engine actually ran.
    pub model: ModelType,
    pub touchpoint_count: usize,
    pub conversion_value: f64,
    pub by_channel: AttributionResult,
    /// Credit fraction per touchpoint source (`direct` when unset).
    pub by_source: BTreeMap<String, f64>,
    /// Credit fraction per campaign; touchpoints without a campaign are left out.
    pub by_campaign: BTreeMap<String, f64>,
}

pub fn summarize_journey(
    touchpoints: &[Touchpoint],
    conversion_value: f64,
    model: &AttributionModel,
) -> TrackflowResult<AttributionSummary> {
    let credits = calculate_touchpoint_credits(touchpoints, conversion_value, model)?;
    let touchpoint_count = eligible_touchpoints(touchpoints, model).len();

    let mut by_source = BTreeMap::new();
    let mut by_campaign = BTreeMap::new();
    for share in &credits {
        *by_source
            .entry(share.touchpoint.source_or_direct().to_string())
            .or_insert(0.0) += share.credit;
        if let Some(campaign) = &share.touchpoint.campaign {
            *by_campaign.entry(campaign.clone()).or_insert(0.0) += share.credit;
        }
    }

    Ok(AttributionSummary {
        model: model.effective_type(),
        touchpoint_count,
        conversion_value,
        by_channel: credits.iter().collect(),
        by_source,
        by_campaign,
    })
}
