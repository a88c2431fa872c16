//! Attribution engine — distributes conversion credit and value across the
//! touchpoints of one journey.
//!
//! Every entry point is a pure function of its arguments. Touchpoints must be
//! sorted ascending by timestamp; the engine does not re-sort them, so the
//! first/last roles and time-decay ages follow the order given.

use chrono::Duration;
use tracing::{debug, warn};

use trackflow_core::error::{TrackflowError, TrackflowResult};
use trackflow_core::model::{AttributionModel, ChannelWeights, CustomWeights, ModelType, PositionalWeights};
use trackflow_core::types::{AttributionResult, Touchpoint, TouchpointCredit};

const POSITION_ENDPOINT_SHARE: f64 = 0.4;
const POSITION_MIDDLE_SHARE: f64 = 0.2;

/// Computes per-channel credit and value for one conversion.
///
/// Returns an empty result when there are no touchpoints, or when fewer than
/// `model.minimum_touchpoints` survive the lookback filter.
pub fn calculate_attribution(
    touchpoints: &[Touchpoint],
    conversion_value: f64,
    model: &AttributionModel,
) -> TrackflowResult<AttributionResult> {
    let credits = calculate_touchpoint_credits(touchpoints, conversion_value, model)?;
    Ok(credits.iter().collect())
}

/// Same pipeline as [`calculate_attribution`], without grouping by channel.
/// Only touchpoints that received a share are returned, in journey order.
pub fn calculate_touchpoint_credits(
    touchpoints: &[Touchpoint],
    conversion_value: f64,
    model: &AttributionModel,
) -> TrackflowResult<Vec<TouchpointCredit>> {
    if !conversion_value.is_finite() || conversion_value < 0.0 {
        return Err(TrackflowError::invalid_input(format!(
            "conversion value must be a non-negative number, got {conversion_value}"
        )));
    }
    model.validate()?;

    let eligible = eligible_touchpoints(touchpoints, model);
    if eligible.is_empty() {
        return Ok(Vec::new());
    }

    let shares = distribute(&eligible, model);
    Ok(eligible
        .into_iter()
        .zip(shares)
        .filter(|(_, credit)| *credit > 0.0)
        .map(|(touchpoint, credit)| TouchpointCredit {
            touchpoint: touchpoint.clone(),
            credit,
            value: conversion_value * credit,
        })
        .collect())
}

/// Touchpoints that take part in the calculation: those inside the lookback
/// window (measured back from the last touchpoint), or none at all when
/// fewer than the model's minimum remain.
pub fn eligible_touchpoints<'a>(
    touchpoints: &'a [Touchpoint],
    model: &AttributionModel,
) -> Vec<&'a Touchpoint> {
    let Some(last) = touchpoints.last() else {
        return Vec::new();
    };

    let eligible: Vec<&Touchpoint> = match model.lookback_days {
        // A window reaching past the representable calendar excludes nothing.
        Some(days) => match last
            .timestamp
            .checked_sub_signed(Duration::days(i64::from(days)))
        {
            Some(cutoff) => touchpoints.iter().filter(|t| t.timestamp >= cutoff).collect(),
            None => touchpoints.iter().collect(),
        },
        None => touchpoints.iter().collect(),
    };

    let dropped = touchpoints.len() - eligible.len();
    if dropped > 0 {
        debug!(
            dropped,
            lookback_days = ?model.lookback_days,
            "Excluded touchpoints outside the lookback window"
        );
    }

    if eligible.len() < model.minimum_touchpoints() {
        debug!(
            eligible = eligible.len(),
            minimum = model.minimum_touchpoints(),
            "Not enough touchpoints for attribution"
        );
        return Vec::new();
    }
    eligible
}

/// Credit share per touchpoint; always sums to 1 for a non-empty journey.
fn distribute(touchpoints: &[&Touchpoint], model: &AttributionModel) -> Vec<f64> {
    let n = touchpoints.len();
    if model.model_type == Some(ModelType::Unrecognized) {
        warn!(model = %model.name, "Unrecognized attribution model type, using last touch");
    }
    let model_type = model.effective_type();
    debug!(model = %model.name, %model_type, touchpoints = n, "Distributing attribution credit");

    match model_type {
        ModelType::FirstTouch => single_share(n, 0),
        ModelType::TimeDecay => time_decay_shares(touchpoints, model.decay_rate_or_default()),
        ModelType::Linear => linear_shares(n),
        ModelType::PositionBased => position_based_shares(n),
        ModelType::Custom => {
            let shares = match &model.custom_weights {
                Some(CustomWeights::Channel(table)) => channel_weighted_shares(touchpoints, table),
                Some(CustomWeights::Positional(weights)) => positional_weighted_shares(n, weights),
                None => None,
            };
            shares.unwrap_or_else(|| {
                warn!(
                    model = %model.name,
                    has_weights = model.custom_weights.is_some(),
                    "Custom weights unusable for this journey, using linear"
                );
                linear_shares(n)
            })
        }
        ModelType::LastTouch | ModelType::Unrecognized => single_share(n, n - 1),
    }
}

fn single_share(n: usize, index: usize) -> Vec<f64> {
    let mut shares = vec![0.0; n];
    shares[index] = 1.0;
    shares
}

fn linear_shares(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Normalizes raw weights, or `None` when they carry no usable mass.
fn normalize(weights: Vec<f64>) -> Option<Vec<f64>> {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    Some(weights.into_iter().map(|w| w / total).collect())
}

/// Weight `(1 - decay_rate) ^ days_before_last`, with whole days truncated.
/// Touchpoints dated after the last one (unsorted input) count as age zero.
fn time_decay_shares(touchpoints: &[&Touchpoint], decay_rate: f64) -> Vec<f64> {
    let n = touchpoints.len();
    let latest = touchpoints[n - 1].timestamp;
    let base = 1.0 - decay_rate;

    let weights = touchpoints
        .iter()
        .map(|t| {
            let days = (latest - t.timestamp).num_days().max(0);
            base.powi(i32::try_from(days).unwrap_or(i32::MAX))
        })
        .collect();

    normalize(weights).unwrap_or_else(|| {
        warn!(decay_rate, "Time decay weights sum to zero, using linear");
        linear_shares(n)
    })
}

fn position_based_shares(n: usize) -> Vec<f64> {
    match n {
        1 => vec![1.0],
        2 => vec![0.5, 0.5],
        _ => {
            let middle = POSITION_MIDDLE_SHARE / (n - 2) as f64;
            let mut shares = vec![middle; n];
            shares[0] = POSITION_ENDPOINT_SHARE;
            shares[n - 1] = POSITION_ENDPOINT_SHARE;
            shares
        }
    }
}

fn channel_weighted_shares(touchpoints: &[&Touchpoint], table: &ChannelWeights) -> Option<Vec<f64>> {
    normalize(touchpoints.iter().map(|t| table.weight(&t.channel)).collect())
}

/// First/middle/last shares from the weight table. Two touchpoints split the
/// first and last shares between them; a single touchpoint takes everything.
fn positional_weighted_shares(n: usize, weights: &PositionalWeights) -> Option<Vec<f64>> {
    match n {
        1 => Some(vec![1.0]),
        2 => normalize(vec![weights.first_touch(), weights.last_touch()]),
        _ => {
            let middle = weights.middle_touches() / (n - 2) as f64;
            let mut shares = vec![middle; n];
            shares[0] = weights.first_touch();
            shares[n - 1] = weights.last_touch();
            normalize(shares)
        }
    }
}
