use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{TrackflowError, TrackflowResult};

/// Channel assigned to touchpoints that carry no channel, source or medium.
pub const DIRECT_CHANNEL: &str = "direct";

/// A single recorded marketing interaction (click, page view, email open).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_channel", deserialize_with = "channel_or_direct")]
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
}

fn default_channel() -> String {
    DIRECT_CHANNEL.to_string()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Null and blank channels read as `direct`, same as [`Touchpoint::new`].
fn channel_or_direct<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(non_blank(raw.as_deref()).map_or_else(default_channel, str::to_string))
}

impl Touchpoint {
    /// A blank channel is recorded as `direct`.
    pub fn new(channel: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let channel = channel.into();
        let channel = match non_blank(Some(channel.as_str())) {
            Some(c) => c.to_string(),
            None => default_channel(),
        };
        Self {
            id: None,
            channel,
            timestamp,
            campaign: None,
            source: None,
            medium: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_campaign(mut self, campaign: impl Into<String>) -> Self {
        self.campaign = Some(campaign.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_medium(mut self, medium: impl Into<String>) -> Self {
        self.medium = Some(medium.into());
        self
    }

    /// Source used for source-level rollups.
    pub fn source_or_direct(&self) -> &str {
        non_blank(self.source.as_deref()).unwrap_or(DIRECT_CHANNEL)
    }
}

/// A touchpoint row as handed over by a touchpoint source, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TouchpointRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
}

impl TouchpointRecord {
    /// Channel label for this record: the explicit channel, else the
    /// `source/medium` pair, else `direct`.
    pub fn resolve_channel(&self) -> String {
        if let Some(channel) = non_blank(self.channel.as_deref()) {
            return channel.to_string();
        }
        match (
            non_blank(self.source.as_deref()),
            non_blank(self.medium.as_deref()),
        ) {
            (Some(source), Some(medium)) => format!("{source}/{medium}"),
            (Some(source), None) => source.to_string(),
            _ => default_channel(),
        }
    }
}

impl TryFrom<TouchpointRecord> for Touchpoint {
    type Error = TrackflowError;

    fn try_from(record: TouchpointRecord) -> TrackflowResult<Self> {
        let channel = record.resolve_channel();
        let timestamp = record.timestamp.ok_or_else(|| {
            TrackflowError::invalid_input(format!(
                "touchpoint {} has no timestamp",
                record.id.as_deref().unwrap_or("<unnamed>")
            ))
        })?;
        Ok(Self {
            id: record.id,
            channel,
            timestamp,
            campaign: record.campaign,
            source: record.source,
            medium: record.medium,
        })
    }
}

/// Converts a batch of records, failing on the first malformed one.
pub fn touchpoints_from_records(
    records: impl IntoIterator<Item = TouchpointRecord>,
) -> TrackflowResult<Vec<Touchpoint>> {
    records.into_iter().map(Touchpoint::try_from).collect()
}

/// Share of a conversion assigned to one touchpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchpointCredit {
    pub touchpoint: Touchpoint,
    pub credit: f64,
    pub value: f64,
}

/// Credit and value assigned to one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelAttribution {
    pub credit: f64,
    pub value: f64,
    pub touchpoint_count: u32,
    #[serde(default)]
    pub touchpoint_ids: Vec<String>,
}

/// Per-channel attribution for one conversion, keyed by channel name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributionResult {
    channels: BTreeMap<String, ChannelAttribution>,
}

impl AttributionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelAttribution> {
        self.channels.get(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, &ChannelAttribution)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn total_credit(&self) -> f64 {
        self.channels.values().map(|c| c.credit).sum()
    }

    pub fn total_value(&self) -> f64 {
        self.channels.values().map(|c| c.value).sum()
    }

    /// Folds one touchpoint's share into its channel entry.
    pub fn accumulate(&mut self, share: &TouchpointCredit) {
        let entry = self
            .channels
            .entry(share.touchpoint.channel.clone())
            .or_default();
        entry.credit += share.credit;
        entry.value += share.value;
        entry.touchpoint_count += 1;
        if let Some(id) = &share.touchpoint.id {
            entry.touchpoint_ids.push(id.clone());
        }
    }
}

impl<'a> FromIterator<&'a TouchpointCredit> for AttributionResult {
    fn from_iter<I: IntoIterator<Item = &'a TouchpointCredit>>(iter: I) -> Self {
        let mut result = Self::new();
        for share in iter {
            result.accumulate(share);
        }
        result
    }
}
