pub mod config;
pub mod error;
pub mod model;
pub mod types;

pub use config::{AppConfig, AttributionSettings};
pub use error::{TrackflowError, TrackflowResult};
pub use model::{AttributionModel, CustomWeights, ModelType};
pub use types::{AttributionResult, ChannelAttribution, Touchpoint, TouchpointCredit, TouchpointRecord};
