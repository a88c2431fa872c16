//! Marketing attribution — distributes conversion credit and value across
//! the touchpoints of a journey, plus the model registry and journey
//! summaries built on top of the engine.

pub mod engine;
pub mod journey;
pub mod registry;
pub mod summary;

pub use engine::{calculate_attribution, calculate_touchpoint_credits};
pub use journey::ConversionJourney;
pub use registry::ModelRegistry;
pub use summary::{summarize_journey, AttributionSummary};
