//! # gsd-scenarios: Synthetic Bad-Data Scenarios
//!
//! Generates controlled measurement corruption for exercising the detection
//! pipeline: single and multiple gross errors, systematic bias, and mixed
//! corruption, each recorded in a ground-truth manifest.

pub mod apply;
pub mod manifest;
pub mod spec;

pub use apply::apply_scenario;
pub use manifest::{load_manifest, write_manifest, CorruptionRecord, ScenarioManifest};
pub use spec::{ScenarioKind, ScenarioParams};
