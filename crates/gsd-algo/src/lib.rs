//! # gsd-algo: Bad-Data Detection for Grid State Estimation
//!
//! This crate provides the diagnostic algorithms that run around a weighted
//! least squares state estimator: observability analysis, residual analysis,
//! measurement consistency checks, and the iterative bad-data detection loop.
//!
//! ## Detection Pipeline
//!
//! The [`BadDataDetector`] drives an explicit state machine:
//!
//! | Phase | Description |
//! |-------|-------------|
//! | Estimate | Run the injected [`Estimator`] over in-service measurements |
//! | GlobalTest | Chi-square test over the sum of squared normalized residuals |
//! | LocalTest | Largest normalized residual identifies the suspect measurement |
//! | Validate | Severity margin, absolute ceiling, and systematic-bias checks |
//! | Remove | Take the suspect out of service, guarded by observability |
//!
//! The loop repeats until the global test passes, the iteration cap is hit,
//! or removal would render the network unobservable.
//!
//! ## Supporting Analysis
//!
//! - [`ObservabilityAnalyzer`]: redundancy ratio, per-bus coverage, and
//!   critical measurement identification
//! - [`compute_residuals`]: normalized residuals sorted by magnitude
//! - [`ConsistencyChecker`]: physical-limit and duplicate-disagreement checks
//!   independent of any estimator
//!
//! ## Example
//!
//! ```ignore
//! use gsd_algo::{BadDataDetector, ConfidenceLevel};
//!
//! let detector = BadDataDetector::new()
//!     .with_confidence(ConfidenceLevel::P95)
//!     .with_max_iterations(5);
//!
//! let result = detector.detect(&topology, &mut measurements, &estimator)?;
//! println!("{:?}: {} removals", result.status, result.removals.len());
//! ```

pub mod consistency;
pub mod detector;
pub mod estimator;
pub mod observability;
pub mod residual;
pub mod test_utils;

pub use consistency::{ConsistencyChecker, ConsistencyMetrics, ConsistencyReport, ConsistencyStatus};
pub use detector::{
    chi_square_critical, BadDataDetector, ChiSquareStat, ConfidenceLevel, DetectionResult,
    DetectionStatus, RemovalEvent, RemovalSeverity,
};
pub use estimator::Estimator;
pub use observability::{ObservabilityAnalyzer, ObservabilityClass, ObservabilityReport};
pub use residual::{compute_residuals, ResidualRecord};
