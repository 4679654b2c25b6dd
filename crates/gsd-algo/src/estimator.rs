//! State estimator seam.
//!
//! The detection loop does not solve the weighted least squares problem
//! itself. It delegates to an [`Estimator`] implementation and consumes the
//! per-measurement estimates it returns. Production code plugs in a real WLS
//! solver; tests plug in deterministic stand-ins from
//! [`test_utils`](crate::test_utils).

use gsd_core::{EstimationOutcome, GridTopology, GsdResult, Measurement};

/// Produces estimated values for a set of in-service measurements.
///
/// Implementations must return one estimate per input measurement, in the
/// same order as `active`. The detection loop re-invokes `estimate` after
/// every removal, so implementations should not cache per-call state keyed
/// on the measurement count.
pub trait Estimator {
    /// Estimate the value of every measurement in `active` given the
    /// network topology.
    ///
    /// A non-converged solve is reported through
    /// [`EstimationOutcome::converged`], not an error. Errors are reserved
    /// for structural failures such as malformed input.
    fn estimate(
        &self,
        topology: &GridTopology,
        active: &[&Measurement],
    ) -> GsdResult<EstimationOutcome>;
}
