//! Normalized residual computation.

use std::cmp::Ordering;

use gsd_core::{EstimationOutcome, GsdError, GsdResult, Measurement, MeasurementId};
use serde::Serialize;

/// Residual of a single measurement against its estimated value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualRecord {
    pub id: MeasurementId,
    /// Measured value minus estimated value.
    pub raw: f64,
    /// Raw residual divided by the measurement standard deviation.
    pub normalized: f64,
}

/// Compute normalized residuals for a set of active measurements.
///
/// `active` and the estimates in `outcome` must be index-aligned; a length
/// mismatch is a contract violation by the estimator and is rejected. The
/// returned records are sorted by descending absolute normalized residual,
/// so the first entry is the largest normalized residual candidate.
pub fn compute_residuals(
    active: &[&Measurement],
    outcome: &EstimationOutcome,
) -> GsdResult<Vec<ResidualRecord>> {
    if active.len() != outcome.estimates.len() {
        return Err(GsdError::Validation(format!(
            "estimator returned {} estimates for {} active measurements",
            outcome.estimates.len(),
            active.len()
        )));
    }

    let mut records: Vec<ResidualRecord> = active
        .iter()
        .zip(outcome.estimates.iter())
        .map(|(m, estimate)| {
            let raw = m.value - estimate;
            ResidualRecord {
                id: m.id,
                raw,
                // std_dev > 0 is enforced at insertion time
                normalized: raw / m.std_dev,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.normalized
            .abs()
            .partial_cmp(&a.normalized.abs())
            .unwrap_or(Ordering::Equal)
    });

    Ok(records)
}
