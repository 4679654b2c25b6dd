//! Iterative bad-data detection.
//!
//! Classic two-stage residual testing around a WLS estimator: a global
//! chi-square test decides whether the measurement set is consistent, and
//! when it is not, the largest normalized residual test identifies the
//! suspect measurement. Suspects are validated against a severity margin,
//! an absolute ceiling, and a systematic-bias count before removal, and
//! every removal is guarded by an observability check.

use gsd_core::{
    ElementRef, GridTopology, GsdError, GsdResult, MeasurementId, MeasurementKind, MeasurementSet,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::estimator::Estimator;
use crate::observability::{ObservabilityAnalyzer, ObservabilityClass};
use crate::residual::{compute_residuals, ResidualRecord};

/// Statistical confidence level for the local residual test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    P90,
    P95,
    P99,
}

impl ConfidenceLevel {
    /// Map a numeric level to a supported confidence level. Anything other
    /// than 0.90, 0.95, or 0.99 is rejected.
    pub fn from_level(level: f64) -> GsdResult<Self> {
        const EPS: f64 = 1e-9;
        if (level - 0.90).abs() < EPS {
            Ok(ConfidenceLevel::P90)
        } else if (level - 0.95).abs() < EPS {
            Ok(ConfidenceLevel::P95)
        } else if (level - 0.99).abs() < EPS {
            Ok(ConfidenceLevel::P99)
        } else {
            Err(GsdError::Config(format!(
                "unsupported confidence level {level}, expected 0.90, 0.95, or 0.99"
            )))
        }
    }

    pub fn level(&self) -> f64 {
        match self {
            ConfidenceLevel::P90 => 0.90,
            ConfidenceLevel::P95 => 0.95,
            ConfidenceLevel::P99 => 0.99,
        }
    }

    /// Two-sided standard normal quantile for this confidence level, the
    /// base threshold of the largest normalized residual test.
    pub fn critical_residual(&self) -> f64 {
        match self {
            ConfidenceLevel::P90 => 1.64,
            ConfidenceLevel::P95 => 1.96,
            ConfidenceLevel::P99 => 2.58,
        }
    }
}

/// Normal approximation to the upper-tail chi-square critical value:
/// `dof + 1.5 * sqrt(2 * dof)`.
pub fn chi_square_critical(dof: usize) -> f64 {
    let dof = dof as f64;
    dof + 1.5 * (2.0 * dof).sqrt()
}

/// How far past the critical threshold a removed measurement sat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalSeverity {
    /// Below twice the critical residual.
    Mild,
    /// Between two and three times the critical residual.
    Moderate,
    /// At or above three times the critical residual.
    Severe,
}

/// One measurement taken out of service by the detection loop.
#[derive(Debug, Clone, Serialize)]
pub struct RemovalEvent {
    pub id: MeasurementId,
    pub kind: MeasurementKind,
    pub element: ElementRef,
    pub normalized_residual: f64,
    pub severity: RemovalSeverity,
}

/// Global test outcome for one estimation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ChiSquareStat {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub critical_value: f64,
}

impl ChiSquareStat {
    pub fn passed(&self) -> bool {
        self.statistic <= self.critical_value
    }
}

/// Terminal status of a detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// Global test passed on the first estimation pass.
    Clean,
    /// One or more measurements were removed and the global test now passes.
    BadDataRemoved,
    /// Too many residuals exceed the critical threshold at once; removal
    /// of individual measurements would not help.
    SystematicBiasDetected,
    /// The global test fails but no single measurement stands out enough
    /// to remove, or the iteration cap was reached.
    Inconclusive,
    /// The network is unobservable, either up front or because the next
    /// removal would make it so.
    AbortedUnobservable,
    /// The estimator failed to converge or returned malformed output.
    EstimationFailed,
}

/// Outcome of a full detection run.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub status: DetectionStatus,
    /// Removals in the order they happened.
    pub removals: Vec<RemovalEvent>,
    /// One entry per estimation pass that reached the global test.
    pub chi_square: Vec<ChiSquareStat>,
    /// Number of removal iterations executed.
    pub iterations: usize,
}

enum Phase {
    Estimate,
    GlobalTest(Vec<ResidualRecord>),
    LocalTest(Vec<ResidualRecord>),
    Validate {
        residuals: Vec<ResidualRecord>,
        candidate: ResidualRecord,
    },
    Remove(ResidualRecord),
}

/// Drives the estimate / test / remove loop over a measurement set.
#[derive(Debug, Clone)]
pub struct BadDataDetector {
    confidence: ConfidenceLevel,
    max_iterations: usize,
    severity_margin: f64,
    absolute_residual_ceiling: f64,
    systematic_threshold_count: usize,
    observability: ObservabilityAnalyzer,
}

impl Default for BadDataDetector {
    fn default() -> Self {
        Self {
            confidence: ConfidenceLevel::P95,
            max_iterations: 5,
            severity_margin: 1.2,
            absolute_residual_ceiling: 3.0,
            systematic_threshold_count: 5,
            observability: ObservabilityAnalyzer::new(),
        }
    }
}

impl BadDataDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confidence(mut self, confidence: ConfidenceLevel) -> Self {
        self.confidence = confidence;
        self
    }

    /// Cap on removal iterations. Defaults to 5.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Multiplier on the critical residual a candidate must exceed before
    /// removal. Defaults to 1.2.
    pub fn with_severity_margin(mut self, margin: f64) -> Self {
        self.severity_margin = margin;
        self
    }

    /// Normalized residual magnitude above which a candidate is removed
    /// regardless of the margin test. Defaults to 3.0.
    pub fn with_absolute_residual_ceiling(mut self, ceiling: f64) -> Self {
        self.absolute_residual_ceiling = ceiling;
        self
    }

    /// Number of simultaneous threshold-exceeding residuals above which the
    /// run is classified as systematic bias. Defaults to 5.
    pub fn with_systematic_threshold_count(mut self, count: usize) -> Self {
        self.systematic_threshold_count = count;
        self
    }

    fn validate_config(&self) -> GsdResult<()> {
        if self.max_iterations == 0 {
            return Err(GsdError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.severity_margin.is_finite() || self.severity_margin <= 0.0 {
            return Err(GsdError::Config(format!(
                "severity_margin must be positive, got {}",
                self.severity_margin
            )));
        }
        if !self.absolute_residual_ceiling.is_finite() || self.absolute_residual_ceiling <= 0.0 {
            return Err(GsdError::Config(format!(
                "absolute_residual_ceiling must be positive, got {}",
                self.absolute_residual_ceiling
            )));
        }
        if self.systematic_threshold_count == 0 {
            return Err(GsdError::Config(
                "systematic_threshold_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn severity(&self, magnitude: f64) -> RemovalSeverity {
        let critical = self.confidence.critical_residual();
        if magnitude < 2.0 * critical {
            RemovalSeverity::Mild
        } else if magnitude < 3.0 * critical {
            RemovalSeverity::Moderate
        } else {
            RemovalSeverity::Severe
        }
    }

    /// Run the detection loop. Removed measurements are flipped out of
    /// service in `set`; call [`MeasurementSet::restore`] afterwards to put
    /// them back.
    pub fn detect(
        &self,
        topology: &GridTopology,
        set: &mut MeasurementSet,
        estimator: &dyn Estimator,
    ) -> GsdResult<DetectionResult> {
        self.validate_config()?;

        let mut result = DetectionResult {
            status: DetectionStatus::Clean,
            removals: Vec::new(),
            chi_square: Vec::new(),
            iterations: 0,
        };

        let mut phase = Phase::Estimate;
        loop {
            phase = match phase {
                Phase::Estimate => {
                    let report = self.observability.analyze(topology, set);
                    if report.classification == ObservabilityClass::Unobservable {
                        warn!(
                            measurements = report.measurement_count,
                            states = report.state_variable_count,
                            uncovered = report.uncovered_buses.len(),
                            "network unobservable, aborting detection"
                        );
                        result.status = DetectionStatus::AbortedUnobservable;
                        return Ok(result);
                    }

                    let active: Vec<_> = set.active().collect();
                    let outcome = match estimator.estimate(topology, &active) {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(error = %err, "estimator failed");
                            result.status = DetectionStatus::EstimationFailed;
                            return Ok(result);
                        }
                    };
                    if !outcome.converged {
                        warn!(
                            iterations = outcome.iterations,
                            "estimator did not converge"
                        );
                        result.status = DetectionStatus::EstimationFailed;
                        return Ok(result);
                    }

                    match compute_residuals(&active, &outcome) {
                        Ok(residuals) => Phase::GlobalTest(residuals),
                        Err(err) => {
                            warn!(error = %err, "estimator output rejected");
                            result.status = DetectionStatus::EstimationFailed;
                            return Ok(result);
                        }
                    }
                }

                Phase::GlobalTest(residuals) => {
                    let dof = residuals
                        .len()
                        .saturating_sub(topology.state_variable_count());
                    let statistic: f64 =
                        residuals.iter().map(|r| r.normalized * r.normalized).sum();
                    let stat = ChiSquareStat {
                        statistic,
                        degrees_of_freedom: dof,
                        critical_value: chi_square_critical(dof),
                    };
                    debug!(
                        statistic = stat.statistic,
                        critical = stat.critical_value,
                        dof,
                        "global chi-square test"
                    );
                    let passed = stat.passed();
                    result.chi_square.push(stat);

                    if passed {
                        result.status = if result.removals.is_empty() {
                            DetectionStatus::Clean
                        } else {
                            DetectionStatus::BadDataRemoved
                        };
                        return Ok(result);
                    }
                    Phase::LocalTest(residuals)
                }

                Phase::LocalTest(residuals) => match residuals.first().cloned() {
                    Some(candidate) => Phase::Validate {
                        residuals,
                        candidate,
                    },
                    None => {
                        result.status = DetectionStatus::Inconclusive;
                        return Ok(result);
                    }
                },

                Phase::Validate {
                    residuals,
                    candidate,
                } => {
                    let critical = self.confidence.critical_residual();
                    let exceeding = residuals
                        .iter()
                        .filter(|r| r.normalized.abs() > critical)
                        .count();
                    if exceeding > self.systematic_threshold_count {
                        info!(
                            exceeding,
                            threshold = self.systematic_threshold_count,
                            "too many simultaneous outliers, classifying as systematic bias"
                        );
                        result.status = DetectionStatus::SystematicBiasDetected;
                        return Ok(result);
                    }

                    let magnitude = candidate.normalized.abs();
                    if magnitude > self.severity_margin * critical
                        || magnitude > self.absolute_residual_ceiling
                    {
                        Phase::Remove(candidate)
                    } else {
                        debug!(
                            residual = magnitude,
                            critical, "largest residual below removal thresholds"
                        );
                        result.status = DetectionStatus::Inconclusive;
                        return Ok(result);
                    }
                }

                Phase::Remove(candidate) => {
                    if !self
                        .observability
                        .would_remain_observable(topology, set, candidate.id)
                    {
                        warn!(
                            measurement = candidate.id.value(),
                            "removal would render network unobservable, aborting"
                        );
                        result.status = DetectionStatus::AbortedUnobservable;
                        return Ok(result);
                    }

                    let (kind, element) = {
                        let m = set.get(candidate.id).ok_or_else(|| {
                            GsdError::Validation(format!(
                                "residual references unknown measurement id {}",
                                candidate.id.value()
                            ))
                        })?;
                        (m.kind, m.element)
                    };
                    set.set_in_service(candidate.id, false)?;

                    let magnitude = candidate.normalized.abs();
                    let severity = self.severity(magnitude);
                    info!(
                        measurement = candidate.id.value(),
                        kind = %kind,
                        element = %element,
                        residual = magnitude,
                        severity = ?severity,
                        "removed measurement failing largest normalized residual test"
                    );
                    result.removals.push(RemovalEvent {
                        id: candidate.id,
                        kind,
                        element,
                        normalized_residual: candidate.normalized,
                        severity,
                    });
                    result.iterations += 1;

                    if result.iterations >= self.max_iterations {
                        info!(
                            iterations = result.iterations,
                            "iteration cap reached before global test passed"
                        );
                        result.status = DetectionStatus::Inconclusive;
                        return Ok(result);
                    }
                    Phase::Estimate
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chi_square_critical_matches_normal_approximation() {
        let expected = 10.0 + 1.5 * (20.0_f64).sqrt();
        assert!((chi_square_critical(10) - expected).abs() < 1e-12);
        assert_eq!(chi_square_critical(0), 0.0);
    }

    #[test]
    fn confidence_level_mapping() {
        assert_eq!(
            ConfidenceLevel::from_level(0.90).unwrap(),
            ConfidenceLevel::P90
        );
        assert_eq!(
            ConfidenceLevel::from_level(0.95).unwrap(),
            ConfidenceLevel::P95
        );
        assert_eq!(
            ConfidenceLevel::from_level(0.99).unwrap(),
            ConfidenceLevel::P99
        );
        assert!((ConfidenceLevel::P90.critical_residual() - 1.64).abs() < 1e-12);
        assert!((ConfidenceLevel::P95.critical_residual() - 1.96).abs() < 1e-12);
        assert!((ConfidenceLevel::P99.critical_residual() - 2.58).abs() < 1e-12);
    }

    #[test]
    fn unsupported_confidence_level_rejected() {
        let err = ConfidenceLevel::from_level(0.85).unwrap_err();
        assert!(matches!(err, GsdError::Config(_)));
    }

    #[test]
    fn severity_bands() {
        let detector = BadDataDetector::new().with_confidence(ConfidenceLevel::P95);
        assert_eq!(detector.severity(2.5), RemovalSeverity::Mild);
        assert_eq!(detector.severity(4.5), RemovalSeverity::Moderate);
        assert_eq!(detector.severity(6.0), RemovalSeverity::Severe);
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(matches!(
            BadDataDetector::new().with_max_iterations(0).validate_config(),
            Err(GsdError::Config(_))
        ));
        assert!(matches!(
            BadDataDetector::new()
                .with_severity_margin(-1.0)
                .validate_config(),
            Err(GsdError::Config(_))
        ));
        assert!(matches!(
            BadDataDetector::new()
                .with_absolute_residual_ceiling(0.0)
                .validate_config(),
            Err(GsdError::Config(_))
        ));
    }
}
