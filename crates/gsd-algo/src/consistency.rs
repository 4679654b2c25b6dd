//! Estimator-independent measurement sanity checks.
//!
//! Catches problems that residual testing would only surface indirectly:
//! voltages outside physical limits, duplicate measurements of the same
//! quantity that disagree, and structural gaps in coverage.

use std::collections::HashMap;

use gsd_core::diagnostics::Diagnostics;
use gsd_core::{BusId, ElementRef, GridTopology, LineId, MeasurementKind, MeasurementSet};
use serde::Serialize;

/// Coverage and redundancy metrics over the in-service measurement set.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyMetrics {
    /// Fraction of buses with at least one in-service voltage measurement.
    pub voltage_coverage: f64,
    /// Fraction of lines with at least one in-service flow measurement.
    pub power_coverage: f64,
    /// In-service measurements over state variables.
    pub redundancy_ratio: f64,
    /// In-service measurements per bus.
    pub measurement_density: f64,
}

/// Overall verdict, graded by the number of hard violations found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyStatus {
    Consistent,
    /// 1 to 2 violations.
    MinorIssues,
    /// 3 to 5 violations.
    ModerateIssues,
    /// More than 5 violations.
    MajorIssues,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub status: ConsistencyStatus,
    pub total_violations: usize,
    pub metrics: ConsistencyMetrics,
    pub diagnostics: Diagnostics,
}

/// Runs physical-limit, duplicate-disagreement, and coverage checks.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    duplicate_tolerance: f64,
    voltage_range: (f64, f64),
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self {
            duplicate_tolerance: 1e-3,
            voltage_range: (0.5, 1.5),
        }
    }
}

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum allowed disagreement between duplicate measurements of the
    /// same quantity, in the measured unit. Defaults to 1e-3.
    pub fn with_duplicate_tolerance(mut self, tolerance: f64) -> Self {
        self.duplicate_tolerance = tolerance;
        self
    }

    /// Acceptable voltage magnitude band in per unit. Defaults to (0.5, 1.5).
    pub fn with_voltage_range(mut self, min: f64, max: f64) -> Self {
        self.voltage_range = (min, max);
        self
    }

    pub fn check(&self, topology: &GridTopology, set: &MeasurementSet) -> ConsistencyReport {
        let mut diagnostics = Diagnostics::new();

        self.check_physical_limits(set, &mut diagnostics);
        self.check_duplicates(set, &mut diagnostics);
        let metrics = self.compute_metrics(topology, set, &mut diagnostics);

        let total_violations = diagnostics.error_count();
        let status = match total_violations {
            0 => ConsistencyStatus::Consistent,
            1..=2 => ConsistencyStatus::MinorIssues,
            3..=5 => ConsistencyStatus::ModerateIssues,
            _ => ConsistencyStatus::MajorIssues,
        };

        ConsistencyReport {
            status,
            total_violations,
            metrics,
            diagnostics,
        }
    }

    fn check_physical_limits(&self, set: &MeasurementSet, diagnostics: &mut Diagnostics) {
        let (min, max) = self.voltage_range;
        for m in set.active() {
            if !m.value.is_finite() {
                diagnostics.add_error_with_entity(
                    "physical",
                    &format!("non-finite {} measurement value", m.kind),
                    &m.element.to_string(),
                );
                continue;
            }
            if m.kind == MeasurementKind::VoltageMagnitude && (m.value < min || m.value > max) {
                diagnostics.add_error_with_entity(
                    "physical",
                    &format!(
                        "voltage magnitude {:.4} pu outside [{min}, {max}]",
                        m.value
                    ),
                    &m.element.to_string(),
                );
            }
        }
    }

    fn check_duplicates(&self, set: &MeasurementSet, diagnostics: &mut Diagnostics) {
        let mut by_quantity: HashMap<(MeasurementKind, ElementRef), Vec<f64>> = HashMap::new();
        for m in set.active() {
            by_quantity.entry((m.kind, m.element)).or_default().push(m.value);
        }

        for ((kind, element), values) in &by_quantity {
            if values.len() < 2 {
                continue;
            }
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max - min > self.duplicate_tolerance {
                diagnostics.add_error_with_entity(
                    "duplicate",
                    &format!(
                        "{} duplicate measurements of {kind} disagree by {:.6}",
                        values.len(),
                        max - min
                    ),
                    &element.to_string(),
                );
            }
        }
    }

    fn compute_metrics(
        &self,
        topology: &GridTopology,
        set: &MeasurementSet,
        diagnostics: &mut Diagnostics,
    ) -> ConsistencyMetrics {
        let mut voltage_buses: HashMap<BusId, usize> = HashMap::new();
        let mut flow_lines: HashMap<LineId, usize> = HashMap::new();
        let mut active = 0usize;
        let mut flow_total = 0usize;

        for m in set.active() {
            active += 1;
            match m.element {
                ElementRef::Bus(bus) => {
                    *voltage_buses.entry(bus).or_default() += 1;
                }
                ElementRef::Line { line, .. } => {
                    flow_total += 1;
                    *flow_lines.entry(line).or_default() += 1;
                }
            }
        }

        let bus_count = topology.bus_count();
        let line_count = topology.line_count();
        let states = topology.state_variable_count();

        let covered_buses = topology.buses().filter(|b| voltage_buses.contains_key(b)).count();
        let covered_lines = topology.lines().filter(|l| flow_lines.contains_key(l)).count();

        let voltage_coverage = if bus_count == 0 {
            0.0
        } else {
            covered_buses as f64 / bus_count as f64
        };
        let power_coverage = if line_count == 0 {
            0.0
        } else {
            covered_lines as f64 / line_count as f64
        };
        let redundancy_ratio = if states == 0 {
            0.0
        } else {
            active as f64 / states as f64
        };
        let measurement_density = if bus_count == 0 {
            0.0
        } else {
            active as f64 / bus_count as f64
        };

        if flow_total == 0 && line_count > 0 {
            diagnostics.add_warning("structure", "no in-service power flow measurements");
        }
        if redundancy_ratio < 1.0 {
            diagnostics.add_warning(
                "structure",
                &format!("redundancy ratio {redundancy_ratio:.2} below 1.0"),
            );
        }

        ConsistencyMetrics {
            voltage_coverage,
            power_coverage,
            redundancy_ratio,
            measurement_density,
        }
    }
}
