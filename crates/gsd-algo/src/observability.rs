//! Measurement redundancy and observability analysis.
//!
//! A WLS estimator needs at least as many measurements as state variables,
//! and every bus must be touched by at least one measurement. This module
//! answers whether an estimation run can proceed at all, and whether a
//! candidate removal during bad-data detection would break that guarantee.

use std::collections::HashMap;

use gsd_core::{BusId, ElementRef, GridTopology, MeasurementId, MeasurementSet};
use serde::Serialize;

/// Observability classification of a topology/measurement pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservabilityClass {
    /// Estimation cannot proceed: too few measurements or uncovered buses.
    Unobservable,
    /// Estimation can proceed but with thin redundancy or critical
    /// measurements whose loss would make the network unobservable.
    MarginallyObservable,
    /// Healthy redundancy with no critical measurements.
    FullyObservable,
}

/// Full observability picture for one topology/measurement pairing.
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityReport {
    /// Number of in-service measurements considered.
    pub measurement_count: usize,
    /// State variables of the network, 2n - 1 for n buses.
    pub state_variable_count: usize,
    /// Measurement count over state variable count, 0 for an empty network.
    pub redundancy_ratio: f64,
    /// How many in-service measurements cover each bus. A voltage
    /// measurement covers its bus; a flow measurement covers both
    /// endpoints of its line.
    pub bus_coverage: HashMap<BusId, usize>,
    /// Buses covered by no in-service measurement, sorted by id.
    pub uncovered_buses: Vec<BusId>,
    /// Measurements that are the sole coverage of at least one bus.
    pub critical_measurements: Vec<MeasurementId>,
    pub classification: ObservabilityClass,
}

/// Computes [`ObservabilityReport`]s and answers removal-safety queries.
#[derive(Debug, Clone)]
pub struct ObservabilityAnalyzer {
    marginal_redundancy: f64,
}

impl Default for ObservabilityAnalyzer {
    fn default() -> Self {
        Self {
            marginal_redundancy: 1.5,
        }
    }
}

impl ObservabilityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redundancy ratio below which an observable network is classified
    /// as marginal. Defaults to 1.5.
    pub fn with_marginal_redundancy(mut self, ratio: f64) -> Self {
        self.marginal_redundancy = ratio;
        self
    }

    /// Analyze the full in-service measurement set against the topology.
    pub fn analyze(&self, topology: &GridTopology, set: &MeasurementSet) -> ObservabilityReport {
        self.analyze_excluding(topology, set, None)
    }

    /// Would the network remain observable if `candidate` were taken out
    /// of service? Used to guard removals during bad-data detection.
    pub fn would_remain_observable(
        &self,
        topology: &GridTopology,
        set: &MeasurementSet,
        candidate: MeasurementId,
    ) -> bool {
        let report = self.analyze_excluding(topology, set, Some(candidate));
        report.classification != ObservabilityClass::Unobservable
    }

    fn analyze_excluding(
        &self,
        topology: &GridTopology,
        set: &MeasurementSet,
        excluded: Option<MeasurementId>,
    ) -> ObservabilityReport {
        let state_variable_count = topology.state_variable_count();

        let mut bus_coverage: HashMap<BusId, usize> =
            topology.buses().map(|b| (b, 0)).collect();
        let mut coverage_by_measurement: Vec<(MeasurementId, Vec<BusId>)> = Vec::new();
        let mut measurement_count = 0;

        for m in set.active() {
            if excluded == Some(m.id) {
                continue;
            }
            measurement_count += 1;

            let covered: Vec<BusId> = match m.element {
                ElementRef::Bus(bus) => vec![bus],
                ElementRef::Line { line, .. } => match topology.line_endpoints(line) {
                    Some((from, to)) => vec![from, to],
                    // measurement on a line the topology does not know;
                    // it covers nothing
                    None => Vec::new(),
                },
            };
            for bus in &covered {
                if let Some(count) = bus_coverage.get_mut(bus) {
                    *count += 1;
                }
            }
            coverage_by_measurement.push((m.id, covered));
        }

        let mut uncovered_buses: Vec<BusId> = bus_coverage
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&bus, _)| bus)
            .collect();
        uncovered_buses.sort();

        let mut critical_measurements: Vec<MeasurementId> = coverage_by_measurement
            .iter()
            .filter(|(_, covered)| {
                covered
                    .iter()
                    .any(|bus| bus_coverage.get(bus).copied() == Some(1))
            })
            .map(|(id, _)| *id)
            .collect();
        critical_measurements.sort();

        let redundancy_ratio = if state_variable_count == 0 {
            0.0
        } else {
            measurement_count as f64 / state_variable_count as f64
        };

        let classification = if state_variable_count == 0
            || redundancy_ratio < 1.0
            || !uncovered_buses.is_empty()
        {
            ObservabilityClass::Unobservable
        } else if redundancy_ratio < self.marginal_redundancy
            || !critical_measurements.is_empty()
        {
            ObservabilityClass::MarginallyObservable
        } else {
            ObservabilityClass::FullyObservable
        };

        ObservabilityReport {
            measurement_count,
            state_variable_count,
            redundancy_ratio,
            bus_coverage,
            uncovered_buses,
            critical_measurements,
            classification,
        }
    }
}
