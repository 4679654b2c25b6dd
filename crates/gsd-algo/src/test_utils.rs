//! Shared fixtures for detection tests.
//!
//! The IEEE 9-bus fixture carries noise-free measurements whose true values
//! double as estimator output, so residuals are exactly zero until a test
//! corrupts something. Estimator stand-ins cover the converged, diverged,
//! and erroring cases.

use std::cell::Cell;
use std::collections::HashMap;

use gsd_core::{
    BusId, ElementRef, EstimationOutcome, GridTopology, GsdError, GsdResult, LineId, LineSide,
    Measurement, MeasurementId, MeasurementKind, MeasurementSet,
};

use crate::estimator::Estimator;

/// IEEE 9-bus topology with a full voltage and line-flow measurement set.
pub struct Ieee9Fixture {
    pub topology: GridTopology,
    pub set: MeasurementSet,
    /// True value of every measurement, keyed by id.
    pub truth: HashMap<MeasurementId, f64>,
}

impl Ieee9Fixture {
    pub fn estimator(&self) -> TruthEstimator {
        TruthEstimator {
            truth: self.truth.clone(),
        }
    }
}

const IEEE9_LINES: [(usize, usize); 9] = [
    (0, 3),
    (1, 6),
    (2, 8),
    (3, 4),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (3, 5),
];

const IEEE9_VOLTAGES: [f64; 9] = [1.040, 1.025, 1.025, 1.026, 0.996, 1.013, 1.026, 1.016, 1.032];

const IEEE9_P_FROM: [f64; 9] = [71.6, 163.0, 85.0, 40.9, -84.3, -59.5, 76.4, -24.1, 30.7];

const IEEE9_Q_FROM: [f64; 9] = [27.0, 6.7, -10.9, 22.9, -11.3, -13.5, -0.8, -24.3, 1.0];

fn power_std_dev(value: f64) -> f64 {
    value.abs() * 0.02 + 0.1
}

/// Build the IEEE 9-bus fixture: 9 voltage measurements plus active and
/// reactive flow measurements on both sides of all 9 lines, 45 in total
/// against 17 state variables.
pub fn ieee9() -> Ieee9Fixture {
    let mut topology = GridTopology::new();
    for bus in 0..9 {
        topology.add_bus(BusId::new(bus)).expect("fresh bus id");
    }
    for (i, (from, to)) in IEEE9_LINES.iter().enumerate() {
        topology
            .add_line(LineId::new(i), BusId::new(*from), BusId::new(*to))
            .expect("fresh line id");
    }

    let mut set = MeasurementSet::with_capacity(45);
    let mut truth = HashMap::new();

    for (bus, voltage) in IEEE9_VOLTAGES.iter().enumerate() {
        let id = set
            .add(
                MeasurementKind::VoltageMagnitude,
                ElementRef::Bus(BusId::new(bus)),
                *voltage,
                0.01,
            )
            .expect("valid voltage measurement");
        truth.insert(id, *voltage);
    }

    for line in 0..9 {
        let p_from = IEEE9_P_FROM[line];
        let q_from = IEEE9_Q_FROM[line];
        // lossless line model: the receiving side sees the negated flow
        let quantities = [
            (MeasurementKind::ActivePowerFlow, LineSide::From, p_from),
            (MeasurementKind::ActivePowerFlow, LineSide::To, -p_from),
            (MeasurementKind::ReactivePowerFlow, LineSide::From, q_from),
            (MeasurementKind::ReactivePowerFlow, LineSide::To, -q_from),
        ];
        for (kind, side, value) in quantities {
            let id = set
                .add(
                    kind,
                    ElementRef::line(LineId::new(line), side),
                    value,
                    power_std_dev(value),
                )
                .expect("valid flow measurement");
            truth.insert(id, value);
        }
    }

    Ieee9Fixture {
        topology,
        set,
        truth,
    }
}

/// Minimal two-bus fixture with exactly as many measurements as state
/// variables, so any removal makes the network unobservable.
pub fn two_bus_minimal() -> Ieee9Fixture {
    let mut topology = GridTopology::new();
    topology.add_bus(BusId::new(0)).expect("fresh bus id");
    topology.add_bus(BusId::new(1)).expect("fresh bus id");
    topology
        .add_line(LineId::new(0), BusId::new(0), BusId::new(1))
        .expect("fresh line id");

    let mut set = MeasurementSet::new();
    let mut truth = HashMap::new();
    let quantities = [
        (
            MeasurementKind::VoltageMagnitude,
            ElementRef::Bus(BusId::new(0)),
            1.00,
            0.01,
        ),
        (
            MeasurementKind::VoltageMagnitude,
            ElementRef::Bus(BusId::new(1)),
            0.98,
            0.01,
        ),
        (
            MeasurementKind::ActivePowerFlow,
            ElementRef::line(LineId::new(0), LineSide::From),
            0.5,
            power_std_dev(0.5),
        ),
    ];
    for (kind, element, value, std_dev) in quantities {
        let id = set
            .add(kind, element, value, std_dev)
            .expect("valid measurement");
        truth.insert(id, value);
    }

    Ieee9Fixture {
        topology,
        set,
        truth,
    }
}

/// Returns the stored true value of every measurement as its estimate.
pub struct TruthEstimator {
    truth: HashMap<MeasurementId, f64>,
}

impl Estimator for TruthEstimator {
    fn estimate(
        &self,
        _topology: &GridTopology,
        active: &[&Measurement],
    ) -> GsdResult<EstimationOutcome> {
        let estimates = active
            .iter()
            .map(|m| {
                self.truth.get(&m.id).copied().ok_or_else(|| {
                    GsdError::Validation(format!(
                        "no true value for measurement id {}",
                        m.id.value()
                    ))
                })
            })
            .collect::<GsdResult<Vec<f64>>>()?;
        Ok(EstimationOutcome {
            converged: true,
            iterations: 3,
            estimates,
        })
    }
}

/// Converges on the first call, then reports non-converged solves.
///
/// Models an estimator that handles the initial measurement set but falls
/// over once the detection loop starts removing measurements.
pub struct ConvergesOnceEstimator {
    inner: TruthEstimator,
    calls: Cell<usize>,
}

impl ConvergesOnceEstimator {
    pub fn new(inner: TruthEstimator) -> Self {
        Self {
            inner,
            calls: Cell::new(0),
        }
    }
}

impl Estimator for ConvergesOnceEstimator {
    fn estimate(
        &self,
        topology: &GridTopology,
        active: &[&Measurement],
    ) -> GsdResult<EstimationOutcome> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call == 0 {
            self.inner.estimate(topology, active)
        } else {
            Ok(EstimationOutcome {
                converged: false,
                iterations: 20,
                estimates: vec![0.0; active.len()],
            })
        }
    }
}

/// Always reports a non-converged solve.
pub struct DivergingEstimator;

impl Estimator for DivergingEstimator {
    fn estimate(
        &self,
        _topology: &GridTopology,
        active: &[&Measurement],
    ) -> GsdResult<EstimationOutcome> {
        Ok(EstimationOutcome {
            converged: false,
            iterations: 20,
            estimates: vec![0.0; active.len()],
        })
    }
}

/// Always fails with a structural error.
pub struct ErroringEstimator;

impl Estimator for ErroringEstimator {
    fn estimate(
        &self,
        _topology: &GridTopology,
        _active: &[&Measurement],
    ) -> GsdResult<EstimationOutcome> {
        Err(GsdError::Estimation("gain matrix is singular".to_string()))
    }
}
