//! # gsd-core: Measurement Modeling Core for State-Estimation Diagnostics
//!
//! Provides the fundamental data structures for statistical bad-data analysis
//! of power-system measurement sets.
//!
//! ## Design Philosophy
//!
//! The measurement set is an **arena of records addressed by stable ids**:
//! - **Removal is a flag flip**: suspect measurements are marked out of
//!   service, never structurally deleted, so any run can be fully undone.
//! - **Original values are immutable snapshots**: every record keeps the
//!   value it was created with, making [`MeasurementSet::restore`] exact.
//! - **Typed element references**: measurements address their grid element
//!   through [`ElementRef`], a `(kind, element, side)` composite, instead of
//!   stringly-typed type/index dispatch.
//!
//! The grid itself is supplied by an external collaborator and enters this
//! crate only as a [`GridTopology`]: bus ids and line endpoints stored in an
//! undirected petgraph graph, enough to answer the incidence queries that
//! observability analysis needs.
//!
//! ## Quick Start
//!
//! ```rust
//! use gsd_core::*;
//!
//! let mut topology = GridTopology::new();
//! topology.add_bus(BusId::new(0)).unwrap();
//! topology.add_bus(BusId::new(1)).unwrap();
//! topology.add_line(LineId::new(0), BusId::new(0), BusId::new(1)).unwrap();
//!
//! let mut set = MeasurementSet::new();
//! set.add(
//!     MeasurementKind::VoltageMagnitude,
//!     ElementRef::Bus(BusId::new(0)),
//!     1.02,
//!     0.01,
//! )
//! .unwrap();
//! set.add(
//!     MeasurementKind::ActivePowerFlow,
//!     ElementRef::line(LineId::new(0), LineSide::From),
//!     54.3,
//!     1.0,
//! )
//! .unwrap();
//!
//! assert_eq!(set.active_count(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`diagnostics`] - Issue collection for measurement screening
//! - [`error`] - Unified error type for the workspace

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod diagnostics;
pub mod error;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{GsdError, GsdResult};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl LineId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LineId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl MeasurementId {
    #[inline]
    pub fn new(value: usize) -> Self {
        MeasurementId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Physical quantity a measurement observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// Bus voltage magnitude (per-unit)
    VoltageMagnitude,
    /// Active power flow on a line terminal (MW)
    ActivePowerFlow,
    /// Reactive power flow on a line terminal (Mvar)
    ReactivePowerFlow,
}

impl std::fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementKind::VoltageMagnitude => write!(f, "V"),
            MeasurementKind::ActivePowerFlow => write!(f, "P"),
            MeasurementKind::ReactivePowerFlow => write!(f, "Q"),
        }
    }
}

/// Which terminal of a line a flow measurement is taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSide {
    From,
    To,
}

/// Grid element a measurement is attached to.
///
/// Together with [`MeasurementKind`] this forms the typed composite key
/// used for measurement lookup and modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRef {
    Bus(BusId),
    Line { line: LineId, side: LineSide },
}

impl ElementRef {
    /// Convenience constructor for line terminal references
    pub fn line(line: LineId, side: LineSide) -> Self {
        ElementRef::Line { line, side }
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementRef::Bus(bus) => write!(f, "Bus {}", bus.value()),
            ElementRef::Line { line, side } => {
                let side = match side {
                    LineSide::From => "from",
                    LineSide::To => "to",
                };
                write!(f, "Line {} ({})", line.value(), side)
            }
        }
    }
}

/// Whether a measurement carries its organic value or a synthetic corruption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Organic,
    Corrupted,
}

/// A single sensor measurement record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    pub kind: MeasurementKind,
    pub element: ElementRef,
    /// Current measured value (per-unit for voltages, MW/Mvar for flows)
    pub value: f64,
    /// Measurement standard deviation, strictly positive, same basis as `value`
    pub std_dev: f64,
    /// In-service flag; detection removals flip this instead of deleting
    pub in_service: bool,
    /// Immutable snapshot of the value at insertion time
    pub original_value: f64,
    /// Immutable snapshot of the standard deviation at insertion time
    pub original_std_dev: f64,
    pub provenance: Provenance,
}

impl Measurement {
    /// Current deviation from the original snapshot, as a factor of the original
    pub fn deviation_factor(&self) -> f64 {
        if self.original_value.abs() < f64::EPSILON {
            return 0.0;
        }
        self.value / self.original_value
    }
}

/// Arena of measurement records with mutation and snapshot/restore semantics.
///
/// Created once per analysis session and exclusively owned by the caller for
/// the duration of a detection run. Records are addressed by stable
/// [`MeasurementId`]s that never shift, regardless of in-service flips.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSet {
    records: Vec<Measurement>,
}

impl MeasurementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Insert a measurement, returning its stable id.
    ///
    /// Rejects non-finite values and non-positive standard deviations.
    pub fn add(
        &mut self,
        kind: MeasurementKind,
        element: ElementRef,
        value: f64,
        std_dev: f64,
    ) -> GsdResult<MeasurementId> {
        if !value.is_finite() {
            return Err(GsdError::Validation(format!(
                "measurement value must be finite, got {} for {}",
                value, element
            )));
        }
        if !std_dev.is_finite() || std_dev <= 0.0 {
            return Err(GsdError::Validation(format!(
                "standard deviation must be positive, got {} for {}",
                std_dev, element
            )));
        }
        if matches!(kind, MeasurementKind::VoltageMagnitude) && !matches!(element, ElementRef::Bus(_))
        {
            return Err(GsdError::Validation(format!(
                "voltage magnitude measurements attach to buses, got {}",
                element
            )));
        }
        if !matches!(kind, MeasurementKind::VoltageMagnitude)
            && !matches!(element, ElementRef::Line { .. })
        {
            return Err(GsdError::Validation(format!(
                "flow measurements attach to line terminals, got {}",
                element
            )));
        }

        let id = MeasurementId::new(self.records.len());
        self.records.push(Measurement {
            id,
            kind,
            element,
            value,
            std_dev,
            in_service: true,
            original_value: value,
            original_std_dev: std_dev,
            provenance: Provenance::Organic,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count of in-service measurements
    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|m| m.in_service).count()
    }

    pub fn get(&self, id: MeasurementId) -> Option<&Measurement> {
        self.records.get(id.value())
    }

    /// Iterate all records, in or out of service
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.records.iter()
    }

    /// Iterate in-service records in id order
    pub fn active(&self) -> impl Iterator<Item = &Measurement> {
        self.records.iter().filter(|m| m.in_service)
    }

    /// Look up a measurement by its typed `(kind, element)` composite
    pub fn find(&self, kind: MeasurementKind, element: ElementRef) -> Option<&Measurement> {
        self.records
            .iter()
            .find(|m| m.kind == kind && m.element == element)
    }

    /// Overwrite the value of the voltage measurement at `bus`
    pub fn set_bus_voltage(&mut self, bus: BusId, value: f64) -> GsdResult<MeasurementId> {
        let id = self
            .find(MeasurementKind::VoltageMagnitude, ElementRef::Bus(bus))
            .map(|m| m.id)
            .ok_or_else(|| {
                GsdError::Validation(format!("no voltage measurement at Bus {}", bus.value()))
            })?;
        self.set_value(id, value)?;
        Ok(id)
    }

    /// Overwrite the value of the `kind` flow measurement at a line terminal
    pub fn set_line_power(
        &mut self,
        line: LineId,
        side: LineSide,
        kind: MeasurementKind,
        value: f64,
    ) -> GsdResult<MeasurementId> {
        if matches!(kind, MeasurementKind::VoltageMagnitude) {
            return Err(GsdError::Validation(
                "line terminals carry flow measurements, not voltage magnitudes".into(),
            ));
        }
        let element = ElementRef::line(line, side);
        let id = self
            .find(kind, element)
            .map(|m| m.id)
            .ok_or_else(|| {
                GsdError::Validation(format!("no {} measurement at {}", kind, element))
            })?;
        self.set_value(id, value)?;
        Ok(id)
    }

    /// Overwrite a measurement value by id
    pub fn set_value(&mut self, id: MeasurementId, value: f64) -> GsdResult<()> {
        if !value.is_finite() {
            return Err(GsdError::Validation(format!(
                "measurement value must be finite, got {}",
                value
            )));
        }
        let record = self.record_mut(id)?;
        record.value = value;
        Ok(())
    }

    /// Overwrite a measurement standard deviation by id
    pub fn set_std_dev(&mut self, id: MeasurementId, std_dev: f64) -> GsdResult<()> {
        if !std_dev.is_finite() || std_dev <= 0.0 {
            return Err(GsdError::Validation(format!(
                "standard deviation must be positive, got {}",
                std_dev
            )));
        }
        let record = self.record_mut(id)?;
        record.std_dev = std_dev;
        Ok(())
    }

    /// Flip a measurement's in-service flag
    pub fn set_in_service(&mut self, id: MeasurementId, in_service: bool) -> GsdResult<()> {
        let record = self.record_mut(id)?;
        record.in_service = in_service;
        Ok(())
    }

    /// Tag a measurement as synthetically corrupted
    pub fn mark_corrupted(&mut self, id: MeasurementId) -> GsdResult<()> {
        let record = self.record_mut(id)?;
        record.provenance = Provenance::Corrupted;
        Ok(())
    }

    /// Reset every record to its insertion-time snapshot.
    ///
    /// Values and standard deviations revert to their originals, every
    /// record returns to service, and provenance tags are cleared.
    /// Idempotent: repeated calls, or calls when nothing was mutated,
    /// leave the set at the same baseline.
    pub fn restore(&mut self) {
        for record in &mut self.records {
            record.value = record.original_value;
            record.std_dev = record.original_std_dev;
            record.in_service = true;
            record.provenance = Provenance::Organic;
        }
    }

    fn record_mut(&mut self, id: MeasurementId) -> GsdResult<&mut Measurement> {
        self.records.get_mut(id.value()).ok_or_else(|| {
            GsdError::Validation(format!("unknown measurement id {}", id.value()))
        })
    }
}

/// Outcome of one external WLS estimation call.
///
/// Produced by the estimator collaborator and consumed read-only by the
/// diagnostics pipeline. `estimates` is aligned 1:1, in id order, with the
/// in-service measurements the estimator was invoked over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationOutcome {
    /// Did the solver converge?
    pub converged: bool,
    /// Solver-internal iteration count
    pub iterations: usize,
    /// Estimated value per in-service measurement
    pub estimates: Vec<f64>,
}

/// Bus/line incidence view of the grid under analysis.
///
/// Supplied by the grid collaborator; this crate only needs bus identity
/// and line endpoints, stored as an undirected graph so incidence queries
/// stay cheap.
#[derive(Debug, Default)]
pub struct GridTopology {
    graph: Graph<BusId, LineId, Undirected>,
    bus_nodes: HashMap<BusId, NodeIndex>,
    line_edges: HashMap<LineId, EdgeIndex>,
}

impl GridTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bus(&mut self, bus: BusId) -> GsdResult<()> {
        if self.bus_nodes.contains_key(&bus) {
            return Err(GsdError::Validation(format!(
                "duplicate bus id {}",
                bus.value()
            )));
        }
        let node = self.graph.add_node(bus);
        self.bus_nodes.insert(bus, node);
        Ok(())
    }

    pub fn add_line(&mut self, line: LineId, from: BusId, to: BusId) -> GsdResult<()> {
        if self.line_edges.contains_key(&line) {
            return Err(GsdError::Validation(format!(
                "duplicate line id {}",
                line.value()
            )));
        }
        let from_node = *self.bus_nodes.get(&from).ok_or_else(|| {
            GsdError::Validation(format!("line {} references unknown bus {}", line.value(), from.value()))
        })?;
        let to_node = *self.bus_nodes.get(&to).ok_or_else(|| {
            GsdError::Validation(format!("line {} references unknown bus {}", line.value(), to.value()))
        })?;
        let edge = self.graph.add_edge(from_node, to_node, line);
        self.line_edges.insert(line, edge);
        Ok(())
    }

    pub fn bus_count(&self) -> usize {
        self.bus_nodes.len()
    }

    pub fn line_count(&self) -> usize {
        self.line_edges.len()
    }

    /// Iterate all bus ids
    pub fn buses(&self) -> impl Iterator<Item = BusId> + '_ {
        self.graph.node_weights().copied()
    }

    /// Iterate all line ids
    pub fn lines(&self) -> impl Iterator<Item = LineId> + '_ {
        self.graph.edge_weights().copied()
    }

    /// Endpoints of a line, if it exists
    pub fn line_endpoints(&self, line: LineId) -> Option<(BusId, BusId)> {
        let edge = *self.line_edges.get(&line)?;
        let (a, b) = self.graph.edge_endpoints(edge)?;
        Some((self.graph[a], self.graph[b]))
    }

    /// Lines incident to a bus
    pub fn lines_at_bus(&self, bus: BusId) -> Vec<LineId> {
        match self.bus_nodes.get(&bus) {
            Some(&node) => self.graph.edges(node).map(|e| *e.weight()).collect(),
            None => Vec::new(),
        }
    }

    /// Number of WLS state variables: one reference voltage magnitude plus
    /// N_bus - 1 angles and N_bus - 1 magnitudes, i.e. `2 * N_bus - 1`.
    pub fn state_variable_count(&self) -> usize {
        let n = self.bus_count();
        if n == 0 {
            0
        } else {
            2 * n - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus_topology() -> GridTopology {
        let mut topology = GridTopology::new();
        topology.add_bus(BusId::new(0)).unwrap();
        topology.add_bus(BusId::new(1)).unwrap();
        topology
            .add_line(LineId::new(0), BusId::new(0), BusId::new(1))
            .unwrap();
        topology
    }

    #[test]
    fn test_add_and_lookup() {
        let mut set = MeasurementSet::new();
        let v0 = set
            .add(
                MeasurementKind::VoltageMagnitude,
                ElementRef::Bus(BusId::new(0)),
                1.02,
                0.01,
            )
            .unwrap();
        let p0 = set
            .add(
                MeasurementKind::ActivePowerFlow,
                ElementRef::line(LineId::new(0), LineSide::From),
                54.3,
                1.0,
            )
            .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.active_count(), 2);
        assert_eq!(set.get(v0).unwrap().value, 1.02);
        assert_eq!(
            set.find(
                MeasurementKind::ActivePowerFlow,
                ElementRef::line(LineId::new(0), LineSide::From)
            )
            .unwrap()
            .id,
            p0
        );
    }

    #[test]
    fn test_rejects_invalid_std_dev() {
        let mut set = MeasurementSet::new();
        let result = set.add(
            MeasurementKind::VoltageMagnitude,
            ElementRef::Bus(BusId::new(0)),
            1.0,
            0.0,
        );
        assert!(matches!(result, Err(GsdError::Validation(_))));

        let result = set.add(
            MeasurementKind::VoltageMagnitude,
            ElementRef::Bus(BusId::new(0)),
            1.0,
            -0.1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_mismatched_kind_and_element() {
        let mut set = MeasurementSet::new();
        // Voltage on a line terminal
        assert!(set
            .add(
                MeasurementKind::VoltageMagnitude,
                ElementRef::line(LineId::new(0), LineSide::From),
                1.0,
                0.01,
            )
            .is_err());
        // Flow on a bus
        assert!(set
            .add(
                MeasurementKind::ActivePowerFlow,
                ElementRef::Bus(BusId::new(0)),
                10.0,
                1.0,
            )
            .is_err());
    }

    #[test]
    fn test_typed_accessors() {
        let mut set = MeasurementSet::new();
        set.add(
            MeasurementKind::VoltageMagnitude,
            ElementRef::Bus(BusId::new(1)),
            1.0,
            0.01,
        )
        .unwrap();
        set.add(
            MeasurementKind::ReactivePowerFlow,
            ElementRef::line(LineId::new(2), LineSide::To),
            -12.5,
            1.0,
        )
        .unwrap();

        set.set_bus_voltage(BusId::new(1), 1.15).unwrap();
        assert_eq!(
            set.find(MeasurementKind::VoltageMagnitude, ElementRef::Bus(BusId::new(1)))
                .unwrap()
                .value,
            1.15
        );

        set.set_line_power(
            LineId::new(2),
            LineSide::To,
            MeasurementKind::ReactivePowerFlow,
            -20.0,
        )
        .unwrap();
        assert_eq!(
            set.find(
                MeasurementKind::ReactivePowerFlow,
                ElementRef::line(LineId::new(2), LineSide::To)
            )
            .unwrap()
            .value,
            -20.0
        );

        // Missing measurement is an error, not a silent no-op
        assert!(set.set_bus_voltage(BusId::new(7), 1.0).is_err());
        assert!(set
            .set_line_power(
                LineId::new(2),
                LineSide::To,
                MeasurementKind::VoltageMagnitude,
                1.0
            )
            .is_err());
    }

    #[test]
    fn test_restore_is_exact_and_idempotent() {
        let mut set = MeasurementSet::new();
        let id = set
            .add(
                MeasurementKind::VoltageMagnitude,
                ElementRef::Bus(BusId::new(0)),
                1.02,
                0.01,
            )
            .unwrap();

        set.set_value(id, 2.5).unwrap();
        set.set_std_dev(id, 0.05).unwrap();
        set.set_in_service(id, false).unwrap();
        set.mark_corrupted(id).unwrap();

        set.restore();
        let record = set.get(id).unwrap();
        assert_eq!(record.value, 1.02);
        assert_eq!(record.std_dev, 0.01);
        assert!(record.in_service);
        assert_eq!(record.provenance, Provenance::Organic);

        // Second restore, and restore on an untouched set, are no-ops
        set.restore();
        assert_eq!(set.get(id).unwrap().value, 1.02);

        let mut untouched = MeasurementSet::new();
        untouched.restore();
        assert!(untouched.is_empty());
    }

    #[test]
    fn test_active_iteration_skips_out_of_service() {
        let mut set = MeasurementSet::new();
        let a = set
            .add(
                MeasurementKind::VoltageMagnitude,
                ElementRef::Bus(BusId::new(0)),
                1.0,
                0.01,
            )
            .unwrap();
        set.add(
            MeasurementKind::VoltageMagnitude,
            ElementRef::Bus(BusId::new(1)),
            1.0,
            0.01,
        )
        .unwrap();

        set.set_in_service(a, false).unwrap();
        assert_eq!(set.active_count(), 1);
        assert!(set.active().all(|m| m.id != a));
        // The record itself is still addressable
        assert!(set.get(a).is_some());
    }

    #[test]
    fn test_topology_incidence() {
        let topology = two_bus_topology();
        assert_eq!(topology.bus_count(), 2);
        assert_eq!(topology.line_count(), 1);
        assert_eq!(
            topology.line_endpoints(LineId::new(0)),
            Some((BusId::new(0), BusId::new(1)))
        );
        assert_eq!(topology.lines_at_bus(BusId::new(0)), vec![LineId::new(0)]);
        assert!(topology.lines_at_bus(BusId::new(9)).is_empty());
    }

    #[test]
    fn test_topology_rejects_dangling_line() {
        let mut topology = GridTopology::new();
        topology.add_bus(BusId::new(0)).unwrap();
        let result = topology.add_line(LineId::new(0), BusId::new(0), BusId::new(5));
        assert!(matches!(result, Err(GsdError::Validation(_))));
    }

    #[test]
    fn test_state_variable_count() {
        let topology = two_bus_topology();
        assert_eq!(topology.state_variable_count(), 3);
        assert_eq!(GridTopology::new().state_variable_count(), 0);
    }
}
