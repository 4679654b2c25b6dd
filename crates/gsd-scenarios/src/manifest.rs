//! Scenario manifests record exactly what a corruption run touched, so a
//! detection result can be scored against ground truth.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use gsd_core::{ElementRef, MeasurementId, MeasurementKind};
use serde::{Deserialize, Serialize};

use crate::spec::{ScenarioKind, ScenarioParams};

/// One corrupted measurement, with enough detail to verify or undo it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorruptionRecord {
    pub id: MeasurementId,
    pub kind: MeasurementKind,
    pub element: ElementRef,
    pub original_value: f64,
    pub corrupted_value: f64,
    /// Multiplier applied to the original value.
    pub factor: f64,
}

/// Ground truth for one scenario application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioManifest {
    pub scenario: ScenarioKind,
    pub params: ScenarioParams,
    pub corruptions: Vec<CorruptionRecord>,
}

impl ScenarioManifest {
    pub fn corrupted_ids(&self) -> Vec<MeasurementId> {
        self.corruptions.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.corruptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corruptions.is_empty()
    }
}

/// Write a manifest as pretty-printed JSON.
pub fn write_manifest(manifest: &ScenarioManifest, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)
        .context("failed to serialize scenario manifest")?;
    fs::write(path, json)
        .with_context(|| format!("failed to write scenario manifest to {}", path.display()))?;
    Ok(())
}

/// Load a manifest previously written with [`write_manifest`].
pub fn load_manifest(path: &Path) -> Result<ScenarioManifest> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario manifest from {}", path.display()))?;
    let manifest = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse scenario manifest {}", path.display()))?;
    Ok(manifest)
}
