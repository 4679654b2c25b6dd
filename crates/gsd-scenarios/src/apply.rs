//! Scenario application: inject controlled corruption into a measurement
//! set in place, returning a manifest of what changed.
//!
//! Randomness comes from an injected [`Rng`], so a seeded generator makes
//! runs reproducible. Corrupted measurements are flagged through
//! [`MeasurementSet::mark_corrupted`] and can be undone wholesale with
//! [`MeasurementSet::restore`].

use anyhow::{bail, Result};
use gsd_core::{MeasurementId, MeasurementKind, MeasurementSet};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::manifest::{CorruptionRecord, ScenarioManifest};
use crate::spec::{ScenarioKind, ScenarioParams};

/// Apply a corruption scenario to `set`, returning the ground-truth
/// manifest.
pub fn apply_scenario<R: Rng + ?Sized>(
    set: &mut MeasurementSet,
    scenario: ScenarioKind,
    params: &ScenarioParams,
    rng: &mut R,
) -> Result<ScenarioManifest> {
    params.validate()?;

    let corruptions = match scenario {
        ScenarioKind::SingleGrossError => {
            let targets = pick_targets(set, |_| true, 1, rng)?;
            apply_gross_errors(set, &targets, params, rng)?
        }
        ScenarioKind::MultipleIndependentErrors => {
            let targets = pick_targets(set, |_| true, params.error_count, rng)?;
            apply_gross_errors(set, &targets, params, rng)?
        }
        ScenarioKind::SystematicBias => apply_systematic_bias(set, params)?,
        ScenarioKind::Mixed => {
            // bias on voltages, gross errors confined to flow measurements
            // so no measurement is corrupted twice
            let mut corruptions = apply_systematic_bias(set, params)?;
            let targets = pick_targets(
                set,
                |kind| kind != MeasurementKind::VoltageMagnitude,
                params.error_count,
                rng,
            )?;
            corruptions.extend(apply_gross_errors(set, &targets, params, rng)?);
            corruptions
        }
    };

    Ok(ScenarioManifest {
        scenario,
        params: params.clone(),
        corruptions,
    })
}

/// Draw `count` distinct in-service measurement ids matching `filter`.
fn pick_targets<R: Rng + ?Sized>(
    set: &MeasurementSet,
    filter: impl Fn(MeasurementKind) -> bool,
    count: usize,
    rng: &mut R,
) -> Result<Vec<MeasurementId>> {
    let candidates: Vec<MeasurementId> = set
        .active()
        .filter(|m| filter(m.kind))
        .map(|m| m.id)
        .collect();
    if candidates.len() < count {
        bail!(
            "scenario needs {count} eligible measurements but only {} are in service",
            candidates.len()
        );
    }
    Ok(candidates.choose_multiple(rng, count).copied().collect())
}

fn apply_gross_errors<R: Rng + ?Sized>(
    set: &mut MeasurementSet,
    targets: &[MeasurementId],
    params: &ScenarioParams,
    rng: &mut R,
) -> Result<Vec<CorruptionRecord>> {
    let (lo, hi) = params.gross_error_range;
    let mut records = Vec::with_capacity(targets.len());

    for &id in targets {
        let (kind, element, original_value) = match set.get(id) {
            Some(m) => (m.kind, m.element, m.value),
            None => bail!("corruption target {} does not exist", id.value()),
        };
        let factor = rng.gen_range(lo..=hi);
        let corrupted_value = original_value * factor;

        set.set_value(id, corrupted_value)?;
        set.mark_corrupted(id)?;
        records.push(CorruptionRecord {
            id,
            kind,
            element,
            original_value,
            corrupted_value,
            factor,
        });
    }
    Ok(records)
}

fn apply_systematic_bias(
    set: &mut MeasurementSet,
    params: &ScenarioParams,
) -> Result<Vec<CorruptionRecord>> {
    let factor = 1.0 + params.bias_fraction;
    let targets: Vec<MeasurementId> = set
        .active()
        .filter(|m| m.kind == MeasurementKind::VoltageMagnitude)
        .map(|m| m.id)
        .collect();
    if targets.is_empty() {
        bail!("systematic bias scenario needs at least one in-service voltage measurement");
    }

    let mut records = Vec::with_capacity(targets.len());
    for id in targets {
        let (kind, element, original_value) = match set.get(id) {
            Some(m) => (m.kind, m.element, m.value),
            None => bail!("corruption target {} does not exist", id.value()),
        };
        let corrupted_value = original_value * factor;
        set.set_value(id, corrupted_value)?;
        set.mark_corrupted(id)?;
        records.push(CorruptionRecord {
            id,
            kind,
            element,
            original_value,
            corrupted_value,
            factor,
        });
    }
    Ok(records)
}
