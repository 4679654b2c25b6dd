//! Scenario generation against the IEEE 9-bus fixture, including full
//! corrupt / detect / restore round trips.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

use gsd_algo::test_utils::ieee9;
use gsd_algo::{BadDataDetector, DetectionStatus};
use gsd_core::{MeasurementKind, Provenance};
use gsd_scenarios::{
    apply_scenario, load_manifest, write_manifest, ScenarioKind, ScenarioParams,
};

#[test]
fn single_gross_error_matches_manifest() {
    let mut fixture = ieee9();
    let params = ScenarioParams::default();
    let mut rng = StdRng::seed_from_u64(7);

    let manifest =
        apply_scenario(&mut fixture.set, ScenarioKind::SingleGrossError, &params, &mut rng)
            .unwrap();

    assert_eq!(manifest.len(), 1);
    let record = &manifest.corruptions[0];
    assert!(record.factor >= 2.0 && record.factor <= 3.0);
    assert!((record.corrupted_value - record.original_value * record.factor).abs() < 1e-9);

    let m = fixture.set.get(record.id).unwrap();
    assert!((m.value - record.corrupted_value).abs() < 1e-12);
    assert_eq!(m.provenance, Provenance::Corrupted);
    // the record's factor is recoverable from the measurement itself
    assert!((m.deviation_factor() - record.factor).abs() < 1e-9);
}

#[test]
fn same_seed_reproduces_the_same_corruption() {
    let params = ScenarioParams::default();

    let mut first = ieee9();
    let mut rng = StdRng::seed_from_u64(99);
    let a = apply_scenario(
        &mut first.set,
        ScenarioKind::MultipleIndependentErrors,
        &params,
        &mut rng,
    )
    .unwrap();

    let mut second = ieee9();
    let mut rng = StdRng::seed_from_u64(99);
    let b = apply_scenario(
        &mut second.set,
        ScenarioKind::MultipleIndependentErrors,
        &params,
        &mut rng,
    )
    .unwrap();

    assert_eq!(a.corrupted_ids(), b.corrupted_ids());
    for (x, y) in a.corruptions.iter().zip(&b.corruptions) {
        assert!((x.factor - y.factor).abs() < 1e-12);
        assert!((x.corrupted_value - y.corrupted_value).abs() < 1e-12);
    }
}

#[test]
fn multiple_errors_hit_distinct_measurements() {
    let mut fixture = ieee9();
    let params = ScenarioParams {
        error_count: 5,
        ..ScenarioParams::default()
    };
    let mut rng = StdRng::seed_from_u64(3);

    let manifest = apply_scenario(
        &mut fixture.set,
        ScenarioKind::MultipleIndependentErrors,
        &params,
        &mut rng,
    )
    .unwrap();

    let ids: HashSet<_> = manifest.corrupted_ids().into_iter().collect();
    assert_eq!(ids.len(), 5);
}

#[test]
fn systematic_bias_shifts_every_voltage() {
    let mut fixture = ieee9();
    let params = ScenarioParams::default();
    let mut rng = StdRng::seed_from_u64(1);

    let manifest =
        apply_scenario(&mut fixture.set, ScenarioKind::SystematicBias, &params, &mut rng)
            .unwrap();

    assert_eq!(manifest.len(), 9);
    for record in &manifest.corruptions {
        assert_eq!(record.kind, MeasurementKind::VoltageMagnitude);
        assert!((record.factor - 1.05).abs() < 1e-12);
    }
}

#[test]
fn mixed_scenario_keeps_bias_and_gross_errors_disjoint() {
    let mut fixture = ieee9();
    let params = ScenarioParams::default();
    let mut rng = StdRng::seed_from_u64(11);

    let manifest =
        apply_scenario(&mut fixture.set, ScenarioKind::Mixed, &params, &mut rng).unwrap();

    assert_eq!(manifest.len(), 9 + params.error_count);
    let ids: HashSet<_> = manifest.corrupted_ids().into_iter().collect();
    assert_eq!(ids.len(), manifest.len());

    let gross: Vec<_> = manifest
        .corruptions
        .iter()
        .filter(|c| c.kind != MeasurementKind::VoltageMagnitude)
        .collect();
    assert_eq!(gross.len(), params.error_count);
}

#[test]
fn restore_undoes_every_scenario_kind() {
    for scenario in [
        ScenarioKind::SingleGrossError,
        ScenarioKind::MultipleIndependentErrors,
        ScenarioKind::SystematicBias,
        ScenarioKind::Mixed,
    ] {
        let mut fixture = ieee9();
        let before: Vec<_> = fixture
            .set
            .iter()
            .map(|m| (m.id, m.value, m.in_service, m.provenance))
            .collect();

        let mut rng = StdRng::seed_from_u64(42);
        apply_scenario(&mut fixture.set, scenario, &ScenarioParams::default(), &mut rng)
            .unwrap();
        fixture.set.restore();

        let after: Vec<_> = fixture
            .set
            .iter()
            .map(|m| (m.id, m.value, m.in_service, m.provenance))
            .collect();
        assert_eq!(after, before, "{scenario:?} did not restore cleanly");
    }
}

#[test]
fn detector_recovers_single_injected_error() {
    let mut fixture = ieee9();
    let estimator = fixture.estimator();
    let mut rng = StdRng::seed_from_u64(5);

    let manifest = apply_scenario(
        &mut fixture.set,
        ScenarioKind::SingleGrossError,
        &ScenarioParams::default(),
        &mut rng,
    )
    .unwrap();

    let result = BadDataDetector::new()
        .detect(&fixture.topology, &mut fixture.set, &estimator)
        .unwrap();

    assert_eq!(result.status, DetectionStatus::BadDataRemoved);
    assert_eq!(result.removals.len(), 1);
    assert_eq!(result.removals[0].id, manifest.corruptions[0].id);
}

#[test]
fn detector_recovers_multiple_injected_errors() {
    let mut fixture = ieee9();
    let estimator = fixture.estimator();
    let mut rng = StdRng::seed_from_u64(17);

    let manifest = apply_scenario(
        &mut fixture.set,
        ScenarioKind::MultipleIndependentErrors,
        &ScenarioParams::default(),
        &mut rng,
    )
    .unwrap();

    let result = BadDataDetector::new()
        .detect(&fixture.topology, &mut fixture.set, &estimator)
        .unwrap();

    assert_eq!(result.status, DetectionStatus::BadDataRemoved);
    let mut removed: Vec<_> = result.removals.iter().map(|r| r.id).collect();
    removed.sort();
    let mut injected = manifest.corrupted_ids();
    injected.sort();
    assert_eq!(removed, injected);
}

#[test]
fn manifest_survives_a_disk_round_trip() {
    let mut fixture = ieee9();
    let mut rng = StdRng::seed_from_u64(23);
    let manifest = apply_scenario(
        &mut fixture.set,
        ScenarioKind::Mixed,
        &ScenarioParams::default(),
        &mut rng,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    write_manifest(&manifest, &path).unwrap();
    let back = load_manifest(&path).unwrap();

    assert_eq!(back.corrupted_ids(), manifest.corrupted_ids());
    assert_eq!(back.len(), manifest.len());
}

#[test]
fn scenario_on_empty_set_is_rejected() {
    let mut set = gsd_core::MeasurementSet::new();
    let mut rng = StdRng::seed_from_u64(0);
    let err = apply_scenario(
        &mut set,
        ScenarioKind::SingleGrossError,
        &ScenarioParams::default(),
        &mut rng,
    )
    .unwrap_err();
    assert!(err.to_string().contains("in service"));
}
