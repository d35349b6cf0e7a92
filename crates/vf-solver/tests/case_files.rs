//! Case files under `tests/fixtures/cases`.

use std::path::PathBuf;

use vf_solver::{AltMinStatus, PennyCrack, RunMode, SimulationConfig, Unilateral, VfError};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("../../tests/fixtures/cases");
    path.push(name);
    path
}

fn load(name: &str) -> SimulationConfig {
    SimulationConfig::from_file(fixture_path(name)).expect("fixture should parse")
}

#[test]
fn test_tension_column_case() {
    let config = load("tension_column.toml");
    assert_eq!(config.mode, RunMode::AltMin);
    assert_eq!(config.loads.steps, 4);

    let history = config.run().expect("case should run");
    assert_eq!(history.len(), 4);
    for pair in history.windows(2) {
        assert!(pair[1].v_min <= pair[0].v_min, "damage decreased between steps");
    }
    let last = history.last().expect("four steps");
    assert!(last.v_min < 1.0);
    assert!(last.v_min >= 0.0 && last.v_max <= 1.0);
}

#[test]
fn test_penny_case_matches_scenario() {
    let config = load("penny.toml");
    assert_eq!(config.mode, RunMode::FixedCrack);
    let history = config.run().expect("case should run");
    assert_eq!(history.len(), 1);
    let from_file = &history[0];

    let scenario = PennyCrack::default().run().expect("scenario should run");
    let reference = &scenario.diagnostics;
    for (name, a, b) in [
        ("elastic", from_file.elastic_energy, reference.elastic_energy),
        ("surface", from_file.surface_energy, reference.surface_energy),
        ("volume", from_file.crack_volume, reference.crack_volume),
    ] {
        assert!(
            (a - b).abs() <= 1e-8 * b.abs(),
            "{name}: case file gives {a}, scenario {b}"
        );
    }
}

#[test]
fn test_layered_insitu_case() {
    let config = load("layered_insitu.toml");
    assert_eq!(config.policy.unilateral, Unilateral::NoCompression);
    let model = config.build_model().expect("model should build");
    assert_eq!(model.materials.for_cell_layer(0).expect("layer 0").name, "shale");
    assert_eq!(model.materials.for_cell_layer(3).expect("layer 3").name, "limestone");

    let history = config.run().expect("case should run");
    let d = &history[0];
    assert_eq!(d.status, AltMinStatus::Converged);
    assert!(d.insitu_work > 0.0);
    assert!(d.elastic_energy > 0.0);
    // a mild compressive load barely damages the column
    assert!(d.v_min > 0.9, "V dropped to {}", d.v_min);
}

#[test]
fn test_broken_case_is_rejected() {
    let text = std::fs::read_to_string(fixture_path("tension_column.toml"))
        .expect("fixture should exist")
        .replace("Z1 = \"FIXED\"", "Z1 = \"SLIDING\"");
    let err = SimulationConfig::from_toml_str(&text).expect_err("unknown marker");
    assert!(err.is_configuration());

    let text = std::fs::read_to_string(fixture_path("tension_column.toml"))
        .expect("fixture should exist")
        .replace("poisson_ratio = 0.2", "poisson_ratio = 0.5");
    assert!(matches!(
        SimulationConfig::from_toml_str(&text),
        Err(VfError::Config(_))
    ));
}
