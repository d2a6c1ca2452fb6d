/// Record-then-replay determinism of whole runs.
use cachesim_core::config::SimConfig;
use cachesim_core::engine::{RunPhase, Simulation};
use cachesim_core::trace::TraceSnapshot;
use cachesim_core::RunReport;
use std::path::Path;

fn config(snapshot: &Path, strategy: &str, replay: bool) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
name = "replay-test"
seed = 2024
replay = {}
snapshot_path = "{}"

[topology]
nodes = [
    {{ id = 0, role = "receiver" }},
    {{ id = 1, role = "receiver" }},
    {{ id = 2, role = "receiver" }},
    {{ id = 3, role = "router", cache_size = 3 }},
    {{ id = 4, role = "router", cache_size = 6 }},
    {{ id = 5, role = "source" }},
    {{ id = 6, role = "source" }},
    {{ id = 7, role = "source" }},
]
links = [
    {{ u = 0, v = 3 }},
    {{ u = 1, v = 3 }},
    {{ u = 2, v = 4 }},
    {{ u = 3, v = 4, delay = 2.0 }},
    {{ u = 4, v = 5, delay = 4.0 }},
    {{ u = 4, v = 6, delay = 8.0 }},
    {{ u = 3, v = 7, delay = 6.0 }},
]

[workload]
n_contents = 120
alpha = 0.7
rate = 3.5
n_warmup = 100
n_measured = 400

[content_placement]
name = "uniform"

[strategy]
name = "{}"

[[collectors]]
name = "cache_hit_ratio"
args = {{ per_node = true }}

[[collectors]]
name = "latency"

[[collectors]]
name = "link_load"
"#,
        replay,
        snapshot.display(),
        strategy
    ))
    .unwrap()
}

fn run(config: &SimConfig) -> RunReport {
    cachesim_core::run_simulation(config).unwrap()
}

#[test]
fn test_replay_reproduces_fresh_run() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("trace.json");

    let fresh = run(&config(&snapshot, "lce", false));
    let replayed = run(&config(&snapshot, "lce", true));

    assert!(!fresh.replayed);
    assert!(replayed.replayed);
    assert_eq!(fresh.events_processed, 500);
    assert_eq!(replayed.events_processed, fresh.events_processed);
    assert!(replayed
        .provider_popularity
        .approx_eq(&fresh.provider_popularity, 1e-9));
    assert_eq!(replayed.results, fresh.results);
}

#[test]
fn test_replay_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("trace.json");
    run(&config(&snapshot, "lcd", false));

    let first = run(&config(&snapshot, "lcd", true));
    let second = run(&config(&snapshot, "lcd", true));
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_replay_does_not_touch_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("trace.json");
    run(&config(&snapshot, "lce", false));
    let before = std::fs::read(&snapshot).unwrap();

    run(&config(&snapshot, "no_cache", true));
    let after = std::fs::read(&snapshot).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_no_temporary_file_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("nested").join("trace.json");
    run(&config(&snapshot, "lce", false));

    let names: Vec<_> = std::fs::read_dir(snapshot.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["trace.json".to_string()]);
}

#[test]
fn test_same_seed_same_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.json");
    let b = dir.path().join("b.json");
    run(&config(&a, "lce", false));
    run(&config(&b, "bernoulli", false));

    // The event stream depends on the workload and seed, not the strategy.
    let a = TraceSnapshot::load(&a).unwrap();
    let b = TraceSnapshot::load(&b).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.events.len(), 500);
    assert_eq!(a.events.iter().filter(|e| !e.event.log).count(), 100);
}

#[test]
fn test_replay_with_other_strategy_sees_same_events() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("trace.json");
    let fresh = run(&config(&snapshot, "lce", false));
    let other = run(&config(&snapshot, "no_cache", true));

    assert_eq!(other.events_processed, fresh.events_processed);
    assert_eq!(other.provider_popularity, fresh.provider_popularity);
    assert_eq!(other.value("cache_hit_ratio", "mean"), Some(0.0));
}

#[test]
fn test_corrupt_snapshot_fails_at_init() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("trace.json");
    std::fs::write(&snapshot, "{\"version\": 1, \"popularity\": [1.0], \"events\": [{}]}").unwrap();

    let err = Simulation::from_config(&config(&snapshot, "lce", true)).unwrap_err();
    assert_eq!(err.phase, RunPhase::Init);
    assert!(err.to_string().contains("index 0"));
}

#[test]
fn test_batch_runs_independently() {
    let dir = tempfile::tempdir().unwrap();
    let configs: Vec<_> = ["lce", "lcd", "no_cache", "bernoulli"]
        .iter()
        .map(|s| config(&dir.path().join(format!("{}.json", s)), s, false))
        .collect();

    let sequential: Vec<_> = configs.iter().map(run).collect();
    let parallel: Vec<_> = cachesim_core::run_batch(&configs)
        .unwrap()
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(parallel, sequential);
}

#[test]
fn test_batch_rejects_shared_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("shared.json");
    let configs = vec![
        config(&snapshot, "lce", false),
        config(&snapshot, "lcd", false),
    ];
    assert!(cachesim_core::run_batch(&configs).is_err());

    let configs = vec![
        config(&snapshot, "lce", false),
        config(&snapshot, "lcd", true),
    ];
    assert!(cachesim_core::run_batch(&configs).is_err());
}

#[test]
fn test_batch_rejects_shared_provider_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("trace.json");
    run(&config(&snapshot, "lce", false));

    let artifact = dir.path().join("providers.json");
    let configs: Vec<_> = ["lcd", "no_cache"]
        .iter()
        .map(|s| {
            let mut c = config(&snapshot, s, true);
            c.simulation.provider_popularity_path = Some(artifact.clone());
            c
        })
        .collect();
    let err = cachesim_core::run_batch(&configs).unwrap_err();
    assert!(err.to_string().contains("providers.json"));
}

#[test]
fn test_comparison_configs_share_one_stream() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("trace.json");
    let artifact = dir.path().join("providers.json");
    let mut base = config(&snapshot, "lce", false);
    base.simulation.provider_popularity_path = Some(artifact.clone());

    let names: Vec<String> = ["lce", "lcd", "no_cache", "bernoulli"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let configs = cachesim_core::comparison_configs(&base, &names);
    assert!(!configs[0].simulation.replay);
    assert_eq!(configs[0].simulation.provider_popularity_path, Some(artifact.clone()));
    for c in &configs[1..] {
        assert!(c.simulation.replay);
        assert_eq!(c.simulation.provider_popularity_path, None);
    }

    let first = run(&configs[0]);
    assert!(artifact.exists());
    let rest = cachesim_core::run_batch(&configs[1..]).unwrap();
    for (c, result) in configs[1..].iter().zip(rest) {
        let report = result.unwrap();
        assert_eq!(report.strategy, c.strategy.name);
        assert_eq!(report.events_processed, first.events_processed);
    }
}
