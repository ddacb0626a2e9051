use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use detection_counter::config::CounterConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "COUNTER_CONFIG",
        "COUNTER_SOURCE",
        "COUNTER_OUTPUT",
        "COUNTER_DB_PATH",
        "COUNTER_EXPORT_PATH",
        "COUNTER_DETECTOR",
        "COUNTER_MIN_CONFIDENCE",
        "COUNTER_MAX_FRAMES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": { "path": "traffic.y4m", "fps": 25 },
        "output": { "path": "annotated.y4m" },
        "store": { "db_path": "counts.db" },
        "export": { "path": "" },
        "detector": { "backend": "Stub", "input_width": 320, "input_height": 320 },
        "pipeline": { "min_confidence": 0.4, "max_consecutive_source_errors": 5 },
        "display": { "mode": "plain" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("COUNTER_CONFIG", file.path());
    std::env::set_var("COUNTER_DB_PATH", "override.db");
    std::env::set_var("COUNTER_MAX_FRAMES", "120");

    let cfg = CounterConfig::load().expect("load config");
    assert_eq!(cfg.source.path, "traffic.y4m");
    assert_eq!(cfg.source.fps, 25);
    assert_eq!(cfg.source.width, 640);
    assert_eq!(cfg.output_path, Some(PathBuf::from("annotated.y4m")));
    assert_eq!(cfg.db_path, "override.db");
    assert_eq!(cfg.export_path, None);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.input_width, 320);
    assert_eq!(cfg.pipeline.min_confidence, 0.4);
    assert_eq!(cfg.pipeline.max_frames, Some(120));
    assert_eq!(cfg.pipeline.max_consecutive_source_errors, 5);
    assert_eq!(cfg.display_mode, "plain");

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CounterConfig::load().expect("load defaults");
    assert_eq!(cfg, CounterConfig::default());
}

#[test]
fn rejects_malformed_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_MIN_CONFIDENCE", "high");
    assert!(CounterConfig::load().is_err());

    std::env::set_var("COUNTER_MIN_CONFIDENCE", "1.2");
    assert!(CounterConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unreadable_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("COUNTER_CONFIG", dir.path().join("missing.json"));
    let err = CounterConfig::load().expect_err("missing file must fail");
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
