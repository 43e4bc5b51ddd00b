use std::time::Duration;

use codeplay::Config;

use super::FIXTURES_PATH;

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    let shell = config.resolve("shell").expect("shell not found");
    assert_eq!(shell.source_name(), "main.sh");
    assert!(!shell.is_compiled());
    assert!(config.stderr_marks_failure);
}

#[test]
fn test_load_full_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.compile_timeout(), Duration::from_secs(5));
    assert!(!config.stderr_marks_failure);
    assert_eq!(config.event_buffer, 32);
    assert_eq!(config.relay.flush_threshold, 10);
    assert_eq!(config.relay.drain_grace_ms, 250);
    assert!(config.env.full_env);

    let copy = config.resolve("copy").expect("copy not found");
    assert!(copy.is_compiled());
    assert_eq!(
        copy.compile_command(),
        Some(vec![
            "cp".to_string(),
            "prog.txt".to_string(),
            "prog.sh".to_string()
        ])
    );
    assert_eq!(copy.run_command(), ["sh", "prog.sh"]);
    assert_eq!(config.resolve("shell").unwrap().source_name(), "run.sh");
}

#[test]
fn test_load_invalid_empty_run_command() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_run_command.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_extension() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_extension.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_zero_threshold() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_zero_threshold.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_missing_file() {
    let path = format!("{FIXTURES_PATH}/configs/does_not_exist.toml");
    assert!(Config::from_file(&path).is_err());
}
