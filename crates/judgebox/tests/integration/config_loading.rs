use judgebox::config::{Config, ConfigError, LanguageId, load_battery};
use judgebox::judge::BatchPolicy;

use super::fixture_path;

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(fixture_path("configs", "valid_full.toml"))
        .expect("Failed to load config");

    assert!(config.languages.contains_key(&LanguageId::C));
    assert!(config.languages.contains_key(&LanguageId::Python));
    assert!(!config.languages.contains_key(&LanguageId::Java));
    assert_eq!(config.default_limits.time_limit, Some(2.0));
    assert_eq!(config.default_limits.memory_limit, Some(128));
    assert_eq!(config.max_concurrent, Some(2));
    assert_eq!(config.policy, BatchPolicy::StopAtFirstFailure);

    let python = config.profile(LanguageId::Python).unwrap();
    assert_eq!(
        python.run.env.get("PYTHONUNBUFFERED").map(String::as_str),
        Some("1")
    );

    let remote = config.remote.expect("remote section");
    assert!(remote.is_rapidapi());
    assert_eq!(remote.max_polls, 10);
}

#[test]
fn test_load_minimal_config() {
    let config = Config::from_file(fixture_path("configs", "valid_minimal.toml"))
        .expect("Failed to load config");

    assert_eq!(config.languages.len(), 1);
    assert_eq!(config.scratch_dir, "/tmp");
    assert!(config.remote.is_none());
}

#[test]
fn test_load_invalid_empty_image() {
    let result = Config::from_file(fixture_path("configs", "invalid_empty_image.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_empty_run_command() {
    let result = Config::from_file(fixture_path("configs", "invalid_empty_run_command.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_unknown_language() {
    let result = Config::from_file(fixture_path("configs", "invalid_unknown_language.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_source_name() {
    let result = Config::from_file(fixture_path("configs", "invalid_source_name.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_policy() {
    let result = Config::from_file(fixture_path("configs", "invalid_policy.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_nonexistent_file() {
    let result = Config::from_file(fixture_path("configs", "does_not_exist.toml"));
    assert!(result.is_err());
}

#[test]
fn test_embedded_example_parses() {
    let config = Config::parse_toml(judgebox::EXAMPLE_CONFIG).unwrap();
    for id in LanguageId::ALL {
        let profile = config.profile(id).unwrap();
        assert_eq!(profile.is_compiled(), id != LanguageId::Python);
    }
}

#[test]
fn test_load_battery() {
    let cases = load_battery(fixture_path("batteries", "sum.toml")).unwrap();
    assert_eq!(cases.len(), 3);
    assert_eq!(cases[0].input, "1 2\n");
    assert_eq!(cases[0].expected_output, "3\n");
    assert!(!cases[1].is_hidden);
    assert!(cases[2].is_hidden);
}
