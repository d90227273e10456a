//! Unit tests for configuration defaults and validation.

use std::path::PathBuf;

use rstest::rstest;

use super::*;

#[test]
fn defaults_are_quiet_and_empty() {
    let config = Config::default();
    assert!(config.search_path().is_empty());
    assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert!(config.validate().is_ok());
}

#[test]
fn state_files_live_under_the_state_dir() {
    let config = Config {
        state_dir: Some(PathBuf::from("/var/pspi")),
        ..Config::default()
    };
    assert_eq!(config.state_dir(), PathBuf::from("/var/pspi"));
    assert_eq!(
        config.module_cache_path(),
        PathBuf::from("/var/pspi/modules.json")
    );
    assert_eq!(config.parameters_dir(), PathBuf::from("/var/pspi/parameters"));
}

#[test]
fn missing_state_dir_falls_back_to_the_data_dir() {
    let config = Config::default();
    assert_eq!(config.state_dir(), default_state_dir());
    assert!(config.state_dir().ends_with(STATE_DIR_NAME));
}

#[rstest]
#[case::empty(0, true)]
#[case::single(1, true)]
#[case::full(MAX_SEARCH_PATH, true)]
#[case::overfull(MAX_SEARCH_PATH + 1, false)]
fn search_path_length_is_bounded(#[case] count: usize, #[case] valid: bool) {
    let config = Config {
        search_path: (0..count)
            .map(|index| PathBuf::from(format!("/plugins/{index}")))
            .collect(),
        ..Config::default()
    };
    let result = config.validate();
    assert_eq!(result.is_ok(), valid);
    if let Err(error) = result {
        assert!(matches!(error, ConfigError::SearchPathTooLong { count: 11 }));
        assert!(error.to_string().contains("at most 10"));
    }
}

#[rstest]
#[case::json("json", LogFormat::Json)]
#[case::upper("COMPACT", LogFormat::Compact)]
#[case::mixed("Json", LogFormat::Json)]
fn log_formats_parse_case_insensitively(#[case] text: &str, #[case] expected: LogFormat) {
    assert_eq!(text.parse::<LogFormat>().expect("format"), expected);
}

#[test]
fn unknown_log_formats_are_rejected() {
    assert!("pretty".parse::<LogFormat>().is_err());
}

#[rstest]
#[case::json_on_terminal(LogFormat::Json, true, true, false)]
#[case::compact_on_terminal(LogFormat::Compact, false, true, true)]
#[case::compact_redirected(LogFormat::Compact, false, false, false)]
fn only_compact_output_is_coloured(
    #[case] format: LogFormat,
    #[case] structured: bool,
    #[case] terminal: bool,
    #[case] coloured: bool,
) {
    assert_eq!(format.is_structured(), structured);
    assert_eq!(format.uses_colour(terminal), coloured);
}

#[test]
fn log_formats_display_in_snake_case() {
    assert_eq!(LogFormat::Json.to_string(), "json");
    assert_eq!(LogFormat::Compact.to_string(), "compact");
}
