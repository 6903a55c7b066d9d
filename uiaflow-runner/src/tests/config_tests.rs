use crate::config::{resolve_path, RunnerConfig, DEFAULT_PROFILE};
use std::path::{Path, PathBuf};
use uiaflow::WaitConditionKind;

#[test]
fn empty_config_uses_defaults() {
    let config = RunnerConfig::from_json("{}").expect("config parses");

    assert_eq!(config.session.timeout_ms, 10_000);
    assert!(config.session.bring_to_foreground);
    assert!(config.evidence_pack.enable);
    assert!(config.ui_state_recovery.enable);
    assert_eq!(config.ui_state_recovery.max_attempts, 2);
    assert_eq!(config.ui_state_recovery.search_root, "desktop");
    assert_eq!(config.flow_timeout_ms(), 30_000);
    assert_eq!(config.import_variables.find_timeout_ms, 10_000);
    assert_eq!(config.import_program.clipboard_timeout_ms, 2_000);
    assert!(config.import_program.fallback_to_type);
    assert_eq!(config.build.timeout_ms, 60_000);
    assert_eq!(config.build.popup.popup_timeout_ms, 1500);
    assert_eq!(config.pack_version(), None);
}

#[test]
fn flow_sections_read_keys_and_flattened_popup_settings() {
    let json = r#"{
        "selectorPackVersion": " v1 ",
        "session": { "processName": "Autothink", "timeoutMs": 2500 },
        "build": {
            "buildButtonSelectorKey": "buildButton",
            "waitCondition": { "kind": "ElementNotExists", "selectorKey": "busy" },
            "enablePopupHandling": true,
            "allowPopupOk": true,
            "popupSearchRoot": "mainWindow"
        },
        "importProgram": {
            "openProgramSteps": [{ "action": "click", "selectorKey": "importProgramMenuOrButton" }],
            "clipboardRetry": { "times": 5, "intervalMs": 50 }
        }
    }"#;
    let config = RunnerConfig::from_json(json).expect("config parses");

    assert_eq!(config.pack_version(), Some("v1"));
    assert_eq!(config.session.process_name.as_deref(), Some("Autothink"));
    assert_eq!(config.session.timeout_ms, 2500);
    assert_eq!(config.build.build_button_selector_key.as_deref(), Some("buildButton"));
    let wait = config.build.wait_condition.as_ref().expect("wait condition");
    assert_eq!(wait.kind, Some(WaitConditionKind::ElementNotExists));
    assert_eq!(wait.selector_key.as_deref(), Some("busy"));
    assert!(config.build.popup.enable_popup_handling);
    assert!(config.build.popup.allow_popup_ok);
    assert_eq!(config.build.popup.popup_search_root.as_deref(), Some("mainWindow"));
    assert_eq!(config.import_program.open_program_steps.len(), 1);
    let retry = config.import_program.clipboard_retry.expect("retry");
    assert_eq!((retry.times, retry.interval_ms), (5, 50));
}

#[test]
fn profile_name_prefers_cli_then_config() {
    let mut config = RunnerConfig::default();
    assert_eq!(config.profile_name(None), DEFAULT_PROFILE);

    config.profile = Some("plant".to_string());
    assert_eq!(config.profile_name(None), "plant");
    assert_eq!(config.profile_name(Some("lab")), "lab");
    assert_eq!(config.profile_name(Some("  ")), DEFAULT_PROFILE);
}

#[test]
fn roots_resolve_against_the_config_directory() {
    let dir = Path::new("/opt/runner");
    let mut config = RunnerConfig::default();

    assert_eq!(config.selectors_root(None, dir), dir.join("selectors"));
    assert_eq!(config.logs_root(dir), dir.join("logs"));

    config.selectors_root = Some("profiles".to_string());
    let absolute_logs = std::env::temp_dir().join("runner-logs");
    config.logs_root = Some(absolute_logs.display().to_string());
    assert_eq!(config.selectors_root(None, dir), dir.join("profiles"));
    assert_eq!(config.logs_root(dir), absolute_logs);
    assert_eq!(
        config.selectors_root(Some(Path::new("cli-selectors")), dir),
        PathBuf::from("cli-selectors")
    );
}

#[test]
fn resolve_path_keeps_absolute_paths() {
    let base = Path::new("base");
    let absolute = std::env::temp_dir().join("file.st");
    assert_eq!(resolve_path(&absolute.display().to_string(), base), absolute);
    assert_eq!(resolve_path(" rel/file.st ", base), base.join("rel/file.st"));
}

#[test]
fn non_positive_flow_timeout_falls_back() {
    let config = RunnerConfig::from_json(r#"{ "flowTimeoutMs": 0 }"#).expect("config parses");
    assert_eq!(config.flow_timeout_ms(), 30_000);
}

#[test]
fn load_reports_parse_errors_with_the_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("runner.json");
    std::fs::write(&path, "{ not json").expect("config written");

    let err = RunnerConfig::load(&path).expect_err("parse error");
    assert!(err.to_string().starts_with("Failed to parse config"));
    assert!(err.to_string().contains("runner.json"));

    std::fs::write(&path, r#"{ "skipBuild": true }"#).expect("config written");
    let (config, config_dir) = RunnerConfig::load(&path).expect("config loads");
    assert!(config.skip_build);
    assert_eq!(config_dir, dir.path());
}
