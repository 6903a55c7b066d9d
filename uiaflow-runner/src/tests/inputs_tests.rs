use crate::config::{InputsSourceConfig, RunnerConfig};
use crate::inputs::{resolve_inputs, CommIrInputs, MODE_FROM_COMM_IR, MODE_INLINE};
use serde_json::json;

fn comm_ir_config(path: &str) -> RunnerConfig {
    RunnerConfig {
        inputs_source: Some(InputsSourceConfig {
            mode: Some("fromCommIr".to_string()),
            comm_ir_path: Some(path.to_string()),
        }),
        ..RunnerConfig::default()
    }
}

#[test]
fn inline_mode_resolves_config_paths() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = RunnerConfig {
        variables_file_path: Some("vars.xlsx".to_string()),
        program_text_path: Some("program.st".to_string()),
        ..RunnerConfig::default()
    };

    let resolved = resolve_inputs(&config, dir.path());

    assert!(resolved.ok);
    assert_eq!(resolved.mode, MODE_INLINE);
    assert_eq!(resolved.variables_file_path, Some(dir.path().join("vars.xlsx")));
    assert_eq!(resolved.program_text_path, Some(dir.path().join("program.st")));
    assert_eq!(resolved.variables_source.as_deref(), Some("config.variablesFilePath"));
}

#[test]
fn inline_mode_requires_both_paths() {
    let config = RunnerConfig {
        variables_file_path: Some("vars.xlsx".to_string()),
        ..RunnerConfig::default()
    };
    let resolved = resolve_inputs(&config, std::path::Path::new("."));

    assert!(!resolved.ok);
    assert_eq!(
        resolved.error_message(),
        Some("inline inputsSource requires variablesFilePath and programTextPath")
    );
    assert_eq!(resolved.error.as_ref().map(|e| e.kind.as_str()), Some("ConfigError"));
}

#[test]
fn unknown_mode_is_rejected() {
    let mut config = comm_ir_config("x.json");
    if let Some(source) = config.inputs_source.as_mut() {
        source.mode = Some("fromDatabase".to_string());
    }
    let resolved = resolve_inputs(&config, std::path::Path::new("."));
    assert_eq!(resolved.error_message(), Some("Unsupported inputsSource.mode: fromDatabase"));
}

#[test]
fn comm_ir_fields_are_tried_in_order() {
    let inputs = CommIrInputs::parse(
        &json!({
            "projectName": "Line3",
            "inputs": { "variablesFilePath": " " },
            "outputs": { "variablesFilePath": "out/vars.xlsx", "outputDir": "out" },
            "sources": { "unionXlsxPath": "union.xlsx", "programTextPath": "src/main.st" }
        })
        .to_string(),
    )
    .expect("comm IR parses");

    assert_eq!(
        inputs.variables,
        Some(("out/vars.xlsx".to_string(), "outputs.variablesFilePath"))
    );
    assert_eq!(
        inputs.program,
        Some(("src/main.st".to_string(), "sources.programTextPath"))
    );
    assert_eq!(inputs.output_dir.as_deref(), Some("out"));
    assert_eq!(inputs.project_name.as_deref(), Some("Line3"));
}

#[test]
fn comm_ir_paths_resolve_next_to_the_document() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ir_dir = dir.path().join("out").join("ir");
    std::fs::create_dir_all(&ir_dir).expect("ir dir");
    std::fs::write(
        ir_dir.join("comm_ir.json"),
        json!({ "outputs": { "variablesFilePath": "vars.xlsx" } }).to_string(),
    )
    .expect("comm IR written");

    let mut config = comm_ir_config("out/ir/comm_ir.json");
    config.program_text_path = Some("program.st".to_string());
    let resolved = resolve_inputs(&config, dir.path());

    assert!(resolved.ok, "{:?}", resolved.error);
    assert_eq!(resolved.mode, MODE_FROM_COMM_IR);
    assert_eq!(resolved.comm_ir_path, Some(ir_dir.join("comm_ir.json")));
    assert_eq!(resolved.variables_file_path, Some(ir_dir.join("vars.xlsx")));
    assert_eq!(resolved.variables_source.as_deref(), Some("outputs.variablesFilePath"));
    assert_eq!(resolved.program_text_path, Some(dir.path().join("program.st")));
    assert_eq!(resolved.program_source.as_deref(), Some("config.programTextPath"));
    assert_eq!(
        resolved.warnings,
        vec!["programTextPath missing in comm_ir; using config override."]
    );
    assert_eq!(resolved.output_dir, Some(dir.path().join("out")));
}

#[test]
fn comm_ir_without_program_path_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("comm_ir.json"),
        json!({ "inputs": { "variablesFilePath": "vars.xlsx" } }).to_string(),
    )
    .expect("comm IR written");

    let resolved = resolve_inputs(&comm_ir_config("comm_ir.json"), dir.path());
    assert!(!resolved.ok);
    assert_eq!(resolved.error_message(), Some("programTextPath not resolved"));

    let resolved = resolve_inputs(&comm_ir_config("absent.json"), dir.path());
    assert!(resolved
        .error_message()
        .is_some_and(|m| m.starts_with("Failed to read commIr")));

    let mut missing_path = comm_ir_config(" ");
    missing_path.program_text_path = Some("program.st".to_string());
    let resolved = resolve_inputs(&missing_path, dir.path());
    assert_eq!(resolved.error_message(), Some("inputsSource.commIrPath is required"));
}
