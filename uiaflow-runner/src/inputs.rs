//! Where the variable table and the program text come from: inline config
//! paths, or a communication IR document produced by the code generator.

use crate::config::{resolve_path, RunnerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const REPORT_FILE: &str = "resolved_inputs.json";

pub const MODE_INLINE: &str = "inline";
pub const MODE_FROM_COMM_IR: &str = "fromCommIr";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputsError {
    pub kind: String,
    pub message: String,
}

/// Outcome of input resolution, written to `resolved_inputs.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedInputs {
    pub ok: bool,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comm_ir_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_text_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_source: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InputsError>,
}

impl ResolvedInputs {
    fn fail(mut self, message: impl Into<String>) -> Self {
        self.ok = false;
        self.error = Some(InputsError {
            kind: "ConfigError".to_string(),
            message: message.into(),
        });
        self
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Paths a comm IR document points at, with the field each came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommIrInputs {
    pub variables: Option<(String, &'static str)>,
    pub program: Option<(String, &'static str)>,
    pub output_dir: Option<String>,
    pub project_name: Option<String>,
}

fn string_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(root, |node, segment| node.get(*segment))?
        .as_str()
        .filter(|s| !s.trim().is_empty())
}

type FieldPath = (&'static [&'static str], &'static str);

/// Lookup order for the variable table path
const VARIABLES_FIELDS: [FieldPath; 3] = [
    (&["inputs", "variablesFilePath"], "inputs.variablesFilePath"),
    (&["outputs", "variablesFilePath"], "outputs.variablesFilePath"),
    (&["sources", "unionXlsxPath"], "sources.unionXlsxPath"),
];

const PROGRAM_FIELDS: [FieldPath; 3] = [
    (&["inputs", "programTextPath"], "inputs.programTextPath"),
    (&["outputs", "programTextPath"], "outputs.programTextPath"),
    (&["sources", "programTextPath"], "sources.programTextPath"),
];

fn first_of(root: &Value, candidates: &[FieldPath]) -> Option<(String, &'static str)> {
    candidates
        .iter()
        .find_map(|(path, label)| string_at(root, path).map(|v| (v.to_string(), *label)))
}

impl CommIrInputs {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let root: Value = serde_json::from_str(json)?;
        Ok(Self {
            variables: first_of(&root, &VARIABLES_FIELDS),
            program: first_of(&root, &PROGRAM_FIELDS),
            output_dir: string_at(&root, &["outputs", "outputDir"]).map(str::to_string),
            project_name: string_at(&root, &["projectName"])
                .or_else(|| string_at(&root, &["sources", "projectName"]))
                .map(str::to_string),
        })
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::parse(&json)?)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `.../out/ir/comm_ir.json` -> `.../out`
fn derive_output_dir(comm_ir_path: &Path) -> Option<PathBuf> {
    let dir = comm_ir_path.parent()?;
    let name = dir.file_name()?.to_str()?;
    if name.eq_ignore_ascii_case("ir") {
        dir.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

pub fn resolve_inputs(config: &RunnerConfig, config_dir: &Path) -> ResolvedInputs {
    let source = config.inputs_source.clone().unwrap_or_default();
    let mode = non_blank(source.mode.as_deref()).unwrap_or(MODE_INLINE);

    if mode.eq_ignore_ascii_case(MODE_FROM_COMM_IR) {
        return from_comm_ir(config, config_dir, source.comm_ir_path.as_deref());
    }

    if !mode.eq_ignore_ascii_case(MODE_INLINE) {
        let resolved = ResolvedInputs {
            mode: mode.to_string(),
            ..ResolvedInputs::default()
        };
        return resolved.fail(format!("Unsupported inputsSource.mode: {mode}"));
    }

    let resolved = ResolvedInputs {
        mode: MODE_INLINE.to_string(),
        ..ResolvedInputs::default()
    };
    let (Some(variables), Some(program)) = (
        non_blank(config.variables_file_path.as_deref()),
        non_blank(config.program_text_path.as_deref()),
    ) else {
        return resolved.fail("inline inputsSource requires variablesFilePath and programTextPath");
    };

    ResolvedInputs {
        ok: true,
        variables_file_path: Some(resolve_path(variables, config_dir)),
        program_text_path: Some(resolve_path(program, config_dir)),
        variables_source: Some("config.variablesFilePath".to_string()),
        program_source: Some("config.programTextPath".to_string()),
        ..resolved
    }
}

fn from_comm_ir(config: &RunnerConfig, config_dir: &Path, comm_ir_path: Option<&str>) -> ResolvedInputs {
    let mut resolved = ResolvedInputs {
        mode: MODE_FROM_COMM_IR.to_string(),
        ..ResolvedInputs::default()
    };
    let Some(comm_ir_path) = non_blank(comm_ir_path) else {
        return resolved.fail("inputsSource.commIrPath is required");
    };
    let comm_ir_path = resolve_path(comm_ir_path, config_dir);
    resolved.comm_ir_path = Some(comm_ir_path.clone());

    let comm_ir = match CommIrInputs::read(&comm_ir_path) {
        Ok(comm_ir) => comm_ir,
        Err(e) => return resolved.fail(format!("Failed to read commIr: {e}")),
    };
    let comm_ir_dir = comm_ir_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_dir.to_path_buf());
    debug!("comm IR inputs: {:?}", comm_ir);

    match (&comm_ir.variables, non_blank(config.variables_file_path.as_deref())) {
        (Some((path, source)), _) => {
            resolved.variables_file_path = Some(resolve_path(path, &comm_ir_dir));
            resolved.variables_source = Some(source.to_string());
        }
        (None, Some(path)) => {
            resolved.variables_file_path = Some(resolve_path(path, config_dir));
            resolved.variables_source = Some("config.variablesFilePath".to_string());
            resolved
                .warnings
                .push("variablesFilePath missing in comm_ir; using config override.".to_string());
        }
        (None, None) => {}
    }

    match (&comm_ir.program, non_blank(config.program_text_path.as_deref())) {
        (Some((path, source)), _) => {
            resolved.program_text_path = Some(resolve_path(path, &comm_ir_dir));
            resolved.program_source = Some(source.to_string());
        }
        (None, Some(path)) => {
            resolved.program_text_path = Some(resolve_path(path, config_dir));
            resolved.program_source = Some("config.programTextPath".to_string());
            resolved
                .warnings
                .push("programTextPath missing in comm_ir; using config override.".to_string());
        }
        (None, None) => {}
    }

    resolved.output_dir = comm_ir
        .output_dir
        .map(PathBuf::from)
        .or_else(|| derive_output_dir(&comm_ir_path));
    resolved.project_name = comm_ir.project_name;

    for warning in &resolved.warnings {
        warn!("{warning}");
    }
    if resolved.variables_file_path.is_none() {
        return resolved.fail("variablesFilePath not resolved");
    }
    if resolved.program_text_path.is_none() {
        return resolved.fail("programTextPath not resolved");
    }
    resolved.ok = true;
    resolved
}
