//! Runner configuration file.
//!
//! Every selector the flows need can be given inline or by a key into the
//! layered selector profile (`...SelectorKey`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uiaflow::{ElementSelector, WaitConditionKind};

pub const DEFAULT_PROFILE: &str = "autothink";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    pub session: SessionConfig,
    pub agent_path: Option<String>,
    pub inputs_source: Option<InputsSourceConfig>,
    pub evidence_pack: EvidencePackConfig,
    pub ui_state_recovery: UiStateRecoveryConfig,
    pub selector_pack_version: Option<String>,
    pub skip_import_variables: bool,
    pub skip_import_program: bool,
    pub skip_build: bool,
    pub allow_partial: bool,
    pub selectors_root: Option<String>,
    pub profile: Option<String>,
    pub logs_root: Option<String>,
    pub program_text_path: Option<String>,
    pub variables_file_path: Option<String>,
    pub import_variables: ImportVariablesConfig,
    pub import_program: ImportProgramConfig,
    pub build: BuildConfig,
    pub flow_timeout_ms: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            agent_path: None,
            inputs_source: None,
            evidence_pack: EvidencePackConfig::default(),
            ui_state_recovery: UiStateRecoveryConfig::default(),
            selector_pack_version: None,
            skip_import_variables: false,
            skip_import_program: false,
            skip_build: false,
            allow_partial: false,
            selectors_root: None,
            profile: None,
            logs_root: None,
            program_text_path: None,
            variables_file_path: None,
            import_variables: ImportVariablesConfig::default(),
            import_program: ImportProgramConfig::default(),
            build: BuildConfig::default(),
            flow_timeout_ms: 30_000,
        }
    }
}

impl RunnerConfig {
    /// Reads the config; returns it with the directory relative paths resolve against.
    pub fn load(path: &Path) -> Result<(Self, PathBuf), ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((config, dir))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// CLI value, then config value, then `autothink`.
    pub fn profile_name(&self, cli: Option<&str>) -> String {
        cli.or(self.profile.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROFILE)
            .to_string()
    }

    pub fn pack_version(&self) -> Option<&str> {
        self.selector_pack_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn selectors_root(&self, cli: Option<&Path>, config_dir: &Path) -> PathBuf {
        if let Some(path) = cli {
            return path.to_path_buf();
        }
        resolve_or(self.selectors_root.as_deref(), "selectors", config_dir)
    }

    pub fn logs_root(&self, config_dir: &Path) -> PathBuf {
        resolve_or(self.logs_root.as_deref(), "logs", config_dir)
    }

    pub fn flow_timeout_ms(&self) -> i64 {
        if self.flow_timeout_ms > 0 {
            self.flow_timeout_ms
        } else {
            30_000
        }
    }
}

fn resolve_or(value: Option<&str>, fallback: &str, base: &Path) -> PathBuf {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(fallback);
    resolve_path(value, base)
}

/// Absolute paths are kept, relative ones are joined onto `base`.
pub fn resolve_path(value: &str, base: &Path) -> PathBuf {
    let path = Path::new(value.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub process_id: Option<u32>,
    pub process_name: Option<String>,
    pub main_window_title_contains: Option<String>,
    pub timeout_ms: i64,
    pub bring_to_foreground: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            process_id: None,
            process_name: None,
            main_window_title_contains: None,
            timeout_ms: 10_000,
            bring_to_foreground: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputsSourceConfig {
    /// `inline` or `fromCommIr`
    pub mode: Option<String>,
    pub comm_ir_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvidencePackConfig {
    pub enable: bool,
}

impl Default for EvidencePackConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiStateRecoveryConfig {
    pub enable: bool,
    pub max_attempts: i64,
    pub search_root: String,
}

impl Default for UiStateRecoveryConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_attempts: 2,
            search_root: "desktop".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitConditionConfig {
    pub kind: Option<WaitConditionKind>,
    pub selector_key: Option<String>,
    pub selector: Option<ElementSelector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogStepConfig {
    pub action: Option<String>,
    pub selector_key: Option<String>,
    pub selector: Option<ElementSelector>,
    pub text: Option<String>,
    pub mode: Option<String>,
    pub keys: Option<String>,
    pub condition: Option<WaitConditionConfig>,
    pub timeout_ms: Option<i64>,
}

/// Popup handling shared by the import and build flows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopupConfig {
    pub enable_popup_handling: bool,
    pub popup_search_root: Option<String>,
    pub popup_timeout_ms: i64,
    pub allow_popup_ok: bool,
    pub popup_dialog_selector_key: Option<String>,
    pub popup_dialog_selector: Option<ElementSelector>,
    pub popup_ok_button_selector_key: Option<String>,
    pub popup_ok_button_selector: Option<ElementSelector>,
    pub popup_cancel_button_selector_key: Option<String>,
    pub popup_cancel_button_selector: Option<ElementSelector>,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            enable_popup_handling: false,
            popup_search_root: None,
            popup_timeout_ms: 1500,
            allow_popup_ok: false,
            popup_dialog_selector_key: None,
            popup_dialog_selector: None,
            popup_ok_button_selector_key: None,
            popup_ok_button_selector: None,
            popup_cancel_button_selector_key: None,
            popup_cancel_button_selector: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportVariablesConfig {
    pub file_path: Option<String>,
    pub open_import_dialog_steps: Vec<DialogStepConfig>,
    pub open_import_selector_key: Option<String>,
    pub open_import_selector: Option<ElementSelector>,
    pub dialog_selector_key: Option<String>,
    pub dialog_selector: Option<ElementSelector>,
    pub file_path_editor_selector_key: Option<String>,
    pub file_path_editor_selector: Option<ElementSelector>,
    pub confirm_button_selector_key: Option<String>,
    pub confirm_button_selector: Option<ElementSelector>,
    pub success_condition: Option<WaitConditionConfig>,
    pub find_timeout_ms: i64,
    pub wait_timeout_ms: i64,
    pub search_root: Option<String>,
    #[serde(flatten)]
    pub popup: PopupConfig,
}

impl Default for ImportVariablesConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            open_import_dialog_steps: Vec::new(),
            open_import_selector_key: None,
            open_import_selector: None,
            dialog_selector_key: None,
            dialog_selector: None,
            file_path_editor_selector_key: None,
            file_path_editor_selector: None,
            confirm_button_selector_key: None,
            confirm_button_selector: None,
            success_condition: None,
            find_timeout_ms: 10_000,
            wait_timeout_ms: 30_000,
            search_root: None,
            popup: PopupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipboardRetryConfig {
    pub times: i64,
    pub interval_ms: i64,
}

impl Default for ClipboardRetryConfig {
    fn default() -> Self {
        Self {
            times: 3,
            interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportProgramConfig {
    pub open_program_steps: Vec<DialogStepConfig>,
    pub editor_root_selector_key: Option<String>,
    pub editor_root_selector: Option<ElementSelector>,
    pub editor_selector_key: Option<String>,
    pub editor_selector: Option<ElementSelector>,
    pub verify_selector_key: Option<String>,
    pub verify_selector: Option<ElementSelector>,
    pub verify_mode: Option<String>,
    pub after_paste_wait_ms: Option<i64>,
    pub find_timeout_ms: i64,
    pub clipboard_timeout_ms: i64,
    pub verify_timeout_ms: i64,
    pub fallback_to_type: bool,
    pub prefer_clipboard: bool,
    pub clipboard_retry: Option<ClipboardRetryConfig>,
    pub clipboard_health_check: bool,
    pub force_fallback_on_clipboard_failure: bool,
    pub type_chunk_size: Option<i64>,
    pub type_chunk_delay_ms: Option<i64>,
    pub search_root: Option<String>,
    #[serde(flatten)]
    pub popup: PopupConfig,
}

impl Default for ImportProgramConfig {
    fn default() -> Self {
        Self {
            open_program_steps: Vec::new(),
            editor_root_selector_key: None,
            editor_root_selector: None,
            editor_selector_key: None,
            editor_selector: None,
            verify_selector_key: None,
            verify_selector: None,
            verify_mode: None,
            after_paste_wait_ms: None,
            find_timeout_ms: 10_000,
            clipboard_timeout_ms: 2_000,
            verify_timeout_ms: 5_000,
            fallback_to_type: true,
            prefer_clipboard: true,
            clipboard_retry: None,
            clipboard_health_check: false,
            force_fallback_on_clipboard_failure: false,
            type_chunk_size: None,
            type_chunk_delay_ms: None,
            search_root: None,
            popup: PopupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOutcomeConfig {
    pub mode: Option<String>,
    pub success_selector_key: Option<String>,
    pub success_selector: Option<ElementSelector>,
    pub failure_selector_key: Option<String>,
    pub failure_selector: Option<ElementSelector>,
    pub text_probe_selector_key: Option<String>,
    pub text_probe_selector: Option<ElementSelector>,
    pub success_text_contains: Vec<String>,
    pub timeout_ms: i64,
}

impl Default for BuildOutcomeConfig {
    fn default() -> Self {
        Self {
            mode: None,
            success_selector_key: None,
            success_selector: None,
            failure_selector_key: None,
            failure_selector: None,
            text_probe_selector_key: None,
            text_probe_selector: None,
            success_text_contains: Vec::new(),
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    pub build_button_selector_key: Option<String>,
    pub build_button_selector: Option<ElementSelector>,
    pub wait_condition: Option<WaitConditionConfig>,
    pub build_outcome: Option<BuildOutcomeConfig>,
    pub timeout_ms: i64,
    pub find_timeout_ms: i64,
    pub optional_close_dialog_selector_key: Option<String>,
    pub optional_close_dialog_selector: Option<ElementSelector>,
    pub unexpected_selector_keys: Vec<String>,
    pub unexpected_selectors: Vec<ElementSelector>,
    pub search_root: Option<String>,
    #[serde(flatten)]
    pub popup: PopupConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_button_selector_key: None,
            build_button_selector: None,
            wait_condition: None,
            build_outcome: None,
            timeout_ms: 60_000,
            find_timeout_ms: 10_000,
            optional_close_dialog_selector_key: None,
            optional_close_dialog_selector: None,
            unexpected_selector_keys: Vec::new(),
            unexpected_selectors: Vec::new(),
            search_root: None,
            popup: PopupConfig::default(),
        }
    }
}
