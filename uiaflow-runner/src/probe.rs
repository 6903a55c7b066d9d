//! Selector probe: resolves every key of one flow profile against the live
//! target and reports what matched, with hints for fixing what did not.

use crate::client::{AgentRpc, RpcChannel};
use crate::config::RunnerConfig;
use crate::connectivity;
use crate::exit_code;
use crate::profiles::{load_profile, LoadedProfile};
use crate::reports::{create_run_dir, write_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uiaflow::finder::{self, FinderFailure, FinderFailureKind, Found};
use uiaflow::rpc::{ErrorKind, FindElementRequest, OpenSessionRequest, RpcError};
use uiaflow::{AccessibilityEngine, ElementSelector, UIElement};

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const ROOT_DESKTOP: &str = "desktop";
const ROOT_MAIN_WINDOW: &str = "mainWindow";
const CALL_GRACE_MS: u64 = 5_000;
const MAIN_WINDOW_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    pub name: String,
    pub class_name: String,
    pub automation_id: String,
    pub control_type: String,
    pub is_enabled: bool,
    /// `left,top,width,height`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<String>,
}

impl ElementSnapshot {
    fn of(element: &UIElement) -> Self {
        let attributes = element.attributes();
        Self {
            bounding_rect: attributes
                .bounds
                .map(|(left, top, width, height)| format!("{left},{top},{width},{height}")),
            name: attributes.name,
            class_name: attributes.class_name,
            automation_id: attributes.automation_id,
            control_type: attributes.control_type,
            is_enabled: attributes.is_enabled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeEntry {
    pub flow_name: String,
    pub selector_key: String,
    pub root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<ElementSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_index: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    pub elapsed_ms: i64,
}

impl ProbeEntry {
    fn new(flow_name: &str, key: &str, root: &str) -> Self {
        Self {
            flow_name: flow_name.to_string(),
            selector_key: key.to_string(),
            root: root.to_string(),
            ..Self::default()
        }
    }

    fn with_selector(mut self, selector: &ElementSelector) -> Self {
        self.used_index = selector.used_index();
        self.selector = Some(selector.clone());
        self
    }

    fn fail(mut self, kind: &str, message: impl Into<String>) -> Self {
        self.ok = false;
        self.error_kind = Some(kind.to_string());
        self.error_message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub flow_name: String,
    pub root: String,
    pub selectors_file: String,
    pub generated_at_utc: DateTime<Utc>,
    pub entries: Vec<ProbeEntry>,
}

impl ProbeReport {
    pub fn file_name(flow_name: &str) -> String {
        format!("probe.{flow_name}.json")
    }
}

/// Command line inputs of a probe run
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    pub flow_name: Option<String>,
    /// Comma separated; all profile keys when absent
    pub keys: Option<String>,
    pub search_root: Option<String>,
    pub timeout_ms: Option<u64>,
    pub agent_path: String,
    pub check_timeout_ms: u64,
    pub skip_check: bool,
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub exit_code: i32,
    pub run_dir: Option<PathBuf>,
    pub report: Option<ProbeReport>,
}

impl ProbeOutcome {
    fn exit(exit_code: i32, run_dir: Option<PathBuf>) -> Self {
        Self {
            exit_code,
            run_dir,
            report: None,
        }
    }
}

/// `mainWindow` when blank; `None` for anything but desktop/mainWindow.
pub fn normalize_probe_root(value: Option<&str>) -> Option<&'static str> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Some(ROOT_MAIN_WINDOW),
        Some(v) if v.eq_ignore_ascii_case(ROOT_DESKTOP) => Some(ROOT_DESKTOP),
        Some(v) if v.eq_ignore_ascii_case(ROOT_MAIN_WINDOW) => Some(ROOT_MAIN_WINDOW),
        Some(_) => None,
    }
}

/// Distinct keys from `--probe-keys`, or every profile key in order.
pub fn resolve_probe_keys(value: Option<&str>, profile: &LoadedProfile) -> Vec<String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(list) => {
            let mut keys: Vec<String> = Vec::new();
            for key in list.split(',').map(str::trim).filter(|k| !k.is_empty()) {
                if !keys.iter().any(|k| k == key) {
                    keys.push(key.to_string());
                }
            }
            keys
        }
        None => profile.selectors.keys().cloned().collect(),
    }
}

pub fn map_failure_kind(kind: FinderFailureKind) -> ErrorKind {
    match kind {
        FinderFailureKind::InvalidSelector
        | FinderFailureKind::InvalidControlType
        | FinderFailureKind::IndexOutOfRange => ErrorKind::InvalidArgument,
        FinderFailureKind::Ambiguous | FinderFailureKind::NotFound => ErrorKind::FindError,
    }
}

fn failure_message(failure: &FinderFailure) -> String {
    if failure.details.is_empty() {
        return failure.kind.to_string();
    }
    let details: Vec<String> = failure.details.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{}: {}", failure.kind, details.join(", "))
}

fn has_whitespace_variance(value: &str) -> bool {
    value.trim() != value || value.contains("  ") || value.contains(['\t', '\r', '\n'])
}

/// Hints derived from a local evaluation of the selector.
pub fn suggestions(
    selector: &ElementSelector,
    result: &Result<Found, FinderFailure>,
    root: &str,
    desktop_hit: bool,
) -> Option<Vec<String>> {
    let mut hints: Vec<String> = Vec::new();
    match result {
        Err(failure) => match failure.kind {
            FinderFailureKind::Ambiguous => {
                hints.push("Matches multiple elements; add SelectorStep.Index or tighten contains filters.".into())
            }
            FinderFailureKind::NotFound => {
                if root == ROOT_MAIN_WINDOW && desktop_hit {
                    hints.push("Try searchRoot=desktop in flow args/RunnerConfig.".into());
                }
                hints.push(
                    "Consider NameContains/IgnoreCase/NormalizeWhitespace or AutomationIdContains/ClassNameContains."
                        .into(),
                );
            }
            FinderFailureKind::IndexOutOfRange => {
                hints.push("Index out of range; adjust SelectorStep.Index to 0..matches-1.".into())
            }
            FinderFailureKind::InvalidControlType => {
                hints.push("ControlType is invalid; use a valid control type name.".into())
            }
            FinderFailureKind::InvalidSelector => hints.push("Selector step must include at least one filter.".into()),
        },
        Ok(found) => {
            if found.matched > 1 {
                hints.push("Multiple matches detected; keep Index or tighten contains filters.".into());
            }
            let variance = has_whitespace_variance(&found.element.name());
            for step in &selector.path {
                if step.name_contains.as_deref().is_some_and(|n| !n.trim().is_empty()) {
                    if !step.ignore_case {
                        hints.push("NameContains may benefit from IgnoreCase=true.".into());
                    }
                    if !step.normalize_whitespace && variance {
                        hints.push(
                            "Enable NormalizeWhitespace for NameContains to reduce whitespace variance.".into(),
                        );
                    }
                }
            }
        }
    }
    (!hints.is_empty()).then_some(hints)
}

/// The runner's own view of the target, used to evaluate selectors locally
struct LocalView {
    engine: Arc<dyn AccessibilityEngine>,
    main_window: UIElement,
}

impl LocalView {
    fn attach(engine: Arc<dyn AccessibilityEngine>, process_id: u32) -> Option<Self> {
        match engine.main_window(process_id, MAIN_WINDOW_TIMEOUT) {
            Ok(main_window) => Some(Self { engine, main_window }),
            Err(e) => {
                warn!("Probe attach warning: {e}");
                None
            }
        }
    }

    fn desktop(&self) -> Option<UIElement> {
        self.engine
            .desktop()
            .inspect_err(|e| debug!("desktop unavailable: {e}"))
            .ok()
    }

    fn evaluate(&self, root: &str, selector: &ElementSelector) -> Option<(Result<Found, FinderFailure>, bool)> {
        let element = if root == ROOT_DESKTOP {
            self.desktop()?
        } else {
            self.main_window.clone()
        };
        let result = finder::resolve(&element, selector);
        let desktop_hit = result.is_err()
            && root == ROOT_MAIN_WINDOW
            && self
                .desktop()
                .is_some_and(|desktop| finder::resolve(&desktop, selector).is_ok());
        Some((result, desktop_hit))
    }
}

async fn probe_selector<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    session_id: &str,
    mut entry: ProbeEntry,
    selector: &ElementSelector,
    timeout_ms: u64,
    local: Option<&LocalView>,
) -> ProbeEntry {
    let started = Instant::now();
    let root = entry.root.clone();

    let mut rpc_outcome: Option<Result<(), RpcError>> = None;
    if root == ROOT_MAIN_WINDOW {
        let request = FindElementRequest {
            session_id: session_id.to_string(),
            selector: selector.clone(),
            timeout_ms: timeout_ms as i64,
        };
        rpc_outcome = Some(match rpc.find_element(&request, timeout_ms + CALL_GRACE_MS).await {
            Ok(result) if result.ok => Ok(()),
            Ok(result) => Err(result
                .error
                .unwrap_or_else(|| RpcError::new(ErrorKind::FindError, "FindElement failed"))),
            Err(e) => Err(RpcError::new(ErrorKind::RpcError, e.to_string())),
        });
    }

    match local.and_then(|view| view.evaluate(&root, selector)) {
        Some((result, desktop_hit)) => {
            entry.suggestions = suggestions(selector, &result, &root, desktop_hit);
            match result {
                Ok(found) => {
                    entry.ok = true;
                    entry.matched_count = Some(found.matched);
                    entry.element = Some(ElementSnapshot::of(&found.element));
                }
                Err(failure) => {
                    entry.matched_count = Some(failure.matched);
                    entry = entry.fail(map_failure_kind(failure.kind).as_str(), failure_message(&failure));
                }
            }
        }
        None => match rpc_outcome {
            Some(Ok(())) => entry.ok = true,
            Some(Err(error)) => entry = entry.fail(error.kind.as_str(), error.message),
            None => entry = entry.fail(ErrorKind::RpcError.as_str(), "Probe requires session"),
        },
    }

    entry.elapsed_ms = started.elapsed().as_millis() as i64;
    entry
}

/// Runs a probe over a channel that has not done its handshake yet. The
/// caller shuts the channel down afterwards.
pub async fn run_probe<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    config: &RunnerConfig,
    selectors_root: &std::path::Path,
    profile: &str,
    logs_root: &std::path::Path,
    options: &ProbeOptions,
    local_engine: Option<Arc<dyn AccessibilityEngine>>,
) -> ProbeOutcome {
    let pack_version = config.pack_version();
    info!("SelectorPackVersion: {}", pack_version.unwrap_or("(default)"));

    let Some(flow_name) = options
        .flow_name
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
    else {
        error!("Probe requires --probe-flow <flowName>.");
        return ProbeOutcome::exit(exit_code::CONFIG_ERROR, None);
    };
    let Some(root) = normalize_probe_root(options.search_root.as_deref()) else {
        error!("Probe searchRoot must be mainWindow/desktop.");
        return ProbeOutcome::exit(exit_code::CONFIG_ERROR, None);
    };
    let timeout_ms = options.timeout_ms.filter(|t| *t > 0).unwrap_or(DEFAULT_TIMEOUT_MS);

    let loaded = match load_profile(selectors_root, profile, flow_name, pack_version) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            return ProbeOutcome::exit(exit_code::CONFIG_ERROR, None);
        }
    };
    let keys = resolve_probe_keys(options.keys.as_deref(), &loaded);

    let run_dir = match create_run_dir(logs_root) {
        Ok(dir) => dir,
        Err(e) => {
            error!("failed to create run directory under {}: {e}", logs_root.display());
            return ProbeOutcome::exit(exit_code::CONFIG_ERROR, None);
        }
    };
    info!("RunDir: {}", run_dir.display());
    info!("ProbeFlow: {flow_name}, keys: {}, root: {root}, timeout: {timeout_ms} ms", keys.join(","));

    let working_dir = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    let report = connectivity::check(rpc, &options.agent_path, &working_dir, options.check_timeout_ms).await;
    let connectivity_path = run_dir.join(connectivity::REPORT_FILE);
    if let Err(e) = write_json(&connectivity_path, &report) {
        warn!("failed to write {}: {e}", connectivity_path.display());
    }
    if !report.ok && !options.skip_check {
        error!("Connectivity failed: {}", report.failure_message().unwrap_or_default());
        return ProbeOutcome::exit(exit_code::CHECK_FAILED, Some(run_dir));
    }

    let session = &config.session;
    let request = OpenSessionRequest {
        process_id: session.process_id,
        process_name: session.process_name.clone(),
        main_window_title_contains: session.main_window_title_contains.clone(),
        timeout_ms: if session.timeout_ms > 0 { session.timeout_ms } else { 10_000 },
        bring_to_foreground: session.bring_to_foreground,
    };
    let opened = match rpc.open_session(&request, request.timeout_ms as u64 + CALL_GRACE_MS).await {
        Ok(result) => match (result.ok, result.value) {
            (true, Some(value)) => Ok(value),
            _ => Err(result
                .error
                .unwrap_or_else(|| RpcError::new(ErrorKind::ConfigError, "OpenSession failed"))),
        },
        Err(e) => Err(RpcError::new(ErrorKind::RpcError, e.to_string())),
    };

    let mut entries = Vec::with_capacity(keys.len());
    match &opened {
        Err(open_error) => {
            error!("OpenSession failed: {}", open_error.message);
            for key in &keys {
                let entry = ProbeEntry::new(flow_name, key, root);
                entries.push(match loaded.get(key) {
                    Some(selector) => entry
                        .with_selector(selector)
                        .fail(open_error.kind.as_str(), open_error.message.clone()),
                    None => entry.fail(ErrorKind::InvalidArgument.as_str(), "Selector key not found"),
                });
            }
        }
        Ok(opened) => {
            let local = local_engine.and_then(|engine| LocalView::attach(engine, opened.process_id));
            for key in &keys {
                let entry = ProbeEntry::new(flow_name, key, root);
                let Some(selector) = loaded.get(key) else {
                    entries.push(entry.fail(ErrorKind::InvalidArgument.as_str(), "Selector key not found"));
                    continue;
                };
                let entry = entry.with_selector(selector);
                entries.push(probe_selector(rpc, &opened.session_id, entry, selector, timeout_ms, local.as_ref()).await);
            }
        }
    }

    let probe_report = ProbeReport {
        flow_name: flow_name.to_string(),
        root: root.to_string(),
        selectors_file: loaded.selectors_file().display().to_string(),
        generated_at_utc: Utc::now(),
        entries,
    };
    let probe_path = run_dir.join(ProbeReport::file_name(flow_name));
    match write_json(&probe_path, &probe_report) {
        Ok(()) => info!("Probe written: {}", probe_path.display()),
        Err(e) => error!("failed to write {}: {e}", probe_path.display()),
    }

    if let Ok(opened) = &opened {
        if let Err(e) = rpc.close_session(&opened.session_id, CALL_GRACE_MS).await {
            debug!("CloseSession failed: {e}");
        }
    }

    ProbeOutcome {
        exit_code: if opened.is_ok() { exit_code::OK } else { exit_code::CHECK_FAILED },
        run_dir: Some(run_dir),
        report: Some(probe_report),
    }
}
