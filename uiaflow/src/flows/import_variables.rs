//! `autothink.importVariables`: opens the import dialog, enters a variable
//! table path, confirms, and waits for the import to finish.

use super::common::{
    acquire_roots, add_root_params, bring_to_foreground, parse_args, positive_or, present,
    run_dialog_steps, set_text_on_element, wait_step, DialogScript, DialogStep, Roots, SearchRoot,
    StepBudgets,
};
use super::popup::{handle_popup, PopupArgs, PopupOptions};
use super::{names, Flow, FlowContext, FlowOutcome};
use crate::rpc::{create_error, ErrorKind, RpcError, SetTextMode};
use crate::selector::{ElementSelector, WaitCondition, WaitConditionKind};
use crate::step_log::OpenStep;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub const DEFAULT_FIND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;
const MAX_DIALOG_OPEN_WAIT_MS: u64 = 10_000;

const OPEN_DIALOG_SCRIPT: DialogScript = DialogScript {
    prefix: "OpenImportDialog",
    action: "Open import dialog step",
    list_name: "OpenImportDialogSteps",
    failure_message: "OpenImportDialog step failed",
};

/// Arguments as sent by the caller; several fields have legacy aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportVariablesArgs {
    pub file_path: Option<String>,
    pub path: Option<String>,
    pub search_root: Option<String>,
    pub open_import_dialog_steps: Vec<DialogStep>,
    pub open_import_selector: Option<ElementSelector>,
    pub dialog_selector: Option<ElementSelector>,
    pub file_path_editor_selector: Option<ElementSelector>,
    pub path_input_selector: Option<ElementSelector>,
    pub confirm_button_selector: Option<ElementSelector>,
    pub confirm_selector: Option<ElementSelector>,
    pub success_condition: Option<WaitCondition>,
    pub completed_condition: Option<WaitCondition>,
    pub find_timeout_ms: Option<i64>,
    pub wait_timeout_ms: Option<i64>,
    #[serde(flatten)]
    pub popup: PopupArgs,
}

/// Validated arguments
#[derive(Debug, Clone)]
pub struct ImportVariablesPlan {
    pub file_path: String,
    pub search_root: SearchRoot,
    pub open_steps: Vec<DialogStep>,
    pub open_selector: Option<ElementSelector>,
    pub dialog: Option<ElementSelector>,
    pub path_input: ElementSelector,
    pub confirm: ElementSelector,
    pub completed: WaitCondition,
    pub find_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub popup: Option<PopupOptions>,
}

impl ImportVariablesPlan {
    pub fn from_args(args: Option<&Value>) -> Result<Self, RpcError> {
        let raw: ImportVariablesArgs = parse_args(args)?;

        let file_path = [raw.file_path, raw.path]
            .into_iter()
            .flatten()
            .find(|p| !p.trim().is_empty())
            .ok_or_else(|| RpcError::invalid_argument("FilePath must be provided"))?;

        let path_input = present(raw.file_path_editor_selector.or(raw.path_input_selector))
            .ok_or_else(|| RpcError::invalid_argument("FilePathEditorSelector must be provided"))?;
        let confirm = present(raw.confirm_button_selector.or(raw.confirm_selector))
            .ok_or_else(|| RpcError::invalid_argument("ConfirmButtonSelector must be provided"))?;

        let dialog = present(raw.dialog_selector);
        let completed = match (raw.success_condition.or(raw.completed_condition), &dialog) {
            (Some(condition), _) => condition,
            (None, Some(dialog)) => {
                WaitCondition::new(WaitConditionKind::ElementNotExists, dialog.clone())
            }
            (None, None) => {
                return Err(RpcError::invalid_argument(
                    "SuccessCondition or DialogSelector must be provided for completion wait",
                ))
            }
        };

        let search_root = SearchRoot::parse(raw.search_root.as_deref(), SearchRoot::MainWindow)
            .ok_or_else(|| RpcError::invalid_argument("SearchRoot must be mainWindow/desktop"))?;
        let popup = raw.popup.into_options()?;
        OPEN_DIALOG_SCRIPT.validate(&raw.open_import_dialog_steps)?;

        Ok(Self {
            file_path,
            search_root,
            open_steps: raw.open_import_dialog_steps,
            open_selector: present(raw.open_import_selector),
            dialog,
            path_input,
            confirm,
            completed,
            find_timeout_ms: positive_or(raw.find_timeout_ms, DEFAULT_FIND_TIMEOUT_MS),
            wait_timeout_ms: positive_or(raw.wait_timeout_ms, DEFAULT_WAIT_TIMEOUT_MS),
            popup,
        })
    }
}

pub struct ImportVariablesFlow;

impl Flow for ImportVariablesFlow {
    fn name(&self) -> &str {
        names::IMPORT_VARIABLES
    }

    fn run(&self, ctx: &mut FlowContext, args: Option<&Value>) -> FlowOutcome {
        let validate = OpenStep::new("ValidateArgs", "Validate args");
        let plan = match ImportVariablesPlan::from_args(args) {
            Ok(plan) => plan,
            Err(e) => return Err(ctx.fail(validate, e).into()),
        };
        ctx.succeed(validate);

        let roots = acquire_roots(ctx)?;
        bring_to_foreground(ctx, &roots.main_window);
        let root = plan.search_root;
        let popup = plan.popup.as_ref();

        handle_popup(ctx, &roots, popup, "BeforeOpenImport");
        open_dialog(ctx, &roots, &plan)?;

        if let Some(dialog) = &plan.dialog {
            wait_step(
                ctx,
                &roots,
                root,
                "WaitDialogOpen",
                "Wait import dialog open",
                &WaitCondition::new(WaitConditionKind::ElementExists, dialog.clone()),
                plan.wait_timeout_ms.min(MAX_DIALOG_OPEN_WAIT_MS),
            )?;
        }

        set_file_path(ctx, &roots, &plan)?;
        confirm_import(ctx, &roots, &plan)?;
        handle_popup(ctx, &roots, popup, "AfterConfirmImport");

        wait_step(
            ctx,
            &roots,
            root,
            "WaitImportDone",
            "Wait import done",
            &plan.completed,
            plan.wait_timeout_ms,
        )?;
        handle_popup(ctx, &roots, popup, "AfterImportDone");

        info!("variables imported from {}", plan.file_path);
        Ok(json!({ "path": plan.file_path }))
    }
}

fn open_dialog(ctx: &mut FlowContext, roots: &Roots, plan: &ImportVariablesPlan) -> Result<(), RpcError> {
    if !plan.open_steps.is_empty() {
        return run_dialog_steps(
            ctx,
            roots,
            plan.search_root,
            OPEN_DIALOG_SCRIPT,
            &plan.open_steps,
            StepBudgets {
                find_timeout_ms: plan.find_timeout_ms,
                wait_timeout_ms: plan.wait_timeout_ms,
            },
        );
    }

    let Some(selector) = &plan.open_selector else {
        let skipped = OpenStep::new("OpenImportDialog", "Open import dialog (skipped)")
            .with_param("skipped", "true");
        ctx.succeed(skipped);
        return Ok(());
    };

    let mut step = OpenStep::new("OpenImportDialog", "Open import dialog")
        .with_selector(Some(selector))
        .with_param("timeoutMs", plan.find_timeout_ms);
    add_root_params(&mut step, plan.search_root);

    let element = match roots.find_element(plan.search_root, selector, plan.find_timeout_ms) {
        Ok(element) => element,
        Err(e) => return Err(ctx.fail(step, e)),
    };
    match element.click() {
        Ok(()) => {
            ctx.succeed(step);
            Ok(())
        }
        Err(e) => Err(ctx.fail(
            step,
            create_error(ErrorKind::ActionError, "Failed to open import dialog", &e),
        )),
    }
}

fn set_file_path(ctx: &mut FlowContext, roots: &Roots, plan: &ImportVariablesPlan) -> Result<(), RpcError> {
    let mut step = OpenStep::new("SetFilePath", "Set file path")
        .with_selector(Some(&plan.path_input))
        .with_param("textLength", plan.file_path.chars().count())
        .with_param("mode", SetTextMode::Replace.as_str());
    add_root_params(&mut step, plan.search_root);

    let element = match roots.find_element(plan.search_root, &plan.path_input, plan.find_timeout_ms) {
        Ok(element) => element,
        Err(e) => return Err(ctx.fail(step, e)),
    };
    let engine = ctx.engine();
    match set_text_on_element(engine.as_ref(), &element, &plan.file_path, SetTextMode::Replace) {
        Ok(()) => {
            ctx.succeed(step);
            Ok(())
        }
        Err(e) => Err(ctx.fail(
            step,
            create_error(ErrorKind::ActionError, "Set file path failed", &e),
        )),
    }
}

fn confirm_import(ctx: &mut FlowContext, roots: &Roots, plan: &ImportVariablesPlan) -> Result<(), RpcError> {
    let mut step = OpenStep::new("ConfirmImport", "Confirm import")
        .with_selector(Some(&plan.confirm))
        .with_param("timeoutMs", plan.find_timeout_ms);
    add_root_params(&mut step, plan.search_root);

    let element = match roots.find_element(plan.search_root, &plan.confirm, plan.find_timeout_ms) {
        Ok(element) => element,
        Err(e) => return Err(ctx.fail(step, e)),
    };
    match element.click() {
        Ok(()) => {
            ctx.succeed(step);
            Ok(())
        }
        Err(e) => Err(ctx.fail(
            step,
            create_error(ErrorKind::ActionError, "Failed to confirm import", &e),
        )),
    }
}
