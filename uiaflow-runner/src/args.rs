//! Turns per-flow config plus loaded profiles into the typed flow arguments
//! sent with `RunFlow`.

use crate::config::{BuildConfig, ImportProgramConfig, ImportVariablesConfig, PopupConfig};
use crate::profiles::{
    resolve_dialog_steps, resolve_selector, resolve_selector_list, resolve_selector_optional,
    resolve_wait_condition, LoadedProfile, SelectorResolveError,
};
use thiserror::Error;
use uiaflow::flows::build::{BuildArgs, BuildOutcomeArgs};
use uiaflow::flows::import_program::{ClipboardRetry, ImportProgramArgs};
use uiaflow::flows::import_variables::ImportVariablesArgs;
use uiaflow::flows::popup::PopupArgs;
use uiaflow::ElementSelector;

const DEFAULT_POPUP_TIMEOUT_MS: i64 = 1500;
const DEFAULT_POPUP_DIALOG_KEY: &str = "popupDialog";
const DEFAULT_POPUP_OK_KEY: &str = "popupOkButton";
const DEFAULT_POPUP_CANCEL_KEY: &str = "popupCancelButton";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error(transparent)]
    Selector(#[from] SelectorResolveError),
    #[error("Build.WaitCondition is required")]
    MissingWaitCondition,
    #[error("{0}")]
    Invalid(String),
}

/// `desktop` when blank; `None` for anything but desktop/mainWindow.
pub fn normalize_popup_root(value: Option<&str>) -> Option<&'static str> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Some("desktop"),
        Some(v) if v.eq_ignore_ascii_case("desktop") => Some("desktop"),
        Some(v) if v.eq_ignore_ascii_case("mainWindow") => Some("mainWindow"),
        Some(_) => None,
    }
}

/// Report label of a flow search root: `desktop`, otherwise `mainWindow`.
pub fn normalize_root(value: Option<&str>) -> &'static str {
    match value {
        Some(v) if v.trim().eq_ignore_ascii_case("desktop") => "desktop",
        _ => "mainWindow",
    }
}

/// Whether any enabled flow needs the popup profile
pub fn popups_needed(
    import_variables: Option<&ImportVariablesConfig>,
    import_program: Option<&ImportProgramConfig>,
    build: Option<&BuildConfig>,
) -> bool {
    import_variables.is_some_and(|c| c.popup.enable_popup_handling)
        || import_program.is_some_and(|c| c.popup.enable_popup_handling)
        || build.is_some_and(|c| c.popup.enable_popup_handling)
}

fn popup_selector(
    inline: Option<&ElementSelector>,
    key: Option<&str>,
    default_key: &str,
    profile: &LoadedProfile,
    context: &str,
) -> Result<Option<ElementSelector>, SelectorResolveError> {
    match key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => resolve_selector_optional(inline, Some(key), profile, context),
        // Default keys are optional; only explicitly named keys must exist.
        None => match resolve_selector_optional(inline, None, profile, context)? {
            Some(selector) => Ok(Some(selector)),
            None => Ok(profile.get(default_key).cloned()),
        },
    }
}

pub fn popup_args(
    config: &PopupConfig,
    popups: Option<&LoadedProfile>,
    context: &str,
) -> Result<PopupArgs, ArgsError> {
    let root = normalize_popup_root(config.popup_search_root.as_deref())
        .ok_or_else(|| ArgsError::Invalid(format!("{context}.popupSearchRoot must be mainWindow/desktop")))?;

    let mut args = PopupArgs {
        enable_popup_handling: config.enable_popup_handling,
        popup_search_root: Some(root.to_string()),
        popup_timeout_ms: Some(if config.popup_timeout_ms > 0 {
            config.popup_timeout_ms
        } else {
            DEFAULT_POPUP_TIMEOUT_MS
        }),
        allow_popup_ok: config.allow_popup_ok,
        ..PopupArgs::default()
    };
    if !config.enable_popup_handling {
        return Ok(args);
    }

    let profile = popups.ok_or_else(|| ArgsError::Invalid("Popup selector profile not loaded.".to_string()))?;

    let dialog = popup_selector(
        config.popup_dialog_selector.as_ref(),
        config.popup_dialog_selector_key.as_deref(),
        DEFAULT_POPUP_DIALOG_KEY,
        profile,
        &format!("{context}.popupDialogSelector"),
    )?
    .ok_or_else(|| SelectorResolveError::Required(format!("{context}.popupDialogSelector")))?;
    let ok = popup_selector(
        config.popup_ok_button_selector.as_ref(),
        config.popup_ok_button_selector_key.as_deref(),
        DEFAULT_POPUP_OK_KEY,
        profile,
        &format!("{context}.popupOkButtonSelector"),
    )?;
    let cancel = popup_selector(
        config.popup_cancel_button_selector.as_ref(),
        config.popup_cancel_button_selector_key.as_deref(),
        DEFAULT_POPUP_CANCEL_KEY,
        profile,
        &format!("{context}.popupCancelButtonSelector"),
    )?;

    if cancel.is_none() && (!config.allow_popup_ok || ok.is_none()) {
        return Err(ArgsError::Invalid(format!(
            "{context} requires popupCancelButtonSelector unless allowPopupOk is true and popupOkButtonSelector is provided"
        )));
    }

    args.popup_dialog_selector = Some(dialog);
    args.popup_ok_button_selector = ok;
    args.popup_cancel_button_selector = cancel;
    Ok(args)
}

pub fn import_variables_args(
    config: &ImportVariablesConfig,
    file_path: String,
    profile: &LoadedProfile,
    popups: Option<&LoadedProfile>,
) -> Result<ImportVariablesArgs, ArgsError> {
    let file_path_editor = resolve_selector(
        config.file_path_editor_selector.as_ref(),
        config.file_path_editor_selector_key.as_deref(),
        profile,
        "filePathEditorSelector",
    )?;
    let confirm_button = resolve_selector(
        config.confirm_button_selector.as_ref(),
        config.confirm_button_selector_key.as_deref(),
        profile,
        "confirmButtonSelector",
    )?;
    let dialog = resolve_selector_optional(
        config.dialog_selector.as_ref(),
        config.dialog_selector_key.as_deref(),
        profile,
        "dialogSelector",
    )?;
    let open_import = resolve_selector_optional(
        config.open_import_selector.as_ref(),
        config.open_import_selector_key.as_deref(),
        profile,
        "openImportSelector",
    )?;

    Ok(ImportVariablesArgs {
        file_path: Some(file_path),
        search_root: config.search_root.clone(),
        open_import_dialog_steps: resolve_dialog_steps(
            &config.open_import_dialog_steps,
            profile,
            "openImportDialogSteps",
        )?,
        open_import_selector: open_import,
        dialog_selector: dialog,
        file_path_editor_selector: Some(file_path_editor),
        confirm_button_selector: Some(confirm_button),
        success_condition: resolve_wait_condition(
            config.success_condition.as_ref(),
            profile,
            "successCondition",
        )?,
        find_timeout_ms: Some(config.find_timeout_ms),
        wait_timeout_ms: Some(config.wait_timeout_ms),
        popup: popup_args(&config.popup, popups, "importVariables")?,
        ..ImportVariablesArgs::default()
    })
}

pub fn import_program_args(
    config: &ImportProgramConfig,
    program_text: String,
    profile: &LoadedProfile,
    popups: Option<&LoadedProfile>,
) -> Result<ImportProgramArgs, ArgsError> {
    let editor = resolve_selector(
        config.editor_selector.as_ref(),
        config.editor_selector_key.as_deref(),
        profile,
        "editorSelector",
    )?;
    let editor_root = resolve_selector_optional(
        config.editor_root_selector.as_ref(),
        config.editor_root_selector_key.as_deref(),
        profile,
        "editorRootSelector",
    )?;
    let verify = resolve_selector_optional(
        config.verify_selector.as_ref(),
        config.verify_selector_key.as_deref(),
        profile,
        "verifySelector",
    )?;

    Ok(ImportProgramArgs {
        program_text,
        open_program_steps: resolve_dialog_steps(&config.open_program_steps, profile, "openProgramSteps")?,
        editor_root_selector: editor_root,
        editor_selector: Some(editor),
        after_paste_wait_ms: config.after_paste_wait_ms,
        verify_mode: config.verify_mode.clone(),
        verify_selector: verify,
        search_root: config.search_root.clone(),
        find_timeout_ms: Some(config.find_timeout_ms),
        clipboard_timeout_ms: Some(config.clipboard_timeout_ms),
        verify_timeout_ms: Some(config.verify_timeout_ms),
        fallback_to_type: config.fallback_to_type,
        prefer_clipboard: config.prefer_clipboard,
        clipboard_retry: config.clipboard_retry.map(|retry| ClipboardRetry {
            times: retry.times,
            interval_ms: retry.interval_ms,
        }),
        clipboard_health_check: config.clipboard_health_check,
        force_fallback_on_clipboard_failure: config.force_fallback_on_clipboard_failure,
        type_chunk_size: config.type_chunk_size,
        type_chunk_delay_ms: config.type_chunk_delay_ms,
        popup: popup_args(&config.popup, popups, "importProgram")?,
    })
}

pub fn build_args(
    config: &BuildConfig,
    profile: &LoadedProfile,
    popups: Option<&LoadedProfile>,
) -> Result<BuildArgs, ArgsError> {
    let button = resolve_selector(
        config.build_button_selector.as_ref(),
        config.build_button_selector_key.as_deref(),
        profile,
        "buildButtonSelector",
    )?;
    let wait = resolve_wait_condition(config.wait_condition.as_ref(), profile, "waitCondition")?
        .ok_or(ArgsError::MissingWaitCondition)?;
    let close_dialog = resolve_selector_optional(
        config.optional_close_dialog_selector.as_ref(),
        config.optional_close_dialog_selector_key.as_deref(),
        profile,
        "optionalCloseDialogSelector",
    )?;
    let unexpected = resolve_selector_list(
        &config.unexpected_selectors,
        &config.unexpected_selector_keys,
        profile,
        "unexpectedSelectors",
    )?;
    let popup = popup_args(&config.popup, popups, "build")?;

    let build_outcome = match &config.build_outcome {
        None => None,
        Some(outcome) => Some(BuildOutcomeArgs {
            mode: outcome.mode.clone(),
            success_selector: resolve_selector_optional(
                outcome.success_selector.as_ref(),
                outcome.success_selector_key.as_deref(),
                profile,
                "buildOutcome.successSelector",
            )?,
            failure_selector: resolve_selector_optional(
                outcome.failure_selector.as_ref(),
                outcome.failure_selector_key.as_deref(),
                profile,
                "buildOutcome.failureSelector",
            )?,
            text_probe_selector: resolve_selector_optional(
                outcome.text_probe_selector.as_ref(),
                outcome.text_probe_selector_key.as_deref(),
                profile,
                "buildOutcome.textProbeSelector",
            )?,
            success_text_contains: outcome.success_text_contains.clone(),
            timeout_ms: Some(outcome.timeout_ms),
        }),
    };

    Ok(BuildArgs {
        build_button_selector: Some(button),
        wait_condition: Some(wait),
        build_outcome,
        timeout_ms: Some(config.timeout_ms),
        find_timeout_ms: Some(config.find_timeout_ms),
        search_root: config.search_root.clone(),
        optional_close_dialog_selector: close_dialog,
        unexpected_selectors: unexpected,
        popup,
        ..BuildArgs::default()
    })
}
