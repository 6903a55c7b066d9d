//! Opt-in dismissal of modal popups at fixed checkpoints inside a flow.
//!
//! At each checkpoint the flow records `PopupDetected.{tag}`; when a dialog is
//! present it also records `PopupDismissed.{tag}`. Nothing here ever stops a
//! flow: problems are logged as warnings.

use super::common::{Roots, SearchRoot};
use super::context::FlowContext;
use crate::finder;
use crate::rpc::{create_error, ErrorKind, RpcError};
use crate::selector::ElementSelector;
use crate::step_log::OpenStep;
use crate::waiter::{self, DEFAULT_POLL_INTERVAL};
use crate::UIElement;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_POPUP_TIMEOUT_MS: u64 = 1500;

/// Popup arguments as they appear in every flow's args object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopupArgs {
    pub enable_popup_handling: bool,
    pub popup_search_root: Option<String>,
    pub popup_timeout_ms: Option<i64>,
    pub allow_popup_ok: bool,
    pub popup_dialog_selector: Option<ElementSelector>,
    pub popup_ok_button_selector: Option<ElementSelector>,
    pub popup_cancel_button_selector: Option<ElementSelector>,
}

impl PopupArgs {
    /// Validated options, or `None` when handling is disabled.
    pub fn into_options(self) -> Result<Option<PopupOptions>, RpcError> {
        let search_root = SearchRoot::parse(self.popup_search_root.as_deref(), SearchRoot::Desktop)
            .ok_or_else(|| RpcError::invalid_argument("PopupSearchRoot must be mainWindow/desktop"))?;

        if !self.enable_popup_handling {
            return Ok(None);
        }

        let dialog = self
            .popup_dialog_selector
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                RpcError::invalid_argument(
                    "PopupDialogSelector must be provided when popup handling is enabled",
                )
            })?;
        let ok_button = self.popup_ok_button_selector.filter(|s| !s.is_empty());
        let cancel_button = self.popup_cancel_button_selector.filter(|s| !s.is_empty());

        if cancel_button.is_none() && !(self.allow_popup_ok && ok_button.is_some()) {
            return Err(RpcError::invalid_argument(
                "PopupCancelButtonSelector is required unless AllowPopupOk is true and PopupOkButtonSelector is provided",
            ));
        }

        let timeout_ms = match self.popup_timeout_ms {
            Some(ms) if ms > 0 => ms as u64,
            _ => DEFAULT_POPUP_TIMEOUT_MS,
        };

        Ok(Some(PopupOptions {
            search_root,
            timeout_ms,
            allow_ok: self.allow_popup_ok,
            dialog,
            ok_button,
            cancel_button,
        }))
    }
}

/// Validated popup handling configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PopupOptions {
    pub search_root: SearchRoot,
    pub timeout_ms: u64,
    pub allow_ok: bool,
    pub dialog: ElementSelector,
    pub ok_button: Option<ElementSelector>,
    pub cancel_button: Option<ElementSelector>,
}

/// Looks for the configured dialog and, if it shows up, clicks Cancel (or OK
/// when allowed and no Cancel button resolves).
pub fn handle_popup(ctx: &mut FlowContext, roots: &Roots, options: Option<&PopupOptions>, tag: &str) {
    let Some(options) = options else {
        return;
    };
    let root = roots.get(options.search_root);
    let root_kind = options.search_root.as_str();

    let mut detect = OpenStep::new(format!("PopupDetected.{tag}"), "Detect popup")
        .with_selector(Some(&options.dialog))
        .with_param("timeoutMs", options.timeout_ms)
        .with_param("root", root_kind);

    let mut dialog: Option<UIElement> = None;
    let mut last_failure = None;
    waiter::poll_until(
        || match finder::resolve(root, &options.dialog) {
            Ok(found) => {
                dialog = Some(found.element);
                true
            }
            Err(failure) => {
                last_failure = Some(failure.kind);
                false
            }
        },
        Duration::from_millis(options.timeout_ms),
        DEFAULT_POLL_INTERVAL,
    );

    let Some(dialog) = dialog else {
        detect.param("found", "false");
        if let Some(kind) = last_failure {
            detect.param("failureKind", kind.as_str());
        }
        ctx.succeed(detect);
        return;
    };

    let title = dialog.name();
    info!("popup detected at {}: {:?}", tag, title);
    detect.param("found", "true").param("title", &title);
    ctx.succeed(detect);

    let cancel = options
        .cancel_button
        .as_ref()
        .and_then(|s| finder::resolve(&dialog, s).ok().map(|f| (s, f.element, "cancel")));
    let target = cancel.or_else(|| {
        if !options.allow_ok {
            return None;
        }
        options
            .ok_button
            .as_ref()
            .and_then(|s| finder::resolve(&dialog, s).ok().map(|f| (s, f.element, "ok")))
    });

    let (selector, button, kind) = match &target {
        Some((selector, button, kind)) => (Some(*selector), Some(button), *kind),
        None => (None, None, "cancel"),
    };
    let dismiss = OpenStep::new(format!("PopupDismissed.{tag}"), "Dismiss popup")
        .with_selector(selector)
        .with_param("root", root_kind)
        .with_param("button", kind)
        .with_param("title", &title);

    let Some(button) = button else {
        ctx.warn(dismiss, RpcError::new(ErrorKind::FindError, "Popup button not found"));
        return;
    };

    match button.click() {
        Ok(()) => {
            debug!("popup dismissed with {} button", kind);
            ctx.succeed(dismiss);
        }
        Err(e) => ctx.warn(
            dismiss,
            create_error(ErrorKind::ActionError, "Popup dismiss failed", &e),
        ),
    }
}
