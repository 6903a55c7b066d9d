use super::common::{acquire_roots, bring_to_foreground};
use super::{names, Flow, FlowContext, FlowOutcome};
use serde_json::{json, Value};

/// Confirms the session's main window is reachable and raises it.
pub struct AttachFlow;

impl Flow for AttachFlow {
    fn name(&self) -> &str {
        names::ATTACH
    }

    fn run(&self, ctx: &mut FlowContext, _args: Option<&Value>) -> FlowOutcome {
        let roots = acquire_roots(ctx)?;
        bring_to_foreground(ctx, &roots.main_window);

        Ok(json!({
            "processId": ctx.session().process_id(),
            "mainWindowTitle": roots.main_window.name(),
        }))
    }
}
