mod config_tests;
mod inputs_tests;
mod probe_tests;
mod reports_tests;
mod selector_check_tests;

use crate::profiles::LoadedProfile;
use serde_json::{json, Value};
use std::path::Path;
use uiaflow::ElementSelector;

pub fn by_id(automation_id: &str) -> ElementSelector {
    serde_json::from_value(selector_json(automation_id)).expect("selector parses")
}

pub fn selector_json(automation_id: &str) -> Value {
    json!({ "path": [{ "automationId": automation_id }] })
}

/// Writes `{dir}/{file_name}` as a profile mapping each key to a selector by automation id.
pub fn write_profile(dir: &Path, file_name: &str, keys: &[(&str, &str)]) {
    let selectors: serde_json::Map<String, Value> = keys
        .iter()
        .map(|(key, id)| (key.to_string(), selector_json(id)))
        .collect();
    let body = json!({ "schemaVersion": 1, "selectors": selectors });
    std::fs::write(dir.join(file_name), body.to_string()).expect("profile written");
}

pub fn profile_of(keys: &[(&str, &str)]) -> LoadedProfile {
    LoadedProfile {
        selectors: keys.iter().map(|(k, id)| (k.to_string(), by_id(id))).collect(),
        ..LoadedProfile::default()
    }
}
