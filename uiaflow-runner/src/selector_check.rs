//! Verifies that the loaded profiles define every key a selector pack requires.

use crate::profiles::LoadedProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uiaflow::flows::names;

pub const REPORT_FILE: &str = "selector_check_report.json";

/// Keys one flow must define, plus groups where one key of each is enough
#[derive(Debug, Clone, Copy)]
pub struct FlowRequirements {
    pub flow_name: &'static str,
    pub required: &'static [&'static str],
    pub any_of: &'static [&'static [&'static str]],
}

const V1_REQUIREMENTS: [FlowRequirements; 4] = [
    FlowRequirements {
        flow_name: names::ATTACH,
        required: &["mainWindow"],
        any_of: &[],
    },
    FlowRequirements {
        flow_name: names::IMPORT_VARIABLES,
        required: &[
            "importVariablesMenuOrButton",
            "importVariablesDialogRoot",
            "importVariablesFilePathEdit",
            "importVariablesOkButton",
            "importVariablesDoneIndicator",
        ],
        any_of: &[],
    },
    FlowRequirements {
        flow_name: names::IMPORT_PROGRAM_TEXT_PASTE,
        required: &[
            "importProgramMenuOrButton",
            "programEditorRoot",
            "programEditorTextArea",
            "programPastedIndicator",
        ],
        any_of: &[],
    },
    FlowRequirements {
        flow_name: names::BUILD,
        required: &["buildButton"],
        any_of: &[
            &["buildOutputPane", "buildStatus"],
            &["buildSucceededIndicator", "buildFinishedIndicator"],
        ],
    },
];

/// Requirements of a pack version; only `v1` defines any.
pub fn requirements_for(pack_version: Option<&str>) -> &'static [FlowRequirements] {
    match pack_version {
        Some(pack) if pack.eq_ignore_ascii_case("v1") => &V1_REQUIREMENTS,
        _ => &[],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowCheck {
    pub flow_name: String,
    pub required_keys: Vec<String>,
    pub required_any_of: Vec<Vec<String>>,
    pub missing_keys: Vec<String>,
    pub missing_any_of: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorCheckReport {
    pub pack_version: String,
    pub required_keys: Vec<String>,
    pub missing_keys: Vec<String>,
    pub loaded_files: Vec<String>,
    pub flows: Vec<FlowCheck>,
    pub generated_at_utc: DateTime<Utc>,
}

impl SelectorCheckReport {
    pub fn ok(&self) -> bool {
        self.missing_keys.is_empty()
    }

    /// `selector-check missingKeys: [..]`
    pub fn failure_message(&self) -> String {
        format!("selector-check missingKeys: [{}]", self.missing_keys.join(", "))
    }
}

/// Checks `profiles` (flow name, loaded profile) against the pack requirements.
pub fn check(pack_version: Option<&str>, profiles: &[(&str, &LoadedProfile)]) -> SelectorCheckReport {
    let mut required_keys = Vec::new();
    let mut missing_keys = Vec::new();
    let mut flows = Vec::new();

    for req in requirements_for(pack_version) {
        let profile = profiles
            .iter()
            .find(|(name, _)| *name == req.flow_name)
            .map(|(_, profile)| *profile);
        let has = |key: &str| profile.is_some_and(|p| p.contains(key));

        let mut flow = FlowCheck {
            flow_name: req.flow_name.to_string(),
            required_keys: req.required.iter().map(|k| k.to_string()).collect(),
            required_any_of: req
                .any_of
                .iter()
                .map(|group| group.iter().map(|k| k.to_string()).collect())
                .collect(),
            ..FlowCheck::default()
        };

        for key in req.required {
            required_keys.push(format!("{}:{key}", req.flow_name));
            if !has(key) {
                flow.missing_keys.push(key.to_string());
                missing_keys.push(format!("{}:{key}", req.flow_name));
            }
        }
        for group in req.any_of {
            let label = format!("{}:(anyOf:{})", req.flow_name, group.join("|"));
            required_keys.push(label.clone());
            if !group.iter().any(|key| has(key)) {
                flow.missing_any_of.push(group.iter().map(|k| k.to_string()).collect());
                missing_keys.push(label);
            }
        }
        flows.push(flow);
    }

    let loaded_files: BTreeSet<String> = profiles
        .iter()
        .flat_map(|(_, profile)| profile.loaded_files.iter())
        .map(|path| path.display().to_string())
        .collect();

    SelectorCheckReport {
        pack_version: pack_version.unwrap_or("default").to_string(),
        required_keys,
        missing_keys,
        loaded_files: loaded_files.into_iter().collect(),
        flows,
        generated_at_utc: Utc::now(),
    }
}
