use super::profile_of;
use crate::profiles::LoadedProfile;
use crate::selector_check::{check, requirements_for};
use uiaflow::flows::names;

fn v1_profiles() -> [(&'static str, LoadedProfile); 4] {
    [
        (names::ATTACH, profile_of(&[("mainWindow", "MainForm")])),
        (
            names::IMPORT_VARIABLES,
            profile_of(&[
                ("importVariablesMenuOrButton", "openImportButton"),
                ("importVariablesDialogRoot", "importDialog"),
                ("importVariablesFilePathEdit", "filePathEdit"),
                ("importVariablesOkButton", "importOkButton"),
                ("importVariablesDoneIndicator", "importDialog"),
            ]),
        ),
        (
            names::IMPORT_PROGRAM_TEXT_PASTE,
            profile_of(&[
                ("importProgramMenuOrButton", "importProgramButton"),
                ("programEditorRoot", "programEditor"),
                ("programEditorTextArea", "programEditor"),
                ("programPastedIndicator", "programPasteIndicator"),
            ]),
        ),
        (
            names::BUILD,
            profile_of(&[
                ("buildButton", "buildButton"),
                ("buildStatus", "statusLabel"),
                ("buildFinishedIndicator", "buildSucceededIndicator"),
            ]),
        ),
    ]
}

fn refs<'a>(profiles: &'a [(&'static str, LoadedProfile)]) -> Vec<(&'static str, &'a LoadedProfile)> {
    profiles.iter().map(|(name, p)| (*name, p)).collect()
}

#[test]
fn only_v1_has_requirements() {
    assert_eq!(requirements_for(Some("v1")).len(), 4);
    assert_eq!(requirements_for(Some("V1")).len(), 4);
    assert!(requirements_for(Some("v2")).is_empty());
    assert!(requirements_for(None).is_empty());
}

#[test]
fn complete_v1_pack_passes() {
    let profiles = v1_profiles();
    let report = check(Some("v1"), &refs(&profiles));

    assert!(report.ok(), "{:?}", report.missing_keys);
    assert_eq!(report.pack_version, "v1");
    assert!(report.required_keys.contains(&"autothink.attach:mainWindow".to_string()));
    assert!(report
        .required_keys
        .contains(&"autothink.build:(anyOf:buildOutputPane|buildStatus)".to_string()));
    assert_eq!(report.flows.len(), 4);
}

#[test]
fn missing_keys_and_groups_are_listed_per_flow() {
    let mut profiles = v1_profiles();
    profiles[3].1 = profile_of(&[("buildStatus", "statusLabel")]);
    profiles[1].1.selectors.remove("importVariablesOkButton");

    let report = check(Some("v1"), &refs(&profiles));

    assert!(!report.ok());
    assert_eq!(
        report.missing_keys,
        vec![
            "autothink.importVariables:importVariablesOkButton",
            "autothink.build:buildButton",
            "autothink.build:(anyOf:buildSucceededIndicator|buildFinishedIndicator)",
        ]
    );
    let build = report.flows.iter().find(|f| f.flow_name == names::BUILD).expect("build flow");
    assert_eq!(build.missing_keys, vec!["buildButton"]);
    assert_eq!(
        build.missing_any_of,
        vec![vec!["buildSucceededIndicator".to_string(), "buildFinishedIndicator".to_string()]]
    );
    assert!(report.failure_message().starts_with("selector-check missingKeys: [autothink.importVariables"));
}

#[test]
fn unversioned_check_is_empty_and_passes() {
    let report = check(None, &[]);
    assert!(report.ok());
    assert_eq!(report.pack_version, "default");
    assert!(report.flows.is_empty());
}
