use super::{by_id, profile_of};
use crate::probe::{map_failure_kind, normalize_probe_root, resolve_probe_keys, suggestions, ProbeReport};
use std::collections::BTreeMap;
use std::time::Duration;
use uiaflow::finder::{self, FinderFailure, FinderFailureKind};
use uiaflow::platforms::memory::MemoryEngine;
use uiaflow::rpc::ErrorKind;
use uiaflow::{AccessibilityEngine, ElementSelector, SelectorStep};

fn failure(kind: FinderFailureKind, matched: usize) -> FinderFailure {
    FinderFailure {
        kind,
        details: BTreeMap::new(),
        matched,
    }
}

#[test]
fn probe_root_defaults_to_main_window() {
    assert_eq!(normalize_probe_root(None), Some("mainWindow"));
    assert_eq!(normalize_probe_root(Some("")), Some("mainWindow"));
    assert_eq!(normalize_probe_root(Some("DESKTOP")), Some("desktop"));
    assert_eq!(normalize_probe_root(Some("taskbar")), None);
}

#[test]
fn probe_keys_are_distinct_or_every_profile_key() {
    let profile = profile_of(&[("b", "b"), ("a", "a"), ("c", "c")]);

    assert_eq!(resolve_probe_keys(None, &profile), vec!["a", "b", "c"]);
    assert_eq!(resolve_probe_keys(Some(" c, a ,,c "), &profile), vec!["c", "a"]);
    assert_eq!(resolve_probe_keys(Some("  "), &profile).len(), 3);
}

#[test]
fn finder_failures_map_to_public_kinds() {
    assert_eq!(map_failure_kind(FinderFailureKind::NotFound), ErrorKind::FindError);
    assert_eq!(map_failure_kind(FinderFailureKind::Ambiguous), ErrorKind::FindError);
    assert_eq!(map_failure_kind(FinderFailureKind::IndexOutOfRange), ErrorKind::InvalidArgument);
    assert_eq!(map_failure_kind(FinderFailureKind::InvalidSelector), ErrorKind::InvalidArgument);
}

#[test]
fn not_found_under_main_window_suggests_desktop() {
    let selector = by_id("importDialog");

    let hints = suggestions(&selector, &Err(failure(FinderFailureKind::NotFound, 0)), "mainWindow", true)
        .expect("hints");
    assert_eq!(hints[0], "Try searchRoot=desktop in flow args/RunnerConfig.");
    assert_eq!(hints.len(), 2);

    let hints = suggestions(&selector, &Err(failure(FinderFailureKind::NotFound, 0)), "desktop", false)
        .expect("hints");
    assert_eq!(hints.len(), 1);

    let hints = suggestions(&selector, &Err(failure(FinderFailureKind::Ambiguous, 2)), "mainWindow", false)
        .expect("hints");
    assert_eq!(
        hints,
        vec!["Matches multiple elements; add SelectorStep.Index or tighten contains filters."]
    );
}

#[test]
fn matches_get_name_filter_hints() {
    let engine = MemoryEngine::demo().expect("demo tree");
    let main_window = engine.main_window(4242, Duration::from_millis(100)).expect("main window");

    let selector = ElementSelector::single(SelectorStep::descendant().with_name_contains("Import program"));
    let found = finder::resolve(&main_window, &selector);
    assert!(found.is_ok());

    let hints = suggestions(&selector, &found, "mainWindow", false).expect("hints");
    assert_eq!(hints, vec!["NameContains may benefit from IgnoreCase=true."]);

    let exact = by_id("importProgramButton");
    let found = finder::resolve(&main_window, &exact);
    assert_eq!(suggestions(&exact, &found, "mainWindow", false), None);
}

#[test]
fn report_file_is_named_after_the_flow() {
    assert_eq!(ProbeReport::file_name("autothink.build"), "probe.autothink.build.json");
}
