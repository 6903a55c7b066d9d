//! Selector resolution over an accessibility tree.
//!
//! `resolve` is a single attempt: no waiting, no retries. Callers that need to
//! wait wrap it in [`crate::waiter::poll_until`].

use crate::control_types;
use crate::element::{UIElement, UIElementAttributes};
use crate::selector::{non_blank, ElementSelector, SearchKind, SelectorStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::trace;

const AMBIGUOUS_HINT: &str = "Specify SelectorStep.Index to select one element deterministically.";
const MISSING_FILTER_REASON: &str =
    "Each selector step must specify at least one filter (AutomationId/Name/ClassName/ControlType).";
const EMPTY_PATH_REASON: &str = "selector.Path must contain at least 1 step";

/// Internal failure kinds of the selector engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinderFailureKind {
    InvalidSelector,
    InvalidControlType,
    IndexOutOfRange,
    Ambiguous,
    NotFound,
}

impl FinderFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinderFailureKind::InvalidSelector => "InvalidSelector",
            FinderFailureKind::InvalidControlType => "InvalidControlType",
            FinderFailureKind::IndexOutOfRange => "IndexOutOfRange",
            FinderFailureKind::Ambiguous => "Ambiguous",
            FinderFailureKind::NotFound => "NotFound",
        }
    }
}

impl fmt::Display for FinderFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("selector resolution failed: {kind}")]
pub struct FinderFailure {
    pub kind: FinderFailureKind,
    pub details: BTreeMap<String, String>,
    /// Candidates that survived filtering at the failing step
    pub matched: usize,
}

impl FinderFailure {
    fn new(kind: FinderFailureKind, matched: usize, details: &[(&str, String)]) -> Self {
        Self {
            kind,
            matched,
            details: details
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    pub fn step_index(&self) -> Option<usize> {
        self.details.get("stepIndex").and_then(|s| s.parse().ok())
    }
}

/// A resolved element plus the matched count of the last step
#[derive(Debug, Clone)]
pub struct Found {
    pub element: UIElement,
    pub matched: usize,
}

/// Resolves `selector` under `root`, one step at a time.
pub fn resolve(root: &UIElement, selector: &ElementSelector) -> Result<Found, FinderFailure> {
    if selector.path.is_empty() {
        return Err(FinderFailure::new(
            FinderFailureKind::InvalidSelector,
            0,
            &[("reason", EMPTY_PATH_REASON.to_string())],
        ));
    }

    let mut current = root.clone();
    let mut last_matched = 0usize;

    for (i, step) in selector.path.iter().enumerate() {
        if !step.has_filter() {
            return Err(FinderFailure::new(
                FinderFailureKind::InvalidSelector,
                0,
                &[
                    ("stepIndex", i.to_string()),
                    ("reason", MISSING_FILTER_REASON.to_string()),
                ],
            ));
        }

        let control_type = match non_blank(&step.control_type) {
            Some(raw) => match control_types::lookup(raw) {
                Some(canonical) => Some(canonical),
                None => {
                    return Err(FinderFailure::new(
                        FinderFailureKind::InvalidControlType,
                        0,
                        &[("stepIndex", i.to_string()), ("controlType", raw.to_string())],
                    ))
                }
            },
            None => None,
        };

        let candidates = match step.search {
            SearchKind::Children => current.children(),
            SearchKind::Descendants => current.descendants(),
        };
        // A tree read failing mid-walk means the subtree went away under us.
        let candidates = match candidates {
            Ok(c) => c,
            Err(e) => {
                trace!("tree read failed at step {}: {}", i, e);
                return Err(FinderFailure::new(
                    FinderFailureKind::NotFound,
                    0,
                    &[("stepIndex", i.to_string()), ("error", e.to_string())],
                ));
            }
        };

        let mut matches: Vec<UIElement> = candidates
            .into_iter()
            .filter(|e| matches_step(&e.attributes(), step, control_type))
            .collect();

        if matches.is_empty() {
            return Err(FinderFailure::new(
                FinderFailureKind::NotFound,
                0,
                &[("stepIndex", i.to_string())],
            ));
        }

        let count = matches.len();
        let selected = match step.index {
            Some(index) => {
                if index < 0 || index as usize >= count {
                    return Err(FinderFailure::new(
                        FinderFailureKind::IndexOutOfRange,
                        count,
                        &[
                            ("stepIndex", i.to_string()),
                            ("index", index.to_string()),
                            ("matches", count.to_string()),
                        ],
                    ));
                }
                matches.swap_remove(index as usize)
            }
            None => {
                if count != 1 {
                    return Err(FinderFailure::new(
                        FinderFailureKind::Ambiguous,
                        count,
                        &[
                            ("stepIndex", i.to_string()),
                            ("matches", count.to_string()),
                            ("hint", AMBIGUOUS_HINT.to_string()),
                        ],
                    ));
                }
                matches.swap_remove(0)
            }
        };

        last_matched = count;
        current = selected;
    }

    Ok(Found {
        element: current,
        matched: last_matched,
    })
}

/// Convenience for predicates that only care whether the selector resolves.
pub fn exists(root: &UIElement, selector: &ElementSelector) -> bool {
    resolve(root, selector).is_ok()
}

fn matches_step(
    attrs: &UIElementAttributes,
    step: &SelectorStep,
    control_type: Option<&'static str>,
) -> bool {
    if !matches_text(
        &attrs.automation_id,
        step.automation_id.as_deref(),
        step.automation_id_contains.as_deref(),
        step.ignore_case,
        false,
    ) {
        return false;
    }
    if !matches_text(
        &attrs.name,
        step.name.as_deref(),
        step.name_contains.as_deref(),
        step.ignore_case,
        step.normalize_whitespace,
    ) {
        return false;
    }
    if !matches_text(
        &attrs.class_name,
        step.class_name.as_deref(),
        step.class_name_contains.as_deref(),
        step.ignore_case,
        false,
    ) {
        return false;
    }
    match control_type {
        Some(expected) => control_types::lookup(&attrs.control_type) == Some(expected),
        None => true,
    }
}

/// Exact beats contains; no filter at all matches anything.
pub fn matches_text(
    actual: &str,
    exact: Option<&str>,
    contains: Option<&str>,
    ignore_case: bool,
    normalize: bool,
) -> bool {
    let prep = |s: &str| -> String {
        let s = if normalize {
            normalize_whitespace(s)
        } else {
            s.to_string()
        };
        if ignore_case {
            s.to_lowercase()
        } else {
            s
        }
    };

    let actual = prep(actual);
    if let Some(exact) = exact.filter(|s| !s.trim().is_empty()) {
        return actual == prep(exact);
    }
    if let Some(contains) = contains.filter(|s| !s.trim().is_empty()) {
        return actual.contains(&prep(contains));
    }
    true
}

/// Collapses whitespace runs into a single space and trims.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
