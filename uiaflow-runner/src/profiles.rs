//! Layered selector profiles.
//!
//! For a flow `autothink.build` with profile `autothink` and pack `v1` the
//! effective map is built from, in order:
//!
//! 1. `autothink.v1.base.json` (required when a pack version is set)
//! 2. `autothink.v1.local.json` (optional, overwrites)
//! 3. `autothink.build.json` (required, only fills keys not yet present)
//! 4. `autothink.build.local.json` (optional, overwrites)
//!
//! Without a pack version the pack layer is `autothink.base.json` /
//! `autothink.base.local.json`, both optional.

use crate::config::{DialogStepConfig, WaitConditionConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uiaflow::flows::common::DialogStep;
use uiaflow::{ElementSelector, WaitCondition};

/// Profile holding the popup dialog selectors
pub const POPUP_PROFILE_FLOW: &str = "autothink.popups";

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Selector base profile not found: {0}")]
    BaseNotFound(PathBuf),
    #[error("Selector profile not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read selector profile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid selector profile {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors resolving a selector from inline config or a profile key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorResolveError {
    #[error("Selector key not found: {key} ({context})")]
    KeyNotFound { key: String, context: String },
    #[error("Selector is required: {0}")]
    Required(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorProfileFile {
    pub schema_version: i64,
    pub selectors: BTreeMap<String, ElementSelector>,
}

impl SelectorProfileFile {
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let json = std::fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ProfileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective selector map of one flow plus where it came from
#[derive(Debug, Clone, Default)]
pub struct LoadedProfile {
    pub selectors: BTreeMap<String, ElementSelector>,
    /// Every file that contributed, in load order
    pub loaded_files: Vec<PathBuf>,
    pub baseline_path: PathBuf,
    pub local_path: Option<PathBuf>,
}

impl LoadedProfile {
    /// The flow-local file when one was used, otherwise the flow baseline
    pub fn selectors_file(&self) -> &Path {
        self.local_path.as_deref().unwrap_or(&self.baseline_path)
    }

    pub fn get(&self, key: &str) -> Option<&ElementSelector> {
        self.selectors.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.selectors.contains_key(key)
    }
}

/// `autothink.importProgram.textPaste` -> `importProgram.textPaste`
pub fn flow_suffix(flow_name: &str) -> &str {
    flow_name
        .split_once('.')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(flow_name)
}

pub fn load_profile(
    root: &Path,
    profile: &str,
    flow_name: &str,
    pack_version: Option<&str>,
) -> Result<LoadedProfile, ProfileError> {
    let mut loaded = LoadedProfile::default();

    let (pack_base, pack_local, base_required) = match pack_version {
        Some(pack) => (
            root.join(format!("{profile}.{pack}.base.json")),
            root.join(format!("{profile}.{pack}.local.json")),
            true,
        ),
        None => (
            root.join(format!("{profile}.base.json")),
            root.join(format!("{profile}.base.local.json")),
            false,
        ),
    };

    if pack_base.is_file() {
        merge(&mut loaded, &pack_base, true)?;
    } else if base_required {
        return Err(ProfileError::BaseNotFound(pack_base));
    }
    if pack_local.is_file() {
        merge(&mut loaded, &pack_local, true)?;
    }

    let suffix = flow_suffix(flow_name);
    let baseline = root.join(format!("{profile}.{suffix}.json"));
    if !baseline.is_file() {
        return Err(ProfileError::NotFound(baseline));
    }
    merge(&mut loaded, &baseline, false)?;
    loaded.baseline_path = baseline;

    let local = root.join(format!("{profile}.{suffix}.local.json"));
    if local.is_file() {
        merge(&mut loaded, &local, true)?;
        loaded.local_path = Some(local);
    }

    debug!(
        "profile {} for {}: {} selectors from {} files",
        profile,
        flow_name,
        loaded.selectors.len(),
        loaded.loaded_files.len()
    );
    Ok(loaded)
}

fn merge(loaded: &mut LoadedProfile, path: &Path, overwrite: bool) -> Result<(), ProfileError> {
    let file = SelectorProfileFile::load(path)?;
    for (key, selector) in file.selectors {
        if overwrite || !loaded.selectors.contains_key(&key) {
            loaded.selectors.insert(key, selector);
        }
    }
    loaded.loaded_files.push(path.to_path_buf());
    Ok(())
}

fn non_empty(selector: Option<&ElementSelector>) -> Option<&ElementSelector> {
    selector.filter(|s| !s.is_empty())
}

fn non_blank(key: Option<&str>) -> Option<&str> {
    key.map(str::trim).filter(|k| !k.is_empty())
}

/// A non-empty inline selector wins, then the profile key.
pub fn resolve_selector(
    inline: Option<&ElementSelector>,
    key: Option<&str>,
    profile: &LoadedProfile,
    context: &str,
) -> Result<ElementSelector, SelectorResolveError> {
    resolve_selector_optional(inline, key, profile, context)?
        .ok_or_else(|| SelectorResolveError::Required(context.to_string()))
}

pub fn resolve_selector_optional(
    inline: Option<&ElementSelector>,
    key: Option<&str>,
    profile: &LoadedProfile,
    context: &str,
) -> Result<Option<ElementSelector>, SelectorResolveError> {
    if let Some(selector) = non_empty(inline) {
        return Ok(Some(selector.clone()));
    }
    let Some(key) = non_blank(key) else {
        return Ok(None);
    };
    profile
        .get(key)
        .cloned()
        .map(Some)
        .ok_or_else(|| SelectorResolveError::KeyNotFound {
            key: key.to_string(),
            context: context.to_string(),
        })
}

/// Inline selectors first, then one selector per key.
pub fn resolve_selector_list(
    inline: &[ElementSelector],
    keys: &[String],
    profile: &LoadedProfile,
    context: &str,
) -> Result<Vec<ElementSelector>, SelectorResolveError> {
    let mut selectors: Vec<ElementSelector> = inline.iter().filter(|s| !s.is_empty()).cloned().collect();
    for key in keys {
        if let Some(selector) = resolve_selector_optional(None, Some(key), profile, context)? {
            selectors.push(selector);
        }
    }
    Ok(selectors)
}

pub fn resolve_wait_condition(
    config: Option<&WaitConditionConfig>,
    profile: &LoadedProfile,
    context: &str,
) -> Result<Option<WaitCondition>, SelectorResolveError> {
    let Some(config) = config else {
        return Ok(None);
    };
    let selector = resolve_selector_optional(
        config.selector.as_ref(),
        config.selector_key.as_deref(),
        profile,
        context,
    )?;
    Ok(selector.map(|selector| WaitCondition::new(config.kind.unwrap_or_default(), selector)))
}

pub fn resolve_dialog_steps(
    steps: &[DialogStepConfig],
    profile: &LoadedProfile,
    context: &str,
) -> Result<Vec<DialogStep>, SelectorResolveError> {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let step_context = format!("{context}[{i}]");
            Ok(DialogStep {
                action: step.action.clone(),
                selector: resolve_selector_optional(
                    step.selector.as_ref(),
                    step.selector_key.as_deref(),
                    profile,
                    &step_context,
                )?,
                text: step.text.clone(),
                mode: step.mode.clone(),
                keys: step.keys.clone(),
                condition: resolve_wait_condition(step.condition.as_ref(), profile, &step_context)?,
                timeout_ms: step.timeout_ms,
            })
        })
        .collect()
}

/// Maps a selector back to the profile key it came from
#[derive(Debug, Default)]
pub struct SelectorKeyIndex {
    by_selector: HashMap<String, String>,
}

impl SelectorKeyIndex {
    pub fn from_profile(profile: &LoadedProfile) -> Self {
        let mut by_selector = HashMap::new();
        for (key, selector) in &profile.selectors {
            if let Ok(json) = serde_json::to_string(selector) {
                by_selector.entry(json).or_insert_with(|| key.clone());
            }
        }
        Self { by_selector }
    }

    pub fn key_for(&self, selector: &ElementSelector) -> Option<&str> {
        let json = serde_json::to_string(selector).ok()?;
        self.by_selector.get(&json).map(String::as_str)
    }
}
