//! Evidence pack: a self-checking copy of the canonical run artifacts.
//!
//! The pack lives in `{run_dir}/evidence_pack_v1/`. Every copied file gets a
//! SHA-256 digest in `evidence_summary.v1.json`; [`verify`] recomputes them
//! and cross-checks the selector report and build outcome.

use crate::reports::{BuildOutcomeReport, RunSummary, BUILD_OUTCOME_FILE, SUMMARY_FILE};
use crate::selector_check::{self, SelectorCheckReport};
use crate::{inputs, recovery};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uiaflow::{StepLog, StepLogEntry};

pub const PACK_DIR: &str = "evidence_pack_v1";
pub const PACK_VERSION: &str = "v1";
pub const EVIDENCE_SUMMARY_FILE: &str = "evidence_summary.v1.json";
pub const STEP_LOGS_FILE: &str = "step_logs.json";

const REQUIRED_FILES: [&str; 4] = [
    SUMMARY_FILE,
    selector_check::REPORT_FILE,
    STEP_LOGS_FILE,
    EVIDENCE_SUMMARY_FILE,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledFlow {
    pub name: String,
    pub log_file: String,
    pub step_log: Option<StepLog>,
}

/// Every flow's step log in one file, plus the runner's own steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogBundle {
    pub generated_at_utc: DateTime<Utc>,
    pub flows: Vec<BundledFlow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runner_steps: Vec<StepLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFlow {
    pub name: String,
    pub ok: bool,
    pub error_kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetrics {
    pub missing_keys_count: usize,
    pub build_outcome: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceSummary {
    pub pack_version: String,
    pub created_at_utc: DateTime<Utc>,
    pub run_dir: String,
    pub flows: Vec<EvidenceFlow>,
    /// File name -> lowercase hex SHA-256
    pub digests: BTreeMap<String, String>,
    pub key_metrics: KeyMetrics,
}

#[derive(Debug, Clone)]
pub struct EvidencePack {
    pub pack_dir: PathBuf,
    pub summary_path: PathBuf,
}

pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let json = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("unreadable evidence file {}: {e}", path.display());
            None
        }
    }
}

fn copy_into_pack(
    source: &Path,
    pack_dir: &Path,
    digests: &mut BTreeMap<String, String>,
    required: bool,
) -> std::io::Result<bool> {
    if !source.is_file() {
        if required {
            warn!("Evidence file missing: {}", source.display());
        }
        return Ok(false);
    }
    let Some(name) = source.file_name() else {
        return Ok(false);
    };
    let dest = pack_dir.join(name);
    std::fs::copy(source, &dest)?;
    digests.insert(name.to_string_lossy().into_owned(), sha256_file(&dest)?);
    Ok(true)
}

/// Writes `step_logs.json` into the run directory.
pub fn write_step_log_bundle(
    run_dir: &Path,
    summary: &RunSummary,
    runner_steps: &[StepLogEntry],
) -> std::io::Result<PathBuf> {
    let flows = summary
        .flows
        .iter()
        .map(|flow| {
            let log_file = flow.log_file.clone().unwrap_or_default();
            let step_log = if log_file.trim().is_empty() {
                None
            } else {
                read_json::<StepLog>(Path::new(&log_file))
            };
            BundledFlow {
                name: flow.name.clone(),
                log_file,
                step_log,
            }
        })
        .collect();
    let bundle = StepLogBundle {
        generated_at_utc: Utc::now(),
        flows,
        runner_steps: runner_steps.to_vec(),
    };
    let path = run_dir.join(STEP_LOGS_FILE);
    crate::reports::write_json(&path, &bundle)?;
    Ok(path)
}

/// Builds the pack from the artifacts already written to `run_dir`.
pub fn write_pack(
    run_dir: &Path,
    summary: &RunSummary,
    runner_steps: &[StepLogEntry],
) -> std::io::Result<EvidencePack> {
    let pack_dir = run_dir.join(PACK_DIR);
    std::fs::create_dir_all(&pack_dir)?;

    let mut digests = BTreeMap::new();
    copy_into_pack(&run_dir.join(SUMMARY_FILE), &pack_dir, &mut digests, true)?;
    copy_into_pack(&run_dir.join(selector_check::REPORT_FILE), &pack_dir, &mut digests, true)?;
    let bundle = write_step_log_bundle(run_dir, summary, runner_steps)?;
    copy_into_pack(&bundle, &pack_dir, &mut digests, true)?;
    for optional in [BUILD_OUTCOME_FILE, recovery::REPORT_FILE, inputs::REPORT_FILE] {
        copy_into_pack(&run_dir.join(optional), &pack_dir, &mut digests, false)?;
    }

    let missing_keys_count = read_json::<SelectorCheckReport>(&run_dir.join(selector_check::REPORT_FILE))
        .map(|report| report.missing_keys.len())
        .unwrap_or(0);

    let evidence = EvidenceSummary {
        pack_version: PACK_VERSION.to_string(),
        created_at_utc: Utc::now(),
        run_dir: run_dir.display().to_string(),
        flows: summary
            .flows
            .iter()
            .map(|flow| EvidenceFlow {
                name: flow.name.clone(),
                ok: flow.ok,
                error_kind: flow.error_kind.clone(),
            })
            .collect(),
        digests,
        key_metrics: KeyMetrics {
            missing_keys_count,
            build_outcome: summary
                .build
                .as_ref()
                .map(|b| b.outcome.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
        },
    };
    let summary_path = pack_dir.join(EVIDENCE_SUMMARY_FILE);
    crate::reports::write_json(&summary_path, &evidence)?;
    Ok(EvidencePack {
        pack_dir,
        summary_path,
    })
}

/// The pack could not be verified at all
#[derive(Error, Debug)]
pub enum VerifyInputError {
    #[error("Evidence summary not found: {0}")]
    SummaryNotFound(PathBuf),
    #[error("Failed to parse evidence_summary.v1.json: {0}")]
    Invalid(String),
}

/// Checks a pack directory; returns every problem found, empty when valid.
pub fn verify(pack_dir: &Path) -> Result<Vec<String>, VerifyInputError> {
    let summary_path = pack_dir.join(EVIDENCE_SUMMARY_FILE);
    if !summary_path.is_file() {
        return Err(VerifyInputError::SummaryNotFound(summary_path));
    }
    let json = std::fs::read_to_string(&summary_path).map_err(|e| VerifyInputError::Invalid(e.to_string()))?;
    let evidence: EvidenceSummary =
        serde_json::from_str(&json).map_err(|e| VerifyInputError::Invalid(e.to_string()))?;

    let mut errors = Vec::new();
    for required in REQUIRED_FILES {
        if !pack_dir.join(required).is_file() {
            errors.push(format!("Missing required file: {required}"));
        }
    }

    for (name, expected) in &evidence.digests {
        let path = pack_dir.join(name);
        if !path.is_file() {
            errors.push(format!("Digest file missing: {name}"));
            continue;
        }
        match sha256_file(&path) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => {}
            Ok(_) => errors.push(format!("Digest mismatch: {name}")),
            Err(e) => errors.push(format!("Digest file unreadable: {name} ({e})")),
        }
    }

    match read_json::<SelectorCheckReport>(&pack_dir.join(selector_check::REPORT_FILE)) {
        None => errors.push(format!("{} missing or invalid.", selector_check::REPORT_FILE)),
        Some(report) => {
            if !report.pack_version.eq_ignore_ascii_case(PACK_VERSION) {
                errors.push(format!(
                    "selector_check_report packVersion mismatch: {}",
                    report.pack_version
                ));
            }
            if !report.missing_keys.is_empty() {
                errors.push(format!(
                    "selector_check_report missingKeys not empty: {}",
                    report.missing_keys.len()
                ));
            }
        }
    }

    let run_summary = read_json::<RunSummary>(&pack_dir.join(SUMMARY_FILE));
    let summary_build = run_summary.as_ref().and_then(|s| s.build.as_ref());
    let outcome_path = pack_dir.join(BUILD_OUTCOME_FILE);
    if outcome_path.is_file() {
        match (read_json::<BuildOutcomeReport>(&outcome_path), summary_build) {
            (None, _) => errors.push("build_outcome.json invalid.".to_string()),
            (Some(_), None) => errors.push("build_outcome.json exists but summary.build is missing.".to_string()),
            (Some(file), Some(build)) if file.outcome != build.outcome => errors.push(format!(
                "build_outcome mismatch: summary={}, file={}",
                build.outcome, file.outcome
            )),
            _ => {}
        }
    } else if summary_build.is_some() {
        errors.push("summary.build exists but build_outcome.json is missing.".to_string());
    }

    Ok(errors)
}
