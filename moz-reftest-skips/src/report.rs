//! The failure-report JSON consumed by `suggest-skips`.
//!
//! The report carries, per platform, the permutation universe CI schedules
//! there and an ordered stream of failure observations. Observations keep
//! their report order so aggregation sees them the way CI produced them.

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

use crate::aggregate::{PermutationUniverse, NO_VARIANT};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read report {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse report {path}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FailureReport {
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformReport>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlatformReport {
    /// `build_type → test_variant` permutations CI runs on this platform.
    /// Absent permutations disable the full-coverage collapses.
    #[serde(default)]
    pub permutations: PermutationUniverse,
    #[serde(default)]
    pub failures: Vec<FailureObservation>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FailureObservation {
    pub test: String,
    pub build_type: String,
    #[serde(default = "no_variant")]
    pub test_variant: String,
}

fn no_variant() -> String {
    NO_VARIANT.to_string()
}

pub fn load(path: &Utf8Path) -> Result<FailureReport, ReportError> {
    let text = fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ReportError::Parse {
        path: path.to_owned(),
        source,
    })
}
