mod aggregate;
mod report;

use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use indexmap::IndexMap;
use itertools::Itertools;
use joinery::JoinableIterator;
use lazy_format::lazy_format;
use miette::IntoDiagnostic;
use skippit::{
    manifest::{FsSource, ManifestParser},
    vocab::Registry,
};
use strum::{EnumIter, IntoEnumIterator};

use crate::{
    aggregate::{FailureRecord, Thresholds},
    report::{FailureObservation, FailureReport},
};

/// Tools for maintaining skip conditions in Firefox reftest manifests.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Cli {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, Parser)]
enum Subcommand {
    /// Parse the given manifests and report syntax errors.
    Lint {
        #[clap(required = true)]
        manifests: Vec<Utf8PathBuf>,
    },
    /// Parse a manifest tree and dump the resolved state as JSON.
    ///
    /// No guarantees are made about the schema of this JSON, for now.
    DumpJson { manifest: Utf8PathBuf },
    /// Read a failure report and print suggested `skip-if` conditions.
    ///
    /// Observations are replayed per test in report order; each test's
    /// final aggregation state decides the suggestion. An aggregation that
    /// covers a platform's whole permutation universe suggests skipping
    /// the platform outright.
    SuggestSkips {
        /// Path to the failure-report JSON.
        #[clap(long)]
        report: Utf8PathBuf,
        /// Only suggest once a build type accumulates repeated failures.
        #[clap(long)]
        high_freq: bool,
        /// Total failures a build type needs in high-frequency mode.
        #[clap(long, default_value_t = Thresholds::default().high_freq_total)]
        high_freq_total: u32,
    },
}

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    run(Cli::parse())
}

/// An error that already has been reported to the user via the CLI; exists
/// so control flow can unwind without printing twice.
struct AlreadyReportedToCommandline;

fn run(cli: Cli) -> ExitCode {
    let Cli { subcommand } = cli;
    let res = match subcommand {
        Subcommand::Lint { manifests } => lint(&manifests),
        Subcommand::DumpJson { manifest } => dump_json(&manifest),
        Subcommand::SuggestSkips {
            report,
            high_freq,
            high_freq_total,
        } => suggest_skips(
            &report,
            high_freq,
            Thresholds {
                high_freq_total,
                ..Default::default()
            },
        ),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(AlreadyReportedToCommandline) => ExitCode::FAILURE,
    }
}

fn lint(manifests: &[Utf8PathBuf]) -> Result<(), AlreadyReportedToCommandline> {
    let registry = Registry::new();
    let source = FsSource;
    let parser = ManifestParser::new(&registry, &source);
    let mut failed: Vec<&Utf8PathBuf> = Vec::new();
    for path in manifests {
        match parser.parse(path).into_diagnostic() {
            Ok(state) => log::info!(
                "{path}: {} test(s) across {} manifest(s)",
                state.tests.len(),
                state.manifests.len(),
            ),
            Err(err) => {
                eprintln!("{err:?}");
                failed.push(path);
            }
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        log::error!("failed to parse {}", failed.iter().join_with(", "));
        Err(AlreadyReportedToCommandline)
    }
}

fn dump_json(manifest: &Utf8Path) -> Result<(), AlreadyReportedToCommandline> {
    let registry = Registry::new();
    let source = FsSource;
    let state = ManifestParser::new(&registry, &source)
        .parse(manifest)
        .into_diagnostic()
        .map_err(|err| {
            eprintln!("{err:?}");
            AlreadyReportedToCommandline
        })?;
    let json = serde_json::to_string_pretty(&state)
        .into_diagnostic()
        .map_err(|err| {
            eprintln!("{err:?}");
            AlreadyReportedToCommandline
        })?;
    println!("{json}");
    Ok(())
}

fn suggest_skips(
    report_path: &Utf8Path,
    high_freq: bool,
    thresholds: Thresholds,
) -> Result<(), AlreadyReportedToCommandline> {
    let report = report::load(report_path).into_diagnostic().map_err(|err| {
        eprintln!("{err:?}");
        AlreadyReportedToCommandline
    })?;

    for platform in platform_order(&report) {
        let platform_report = &report.platforms[platform];
        let mut by_test: IndexMap<&str, Vec<&FailureObservation>> = IndexMap::new();
        for observation in &platform_report.failures {
            by_test
                .entry(observation.test.as_str())
                .or_default()
                .push(observation);
        }
        for (test, observations) in &by_test {
            let mut record = FailureRecord::new(platform_report.permutations.clone(), high_freq)
                .with_thresholds(thresholds);
            let mut last = None;
            for observation in observations {
                last = record.skip_expression(
                    " && ",
                    &observation.build_type,
                    &observation.test_variant,
                );
            }
            match last {
                None => log::info!("{platform}: {test}: not enough failures to suggest a skip"),
                Some(condition) => {
                    let os_atom = lazy_format!("os == '{platform}'");
                    println!("{test}: skip-if({os_atom}{condition})");
                }
            }
        }
    }
    Ok(())
}

/// Report platforms in canonical order (win, mac, linux, android), then
/// anything else the report mentions, sorted.
fn platform_order(report: &FailureReport) -> Vec<&str> {
    Platform::iter()
        .map(|platform| platform.key())
        .filter(|key| report.platforms.contains_key(*key))
        .chain(
            report
                .platforms
                .keys()
                .map(String::as_str)
                .filter(|key| Platform::iter().all(|platform| platform.key() != *key))
                .sorted(),
        )
        .collect()
}

#[derive(Clone, Copy, Debug, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
}

impl Platform {
    fn key(self) -> &'static str {
        match self {
            Self::Windows => "win",
            Self::MacOs => "mac",
            Self::Linux => "linux",
            Self::Android => "android",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_debug_snapshot;

    #[test]
    fn platform_ordering() {
        let report: FailureReport = serde_json::from_str(
            r#"{
                "platforms": {
                    "zos": {},
                    "linux": {},
                    "win": {},
                    "beos": {}
                }
            }"#,
        )
        .unwrap();
        assert_debug_snapshot!(platform_order(&report), @r###"
        [
            "win",
            "linux",
            "beos",
            "zos",
        ]
        "###);
    }
}
