//! Parsing of reftest manifest files.
//!
//! A manifest is UTF-8 text with one directive per line: `defaults`,
//! `url-prefix`, `include`, and the test entry forms (`load`, `script`,
//! `==`, `!=`, `print`), each optionally preceded by annotation tokens
//! (`skip-if(...)`, `fuzzy-if(...)`, `pref(...)`, …). Parsing resolves
//! `include` recursively, inheriting `skip-if` conditions down the tree,
//! and translates annotation conditions into the manifest-parser
//! vocabulary via [`Registry::translate`].

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use thiserror::Error;

use crate::vocab::Registry;

/// Annotation prefixes describing how a test is expected to behave.
const FAILURE_TYPES: &[&str] = &[
    "fails",
    "fails-if",
    "needs-focus",
    "random",
    "random-if",
    "silentfail",
    "silentfail-if",
    "skip",
    "skip-if",
    "slow",
    "slow-if",
    "fuzzy",
    "fuzzy-if",
    "require-or",
    "asserts",
    "asserts-if",
];

/// Annotation prefixes carrying preference settings.
const PREF_TYPES: &[&str] = &["pref", "test-pref", "ref-pref"];

/// How the parser reads manifest text. Injected so parsing can run against
/// an in-memory snapshot in tests.
pub trait ManifestSource {
    fn read(&self, path: &Utf8Path) -> io::Result<String>;
}

/// Reads manifests from the real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSource;

impl ManifestSource for FsSource {
    fn read(&self, path: &Utf8Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// An in-memory manifest snapshot keyed by path.
#[derive(Clone, Debug, Default)]
pub struct MemorySource(pub BTreeMap<Utf8PathBuf, String>);

impl ManifestSource for MemorySource {
    fn read(&self, path: &Utf8Path) -> io::Result<String> {
        let Self(files) = self;
        files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no manifest at {path}"))
        })
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Syntax(#[from] ManifestSyntaxError),
    #[error("failed to read manifest {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A malformed manifest line. Parsing a manifest stops at the first one.
#[derive(Debug, Error)]
#[error("{path}:{line}: unexpected token `{token}`: {reason}")]
pub struct ManifestSyntaxError {
    pub path: Utf8PathBuf,
    pub line: usize,
    pub token: String,
    pub reason: &'static str,
}

/// A single test produced by parsing.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize))]
pub struct ManifestEntry {
    pub path: Utf8PathBuf,
    pub here: Utf8PathBuf,
    pub manifest: Utf8PathBuf,
    pub name: String,
    /// For the second half of a reference pair, the first half.
    #[cfg_attr(
        feature = "serde1",
        serde(rename = "referenced-test", skip_serializing_if = "Option::is_none")
    )]
    pub referenced_test: Option<Utf8PathBuf>,
    pub head: String,
    #[cfg_attr(feature = "serde1", serde(rename = "support-files"))]
    pub support_files: String,
    pub subsuite: String,
    /// Annotation kind → condition text. Repeated kinds accumulate
    /// newline-joined, matching the downstream manifest-parser format.
    pub annotations: IndexMap<String, String>,
}

/// Everything accumulated while parsing a manifest tree.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize))]
pub struct ManifestState {
    pub path: Utf8PathBuf,
    pub dirs: BTreeSet<Utf8PathBuf>,
    pub files: BTreeSet<Utf8PathBuf>,
    pub manifests: BTreeSet<Utf8PathBuf>,
    pub tests: Vec<ManifestEntry>,
}

/// The reftest manifest parser.
pub struct ManifestParser<'a, S> {
    registry: &'a Registry,
    source: &'a S,
}

impl<'a, S> ManifestParser<'a, S>
where
    S: ManifestSource,
{
    pub fn new(registry: &'a Registry, source: &'a S) -> Self {
        Self { registry, source }
    }

    /// Parse the manifest tree rooted at `root`.
    pub fn parse(&self, root: &Utf8Path) -> Result<ManifestState, ManifestError> {
        let mut state = ManifestState {
            path: root.to_owned(),
            ..Default::default()
        };
        self.parse_file(root, "", &mut state)?;
        Ok(state)
    }

    fn parse_file(
        &self,
        path: &Utf8Path,
        parent_skip_if: &str,
        state: &mut ManifestState,
    ) -> Result<(), ManifestError> {
        let text = self
            .source
            .read(path)
            .map_err(|source| ManifestError::Read {
                path: path.to_owned(),
                source,
            })?;
        let here = path
            .parent()
            .map(Utf8Path::to_owned)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        state.manifests.insert(path.to_owned());
        state.dirs.insert(here.clone());

        let mut defaults: Vec<String> = Vec::new();
        let mut url_prefix = String::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let tokens: Vec<&str> = strip_comment(raw).split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens[0] == "defaults" {
                defaults = tokens[1..].iter().map(|t| t.to_string()).collect();
                continue;
            }

            let effective: Vec<&str> = defaults
                .iter()
                .map(String::as_str)
                .chain(tokens.iter().copied())
                .collect();
            let syntax = |token: &str, reason| ManifestSyntaxError {
                path: path.to_owned(),
                line: line_no,
                token: token.to_string(),
                reason,
            };

            let mut annotations: Vec<(String, String)> = Vec::new();
            let mut idx = 0;
            while let Some(annotation) = effective
                .get(idx)
                .and_then(|token| parse_annotation(self.registry, token))
            {
                annotations.push(annotation);
                idx += 1;
            }

            let Some(&first) = effective.get(idx) else {
                let token = effective.last().copied().unwrap_or_default();
                return Err(syntax(token, "expected a directive after annotations").into());
            };
            if idx < defaults.len() {
                return Err(syntax(first, "not a valid token for defaults").into());
            }

            // HTTP tokens are modifiers; the entry kind follows them.
            let mut kind = first;
            loop {
                if kind == "HTTP" {
                    idx += 1;
                } else if let Some(rel) = kind
                    .strip_prefix("HTTP(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    state.dirs.insert(normalize_path(&here, rel));
                    idx += 1;
                } else {
                    break;
                }
                kind = match effective.get(idx) {
                    Some(&token) => token,
                    None => return Err(syntax(kind, "truncated entry after HTTP").into()),
                };
            }

            match kind {
                "url-prefix" => {
                    url_prefix = effective
                        .get(idx + 1)
                        .copied()
                        .ok_or_else(|| syntax(kind, "url-prefix requires a value"))?
                        .to_string();
                }
                "include" => {
                    let target = effective
                        .get(idx + 1)
                        .copied()
                        .ok_or_else(|| syntax(kind, "include requires a path"))?;
                    let mut inherited: Vec<&str> = Vec::new();
                    if !parent_skip_if.is_empty() {
                        inherited.push(parent_skip_if);
                    }
                    inherited.extend(
                        annotations
                            .iter()
                            .filter(|(key, _)| key == "skip-if")
                            .map(|(_, value)| value.as_str()),
                    );
                    let inherited = inherited.join("\n");
                    self.parse_file(&normalize_path(&here, target), &inherited, state)?;
                }
                "load" | "script" => {
                    let file = effective
                        .get(idx + 1)
                        .copied()
                        .ok_or_else(|| syntax(kind, "expected a file to run"))?;
                    self.add_test(
                        state,
                        path,
                        &here,
                        &url_prefix,
                        file,
                        &annotations,
                        None,
                        parent_skip_if,
                    );
                }
                "==" | "!=" | "print" => {
                    let test = effective
                        .get(idx + 1)
                        .copied()
                        .ok_or_else(|| syntax(kind, "expected a test and a reference"))?;
                    let reference = effective
                        .get(idx + 2)
                        .copied()
                        .ok_or_else(|| syntax(test, "expected a reference"))?;
                    let test_path = self.add_test(
                        state,
                        path,
                        &here,
                        &url_prefix,
                        test,
                        &annotations,
                        None,
                        parent_skip_if,
                    );
                    self.add_test(
                        state,
                        path,
                        &here,
                        &url_prefix,
                        reference,
                        &annotations,
                        Some(&test_path),
                        parent_skip_if,
                    );
                }
                other => return Err(syntax(other, "unrecognized directive").into()),
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_test(
        &self,
        state: &mut ManifestState,
        manifest: &Utf8Path,
        here: &Utf8Path,
        url_prefix: &str,
        file: &str,
        annotations: &[(String, String)],
        referenced_test: Option<&Utf8Path>,
        parent_skip_if: &str,
    ) -> Utf8PathBuf {
        let named = if url_prefix.is_empty() {
            file.to_string()
        } else {
            format!("{url_prefix}{file}")
        };
        let path = normalize_path(here, &named);
        if state.files.contains(&path) {
            log::warn!("{manifest}: duplicate entry for {path}, dropping");
            return path;
        }
        state.files.insert(path.clone());

        let mut entry = ManifestEntry {
            path: path.clone(),
            here: here.to_owned(),
            manifest: manifest.to_owned(),
            name: path.file_name().unwrap_or(file).to_string(),
            referenced_test: referenced_test.map(Utf8Path::to_owned),
            head: String::new(),
            support_files: String::new(),
            subsuite: String::new(),
            annotations: IndexMap::new(),
        };
        if !parent_skip_if.is_empty() {
            entry
                .annotations
                .insert("skip-if".to_string(), parent_skip_if.to_string());
        }
        for (key, value) in annotations {
            match entry.annotations.entry(key.clone()) {
                indexmap::map::Entry::Occupied(mut occupied) => {
                    let joined = occupied.get_mut();
                    joined.push('\n');
                    joined.push_str(value);
                }
                indexmap::map::Entry::Vacant(vacant) => {
                    vacant.insert(value.clone());
                }
            }
        }
        state.tests.push(entry);
        path
    }
}

/// Recognize one annotation token, returning its kind and (translated)
/// condition text.
fn parse_annotation(registry: &Registry, token: &str) -> Option<(String, String)> {
    let (name, arg) = match token.find('(') {
        Some(open) if token.ends_with(')') => {
            (&token[..open], Some(&token[open + 1..token.len() - 1]))
        }
        Some(_) => return None,
        None => (token, None),
    };
    if !FAILURE_TYPES.contains(&name) && !PREF_TYPES.contains(&name) {
        return None;
    }
    Some(match (name, arg) {
        // A bare `skip` means "always skip".
        ("skip", None) => ("skip-if".to_string(), "true".to_string()),
        ("skip", Some(cond)) => ("skip-if".to_string(), registry.translate(cond)),
        (_, None) => (name.to_string(), String::new()),
        ("fuzzy-if" | "asserts-if" | "require-or", Some(arg)) => {
            // The condition is the first comma-separated field; the rest
            // (fuzz ranges, assertion counts, fallbacks) passes through.
            let value = match arg.split_once(',') {
                Some((cond, rest)) => format!("{},{rest}", registry.translate(cond)),
                None => registry.translate(arg),
            };
            (name.to_string(), value)
        }
        (_, Some(arg)) if name.ends_with("-if") => (name.to_string(), registry.translate(arg)),
        (_, Some(arg)) => (name.to_string(), arg.to_string()),
    })
}

/// Truncate `line` at an inline comment: `#` at the start of the line or
/// preceded by whitespace.
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    let bytes = line.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        if *byte == b'#' && i > 0 && bytes[i - 1].is_ascii_whitespace() {
            return &line[..i];
        }
    }
    line
}

/// Resolve `rel` against `base` textually, folding `.` and `..` components.
/// No filesystem access happens here.
fn normalize_path(base: &Utf8Path, rel: &str) -> Utf8PathBuf {
    use camino::Utf8Component;

    let joined = base.join(rel);
    let mut out = Utf8PathBuf::new();
    for component in joined.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                let poppable = matches!(
                    out.components().next_back(),
                    Some(Utf8Component::Normal(_))
                );
                if poppable {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_str()),
        }
    }
    out
}
