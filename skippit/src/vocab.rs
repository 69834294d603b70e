//! The fixed vocabulary shared by the condition algebra and the manifest
//! parser: which dimensions exist, which atoms they admit, and how the
//! reftest-JS identifier vocabulary maps onto the manifest-parser one.

/// Operating systems the manifests can constrain on.
pub const OS_ATOMS: &[&str] = &["win", "mac", "linux", "android"];

/// Address widths the manifests can constrain on.
pub const BITS_ATOMS: &[&str] = &["32", "64"];

/// Build types known to the aggregation pipeline. `build_type` is the primary
/// aggregation key, so it leads [`Registry::dimensions`].
pub const BUILD_TYPE_ATOMS: &[&str] = &[
    "opt",
    "debug",
    "asan",
    "tsan",
    "ccov",
    "mingwclang",
    "devedition",
    "isolated-process",
];

/// Variant flags declared by the vocabulary. Each is a two-valued dimension
/// of its own (`flag` / `!flag`).
pub const VARIANT_FLAGS: &[&str] = &["fission", "swgl", "e10s", "snapshot", "wayland"];

/// What a bare identifier in a condition denotes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AtomClass {
    /// Pins the `os` dimension to one value, e.g. `gtkWidget`.
    Os(&'static str),
    /// Pins the `bits` dimension to one value, e.g. `is64Bit`.
    Bits(&'static str),
    /// Pins the `build_type` dimension to one value, e.g. `isDebugBuild`.
    BuildType(&'static str),
    /// A two-valued flag. `known` distinguishes declared variant flags from
    /// identifiers merely passed through.
    Flag { name: String, known: bool },
}

/// Identifier rows of the reftest-JS → manifest-parser translation table.
///
/// Each entry is `(js identifier, manifest spelling, classification)`. The
/// table is total for the known identifiers; anything else passes through
/// [`Registry::translate`] unchanged.
const JS_IDENTIFIERS: &[(&str, &str, AtomClassTag)] = &[
    ("winWidget", "os == 'win'", AtomClassTag::Os("win")),
    ("cocoaWidget", "os == 'mac'", AtomClassTag::Os("mac")),
    ("gtkWidget", "os == 'linux'", AtomClassTag::Os("linux")),
    ("Android", "os == 'android'", AtomClassTag::Os("android")),
    ("is64Bit", "bits == 64", AtomClassTag::Bits("64")),
    ("isDebugBuild", "debug", AtomClassTag::BuildType("debug")),
    ("AddressSanitizer", "asan", AtomClassTag::BuildType("asan")),
    ("ThreadSanitizer", "tsan", AtomClassTag::BuildType("tsan")),
    ("isCoverageBuild", "ccov", AtomClassTag::BuildType("ccov")),
    ("useDrawSnapshot", "snapshot", AtomClassTag::Flag("snapshot")),
    ("wayland", "wayland", AtomClassTag::Flag("wayland")),
];

/// Borrowed sibling of [`AtomClass`] usable in a `const` table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AtomClassTag {
    Os(&'static str),
    Bits(&'static str),
    BuildType(&'static str),
    Flag(&'static str),
}

/// The dimension registry: a read-only description of the condition
/// vocabulary.
///
/// The registry is deliberately value-less; all tables are static. It exists
/// as a struct so translation behavior stays swappable at the seams where the
/// algebra and the manifest parser consume it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Registry;

impl Registry {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate the dimensions in stable order: `build_type` first (the
    /// aggregation key), `test_variant` last.
    pub fn dimensions(&self) -> impl Iterator<Item = (&'static str, &'static [&'static str])> {
        [
            ("build_type", BUILD_TYPE_ATOMS),
            ("os", OS_ATOMS),
            ("bits", BITS_ATOMS),
            ("test_variant", VARIANT_FLAGS),
        ]
        .into_iter()
    }

    /// Whether `atom` names a declared variant flag.
    pub fn is_variant(&self, atom: &str) -> bool {
        VARIANT_FLAGS.contains(&atom)
    }

    /// Translate a reftest-JS style condition into the manifest-parser
    /// vocabulary.
    ///
    /// Translation is token-level: identifiers are looked up whole, so
    /// identifier fragments can never match. It never fails; unknown
    /// identifiers and unexpected characters pass through verbatim.
    pub fn translate(&self, expr: &str) -> String {
        let mut out = String::new();
        let mut rest = expr;
        while let Some(c) = rest.chars().next() {
            if c.is_whitespace() {
                rest = &rest[c.len_utf8()..];
            } else if c == '!' && !rest.starts_with("!=") {
                rest = &rest[1..];
                let (ident, after) = split_ident(rest);
                if ident.is_empty() {
                    out.push('!');
                } else {
                    out.push_str(&translate_negated_ident(ident));
                    rest = after;
                }
            } else if c.is_ascii_alphabetic() || c == '_' {
                let (ident, after) = split_ident(rest);
                out.push_str(translate_ident(ident));
                rest = after;
            } else if let Some(after) = rest.strip_prefix("&&") {
                out.push_str(" && ");
                rest = after;
            } else if let Some(after) = rest.strip_prefix("||") {
                out.push_str(" || ");
                rest = after;
            } else if let Some(after) = rest.strip_prefix("==") {
                out.push_str(" == ");
                rest = after;
            } else if let Some(after) = rest.strip_prefix("!=") {
                out.push_str(" != ");
                rest = after;
            } else if c == '\'' || c == '"' {
                let (quoted, after) = split_quoted(rest, c);
                out.push_str(quoted);
                rest = after;
            } else {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        out
    }

    /// Classify a bare identifier for the algebra's lowering pass.
    pub(crate) fn classify_ident(&self, ident: &str) -> AtomClass {
        for (js, _manifest, tag) in JS_IDENTIFIERS {
            if *js == ident {
                return match tag {
                    AtomClassTag::Os(v) => AtomClass::Os(v),
                    AtomClassTag::Bits(v) => AtomClass::Bits(v),
                    AtomClassTag::BuildType(v) => AtomClass::BuildType(v),
                    AtomClassTag::Flag(name) => AtomClass::Flag {
                        name: name.to_string(),
                        known: true,
                    },
                };
            }
        }
        if let Some(v) = BUILD_TYPE_ATOMS.iter().find(|v| **v == ident) {
            return AtomClass::BuildType(v);
        }
        AtomClass::Flag {
            name: ident.to_string(),
            known: self.is_variant(ident),
        }
    }

    /// The reftest-JS spelling of an `os` atom, used when the algebra widens
    /// an `os` constraint that was written in the JS vocabulary.
    pub(crate) fn os_js_spelling(&self, value: &str) -> Option<&'static str> {
        JS_IDENTIFIERS.iter().find_map(|(js, _, tag)| match tag {
            AtomClassTag::Os(v) if *v == value => Some(*js),
            _ => None,
        })
    }
}

fn split_ident(input: &str) -> (&str, &str) {
    let end = input
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(input.len());
    input.split_at(end)
}

fn split_quoted(input: &str, quote: char) -> (&str, &str) {
    debug_assert!(input.starts_with(quote));
    match input[1..].find(quote) {
        Some(p) => input.split_at(p + 2),
        None => (input, ""),
    }
}

fn translate_ident(ident: &str) -> &str {
    JS_IDENTIFIERS
        .iter()
        .find_map(|(js, manifest, _)| (*js == ident).then_some(*manifest))
        .unwrap_or(ident)
}

fn translate_negated_ident(ident: &str) -> String {
    for (js, manifest, tag) in JS_IDENTIFIERS {
        if *js != ident {
            continue;
        }
        return match tag {
            // Comparison-valued targets flip the operator rather than
            // acquiring a leading `!`.
            AtomClassTag::Os(_) | AtomClassTag::Bits(_) => manifest.replace(" == ", " != "),
            AtomClassTag::BuildType(_) | AtomClassTag::Flag(_) => format!("!{manifest}"),
        };
    }
    format!("!{ident}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_known_identifiers() {
        let registry = Registry::new();
        assert_eq!(registry.translate("gtkWidget"), "os == 'linux'");
        assert_eq!(
            registry.translate("gtkWidget&&!fission"),
            "os == 'linux' && !fission"
        );
        assert_eq!(
            registry.translate("winWidget||Android"),
            "os == 'win' || os == 'android'"
        );
        assert_eq!(registry.translate("!is64Bit"), "bits != 64");
        assert_eq!(registry.translate("!isDebugBuild"), "!debug");
        assert_eq!(
            registry.translate("cocoaWidget&&useDrawSnapshot"),
            "os == 'mac' && snapshot"
        );
        assert_eq!(
            registry.translate("AddressSanitizer&&ThreadSanitizer"),
            "asan && tsan"
        );
        assert_eq!(registry.translate("isCoverageBuild"), "ccov");
    }

    #[test]
    fn translate_passes_unknowns_through() {
        let registry = Registry::new();
        assert_eq!(registry.translate("webrender"), "webrender");
        assert_eq!(
            registry.translate("webrender&&gtkWidget"),
            "webrender && os == 'linux'"
        );
        assert_eq!(registry.translate("!webrender"), "!webrender");
        // Identifier fragments must not match: `gtkWidgetX` is its own token.
        assert_eq!(registry.translate("gtkWidgetX"), "gtkWidgetX");
        assert_eq!(
            registry.translate("(gtkWidget||wayland)&&swgl"),
            "(os == 'linux' || wayland) && swgl"
        );
    }

    #[test]
    fn translate_preserves_quoted_text() {
        let registry = Registry::new();
        assert_eq!(
            registry.translate("os == 'gtkWidget'"),
            "os == 'gtkWidget'"
        );
        assert_eq!(registry.translate("env == \"wayland\""), "env == \"wayland\"");
    }

    #[test]
    fn dimension_order_is_stable() {
        let registry = Registry::new();
        let names: Vec<_> = registry.dimensions().map(|(name, _)| name).collect();
        assert_eq!(names, ["build_type", "os", "bits", "test_variant"]);
        let (first, atoms) = registry.dimensions().next().unwrap();
        assert_eq!(first, "build_type");
        assert!(atoms.contains(&"opt"));
    }

    #[test]
    fn variant_classification() {
        let registry = Registry::new();
        assert!(registry.is_variant("swgl"));
        assert!(registry.is_variant("fission"));
        assert!(!registry.is_variant("asan"));
        assert!(!registry.is_variant("os"));
        assert!(!registry.is_variant("a11y_checks"));
    }
}
