//! Per-platform aggregation of failure observations into skip expressions.
//!
//! A [`FailureRecord`] tracks how many times each `(build_type,
//! test_variant)` permutation of one platform has failed, against the known
//! permutation universe for that platform. Querying it produces the
//! narrowest skip expression consistent with what has been observed: a
//! build-type-plus-variant condition while coverage is partial, a bare
//! build-type condition once every variant of that build type fails, and an
//! unconditional skip (the empty string) once the whole universe fails.
//!
//! An absent or empty universe disables the broad collapses entirely, so
//! missing universe data can never produce an overbroad skip.

use std::collections::{BTreeMap, BTreeSet};

/// Variant name used when an observation carries no variant flags.
pub const NO_VARIANT: &str = "no_variant";

/// The tunable constants of the high-frequency emission mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Thresholds {
    /// Total failures a build type must accumulate before any suggestion is
    /// made in high-frequency mode.
    pub high_freq_total: u32,
    /// Numerator of the dominant-variant ratio.
    pub dominant_num: u32,
    /// Denominator of the dominant-variant ratio.
    pub dominant_den: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_freq_total: 7,
            dominant_num: 3,
            dominant_den: 4,
        }
    }
}

/// The `build_type → test_variant` permutations expected to run on a
/// platform.
pub type PermutationUniverse = BTreeMap<String, BTreeSet<String>>;

/// Failure bookkeeping for a single platform.
#[derive(Clone, Debug, Default)]
pub struct FailureRecord {
    universe: PermutationUniverse,
    high_freq: bool,
    thresholds: Thresholds,
    failures: BTreeMap<String, BTreeMap<String, u32>>,
}

impl FailureRecord {
    pub fn new(universe: PermutationUniverse, high_freq: bool) -> Self {
        Self {
            universe,
            high_freq,
            thresholds: Thresholds::default(),
            failures: BTreeMap::new(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Record one failure of `(build_type, test_variant)`.
    pub fn observe_failure(&mut self, build_type: &str, test_variant: &str) {
        *self
            .failures
            .entry(build_type.to_string())
            .or_default()
            .entry(test_variant.to_string())
            .or_default() += 1;
        log::debug!(
            "{build_type}/{test_variant}: {} failure(s) recorded",
            self.failures[build_type][test_variant],
        );
    }

    /// Record `(build_type, test_variant)` and return the skip expression
    /// for the state reached.
    ///
    /// Returns `None` while high-frequency mode has not accumulated enough
    /// failures to say anything; otherwise a string joined by `and_str`
    /// (possibly empty, meaning "skip unconditionally").
    pub fn skip_expression(
        &mut self,
        and_str: &str,
        build_type: &str,
        test_variant: &str,
    ) -> Option<String> {
        self.observe_failure(build_type, test_variant);
        self.emission(and_str, build_type, test_variant)
    }

    /// What [`Self::skip_expression`] would return, without recording the
    /// observation.
    pub fn preview(&self, and_str: &str, build_type: &str, test_variant: &str) -> Option<String> {
        let mut scratch = self.clone();
        scratch.skip_expression(and_str, build_type, test_variant)
    }

    fn emission(&self, and_str: &str, build_type: &str, test_variant: &str) -> Option<String> {
        if self.high_freq {
            if self.is_full_high_freq_fail() {
                return Some(String::new());
            }
            let by_variant = self.failures.get(build_type)?;
            let total: u32 = by_variant.values().sum();
            if total < self.thresholds.high_freq_total {
                return None;
            }
            let (most_variant, most_failures) = by_variant
                .iter()
                .fold(None, |best: Option<(&String, u32)>, (variant, count)| {
                    match best {
                        Some((_, best_count)) if best_count >= *count => best,
                        _ => Some((variant, *count)),
                    }
                })?;
            let dominant =
                most_failures * self.thresholds.dominant_den >= total * self.thresholds.dominant_num;
            if dominant && !self.is_full_fail() {
                Some(format!(
                    "{and_str}{build_type}{}",
                    self.variant_condition(and_str, build_type, most_variant),
                ))
            } else if self.is_full_fail() {
                Some(String::new())
            } else {
                Some(format!("{and_str}{build_type}"))
            }
        } else {
            if self.is_full_fail() {
                return Some(String::new());
            }
            let mut out = format!("{and_str}{build_type}");
            if !self.is_full_test_variants_fail(build_type) {
                out.push_str(&self.variant_condition(and_str, build_type, test_variant));
            }
            Some(out)
        }
    }

    /// Whether every variant the universe expects for `build_type` has a
    /// recorded failure. An unknown (absent or empty) universe entry is
    /// never fully covered.
    pub fn is_full_test_variants_fail(&self, build_type: &str) -> bool {
        let Some(universe) = self.universe.get(build_type) else {
            return false;
        };
        if universe.is_empty() {
            return false;
        }
        let failed = self.failures.get(build_type);
        universe
            .iter()
            .all(|variant| failed.is_some_and(|counts| counts.contains_key(variant)))
    }

    /// Whether every `(build_type, test_variant)` pair in the universe has
    /// failed.
    pub fn is_full_fail(&self) -> bool {
        !self.universe.is_empty()
            && self
                .universe
                .keys()
                .all(|build_type| self.is_full_test_variants_fail(build_type))
    }

    /// Whether every known build type has accumulated enough failures for
    /// an unconditional high-frequency skip.
    pub fn is_full_high_freq_fail(&self) -> bool {
        !self.universe.is_empty()
            && self.universe.keys().all(|build_type| {
                self.failures
                    .get(build_type)
                    .map(|counts| counts.values().sum::<u32>())
                    .unwrap_or(0)
                    >= self.thresholds.high_freq_total
            })
    }

    /// The variant half of a narrow skip condition.
    ///
    /// For the no-variant sentinel this negates every flag the universe can
    /// turn on for `build_type`. For a composite variant it asserts the
    /// variant's own flags, then negates the extra flags of every universe
    /// variant that is a strict superset, so the emitted condition cannot
    /// swallow a more specific rule.
    fn variant_condition(&self, and_str: &str, build_type: &str, test_variant: &str) -> String {
        let universe = self.universe.get(build_type);
        let universe_variants = universe.into_iter().flatten();
        let mut out = String::new();
        if test_variant == NO_VARIANT {
            let flags: BTreeSet<&str> = universe_variants
                .filter(|variant| *variant != NO_VARIANT)
                .flat_map(|variant| variant.split('+'))
                .collect();
            for flag in flags {
                out.push_str(and_str);
                out.push('!');
                out.push_str(flag);
            }
        } else {
            let own: BTreeSet<&str> = test_variant.split('+').collect();
            for flag in test_variant.split('+') {
                out.push_str(and_str);
                out.push_str(flag);
            }
            let mut negations: BTreeSet<&str> = BTreeSet::new();
            for variant in universe_variants {
                if variant == NO_VARIANT {
                    continue;
                }
                let flags: BTreeSet<&str> = variant.split('+').collect();
                if flags.len() > own.len() && flags.is_superset(&own) {
                    negations.extend(flags.difference(&own));
                }
            }
            for flag in negations {
                out.push_str(and_str);
                out.push('!');
                out.push_str(flag);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_debug_snapshot;

    fn universe(entries: &[(&str, &[&str])]) -> PermutationUniverse {
        entries
            .iter()
            .map(|(build_type, variants)| {
                (
                    build_type.to_string(),
                    variants.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect()
    }

    fn opt_debug_universe() -> PermutationUniverse {
        universe(&[
            ("opt", &[NO_VARIANT, "swgl"]),
            ("debug", &[NO_VARIANT, "swgl"]),
        ])
    }

    #[test]
    fn standard_mode_narrows_then_collapses() {
        let mut record = FailureRecord::new(opt_debug_universe(), false);

        assert_debug_snapshot!(
            record.skip_expression(" && ", "opt", NO_VARIANT),
            @r###"
        Some(
            " && opt && !swgl",
        )
        "###
        );
        assert_eq!(
            record.skip_expression(" && ", "opt", "swgl").as_deref(),
            Some(" && opt"),
        );
        assert_eq!(
            record
                .skip_expression(" && ", "debug", NO_VARIANT)
                .as_deref(),
            Some(" && debug && !swgl"),
        );
        assert_eq!(
            record.skip_expression(" && ", "debug", "swgl").as_deref(),
            Some(""),
        );
    }

    #[test]
    fn full_coverage_collapses_to_unconditional_skip() {
        // Once every pair in the universe has been seen, the next call
        // answers with the empty string.
        let mut record = FailureRecord::new(opt_debug_universe(), false);
        for (build_type, variant) in [
            ("opt", NO_VARIANT),
            ("opt", "swgl"),
            ("debug", NO_VARIANT),
            ("debug", "swgl"),
        ] {
            record.observe_failure(build_type, variant);
        }
        assert!(record.is_full_fail());
        assert_eq!(
            record.skip_expression(" && ", "opt", NO_VARIANT).as_deref(),
            Some(""),
        );
    }

    #[test]
    fn empty_universe_never_goes_unconditional() {
        // With no universe information, neither mode may emit "".
        let mut standard = FailureRecord::new(PermutationUniverse::new(), false);
        let mut high_freq = FailureRecord::new(PermutationUniverse::new(), true);
        for round in 0..20 {
            let variant = if round % 2 == 0 { NO_VARIANT } else { "swgl" };
            if let Some(expr) = standard.skip_expression(" && ", "opt", variant) {
                assert!(!expr.is_empty(), "round {round}");
            }
            if let Some(expr) = high_freq.skip_expression(" && ", "opt", variant) {
                assert!(!expr.is_empty(), "round {round}");
            }
        }
    }

    #[test]
    fn high_freq_mode_waits_for_threshold() {
        let mut record = FailureRecord::new(opt_debug_universe(), true);
        for _ in 0..6 {
            assert_eq!(record.skip_expression(" && ", "opt", "swgl"), None);
        }
        // Seventh failure; swgl dominates at 7/7, and coverage is partial.
        assert_eq!(
            record.skip_expression(" && ", "opt", "swgl").as_deref(),
            Some(" && opt && swgl"),
        );
    }

    #[test]
    fn high_freq_mode_spreads_to_bare_build_type() {
        let mut record = FailureRecord::new(opt_debug_universe(), true);
        for _ in 0..4 {
            record.observe_failure("opt", "swgl");
        }
        for _ in 0..3 {
            record.observe_failure("opt", NO_VARIANT);
        }
        // 8 total after this call, best variant holds 5/8 < 3/4.
        assert_eq!(
            record.skip_expression(" && ", "opt", "swgl").as_deref(),
            Some(" && opt"),
        );
    }

    #[test]
    fn high_freq_full_coverage_is_unconditional() {
        let mut record = FailureRecord::new(universe(&[("opt", &[NO_VARIANT, "swgl"])]), true);
        for _ in 0..4 {
            record.observe_failure("opt", "swgl");
            record.observe_failure("opt", NO_VARIANT);
        }
        assert!(record.is_full_high_freq_fail());
        assert_eq!(
            record.skip_expression(" && ", "opt", "swgl").as_deref(),
            Some(""),
        );
    }

    #[test]
    fn composite_variants_negate_their_supersets() {
        let universe = universe(&[(
            "opt",
            &[NO_VARIANT, "a11y_checks", "a11y_checks+swgl"],
        )]);
        let mut record = FailureRecord::new(universe.clone(), false);
        assert_eq!(
            record
                .skip_expression(" && ", "opt", "a11y_checks")
                .as_deref(),
            Some(" && opt && a11y_checks && !swgl"),
        );

        // The composite variant itself has no strict superset to negate.
        let mut record = FailureRecord::new(universe.clone(), false);
        assert_eq!(
            record
                .skip_expression(" && ", "opt", "a11y_checks+swgl")
                .as_deref(),
            Some(" && opt && a11y_checks && swgl"),
        );

        // The no-variant sentinel negates every flag the universe can set.
        let mut record = FailureRecord::new(universe, false);
        assert_eq!(
            record
                .skip_expression(" && ", "opt", NO_VARIANT)
                .as_deref(),
            Some(" && opt && !a11y_checks && !swgl"),
        );
    }

    #[test]
    fn preview_does_not_record() {
        let mut record = FailureRecord::new(opt_debug_universe(), false);
        record.observe_failure("opt", NO_VARIANT);

        let previewed = record.preview(" && ", "opt", "swgl");
        assert_eq!(previewed.as_deref(), Some(" && opt"));
        // The preview must not have recorded (opt, swgl); recording it now
        // reproduces the previewed answer.
        assert!(!record.is_full_test_variants_fail("opt"));
        assert_eq!(record.skip_expression(" && ", "opt", "swgl"), previewed);
    }

    #[test]
    fn empty_universe_entry_is_treated_as_unknown() {
        let mut record = FailureRecord::new(universe(&[("opt", &[])]), false);
        record.observe_failure("opt", NO_VARIANT);
        assert!(!record.is_full_test_variants_fail("opt"));
        assert!(!record.is_full_fail());
        assert_eq!(
            record.skip_expression(" && ", "opt", NO_VARIANT).as_deref(),
            Some(" && opt"),
        );
    }
}
