//! The condition algebra: parsing, canonicalization, coverage, and merging of
//! boolean conditions over the dimension atoms declared in [`crate::vocab`].
//!
//! Conditions are held in disjunctive normal form. Each conjunction maps
//! dimensions to value sets; a contradictory conjunction is unsatisfiable and
//! dropped, and a disjunction whose branches enumerate every legal value of a
//! dimension collapses along that dimension.

pub(crate) mod expr;

pub use self::expr::{Expr, Literal, Value};

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
};

use chumsky::{
    extra::Full, prelude::Rich, primitive::end, span::SimpleSpan, text::inline_whitespace, Parser,
};
use lazy_format::make_lazy_format;
use thiserror::Error;

use crate::vocab::{AtomClass, Registry, BITS_ATOMS, BUILD_TYPE_ATOMS, OS_ATOMS};

/// An error emitted by the parsers in [`expr`] and [`Algebra::parse`].
pub type ParseError<'a> = Full<Rich<'a, char>, (), ()>;

const FLAG_ATOMS: &[&str] = &["true", "false"];

/// Error raised when a condition string fails to parse or lower.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("condition parse error at offset {offset}: {message}")]
pub struct ConditionParseError {
    pub offset: usize,
    pub message: String,
}

/// A single axis a condition can constrain. Ordered the way
/// [`Registry::dimensions`] enumerates: `build_type` leads, variant flags
/// trail.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum DimKey {
    BuildType,
    Os,
    Bits,
    /// A two-valued flag dimension, declared or passed through.
    Flag(String),
    /// A comparison against a variable the registry does not know. Its value
    /// space is open, so it never collapses.
    Var(String),
}

/// The value set a conjunction admits on one dimension.
///
/// Closed dimensions always normalize to `In`; `NotIn` only appears for open
/// [`DimKey::Var`] dimensions, where the complement cannot be enumerated.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Constraint {
    In(BTreeSet<String>),
    NotIn(BTreeSet<String>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Atom {
    dim: DimKey,
    constraint: Constraint,
    spelling: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct Conj {
    atoms: Vec<Atom>,
}

impl Conj {
    fn constraint_map(&self) -> BTreeMap<DimKey, Constraint> {
        self.atoms
            .iter()
            .map(|atom| (atom.dim.clone(), atom.constraint.clone()))
            .collect()
    }

    fn atom_for(&self, dim: &DimKey) -> Option<&Atom> {
        self.atoms.iter().find(|atom| &atom.dim == dim)
    }

    fn without_dim(&self, dim: &DimKey) -> Conj {
        Conj {
            atoms: self
                .atoms
                .iter()
                .filter(|atom| &atom.dim != dim)
                .cloned()
                .collect(),
        }
    }
}

/// A parsed, canonicalized condition.
///
/// Atom spellings and their order are preserved from the source text, so a
/// condition written in the reftest-JS vocabulary serializes back in that
/// vocabulary and one written for the manifest parser stays in its
/// vocabulary. Equality is semantic: two conditions are equal when their
/// per-dimension constraints are, regardless of spelling.
#[derive(Clone, Debug)]
pub struct Cond {
    conjs: Vec<Conj>,
    spaced: bool,
}

impl Cond {
    fn canonical(&self) -> Vec<BTreeMap<DimKey, Constraint>> {
        let mut canon: Vec<_> = self
            .conjs
            .iter()
            .map(|conj| {
                conj.constraint_map()
                    .into_iter()
                    .filter(|(dim, constraint)| !is_full_constraint(dim, constraint))
                    .collect::<BTreeMap<_, _>>()
            })
            .collect();
        canon.sort();
        canon
    }

    /// Render this condition back to text. Equivalent to `to_string`.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Cond {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Cond {}

impl Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { conjs, spaced } = self;
        if conjs.is_empty() {
            return write!(f, "false");
        }
        let or_join = if *spaced { " || " } else { "||" };
        let and_join = if *spaced { " && " } else { "&&" };
        for (i, conj) in conjs.iter().enumerate() {
            if i > 0 {
                write!(f, "{or_join}")?;
            }
            if conj.atoms.is_empty() {
                write!(f, "true")?;
            } else {
                let rendered = make_lazy_format!(|f| {
                    for (j, atom) in conj.atoms.iter().enumerate() {
                        if j > 0 {
                            write!(f, "{and_join}")?;
                        }
                        write!(f, "{}", atom.spelling)?;
                    }
                    Ok(())
                });
                write!(f, "{rendered}")?;
            }
        }
        Ok(())
    }
}

/// How an atom was spelled, used when the algebra has to synthesize a new
/// spelling for a widened constraint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Style {
    Ident,
    Cmp,
}

fn style_of(spelling: &str) -> Style {
    if spelling.contains("==") || spelling.contains("!=") {
        Style::Cmp
    } else {
        Style::Ident
    }
}

fn legal_atoms(dim: &DimKey) -> Option<&'static [&'static str]> {
    match dim {
        DimKey::BuildType => Some(BUILD_TYPE_ATOMS),
        DimKey::Os => Some(OS_ATOMS),
        DimKey::Bits => Some(BITS_ATOMS),
        DimKey::Flag(_) => Some(FLAG_ATOMS),
        DimKey::Var(_) => None,
    }
}

fn is_full_constraint(dim: &DimKey, constraint: &Constraint) -> bool {
    match constraint {
        Constraint::In(set) => legal_atoms(dim).is_some_and(|legal| set.len() == legal.len()),
        Constraint::NotIn(set) => set.is_empty(),
    }
}

fn constraint_superset(sup: &Constraint, sub: &Constraint) -> bool {
    use Constraint::{In, NotIn};
    match (sup, sub) {
        (In(sup), In(sub)) => sub.is_subset(sup),
        (In(_), NotIn(_)) => false,
        (NotIn(sup), In(sub)) => sup.intersection(sub).next().is_none(),
        (NotIn(sup), NotIn(sub)) => sup.is_subset(sub),
    }
}

fn intersect(lhs: &Constraint, rhs: &Constraint) -> Constraint {
    use Constraint::{In, NotIn};
    match (lhs, rhs) {
        (In(lhs), In(rhs)) => In(lhs.intersection(rhs).cloned().collect()),
        (In(lhs), NotIn(rhs)) | (NotIn(rhs), In(lhs)) => {
            In(lhs.difference(rhs).cloned().collect())
        }
        (NotIn(lhs), NotIn(rhs)) => NotIn(lhs.union(rhs).cloned().collect()),
    }
}

type SpannedValue<'a> = (Value<'a>, SimpleSpan);

/// The condition algebra, configured against a [`Registry`].
///
/// `implicit_vars` selects how a conjunction that leaves a flag dimension
/// unmentioned participates in coverage and merging: when true (the
/// default), an absent flag reads as the flag-off configuration; when false,
/// absence means "all values". The distinction is observable in `covers`,
/// `should_merge`, and `merge` (see the property tests).
#[derive(Clone, Copy, Debug)]
pub struct Algebra<'r> {
    registry: &'r Registry,
    implicit_vars: bool,
}

impl<'r> Algebra<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            implicit_vars: true,
        }
    }

    pub fn with_implicit_vars(registry: &'r Registry, implicit_vars: bool) -> Self {
        Self {
            registry,
            implicit_vars,
        }
    }

    pub fn implicit_vars(&self) -> bool {
        self.implicit_vars
    }

    /// Parse `input` into a canonicalized [`Cond`].
    pub fn parse(&self, input: &str) -> Result<Cond, ConditionParseError> {
        let parser = Expr::parser(Value::parser().map_with(|v, e| (v, e.span())))
            .padded_by(inline_whitespace())
            .then_ignore(end());
        let ast = match parser.parse(input).into_result() {
            Ok(ast) => ast,
            Err(errs) => {
                let (offset, message) = errs
                    .into_iter()
                    .next()
                    .map(|err| (err.span().start, err.to_string()))
                    .unwrap_or((0, "invalid condition".to_string()));
                return Err(ConditionParseError { offset, message });
            }
        };
        let conjs = self.lower(&ast, false)?;
        let spaced = input.contains(" && ") || input.contains(" || ");
        Ok(self.canonicalize(Cond { conjs, spaced }))
    }

    /// True iff every legal assignment satisfies `cond`.
    pub fn is_tautology(&self, cond: &Cond) -> bool {
        cond.conjs.iter().any(|conj| {
            conj.atoms
                .iter()
                .all(|atom| is_full_constraint(&atom.dim, &atom.constraint))
        })
    }

    /// True iff no assignment satisfies `cond`.
    pub fn is_unsat(&self, cond: &Cond) -> bool {
        cond.conjs.is_empty()
    }

    /// True iff every satisfying assignment of `b` also satisfies `a`.
    ///
    /// In implicit-vars mode, flag dimensions mentioned by only one side are
    /// filled as flag-off on the other before comparing.
    pub fn covers(&self, a: &Cond, b: &Cond) -> bool {
        b.conjs
            .iter()
            .all(|cb| a.conjs.iter().any(|ca| self.conj_covers(ca, cb)))
    }

    /// Whether `a ∨ b` can be represented more compactly than the pair.
    pub fn should_merge(&self, a: &Cond, b: &Cond) -> bool {
        self.try_merge(a, b).is_some()
    }

    /// Produce the compact union of `a` and `b` when one exists; otherwise
    /// the second operand wins, unchanged.
    pub fn merge(&self, a: &Cond, b: &Cond) -> Cond {
        self.try_merge(a, b).unwrap_or_else(|| b.clone())
    }

    fn conj_covers(&self, ca: &Conj, cb: &Conj) -> bool {
        let (ma, mb, _filled) = self.fill_maps(ca, cb);
        ma.iter().all(|(dim, sup)| match mb.get(dim) {
            Some(sub) => constraint_superset(sup, sub),
            None => is_full_constraint(dim, sup),
        })
    }

    /// Constraint maps for a pair of conjunctions, with implicit flag filling
    /// applied in implicit-vars mode. Returns the dimensions that were
    /// filled.
    fn fill_maps(
        &self,
        ca: &Conj,
        cb: &Conj,
    ) -> (
        BTreeMap<DimKey, Constraint>,
        BTreeMap<DimKey, Constraint>,
        BTreeSet<DimKey>,
    ) {
        let mut ma = ca.constraint_map();
        let mut mb = cb.constraint_map();
        let mut filled = BTreeSet::new();
        if self.implicit_vars {
            let dims: BTreeSet<DimKey> = ma.keys().chain(mb.keys()).cloned().collect();
            for dim in dims {
                if !matches!(dim, DimKey::Flag(_)) {
                    continue;
                }
                let flag_off = || Constraint::In(BTreeSet::from(["false".to_string()]));
                match (ma.contains_key(&dim), mb.contains_key(&dim)) {
                    (true, false) => {
                        mb.insert(dim.clone(), flag_off());
                        filled.insert(dim);
                    }
                    (false, true) => {
                        ma.insert(dim.clone(), flag_off());
                        filled.insert(dim);
                    }
                    _ => {}
                }
            }
        }
        (ma, mb, filled)
    }

    fn try_merge(&self, a: &Cond, b: &Cond) -> Option<Cond> {
        if a == b {
            return Some(a.clone());
        }
        if self.covers(a, b) {
            return Some(a.clone());
        }
        if self.covers(b, a) {
            return Some(b.clone());
        }
        let [ca] = a.conjs.as_slice() else {
            return None;
        };
        let [cb] = b.conjs.as_slice() else {
            return None;
        };

        let (ma, mb, filled) = self.fill_maps(ca, cb);
        if !ma.keys().eq(mb.keys()) {
            return None;
        }
        let diffs: Vec<&DimKey> = ma
            .iter()
            .filter(|(dim, constraint)| mb.get(*dim) != Some(constraint))
            .map(|(dim, _)| dim)
            .collect();
        let [dim] = diffs.as_slice() else {
            return None;
        };
        let dim = *dim;
        let (Constraint::In(va), Constraint::In(vb)) = (&ma[dim], &mb[dim]) else {
            return None;
        };
        let union: BTreeSet<String> = va.union(vb).cloned().collect();
        let legal = legal_atoms(dim)?;
        let spaced = a.spaced || b.spaced;

        let conj = if union.len() == legal.len() {
            if filled.contains(dim) || !self.implicit_vars {
                // Keep the dimension, rendered as an explicit alternation.
                // The base is whichever operand spelled the dimension out.
                let base = if ca.atom_for(dim).is_some() { ca } else { cb };
                let style = base.atom_for(dim).map(|atom| style_of(&atom.spelling))?;
                let alternation = Atom {
                    dim: dim.clone(),
                    constraint: Constraint::In(union),
                    spelling: self.render_group(dim, legal, style, spaced),
                };
                replace_atom(base, dim, alternation)
            } else {
                // Both sides spelled the dimension out and the union covers
                // it, so it drops entirely.
                ca.without_dim(dim)
            }
        } else {
            let base_atom = ca.atom_for(dim)?;
            let style = style_of(&base_atom.spelling);
            let values: Vec<&str> = union.iter().map(String::as_str).collect();
            let widened = Atom {
                dim: dim.clone(),
                constraint: Constraint::In(union.clone()),
                spelling: self.render_group(dim, &values, style, spaced),
            };
            replace_atom(ca, dim, widened)
        };
        Some(Cond {
            conjs: vec![conj],
            spaced,
        })
    }

    fn canonicalize(&self, cond: Cond) -> Cond {
        let Cond { conjs, spaced } = cond;
        let mut out: Vec<Conj> = Vec::new();
        for conj in conjs {
            if let Some(conj) = canonicalize_conj(conj) {
                if !out
                    .iter()
                    .any(|seen| seen.constraint_map() == conj.constraint_map())
                {
                    out.push(conj);
                }
            }
        }
        'collapse: loop {
            for i in 0..out.len() {
                for j in i + 1..out.len() {
                    if let Some(collapsed) = collapse_pair(&out[i], &out[j]) {
                        out[i] = collapsed;
                        out.remove(j);
                        continue 'collapse;
                    }
                }
            }
            break;
        }
        Cond { conjs: out, spaced }
    }

    fn lower(
        &self,
        expr: &Expr<SpannedValue<'_>>,
        negate: bool,
    ) -> Result<Vec<Conj>, ConditionParseError> {
        match expr {
            Expr::Or(lhs, rhs) => {
                let (lhs, rhs) = (self.lower(lhs, negate)?, self.lower(rhs, negate)?);
                Ok(if negate {
                    cross(&lhs, &rhs)
                } else {
                    concat(lhs, rhs)
                })
            }
            Expr::And(lhs, rhs) => {
                let (lhs, rhs) = (self.lower(lhs, negate)?, self.lower(rhs, negate)?);
                Ok(if negate {
                    concat(lhs, rhs)
                } else {
                    cross(&lhs, &rhs)
                })
            }
            Expr::Not(inner) => self.lower(inner, !negate),
            Expr::Eq(lhs, rhs) => self.lower_cmp(lhs, rhs, negate),
            Expr::Neq(lhs, rhs) => self.lower_cmp(lhs, rhs, !negate),
            Expr::Value((Value::Variable(name), _)) => Ok(self.lower_ident(name, negate)),
            Expr::Value((Value::Literal(_), span)) => Err(ConditionParseError {
                offset: span.start,
                message: "bare literal is not a condition".to_string(),
            }),
        }
    }

    fn lower_ident(&self, name: &str, negate: bool) -> Vec<Conj> {
        match name {
            "true" => {
                if negate {
                    vec![]
                } else {
                    vec![Conj::default()]
                }
            }
            "false" => {
                if negate {
                    vec![Conj::default()]
                } else {
                    vec![]
                }
            }
            _ => {
                let spelling = if negate {
                    format!("!{name}")
                } else {
                    name.to_string()
                };
                let atom = match self.registry.classify_ident(name) {
                    AtomClass::Os(value) => closed_atom(DimKey::Os, value, negate, spelling),
                    AtomClass::Bits(value) => closed_atom(DimKey::Bits, value, negate, spelling),
                    AtomClass::BuildType(value) => {
                        closed_atom(DimKey::BuildType, value, negate, spelling)
                    }
                    AtomClass::Flag { name, known: _ } => {
                        let value = if negate { "false" } else { "true" };
                        closed_atom(DimKey::Flag(name), value, false, spelling)
                    }
                };
                vec![Conj { atoms: vec![atom] }]
            }
        }
    }

    fn lower_cmp(
        &self,
        lhs: &Expr<SpannedValue<'_>>,
        rhs: &Expr<SpannedValue<'_>>,
        negated: bool,
    ) -> Result<Vec<Conj>, ConditionParseError> {
        let (var, lit) = match (lhs, rhs) {
            (
                Expr::Value((Value::Variable(var), _)),
                Expr::Value((Value::Literal(lit), _)),
            ) => (var, lit),
            (
                Expr::Value((Value::Literal(lit), _)),
                Expr::Value((Value::Variable(var), _)),
            ) => (var, lit),
            _ => {
                return Err(ConditionParseError {
                    offset: first_offset(lhs),
                    message: "comparison operands must be a variable and a literal".to_string(),
                })
            }
        };
        let (value, quoted) = match lit {
            Literal::String(s) => (s.to_string(), true),
            Literal::Integer(i) => (i.to_string(), false),
        };
        let op = if negated { "!=" } else { "==" };
        let rendered_value = if quoted {
            format!("'{value}'")
        } else {
            value.clone()
        };
        let spelling = format!("{var} {op} {rendered_value}");

        let atom = match &**var {
            "os" if OS_ATOMS.contains(&value.as_str()) => {
                closed_atom(DimKey::Os, &value, negated, spelling)
            }
            "bits" if BITS_ATOMS.contains(&value.as_str()) => {
                closed_atom(DimKey::Bits, &value, negated, spelling)
            }
            _ => {
                let values = BTreeSet::from([value]);
                let constraint = if negated {
                    Constraint::NotIn(values)
                } else {
                    Constraint::In(values)
                };
                Atom {
                    dim: DimKey::Var(var.to_string()),
                    constraint,
                    spelling,
                }
            }
        };
        Ok(vec![Conj { atoms: vec![atom] }])
    }

    fn render_value(&self, dim: &DimKey, value: &str, style: Style) -> String {
        match (dim, style) {
            (DimKey::Os, Style::Ident) => self
                .registry
                .os_js_spelling(value)
                .map(str::to_string)
                .unwrap_or_else(|| format!("os == '{value}'")),
            (DimKey::Os, Style::Cmp) => format!("os == '{value}'"),
            (DimKey::Bits, Style::Ident) => if value == "64" {
                "is64Bit"
            } else {
                "!is64Bit"
            }
            .to_string(),
            (DimKey::Bits, Style::Cmp) => format!("bits == {value}"),
            (DimKey::BuildType, _) => value.to_string(),
            (DimKey::Flag(name), _) => {
                if value == "true" {
                    name.clone()
                } else {
                    format!("!{name}")
                }
            }
            (DimKey::Var(name), _) => format!("{name} == '{value}'"),
        }
    }

    fn render_group(&self, dim: &DimKey, values: &[&str], style: Style, spaced: bool) -> String {
        let rendered: Vec<String> = match dim {
            // Alternations over a flag read best positive-first.
            DimKey::Flag(name) if values.len() == 2 => {
                vec![name.clone(), format!("!{name}")]
            }
            _ => values
                .iter()
                .map(|value| self.render_value(dim, value, style))
                .collect(),
        };
        match rendered.as_slice() {
            [single] => single.clone(),
            _ => {
                let join = if spaced { " || " } else { "||" };
                format!("({})", rendered.join(join))
            }
        }
    }
}

fn closed_atom(dim: DimKey, value: &str, complemented: bool, spelling: String) -> Atom {
    let constraint = if complemented {
        let legal = legal_atoms(&dim).unwrap_or_default();
        Constraint::In(
            legal
                .iter()
                .filter(|legal| **legal != value)
                .map(|legal| legal.to_string())
                .collect(),
        )
    } else {
        Constraint::In(BTreeSet::from([value.to_string()]))
    };
    Atom {
        dim,
        constraint,
        spelling,
    }
}

fn replace_atom(base: &Conj, dim: &DimKey, replacement: Atom) -> Conj {
    Conj {
        atoms: base
            .atoms
            .iter()
            .map(|atom| {
                if &atom.dim == dim {
                    replacement.clone()
                } else {
                    atom.clone()
                }
            })
            .collect(),
    }
}

fn canonicalize_conj(conj: Conj) -> Option<Conj> {
    let mut atoms: Vec<Atom> = Vec::with_capacity(conj.atoms.len());
    for atom in conj.atoms {
        match atoms.iter_mut().find(|seen| seen.dim == atom.dim) {
            None => atoms.push(atom),
            Some(seen) => {
                let merged = intersect(&seen.constraint, &atom.constraint);
                if let Constraint::In(values) = &merged {
                    if values.is_empty() {
                        return None;
                    }
                }
                if merged == atom.constraint {
                    seen.spelling = atom.spelling;
                }
                seen.constraint = merged;
            }
        }
    }
    Some(Conj { atoms })
}

fn collapse_pair(a: &Conj, b: &Conj) -> Option<Conj> {
    let ma = a.constraint_map();
    let mb = b.constraint_map();
    if !ma.keys().eq(mb.keys()) {
        return None;
    }
    let diffs: Vec<&DimKey> = ma
        .iter()
        .filter(|(dim, constraint)| mb.get(*dim) != Some(constraint))
        .map(|(dim, _)| dim)
        .collect();
    let [dim] = diffs.as_slice() else {
        return None;
    };
    let dim = *dim;
    let (Constraint::In(va), Constraint::In(vb)) = (&ma[dim], &mb[dim]) else {
        return None;
    };
    let union: BTreeSet<&String> = va.union(vb).collect();
    let legal = legal_atoms(dim)?;
    (union.len() == legal.len()).then(|| a.without_dim(dim))
}

fn concat(mut lhs: Vec<Conj>, rhs: Vec<Conj>) -> Vec<Conj> {
    lhs.extend(rhs);
    lhs
}

fn cross(lhs: &[Conj], rhs: &[Conj]) -> Vec<Conj> {
    let mut out = Vec::with_capacity(lhs.len() * rhs.len());
    for a in lhs {
        for b in rhs {
            out.push(Conj {
                atoms: a.atoms.iter().chain(&b.atoms).cloned().collect(),
            });
        }
    }
    out
}

fn first_offset<V>(expr: &Expr<(V, SimpleSpan)>) -> usize {
    match expr {
        Expr::Value((_, span)) => span.start,
        Expr::And(lhs, _) | Expr::Or(lhs, _) | Expr::Eq(lhs, _) | Expr::Neq(lhs, _) => {
            first_offset(lhs)
        }
        Expr::Not(inner) => first_offset(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Registry;

    fn parse(algebra: &Algebra<'_>, input: &str) -> Cond {
        algebra.parse(input).unwrap()
    }

    #[test]
    fn round_trips() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        for input in [
            "gtkWidget",
            "gtkWidget&&AddressSanitizer&&!fission",
            "winWidget&&!is64Bit",
            "os == 'linux' && debug",
            "swgl||!fission",
            "!gtkWidget",
            "webrender&&swgl",
        ] {
            assert_eq!(parse(&algebra, input).serialize(), input, "{input:?}");
        }
    }

    #[test]
    fn unsatisfiable_conjunction_is_dropped() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        let cond = parse(&algebra, "gtkWidget&&winWidget");
        assert!(algebra.is_unsat(&cond));
        assert_eq!(cond.serialize(), "false");

        let cond = parse(&algebra, "fission&&!fission");
        assert!(algebra.is_unsat(&cond));
    }

    #[test]
    fn tautologies() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        assert!(algebra.is_tautology(&parse(&algebra, "true")));
        assert!(algebra.is_tautology(&parse(&algebra, "fission||!fission")));
        assert!(!algebra.is_tautology(&parse(&algebra, "gtkWidget")));
        assert!(!algebra.is_tautology(&parse(&algebra, "false")));
    }

    #[test]
    fn dimension_coverage_collapses_disjuncts() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        let cond = parse(&algebra, "(gtkWidget&&fission)||(gtkWidget&&!fission)");
        assert_eq!(cond.serialize(), "gtkWidget");
        assert_eq!(cond, parse(&algebra, "gtkWidget"));
    }

    #[test]
    fn parse_errors_carry_offsets() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        for input in ["gtkWidget&&(", "&&gtkWidget", "", "os == "] {
            let err = algebra.parse(input).unwrap_err();
            assert!(err.offset <= input.len(), "{input:?} -> {err}");
        }
    }

    #[test]
    fn covers_respects_variable_mode() {
        let registry = Registry::new();
        let implicit = Algebra::new(&registry);
        let explicit = Algebra::with_implicit_vars(&registry, false);

        let broad = parse(&implicit, "gtkWidget");
        let narrow = parse(&implicit, "gtkWidget&&swgl");
        assert!(explicit.covers(&broad, &narrow));
        assert!(!implicit.covers(&broad, &narrow));

        let other_os = parse(&implicit, "winWidget");
        assert!(!explicit.covers(&broad, &other_os));
        assert!(!implicit.covers(&broad, &other_os));

        // A full alternation collapses away at parse time, leaving the
        // dimension unconstrained; explicit mode then covers both
        // polarities, implicit mode reads absence as flag-off.
        let any_swgl = parse(&implicit, "gtkWidget&&(swgl||!swgl)");
        assert_eq!(any_swgl.serialize(), "gtkWidget");
        assert!(explicit.covers(&any_swgl, &narrow));
        assert!(!implicit.covers(&any_swgl, &narrow));
    }

    #[test]
    fn merge_distinct_os_dimensions_does_not_merge() {
        // Differing `os` plus a `bits` constraint on one side only.
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        let a = parse(&algebra, "gtkWidget");
        let b = parse(&algebra, "winWidget&&!is64Bit");
        assert!(!algebra.should_merge(&a, &b));
        assert!(!algebra.should_merge(&b, &a));
        let merged = algebra.merge(&a, &b);
        assert_eq!(merged, b);
        assert_eq!(merged.serialize(), "winWidget&&!is64Bit");
    }

    #[test]
    fn merge_widens_single_flag_to_alternation() {
        // The flag missing from one side widens to an explicit
        // alternation in implicit-vars mode.
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        let a = parse(&algebra, "gtkWidget&&AddressSanitizer&&!fission");
        let b = parse(&algebra, "gtkWidget&&AddressSanitizer&&!fission&&swgl");
        assert!(algebra.should_merge(&a, &b));
        assert!(algebra.should_merge(&b, &a));
        assert_eq!(
            algebra.merge(&a, &b).serialize(),
            "gtkWidget&&AddressSanitizer&&!fission&&(swgl||!swgl)"
        );
    }

    #[test]
    fn merge_subsumption_in_explicit_mode() {
        // The broader operand wins outright.
        let registry = Registry::new();
        let algebra = Algebra::with_implicit_vars(&registry, false);
        let a = parse(&algebra, "gtkWidget");
        let b = parse(&algebra, "gtkWidget&&is64Bit");
        assert!(algebra.should_merge(&a, &b));
        assert_eq!(algebra.merge(&a, &b).serialize(), "gtkWidget");
    }

    #[test]
    fn merge_is_idempotent() {
        let registry = Registry::new();
        for implicit_vars in [true, false] {
            let algebra = Algebra::with_implicit_vars(&registry, implicit_vars);
            for input in [
                "gtkWidget",
                "gtkWidget&&AddressSanitizer&&!fission",
                "os == 'linux' && debug",
                "swgl||!fission",
            ] {
                let cond = parse(&algebra, input);
                assert_eq!(algebra.merge(&cond, &cond), cond, "{input:?}");
            }
        }
    }

    #[test]
    fn should_merge_is_commutative() {
        let registry = Registry::new();
        let inputs = [
            "gtkWidget",
            "winWidget&&!is64Bit",
            "gtkWidget&&AddressSanitizer&&!fission",
            "gtkWidget&&AddressSanitizer&&!fission&&swgl",
            "gtkWidget&&is64Bit",
            "winWidget",
        ];
        for implicit_vars in [true, false] {
            let algebra = Algebra::with_implicit_vars(&registry, implicit_vars);
            for a in inputs {
                for b in inputs {
                    let (a, b) = (parse(&algebra, a), parse(&algebra, b));
                    assert_eq!(
                        algebra.should_merge(&a, &b),
                        algebra.should_merge(&b, &a),
                        "{a} / {b} (implicit_vars: {implicit_vars})"
                    );
                }
            }
        }
    }

    #[test]
    fn merge_honors_subsumption() {
        // Whenever `a` covers `b`, merging yields `a`.
        let registry = Registry::new();
        for implicit_vars in [true, false] {
            let algebra = Algebra::with_implicit_vars(&registry, implicit_vars);
            let pairs = [
                ("gtkWidget", "gtkWidget&&is64Bit"),
                ("gtkWidget&&(swgl||!swgl)", "gtkWidget&&swgl"),
                ("gtkWidget||winWidget", "winWidget"),
            ];
            for (a, b) in pairs {
                let (a, b) = (parse(&algebra, a), parse(&algebra, b));
                if algebra.covers(&a, &b) {
                    assert_eq!(algebra.merge(&a, &b), a, "{a} / {b}");
                }
            }
        }
    }

    #[test]
    fn merge_collapses_explicit_complements() {
        let registry = Registry::new();
        let implicit = Algebra::new(&registry);
        let explicit = Algebra::with_implicit_vars(&registry, false);

        let a = parse(&implicit, "gtkWidget&&fission");
        let b = parse(&implicit, "gtkWidget&&!fission");
        assert_eq!(implicit.merge(&a, &b).serialize(), "gtkWidget");
        assert_eq!(
            explicit.merge(&a, &b).serialize(),
            "gtkWidget&&(fission||!fission)"
        );
    }

    #[test]
    fn merge_widens_closed_value_sets() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        let a = parse(&algebra, "gtkWidget");
        let b = parse(&algebra, "winWidget");
        assert!(algebra.should_merge(&a, &b));
        assert_eq!(algebra.merge(&a, &b).serialize(), "(gtkWidget||winWidget)");
    }

    #[test]
    fn implicit_absent_flag_reads_as_flag_off() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        let a = parse(&algebra, "gtkWidget&&!swgl");
        let b = parse(&algebra, "gtkWidget");
        assert!(algebra.should_merge(&a, &b));
        assert_eq!(algebra.merge(&a, &b).serialize(), "gtkWidget&&!swgl");
    }

    #[test]
    fn merge_fills_unknown_flags_too() {
        let registry = Registry::new();
        let algebra = Algebra::new(&registry);
        let a = parse(&algebra, "webrender&&gtkWidget");
        let b = parse(&algebra, "gtkWidget");
        assert!(algebra.should_merge(&a, &b));
        assert_eq!(
            algebra.merge(&a, &b).serialize(),
            "(webrender||!webrender)&&gtkWidget"
        );
    }
}
