use std::borrow::Cow;

#[cfg(test)]
use insta::assert_debug_snapshot;

use chumsky::{
    pratt::{infix, left, prefix},
    prelude::Rich,
    primitive::{any, choice, just},
    recursive::recursive,
    text::{self, ascii::ident, inline_whitespace, newline},
    Parser,
};

use crate::conditions::ParseError;

/// Values that can be placed into [`Value::Literal`].
///
/// String values use single or double quotes interchangeably; no escaping is
/// supported in this implementation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Literal<'a> {
    String(Cow<'a, str>),
    Integer(i64),
}

impl<'a> Literal<'a> {
    pub(crate) fn parser() -> impl Clone + Parser<'a, &'a str, Literal<'a>, ParseError<'a>> {
        choice((
            any()
                .and_is(choice((newline(), just('\'').to(()))).not())
                .repeated()
                .to_slice()
                .delimited_by(just('\''), just('\''))
                .map(|s: &str| Literal::String(s.into())),
            any()
                .and_is(choice((newline(), just('"').to(()))).not())
                .repeated()
                .to_slice()
                .delimited_by(just('"'), just('"'))
                .map(|s: &str| Literal::String(s.into())),
            text::int(10).to_slice().try_map(|s: &str, span| {
                s.parse()
                    .map(Literal::Integer)
                    .map_err(|_| Rich::custom(span, "integer literal out of range"))
            }),
        ))
        .labelled("literal")
    }

    pub fn to_static(&self) -> Literal<'static> {
        match self {
            Self::String(s) => Literal::String(s.clone().into_owned().into()),
            Self::Integer(i) => Literal::Integer(*i),
        }
    }
}

/// Variable and literal terminals of an [`Expr`] condition expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value<'a> {
    Variable(Cow<'a, str>),
    Literal(Literal<'a>),
}

impl<'a> Value<'a> {
    /// Retrieve a parser for [`Self`]. Often used as input to [`Expr::parser`].
    pub fn parser() -> impl Clone + Parser<'a, &'a str, Value<'a>, ParseError<'a>> {
        choice((
            ident().map(|i: &str| Value::Variable(i.into())),
            Literal::parser().map(Value::Literal),
        ))
    }

    pub fn to_static(&self) -> Value<'static> {
        match self {
            Value::Variable(var) => Value::Variable(var.clone().into_owned().into()),
            Value::Literal(lit) => Value::Literal(lit.to_static()),
        }
    }
}

/// Condition expressions in the annotation sub-grammar of reftest manifests.
///
/// Conjunction binds tighter than disjunction; negation is a prefix operator
/// and binds tightest. Comparisons sit between negation and conjunction, so
/// `os == 'linux' && !swgl || debug` parses the way the manifests intend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr<V> {
    Value(V),
    And(Box<Expr<V>>, Box<Expr<V>>),
    Or(Box<Expr<V>>, Box<Expr<V>>),
    Not(Box<Expr<V>>),
    Eq(Box<Expr<V>>, Box<Expr<V>>),
    Neq(Box<Expr<V>>, Box<Expr<V>>),
}

impl<V> Expr<V> {
    /// Retrieve a parser for [`Self`], using `var_parser` to parse terminal
    /// expressions. `var_parser` is usually (but not always) a call to
    /// [`Value::parser`].
    pub fn parser<'a, Pt>(
        var_parser: Pt,
    ) -> impl Clone + Parser<'a, &'a str, Expr<V>, ParseError<'a>>
    where
        V: 'a,
        Pt: Clone + Parser<'a, &'a str, V, ParseError<'a>> + 'a,
    {
        let op = |symbol| just(symbol).padded_by(inline_whitespace());

        recursive(move |expr| {
            var_parser
                .map(Expr::Value)
                .or(expr.delimited_by(just('('), just(')')))
                .pratt((
                    prefix(4, op("!"), |c| Expr::Not(Box::new(c))),
                    infix(left(3), op("=="), |c1, c2| {
                        Expr::Eq(Box::new(c1), Box::new(c2))
                    }),
                    infix(left(3), op("!="), |c1, c2| {
                        Expr::Neq(Box::new(c1), Box::new(c2))
                    }),
                    infix(left(2), op("&&"), |c1, c2| {
                        Expr::And(Box::new(c1), Box::new(c2))
                    }),
                    infix(left(1), op("||"), |c1, c2| {
                        Expr::Or(Box::new(c1), Box::new(c2))
                    }),
                ))
        })
    }
}

#[test]
fn snapshots() {
    let condition = || Expr::parser(Value::parser());

    assert_debug_snapshot!(
        condition().parse("swgl&&!fission"),
        @r###"
    ParseResult {
        output: Some(
            And(
                Value(
                    Variable(
                        "swgl",
                    ),
                ),
                Not(
                    Value(
                        Variable(
                            "fission",
                        ),
                    ),
                ),
            ),
        ),
        errs: [],
    }
    "###
    );

    assert_debug_snapshot!(
        condition().parse(r#"os == 'linux'"#),
        @r###"
    ParseResult {
        output: Some(
            Eq(
                Value(
                    Variable(
                        "os",
                    ),
                ),
                Value(
                    Literal(
                        String(
                            "linux",
                        ),
                    ),
                ),
            ),
        ),
        errs: [],
    }
    "###
    );

    assert_debug_snapshot!(
        condition().parse("bits != 64"),
        @r###"
    ParseResult {
        output: Some(
            Neq(
                Value(
                    Variable(
                        "bits",
                    ),
                ),
                Value(
                    Literal(
                        Integer(
                            64,
                        ),
                    ),
                ),
            ),
        ),
        errs: [],
    }
    "###
    );

    assert_debug_snapshot!(
        condition().parse("(((fission)))"),
        @r###"
    ParseResult {
        output: Some(
            Value(
                Variable(
                    "fission",
                ),
            ),
        ),
        errs: [],
    }
    "###
    );

    assert_debug_snapshot!(
        condition().parse("gtkWidget||swgl&&debug"),
        @r###"
    ParseResult {
        output: Some(
            Or(
                Value(
                    Variable(
                        "gtkWidget",
                    ),
                ),
                And(
                    Value(
                        Variable(
                            "swgl",
                        ),
                    ),
                    Value(
                        Variable(
                            "debug",
                        ),
                    ),
                ),
            ),
        ),
        errs: [],
    }
    "###
    );
}
