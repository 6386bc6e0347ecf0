use std::fmt;

use itertools::Itertools;
use tracing::warn;
use winnow::ascii::{multispace0, multispace1};
use winnow::combinator::{alt, cut_err, delimited, dispatch, eof, opt, peek, preceded, repeat};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use crate::error::{Error, Result};

/// A single USE guard in a conditional, e.g. `ssl?` or `!debug?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseGuard {
    /// USE flag name.
    pub flag: String,
    /// `true` for the `!flag?` form.
    pub negated: bool,
}

/// A node in a dependency expression tree.
///
/// Dependency-class variables (`DEPEND`, `RDEPEND`, `PDEPEND`,
/// `PROVIDE`), `LICENSE` and `SRC_URI` share one grammar: whitespace
/// separated atoms, parenthesized all-of groups, `|| ( ... )` any-of
/// groups and `flag? ( ... )` USE conditionals.
///
/// See [PMS 8.2](https://projects.gentoo.org/pms/9/pms.html#dependency-specification-format).
///
/// Atoms are opaque here: package atoms, license names and source URIs
/// are all carried as their literal text. A trailing `[...]` USE
/// constraint suffix stays attached to the atom and is only interpreted
/// by [`apply_use_constraints`](crate::apply_use_constraints).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepExpr {
    /// An opaque package/license/URI reference.
    Atom(String),
    /// `( ... )` — all entries required.
    Group(Vec<DepExpr>),
    /// `|| ( ... )` — one branch must be chosen.
    AnyOf(Vec<DepExpr>),
    /// `flag? target` with one or more guards. The chained multi-guard
    /// form (`a? b? target`) is deprecated legacy syntax: accepted with
    /// a warning, all guards must hold.
    Conditional {
        /// Guard chain; every guard must hold for the target to apply.
        guards: Vec<UseGuard>,
        /// Guarded subtree.
        target: Box<DepExpr>,
    },
}

impl DepExpr {
    /// Parse a dependency expression string into its top-level entries.
    ///
    /// The returned sequence is the implicit top-level all-of group.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_depexpr::DepExpr;
    ///
    /// let entries = DepExpr::parse("dev-libs/foo ssl? ( dev-libs/openssl )").unwrap();
    /// assert_eq!(entries.len(), 2);
    /// assert!(matches!(&entries[0], DepExpr::Atom(_)));
    /// assert!(matches!(&entries[1], DepExpr::Conditional { .. }));
    ///
    /// assert!(DepExpr::parse("a ( b").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Vec<DepExpr>> {
        parse_dep_string()
            .parse(input)
            .map_err(|e| Error::InvalidExpr(format!("{e}")))
    }
}

impl fmt::Display for UseGuard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}?", self.flag)
    }
}

impl fmt::Display for DepExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DepExpr::Atom(text) => write!(f, "{text}"),
            DepExpr::Group(entries) if entries.is_empty() => write!(f, "( )"),
            DepExpr::Group(entries) => write!(f, "( {} )", entries.iter().join(" ")),
            DepExpr::AnyOf(branches) => write!(f, "|| ( {} )", branches.iter().join(" ")),
            DepExpr::Conditional { guards, target } => {
                write!(f, "{} {}", guards.iter().join(" "), target)
            }
        }
    }
}

// Winnow parsers

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

fn is_flag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+' || c == '@'
}

fn parse_atom(input: &mut &str) -> ModalResult<DepExpr> {
    take_while(1.., is_atom_char)
        .map(|s: &str| DepExpr::Atom(s.to_string()))
        .parse_next(input)
}

/// Parse `( entries... )`.
fn parse_group(input: &mut &str) -> ModalResult<DepExpr> {
    delimited(
        '(',
        parse_entries,
        cut_err((multispace0, ')')).context(StrContext::Label("closing ')'")),
    )
    .map(DepExpr::Group)
    .parse_next(input)
}

/// Parse `|| ( branches... )`. The group is mandatory and must be
/// non-empty: a choice with no branches can never be satisfied.
fn parse_any_of(input: &mut &str) -> ModalResult<DepExpr> {
    "||".parse_next(input)?;
    multispace0.parse_next(input)?;
    cut_err(
        delimited('(', parse_entries, (multispace0, ')'))
            .verify(|branches: &Vec<DepExpr>| !branches.is_empty()),
    )
    .context(StrContext::Label("non-empty '||' group"))
    .map(DepExpr::AnyOf)
    .parse_next(input)
}

/// Parse a single `[!]flag?` guard token. The `?` must end the token so
/// that atoms containing `?` (URIs, `pkg[ssl?]`) are not misread.
/// Parentheses terminate tokens just like whitespace does, so `a?( b )`
/// is a guard and `b?)` is a dangling guard, not an atom.
fn parse_guard(input: &mut &str) -> ModalResult<UseGuard> {
    let negated = opt('!').parse_next(input)?.is_some();
    let flag: String = take_while(1.., is_flag_char)
        .map(|s: &str| s.to_string())
        .parse_next(input)?;
    '?'.parse_next(input)?;
    peek(alt((multispace1.void(), one_of(['(', ')']).void(), eof.void()))).parse_next(input)?;
    Ok(UseGuard { flag, negated })
}

fn parse_conditional_target(input: &mut &str) -> ModalResult<DepExpr> {
    dispatch! {peek(any);
        '(' => parse_group,
        '|' => parse_any_of,
        _ => parse_atom,
    }
    .parse_next(input)
}

/// Parse a guard chain and its target. A guard with nothing after it is
/// malformed.
fn parse_conditional(input: &mut &str) -> ModalResult<DepExpr> {
    let guards: Vec<UseGuard> = repeat(1.., preceded(multispace0, parse_guard)).parse_next(input)?;
    let target = cut_err(preceded(multispace0, parse_conditional_target))
        .context(StrContext::Label("conditional target"))
        .parse_next(input)?;

    if guards.len() > 1 {
        warn!(
            "deprecated chained USE conditionals: {}",
            guards.iter().join(" ")
        );
    }
    if !matches!(target, DepExpr::Group(_) | DepExpr::AnyOf(_)) {
        warn!(
            "deprecated USE conditional without parentheses: {} {}",
            guards.iter().join(" "),
            target
        );
    }

    Ok(DepExpr::Conditional {
        guards,
        target: Box::new(target),
    })
}

fn parse_entry(input: &mut &str) -> ModalResult<DepExpr> {
    dispatch! {peek(any);
        '(' => parse_group,
        '|' => parse_any_of,
        _ => alt((parse_conditional, parse_atom)),
    }
    .parse_next(input)
}

fn parse_entries(input: &mut &str) -> ModalResult<Vec<DepExpr>> {
    repeat(0.., preceded(multispace0, parse_entry)).parse_next(input)
}

pub(crate) fn parse_dep_string<'s>() -> impl Parser<&'s str, Vec<DepExpr>, ErrMode<ContextError>> {
    move |input: &mut &'s str| {
        let entries = parse_entries(input)?;
        multispace0.parse_next(input)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn parse_atoms() {
        let entries = DepExpr::parse("dev-libs/foo >=sys-apps/bar-1.2:0").unwrap();
        assert_eq!(
            entries,
            vec![
                DepExpr::Atom("dev-libs/foo".to_string()),
                DepExpr::Atom(">=sys-apps/bar-1.2:0".to_string()),
            ]
        );
    }

    #[test]
    fn parse_empty() {
        assert!(DepExpr::parse("").unwrap().is_empty());
        assert!(DepExpr::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn parse_group() {
        let entries = DepExpr::parse("a ( b c )").unwrap();
        assert_eq!(entries.len(), 2);
        match &entries[1] {
            DepExpr::Group(inner) => assert_eq!(inner.len(), 2),
            other => panic!("expected Group, got {other:?}"),
        }
    }

    #[test]
    fn parse_any_of() {
        let entries = DepExpr::parse("|| ( a b )").unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            DepExpr::AnyOf(branches) => assert_eq!(branches.len(), 2),
            other => panic!("expected AnyOf, got {other:?}"),
        }
    }

    #[test]
    fn parse_conditional_group() {
        let entries = DepExpr::parse("ssl? ( dev-libs/openssl )").unwrap();
        match &entries[0] {
            DepExpr::Conditional { guards, target } => {
                assert_eq!(guards.len(), 1);
                assert_eq!(guards[0].flag, "ssl");
                assert!(!guards[0].negated);
                assert!(matches!(target.as_ref(), DepExpr::Group(_)));
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn parse_negated_conditional() {
        let entries = DepExpr::parse("!debug? ( a )").unwrap();
        match &entries[0] {
            DepExpr::Conditional { guards, .. } => {
                assert_eq!(guards[0].flag, "debug");
                assert!(guards[0].negated);
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    #[traced_test]
    fn parse_chained_guards() {
        let entries = DepExpr::parse("a? b? ( x y )").unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            DepExpr::Conditional { guards, target } => {
                assert_eq!(guards.len(), 2);
                assert_eq!(guards[0].flag, "a");
                assert_eq!(guards[1].flag, "b");
                assert!(matches!(target.as_ref(), DepExpr::Group(_)));
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
        assert!(logs_contain("deprecated chained USE conditionals"));
    }

    #[test]
    #[traced_test]
    fn parse_unparenthesized_target() {
        let entries = DepExpr::parse("doc? app-doc/docs").unwrap();
        match &entries[0] {
            DepExpr::Conditional { target, .. } => {
                assert_eq!(target.as_ref(), &DepExpr::Atom("app-doc/docs".to_string()));
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
        assert!(logs_contain("deprecated USE conditional without parentheses"));
    }

    #[test]
    fn parse_conditional_any_of_target() {
        let entries = DepExpr::parse("gui? || ( x11-libs/gtk x11-libs/qt )").unwrap();
        match &entries[0] {
            DepExpr::Conditional { target, .. } => {
                assert!(matches!(target.as_ref(), DepExpr::AnyOf(_)));
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn bracket_suffix_is_an_atom() {
        let entries = DepExpr::parse("dev-libs/foo[ssl?,!debug=]").unwrap();
        assert_eq!(
            entries,
            vec![DepExpr::Atom("dev-libs/foo[ssl?,!debug=]".to_string())]
        );
    }

    #[test]
    fn uri_with_query_is_an_atom() {
        let entries = DepExpr::parse("https://example.com/download?file=foo-1.0.tar.gz").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0], DepExpr::Atom(_)));
    }

    #[test]
    fn token_with_inner_question_mark_is_an_atom() {
        // The guard form requires `?` at the end of the token.
        let entries = DepExpr::parse("what?ever").unwrap();
        assert_eq!(entries, vec![DepExpr::Atom("what?ever".to_string())]);
    }

    #[test]
    fn guard_binds_to_adjacent_group() {
        // No whitespace between the guard and its group.
        let entries = DepExpr::parse("a?( b )").unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            DepExpr::Conditional { guards, target } => {
                assert_eq!(guards.len(), 1);
                assert_eq!(guards[0].flag, "a");
                assert_eq!(
                    target.as_ref(),
                    &DepExpr::Group(vec![DepExpr::Atom("b".to_string())])
                );
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn dangling_guard_before_close_paren_is_malformed() {
        let err = DepExpr::parse("( a b?)").unwrap_err();
        assert!(err.is_malformed_input());
        assert!(DepExpr::parse("b?)").is_err());
    }

    #[test]
    fn unmatched_open_paren_is_malformed() {
        let err = DepExpr::parse("a ( b").unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn stray_close_paren_is_malformed() {
        assert!(DepExpr::parse("a ) b").is_err());
    }

    #[test]
    fn dangling_guard_is_malformed() {
        let err = DepExpr::parse("b? ").unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn dangling_guard_in_group_is_malformed() {
        assert!(DepExpr::parse("( a b? )").is_err());
    }

    #[test]
    fn dangling_any_of_is_malformed() {
        assert!(DepExpr::parse("|| a").is_err());
        assert!(DepExpr::parse("||").is_err());
    }

    #[test]
    fn empty_any_of_is_malformed() {
        assert!(DepExpr::parse("|| ( )").is_err());
    }

    #[test]
    fn nested_structure() {
        let entries = DepExpr::parse("|| ( ( a b ) c? ( d ) )").unwrap();
        match &entries[0] {
            DepExpr::AnyOf(branches) => {
                assert_eq!(branches.len(), 2);
                assert!(matches!(&branches[0], DepExpr::Group(_)));
                assert!(matches!(&branches[1], DepExpr::Conditional { .. }));
            }
            other => panic!("expected AnyOf, got {other:?}"),
        }
    }

    #[test]
    fn display_round_trip_preserves_structure() {
        for input in [
            "a b c",
            "a ( b c )",
            "|| ( x y ) z",
            "ssl? ( dev-libs/openssl ) !ssl? ( dev-libs/gnutls )",
            "|| ( ( a b ) c )",
            "a? b? ( x )",
        ] {
            let parsed = DepExpr::parse(input).unwrap();
            let rendered = parsed.iter().join(" ");
            let reparsed = DepExpr::parse(&rendered).unwrap();
            assert_eq!(parsed, reparsed, "round-trip failed for {input:?}");
        }
    }

    #[test]
    fn display_conditional() {
        let entries = DepExpr::parse("!ssl? ( a b )").unwrap();
        assert_eq!(entries[0].to_string(), "!ssl? ( a b )");
    }
}
