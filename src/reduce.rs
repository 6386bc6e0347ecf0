use indexmap::IndexSet;

use crate::error::{Error, Result};
use crate::expr::{DepExpr, UseGuard};

/// Flag sets a reduction is evaluated against.
///
/// `enabled` is the effective enabled set for the package being
/// processed, i.e. the user-enabled flags unioned with the forced
/// flags (see [`UseContext::effective_enabled`](crate::UseContext::effective_enabled)).
/// `matchall` resolves every positive conditional regardless of
/// `enabled` (used by QA tools to expand all branches); `exclude_all`
/// names flags that fail the positive condition even under `matchall`.
#[derive(Debug, Clone, Default)]
pub struct ReduceContext {
    /// Effective enabled flags (user-enabled plus forced).
    pub enabled: IndexSet<String>,
    /// Masked flags; a positive guard on a masked flag never holds.
    pub masked: IndexSet<String>,
    /// Treat every positive guard as holding unless masked or excluded.
    pub matchall: bool,
    /// Flags whose positive condition fails even under `matchall`.
    pub exclude_all: IndexSet<String>,
}

/// Evaluate USE conditionals out of an expression tree.
///
/// Conditionals whose guard chain holds are replaced in place by their
/// reduced target (a group target is spliced as its children);
/// conditionals whose guards fail contribute nothing. Plain groups that
/// reduce to nothing are dropped. An any-of branch that reduces to
/// nothing is replaced by its pre-reduction string form, so that a
/// choice with no viable option fails atom matching downstream instead
/// of silently disappearing.
///
/// This stage assumes a well-formed tree; it only fails on invariant
/// violations (a corrupted guard chain), never on user input.
///
/// # Examples
///
/// ```
/// use indexmap::IndexSet;
/// use portage_depexpr::{reduce, DepExpr, ReduceContext};
///
/// let tree = DepExpr::parse("a b? ( c d )").unwrap();
///
/// let ctx = ReduceContext::default();
/// assert_eq!(reduce(&tree, &ctx).unwrap(), DepExpr::parse("a").unwrap());
///
/// let ctx = ReduceContext {
///     enabled: IndexSet::from(["b".to_string()]),
///     ..Default::default()
/// };
/// assert_eq!(reduce(&tree, &ctx).unwrap(), DepExpr::parse("a c d").unwrap());
/// ```
pub fn reduce(entries: &[DepExpr], ctx: &ReduceContext) -> Result<Vec<DepExpr>> {
    let mut out = Vec::new();
    for entry in entries {
        reduce_into(entry, ctx, &mut out)?;
    }
    Ok(out)
}

fn reduce_into(node: &DepExpr, ctx: &ReduceContext, out: &mut Vec<DepExpr>) -> Result<()> {
    match node {
        DepExpr::Atom(_) => out.push(node.clone()),
        DepExpr::Group(children) => {
            let reduced = reduce(children, ctx)?;
            if !reduced.is_empty() {
                out.push(DepExpr::Group(reduced));
            }
        }
        DepExpr::AnyOf(branches) => {
            let mut kept = Vec::with_capacity(branches.len());
            for branch in branches {
                let mut reduced = Vec::new();
                reduce_into(branch, ctx, &mut reduced)?;
                match reduced.len() {
                    // An unviable branch stays in the running as its
                    // literal string form; downstream atom matching
                    // will reject it deterministically.
                    0 => kept.push(DepExpr::Atom(branch.to_string())),
                    1 => kept.push(reduced.remove(0)),
                    _ => kept.push(DepExpr::Group(reduced)),
                }
            }
            out.push(DepExpr::AnyOf(kept));
        }
        DepExpr::Conditional { guards, target } => {
            if guards.is_empty() {
                return Err(Error::Invariant(
                    "conditional node with an empty guard chain".to_string(),
                ));
            }
            if guards.iter().all(|g| guard_holds(g, ctx)) {
                match target.as_ref() {
                    // Splice a group target's children directly into
                    // the parent sequence.
                    DepExpr::Group(children) => out.extend(reduce(children, ctx)?),
                    other => reduce_into(other, ctx, out)?,
                }
            }
        }
    }
    Ok(())
}

fn guard_holds(guard: &UseGuard, ctx: &ReduceContext) -> bool {
    let positive = !ctx.exclude_all.contains(&guard.flag)
        && !ctx.masked.contains(&guard.flag)
        && (ctx.matchall || ctx.enabled.contains(&guard.flag));
    if guard.negated {
        !positive
    } else {
        positive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(input: &str) -> Vec<DepExpr> {
        DepExpr::parse(input).unwrap()
    }

    fn flags(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn enabled(names: &[&str]) -> ReduceContext {
        ReduceContext {
            enabled: flags(names),
            ..Default::default()
        }
    }

    #[test]
    fn atoms_pass_through() {
        let tree = parsed("a b");
        assert_eq!(reduce(&tree, &ReduceContext::default()).unwrap(), tree);
    }

    #[test]
    fn disabled_conditional_dropped() {
        let tree = reduce(&parsed("a b? ( c d )"), &enabled(&[])).unwrap();
        assert_eq!(tree, parsed("a"));
    }

    #[test]
    fn enabled_conditional_spliced() {
        let tree = reduce(&parsed("a b? ( c d )"), &enabled(&["b"])).unwrap();
        assert_eq!(tree, parsed("a c d"));
    }

    #[test]
    fn negated_conditional() {
        let ctx = enabled(&["ssl"]);
        let tree = reduce(&parsed("ssl? ( a ) !ssl? ( b )"), &ctx).unwrap();
        assert_eq!(tree, parsed("a"));

        let tree = reduce(&parsed("ssl? ( a ) !ssl? ( b )"), &enabled(&[])).unwrap();
        assert_eq!(tree, parsed("b"));
    }

    #[test]
    fn unspaced_guard_still_conditional() {
        let tree = parsed("a?( b )");
        assert_eq!(reduce(&tree, &enabled(&[])).unwrap(), parsed(""));
        assert_eq!(reduce(&tree, &enabled(&["a"])).unwrap(), parsed("b"));
    }

    #[test]
    fn single_node_target_inserted() {
        let tree = reduce(&parsed("doc? app-doc/docs"), &enabled(&["doc"])).unwrap();
        assert_eq!(tree, parsed("app-doc/docs"));
    }

    #[test]
    fn chained_guards_require_all() {
        let tree = parsed("a? b? ( x )");
        assert_eq!(reduce(&tree, &enabled(&["a"])).unwrap(), parsed(""));
        assert_eq!(reduce(&tree, &enabled(&["a", "b"])).unwrap(), parsed("x"));
    }

    #[test]
    fn masked_flag_fails_positive_guard() {
        let ctx = ReduceContext {
            enabled: flags(&["ssl"]),
            masked: flags(&["ssl"]),
            ..Default::default()
        };
        assert_eq!(reduce(&parsed("ssl? ( a )"), &ctx).unwrap(), parsed(""));
        // Masking makes the flag count as absent, so the negated guard holds.
        assert_eq!(reduce(&parsed("!ssl? ( b )"), &ctx).unwrap(), parsed("b"));
    }

    #[test]
    fn matchall_resolves_positive_guards_only() {
        let ctx = ReduceContext {
            matchall: true,
            ..Default::default()
        };
        let tree = reduce(&parsed("a? ( x ) !b? ( y )"), &ctx).unwrap();
        assert_eq!(tree, parsed("x"));
    }

    #[test]
    fn exclude_all_overrides_matchall() {
        let ctx = ReduceContext {
            matchall: true,
            exclude_all: flags(&["a"]),
            ..Default::default()
        };
        let tree = reduce(&parsed("a? ( x ) !a? ( y ) b? ( z )"), &ctx).unwrap();
        assert_eq!(tree, parsed("y z"));
    }

    #[test]
    fn empty_group_dropped() {
        let tree = reduce(&parsed("a ( b? ( c ) )"), &enabled(&[])).unwrap();
        assert_eq!(tree, parsed("a"));
    }

    #[test]
    fn nested_group_kept_nested() {
        let tree = reduce(&parsed("a ( b c )"), &enabled(&[])).unwrap();
        assert_eq!(tree, parsed("a ( b c )"));
    }

    #[test]
    fn any_of_branches_reduce_independently() {
        let tree = reduce(&parsed("|| ( a? ( x ) y )"), &enabled(&["a"])).unwrap();
        assert_eq!(tree, parsed("|| ( x y )"));
    }

    #[test]
    fn unviable_any_of_branch_becomes_literal() {
        let tree = reduce(&parsed("|| ( a? ( x ) y )"), &enabled(&[])).unwrap();
        assert_eq!(
            tree,
            vec![DepExpr::AnyOf(vec![
                DepExpr::Atom("a? ( x )".to_string()),
                DepExpr::Atom("y".to_string()),
            ])]
        );
    }

    #[test]
    fn multi_node_branch_wrapped_in_group() {
        let tree = reduce(&parsed("|| ( a? ( x y ) z )"), &enabled(&["a"])).unwrap();
        assert_eq!(tree, parsed("|| ( ( x y ) z )"));
    }

    #[test]
    fn conditional_any_of_target() {
        let tree = reduce(&parsed("gui? || ( gtk qt )"), &enabled(&["gui"])).unwrap();
        assert_eq!(tree, parsed("|| ( gtk qt )"));
    }

    #[test]
    fn reduction_is_pure() {
        let tree = parsed("a b? ( c )");
        let before = tree.clone();
        let _ = reduce(&tree, &enabled(&["b"])).unwrap();
        assert_eq!(tree, before);
    }
}
