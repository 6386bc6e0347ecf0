use indexmap::IndexSet;
use tracing::warn;

use crate::error::{Error, Result};
use crate::expr::DepExpr;

/// Choose concrete atoms from a reduced tree against an
/// installed-package oracle.
///
/// Top-level atoms are always emitted; nested plain groups are
/// unconditional and contribute all of their atoms. For every any-of
/// group, branches are tried in order and the first branch whose atoms
/// are all satisfied by the oracle wins. When no branch is satisfied
/// the first branch is emitted in its literal string form, so the
/// unsatisfied choice surfaces as a failed atom match downstream rather
/// than vanishing.
///
/// The oracle may be called repeatedly for the same atom and must be a
/// read-only predicate.
///
/// USE conditionals must already have been reduced away; one reaching
/// this stage is an invariant violation, as is an any-of group with no
/// branches.
///
/// # Examples
///
/// ```
/// use portage_depexpr::{select, DepExpr};
///
/// let tree = DepExpr::parse("|| ( x y ) z").unwrap();
///
/// let atoms = select(&tree, &|atom: &str| atom == "y").unwrap();
/// assert_eq!(atoms, vec!["y", "z"]);
///
/// // Nothing installed: the first branch is kept as a loud fallback.
/// let atoms = select(&tree, &|_: &str| false).unwrap();
/// assert_eq!(atoms, vec!["x", "z"]);
/// ```
pub fn select<F>(entries: &[DepExpr], is_satisfied: &F) -> Result<Vec<String>>
where
    F: Fn(&str) -> bool,
{
    let mut out = Vec::new();
    for entry in entries {
        match entry {
            DepExpr::Atom(text) => out.push(text.clone()),
            DepExpr::Group(children) => out.extend(select(children, is_satisfied)?),
            DepExpr::AnyOf(branches) => {
                let Some(first) = branches.first() else {
                    return Err(Error::Invariant(
                        "empty any-of group at selection stage".to_string(),
                    ));
                };
                match or_select(branches, is_satisfied)? {
                    Some(atoms) => out.extend(atoms),
                    None => {
                        warn!("no satisfied branch in any-of group, keeping {first}");
                        out.push(first.to_string());
                    }
                }
            }
            DepExpr::Conditional { .. } => {
                return Err(Error::Invariant(
                    "USE conditional at selection stage".to_string(),
                ));
            }
        }
    }
    Ok(out)
}

/// First branch whose atoms are all satisfied, or `None`.
fn or_select<F>(branches: &[DepExpr], is_satisfied: &F) -> Result<Option<Vec<String>>>
where
    F: Fn(&str) -> bool,
{
    for branch in branches {
        if let Some(atoms) = branch_satisfied(branch, is_satisfied)? {
            return Ok(Some(atoms));
        }
    }
    Ok(None)
}

fn branch_satisfied<F>(node: &DepExpr, is_satisfied: &F) -> Result<Option<Vec<String>>>
where
    F: Fn(&str) -> bool,
{
    match node {
        DepExpr::Atom(text) => {
            if is_satisfied(text) {
                Ok(Some(vec![text.clone()]))
            } else {
                Ok(None)
            }
        }
        // An all-of branch holds only if every member holds.
        DepExpr::Group(children) => {
            let mut atoms = Vec::new();
            for child in children {
                match branch_satisfied(child, is_satisfied)? {
                    Some(chosen) => atoms.extend(chosen),
                    None => return Ok(None),
                }
            }
            Ok(Some(atoms))
        }
        DepExpr::AnyOf(branches) => or_select(branches, is_satisfied),
        DepExpr::Conditional { .. } => Err(Error::Invariant(
            "USE conditional at selection stage".to_string(),
        )),
    }
}

/// Flatten a reduced `LICENSE` tree into the set of named licenses.
///
/// License acceptance is "any of the named licenses": `||` markers and
/// grouping are discarded and every identifier is retained, unlike
/// [`select`]'s single-branch choice.
///
/// # Examples
///
/// ```
/// use portage_depexpr::{select_licenses, DepExpr};
///
/// let tree = DepExpr::parse("|| ( GPL-2 MIT )").unwrap();
/// let licenses = select_licenses(&tree).unwrap();
/// assert!(licenses.contains("GPL-2"));
/// assert!(licenses.contains("MIT"));
/// ```
pub fn select_licenses(entries: &[DepExpr]) -> Result<IndexSet<String>> {
    let mut out = IndexSet::new();
    collect_licenses(entries, &mut out)?;
    Ok(out)
}

fn collect_licenses(entries: &[DepExpr], out: &mut IndexSet<String>) -> Result<()> {
    for entry in entries {
        match entry {
            DepExpr::Atom(text) => {
                out.insert(text.clone());
            }
            DepExpr::Group(children) | DepExpr::AnyOf(children) => {
                collect_licenses(children, out)?;
            }
            DepExpr::Conditional { .. } => {
                return Err(Error::Invariant(
                    "USE conditional at selection stage".to_string(),
                ));
            }
        }
    }
    Ok(())
}
