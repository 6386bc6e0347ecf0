use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use itertools::Itertools;

use crate::error::{Error, Result};

/// How a per-atom USE constraint clause binds to the current flag state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `flag` — the dependency must have the flag enabled.
    Required,
    /// `!flag` — accepted syntactically, but has no defined rewrite;
    /// dropped during application.
    Forbidden,
    /// `flag=` — the dependency must mirror our current flag state.
    Mirror,
    /// `!flag=` — the dependency must invert our current flag state.
    Inverse,
    /// `flag?` — require the flag enabled only if we have it enabled.
    IfEnabled,
    /// `!flag?` — require the flag disabled only if we have it disabled.
    IfDisabled,
}

/// One clause of an atom's bracketed USE constraint suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseConstraint {
    /// USE flag name, without `!`/`=`/`?` decoration.
    pub flag: String,
    /// Clause shape.
    pub kind: ConstraintKind,
}

impl FromStr for UseConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (negated, rest) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (kind, name) = if let Some(name) = rest.strip_suffix('=') {
            let kind = if negated {
                ConstraintKind::Inverse
            } else {
                ConstraintKind::Mirror
            };
            (kind, name)
        } else if let Some(name) = rest.strip_suffix('?') {
            let kind = if negated {
                ConstraintKind::IfDisabled
            } else {
                ConstraintKind::IfEnabled
            };
            (kind, name)
        } else {
            let kind = if negated {
                ConstraintKind::Forbidden
            } else {
                ConstraintKind::Required
            };
            (kind, rest)
        };
        if name.is_empty() {
            return Err(Error::InvalidConstraint(s.to_string()));
        }
        Ok(UseConstraint {
            flag: name.to_string(),
            kind,
        })
    }
}

impl fmt::Display for UseConstraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ConstraintKind::Required => write!(f, "{}", self.flag),
            ConstraintKind::Forbidden => write!(f, "!{}", self.flag),
            ConstraintKind::Mirror => write!(f, "{}=", self.flag),
            ConstraintKind::Inverse => write!(f, "!{}=", self.flag),
            ConstraintKind::IfEnabled => write!(f, "{}?", self.flag),
            ConstraintKind::IfDisabled => write!(f, "!{}?", self.flag),
        }
    }
}

/// Split `pkg[a,b=]` into `("pkg", "a,b=")`; `None` when the atom has
/// no constraint suffix.
fn split_constraint_suffix(atom: &str) -> Option<(&str, &str)> {
    let rest = atom.strip_suffix(']')?;
    let open = rest.find('[')?;
    Some((&rest[..open], &rest[open + 1..]))
}

/// Rewrite each atom's bracketed USE constraints into concrete flag
/// requirements against the resolved enabled set.
///
/// Conditional clause shapes collapse to their concrete outcome
/// (`flag=` mirrors the current state, `flag?` only binds when the flag
/// is enabled, and so on); surviving requirements are re-attached in
/// `[-flag1,flag2]` notation, and the suffix is omitted entirely when
/// nothing survives. Atoms without a suffix pass through unchanged.
///
/// # Examples
///
/// ```
/// use indexmap::IndexSet;
/// use portage_depexpr::apply_use_constraints;
///
/// let enabled = IndexSet::from(["ssl".to_string()]);
/// let atoms = vec!["net-misc/curl[ssl?]".to_string(), "dev-libs/foo[gtk?]".to_string()];
/// let rewritten = apply_use_constraints(&atoms, &enabled).unwrap();
/// assert_eq!(rewritten, vec!["net-misc/curl[ssl]", "dev-libs/foo"]);
/// ```
pub fn apply_use_constraints(atoms: &[String], enabled: &IndexSet<String>) -> Result<Vec<String>> {
    atoms.iter().map(|atom| rewrite_atom(atom, enabled)).collect()
}

fn rewrite_atom(atom: &str, enabled: &IndexSet<String>) -> Result<String> {
    let Some((base, clauses)) = split_constraint_suffix(atom) else {
        return Ok(atom.to_string());
    };

    let mut markers: Vec<String> = Vec::new();
    for raw in clauses.split(',') {
        let clause: UseConstraint = raw.trim().parse()?;
        let on = enabled.contains(&clause.flag);
        match clause.kind {
            ConstraintKind::Required => markers.push(clause.flag),
            ConstraintKind::Forbidden => {
                // No defined rewrite for the bare negative form.
            }
            ConstraintKind::Mirror => {
                if on {
                    markers.push(clause.flag);
                } else {
                    markers.push(format!("-{}", clause.flag));
                }
            }
            ConstraintKind::Inverse => {
                if on {
                    markers.push(format!("-{}", clause.flag));
                } else {
                    markers.push(clause.flag);
                }
            }
            ConstraintKind::IfEnabled => {
                if on {
                    markers.push(clause.flag);
                }
            }
            ConstraintKind::IfDisabled => {
                if !on {
                    markers.push(format!("-{}", clause.flag));
                }
            }
        }
    }

    if markers.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}[{}]", markers.iter().join(",")))
    }
}
