use crate::expr::DepExpr;

/// Remove redundant nesting from an expression tree without changing
/// its meaning.
///
/// Two rewrites apply, recursively:
/// - an any-of group left with exactly one branch becomes that branch
///   (an OR of one option is not a choice);
/// - a plain group whose only child is itself a group is flattened into
///   the inner elements. The top-level entry sequence counts as a group
///   for this purpose.
///
/// Order is preserved and nothing is deduplicated. The function is
/// idempotent.
///
/// # Examples
///
/// ```
/// use portage_depexpr::{normalize, DepExpr};
///
/// let tree = DepExpr::parse("( ( a b ) )").unwrap();
/// let tree = normalize(&tree);
/// assert_eq!(tree, DepExpr::parse("a b").unwrap());
///
/// let tree = DepExpr::parse("|| ( x )").unwrap();
/// let tree = normalize(&tree);
/// assert_eq!(tree, vec![DepExpr::Atom("x".to_string())]);
/// ```
pub fn normalize(entries: &[DepExpr]) -> Vec<DepExpr> {
    let out: Vec<DepExpr> = entries.iter().map(normalize_node).collect();
    if let [DepExpr::Group(inner)] = out.as_slice() {
        return inner.clone();
    }
    out
}

fn normalize_node(node: &DepExpr) -> DepExpr {
    match node {
        DepExpr::Atom(_) => node.clone(),
        DepExpr::Group(children) => DepExpr::Group(normalize(children)),
        DepExpr::AnyOf(branches) => {
            let mut branches: Vec<DepExpr> = branches.iter().map(normalize_node).collect();
            if branches.len() == 1 {
                branches.remove(0)
            } else {
                DepExpr::AnyOf(branches)
            }
        }
        DepExpr::Conditional { guards, target } => DepExpr::Conditional {
            guards: guards.clone(),
            target: Box::new(normalize_node(target)),
        },
    }
}
