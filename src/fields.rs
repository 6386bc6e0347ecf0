use indexmap::IndexSet;
use itertools::Itertools;

use crate::constraint::apply_use_constraints;
use crate::error::{Error, Result};
use crate::expr::DepExpr;
use crate::normalize::normalize;
use crate::reduce::{reduce, ReduceContext};
use crate::select::{select, select_licenses};
use crate::useflags::{resolve_enabled, DeclaredFlag, UseContext};

/// Metadata fields carrying dependency expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DepField {
    /// `LICENSE`.
    License,
    /// `DEPEND` — build-time dependencies.
    Depend,
    /// `RDEPEND` — runtime dependencies.
    Rdepend,
    /// `PDEPEND` — post-merge dependencies.
    Pdepend,
    /// `PROVIDE` — legacy virtuals.
    Provide,
    /// `SRC_URI` — source files.
    SrcUri,
}

/// Raw field strings for one package, as extracted from its build
/// metadata by an external collaborator. Missing fields are empty
/// strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldInputs<'a> {
    /// Declared USE flags (`IUSE`), whitespace separated, optionally
    /// `+`/`-` prefixed.
    pub iuse: &'a str,
    /// `LICENSE` expression.
    pub license: &'a str,
    /// `DEPEND` expression.
    pub depend: &'a str,
    /// `RDEPEND` expression.
    pub rdepend: &'a str,
    /// `PDEPEND` expression.
    pub pdepend: &'a str,
    /// `PROVIDE` expression.
    pub provide: &'a str,
    /// `SRC_URI` expression.
    pub src_uri: &'a str,
}

/// Flattened per-field results of one package's reduction.
///
/// Only the resolved per-package enabled set is echoed back; the raw
/// user/masked/forced sets are the caller's own [`UseContext`] and are
/// not duplicated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedFields {
    /// Accepted license identifiers (any of these satisfies).
    pub license: IndexSet<String>,
    /// Flattened `DEPEND` atoms, space joined.
    pub depend: String,
    /// Flattened `RDEPEND` atoms, space joined.
    pub rdepend: String,
    /// Flattened `PDEPEND` atoms, space joined.
    pub pdepend: String,
    /// Flattened `PROVIDE` atoms, space joined.
    pub provide: String,
    /// Flattened source URIs, space joined, rename pairs stripped.
    pub src_uri: String,
    /// Resolved enabled USE flags for this package, sorted.
    pub enabled_use: Vec<String>,
}

impl ComputedFields {
    /// The flat string form of one field.
    pub fn joined(&self, field: DepField) -> String {
        match field {
            DepField::License => self.license.iter().join(" "),
            DepField::Depend => self.depend.clone(),
            DepField::Rdepend => self.rdepend.clone(),
            DepField::Pdepend => self.pdepend.clone(),
            DepField::Provide => self.provide.clone(),
            DepField::SrcUri => self.src_uri.clone(),
        }
    }
}

/// Drop `uri -> renamed` pairs from a parsed `SRC_URI` tree, keeping
/// only the original URI. Renaming itself is handled by the fetch
/// layer, not this engine. Nested conditional and grouped entries are
/// covered.
pub fn strip_source_renames(entries: &[DepExpr]) -> Vec<DepExpr> {
    let mut out = Vec::new();
    let mut iter = entries.iter();
    while let Some(entry) = iter.next() {
        match entry {
            DepExpr::Atom(text) if text == "->" => {
                // Skip the rename operator and its target.
                iter.next();
            }
            DepExpr::Atom(_) => out.push(entry.clone()),
            DepExpr::Group(children) => out.push(DepExpr::Group(strip_source_renames(children))),
            DepExpr::AnyOf(branches) => out.push(DepExpr::AnyOf(strip_source_renames(branches))),
            DepExpr::Conditional { guards, target } => {
                let target = match target.as_ref() {
                    DepExpr::Group(children) => DepExpr::Group(strip_source_renames(children)),
                    other => other.clone(),
                };
                out.push(DepExpr::Conditional {
                    guards: guards.clone(),
                    target: Box::new(target),
                });
            }
        }
    }
    out
}

/// Compute the flattened dependency fields for one package.
///
/// Every field runs parse → reduce → normalize → select; `LICENSE`
/// flattens to a set instead of choosing a branch, `SRC_URI` first
/// strips rename pairs, and the dependency classes additionally rewrite
/// per-atom USE constraints against the resolved enabled set.
///
/// A malformed field fails the whole computation with
/// [`Error::Field`] naming the field — an incompletely parsed
/// dependency set is worse than an explicit failure.
///
/// # Examples
///
/// ```
/// use indexmap::IndexSet;
/// use portage_depexpr::{compute_dependency_fields, FieldInputs, UseContext};
///
/// let inputs = FieldInputs {
///     iuse: "ssl doc",
///     license: "|| ( GPL-2 MIT )",
///     depend: "dev-libs/base ssl? ( dev-libs/openssl ) net-misc/curl[ssl?]",
///     src_uri: "https://example.com/v1.0.tar.gz -> foo-1.0.tar.gz",
///     ..Default::default()
/// };
/// let ctx = UseContext {
///     enabled: IndexSet::from(["ssl".to_string()]),
///     ..Default::default()
/// };
///
/// let fields = compute_dependency_fields(&inputs, &ctx, |_| false).unwrap();
/// assert_eq!(fields.depend, "dev-libs/base dev-libs/openssl net-misc/curl[ssl]");
/// assert_eq!(fields.src_uri, "https://example.com/v1.0.tar.gz");
/// assert!(fields.license.contains("MIT"));
/// assert_eq!(fields.enabled_use, vec!["ssl".to_string()]);
/// ```
pub fn compute_dependency_fields<F>(
    inputs: &FieldInputs,
    use_ctx: &UseContext,
    is_installed: F,
) -> Result<ComputedFields>
where
    F: Fn(&str) -> bool,
{
    let declared = DeclaredFlag::parse_line(inputs.iuse)
        .map_err(|e| Error::Field("IUSE".to_string(), Box::new(e)))?;
    let resolved = resolve_enabled(&declared, &use_ctx.enabled, &use_ctx.forced, &use_ctx.masked);

    let reduce_ctx = ReduceContext {
        enabled: use_ctx.effective_enabled(),
        masked: use_ctx.masked.clone(),
        matchall: false,
        exclude_all: IndexSet::new(),
    };

    let license = compute_license(inputs.license, &reduce_ctx)
        .map_err(|e| field_error(DepField::License, e))?;
    let depend = compute_dep_class(inputs.depend, &reduce_ctx, &resolved, &is_installed)
        .map_err(|e| field_error(DepField::Depend, e))?;
    let rdepend = compute_dep_class(inputs.rdepend, &reduce_ctx, &resolved, &is_installed)
        .map_err(|e| field_error(DepField::Rdepend, e))?;
    let pdepend = compute_dep_class(inputs.pdepend, &reduce_ctx, &resolved, &is_installed)
        .map_err(|e| field_error(DepField::Pdepend, e))?;
    let provide = compute_dep_class(inputs.provide, &reduce_ctx, &resolved, &is_installed)
        .map_err(|e| field_error(DepField::Provide, e))?;
    let src_uri = compute_src_uri(inputs.src_uri, &reduce_ctx, &is_installed)
        .map_err(|e| field_error(DepField::SrcUri, e))?;

    let mut enabled_use: Vec<String> = resolved.into_iter().collect();
    enabled_use.sort();

    Ok(ComputedFields {
        license,
        depend,
        rdepend,
        pdepend,
        provide,
        src_uri,
        enabled_use,
    })
}

fn field_error(field: DepField, source: Error) -> Error {
    Error::Field(field.to_string(), Box::new(source))
}

fn reduced_tree(raw: &str, ctx: &ReduceContext) -> Result<Vec<DepExpr>> {
    let tree = DepExpr::parse(raw)?;
    let tree = reduce(&tree, ctx)?;
    Ok(normalize(&tree))
}

fn compute_license(raw: &str, ctx: &ReduceContext) -> Result<IndexSet<String>> {
    select_licenses(&reduced_tree(raw, ctx)?)
}

fn compute_dep_class<F>(
    raw: &str,
    ctx: &ReduceContext,
    enabled: &IndexSet<String>,
    is_installed: &F,
) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    let atoms = select(&reduced_tree(raw, ctx)?, is_installed)?;
    Ok(apply_use_constraints(&atoms, enabled)?.iter().join(" "))
}

fn compute_src_uri<F>(raw: &str, ctx: &ReduceContext, is_installed: &F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    let tree = DepExpr::parse(raw)?;
    let tree = strip_source_renames(&tree);
    let tree = reduce(&tree, ctx)?;
    let tree = normalize(&tree);
    Ok(select(&tree, is_installed)?.iter().join(" "))
}
