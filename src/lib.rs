//! Dependency-expression engine for Portage-style package metadata.
//!
//! Build recipes attach conditionally guarded, parenthesized dependency
//! expressions to their metadata fields (`DEPEND`, `RDEPEND`, `PDEPEND`,
//! `PROVIDE`, `LICENSE`, `SRC_URI`). This crate parses those expressions,
//! reduces them against the enabled/masked/forced USE-flag sets, rewrites
//! per-atom USE constraints, and selects a single satisfiable alternative
//! from each `|| ( ... )` group against an installed-package oracle.
//!
//! The grammar follows [PMS 8.2]; atoms themselves are opaque strings
//! here — version and slot matching belongs to the package index, not to
//! this engine.
//!
//! [PMS 8.2]: https://projects.gentoo.org/pms/9/pms.html#dependency-specification-format
//!
//! # Overview
//!
//! The engine is a pipeline of pure functions over an immutable
//! expression tree ([`DepExpr`]):
//!
//! 1. [`DepExpr::parse`] — structure only, no flag knowledge;
//! 2. [`reduce`] — evaluate `flag?` conditionals against a
//!    [`ReduceContext`];
//! 3. [`normalize`] — collapse redundant nesting;
//! 4. [`select`] / [`select_licenses`] — pick a satisfiable branch from
//!    each choice group;
//! 5. [`apply_use_constraints`] — rewrite `atom[flag?]`-style suffixes.
//!
//! [`compute_dependency_fields`] drives the pipeline per metadata field.
//! No stage performs I/O or reads shared state, so packages can be
//! processed concurrently with per-package snapshots of the flag sets.
//!
//! # Examples
//!
//! ```
//! use indexmap::IndexSet;
//! use portage_depexpr::{compute_dependency_fields, FieldInputs, UseContext};
//!
//! let inputs = FieldInputs {
//!     iuse: "ssl",
//!     depend: "dev-libs/base ssl? ( dev-libs/openssl )",
//!     rdepend: "|| ( x11-libs/gtk x11-libs/qt )",
//!     ..Default::default()
//! };
//! let ctx = UseContext {
//!     enabled: IndexSet::from(["ssl".to_string()]),
//!     ..Default::default()
//! };
//! let installed = |atom: &str| atom == "x11-libs/qt";
//!
//! let fields = compute_dependency_fields(&inputs, &ctx, installed).unwrap();
//! assert_eq!(fields.depend, "dev-libs/base dev-libs/openssl");
//! assert_eq!(fields.rdepend, "x11-libs/qt");
//! ```

mod constraint;
mod error;
mod expr;
mod fields;
mod normalize;
mod reduce;
mod select;
mod useflags;

// Re-export public types
pub use constraint::{apply_use_constraints, ConstraintKind, UseConstraint};
pub use error::{Error, Result};
pub use expr::{DepExpr, UseGuard};
pub use fields::{
    compute_dependency_fields, strip_source_renames, ComputedFields, DepField, FieldInputs,
};
pub use normalize::normalize;
pub use reduce::{reduce, ReduceContext};
pub use select::{select, select_licenses};
pub use useflags::{resolve_enabled, DeclaredFlag, FlagDefault, UseContext};
