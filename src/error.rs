/// Error type for dependency-expression parsing and reduction.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed dependency expression: unbalanced parenthesis, `||`
    /// without a following group, or a USE conditional with no target.
    #[error("invalid dependency expression: {0}")]
    InvalidExpr(String),

    /// Malformed per-atom USE constraint clause (`atom[...]` suffix).
    #[error("invalid USE constraint: {0}")]
    InvalidConstraint(String),

    /// Invalid declared USE flag entry (IUSE).
    #[error("invalid USE flag entry: {0}")]
    InvalidFlag(String),

    /// A metadata field failed to compute; carries the field name and
    /// the underlying failure.
    #[error("error computing {0}: {1}")]
    Field(String, Box<Error>),

    /// A pipeline stage received a tree shape an earlier stage should
    /// have eliminated. This is a defect in the caller or the library,
    /// not in the input data.
    #[error("dependency pipeline invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// `true` for errors caused by malformed input data, `false` for
    /// programming-error-class invariant violations.
    pub fn is_malformed_input(&self) -> bool {
        match self {
            Error::Invariant(_) => false,
            Error::Field(_, source) => source.is_malformed_input(),
            _ => true,
        }
    }
}

/// Result type for portage-depexpr operations.
pub type Result<T> = std::result::Result<T, Error>;
