use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;

use crate::error::{Error, Result};

/// Default state prefix of a declared USE flag (`+flag` / `-flag`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagDefault {
    /// `+flag` — enabled by default.
    Enabled,
    /// `-flag` — disabled by default.
    Disabled,
}

/// A USE flag declared by a package (one `IUSE` entry).
///
/// The default prefix only documents the package author's suggestion;
/// [`resolve_enabled`] ignores it and decides purely from the
/// user/forced/masked sets, as the legacy resolver did.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclaredFlag {
    /// Flag name, without prefix.
    pub name: String,
    /// Optional `+`/`-` default prefix.
    pub default: Option<FlagDefault>,
}

impl DeclaredFlag {
    /// Parse a whitespace-separated `IUSE` line.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_depexpr::DeclaredFlag;
    ///
    /// let flags = DeclaredFlag::parse_line("+ssl -debug test").unwrap();
    /// assert_eq!(flags.len(), 3);
    /// assert_eq!(flags[0].name, "ssl");
    /// ```
    pub fn parse_line(input: &str) -> Result<Vec<DeclaredFlag>> {
        input.split_whitespace().map(str::parse).collect()
    }
}

impl FromStr for DeclaredFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (default, name) = if let Some(name) = s.strip_prefix('+') {
            (Some(FlagDefault::Enabled), name)
        } else if let Some(name) = s.strip_prefix('-') {
            (Some(FlagDefault::Disabled), name)
        } else {
            (None, s)
        };
        if name.is_empty() {
            return Err(Error::InvalidFlag(s.to_string()));
        }
        Ok(DeclaredFlag {
            name: name.to_string(),
            default,
        })
    }
}

impl fmt::Display for DeclaredFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.default {
            Some(FlagDefault::Enabled) => write!(f, "+{}", self.name),
            Some(FlagDefault::Disabled) => write!(f, "-{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Read-only snapshot of the settings collaborator's flag sets for one
/// package reduction.
#[derive(Debug, Clone, Default)]
pub struct UseContext {
    /// User-enabled flags (the raw `USE` set).
    pub enabled: IndexSet<String>,
    /// Flags forcibly disabled regardless of `enabled`.
    pub masked: IndexSet<String>,
    /// Flags forcibly enabled regardless of `enabled`.
    pub forced: IndexSet<String>,
}

impl UseContext {
    /// The set USE conditionals are evaluated against: user-enabled
    /// plus forced flags. Masking is applied separately by the guard
    /// evaluation and by [`resolve_enabled`].
    pub fn effective_enabled(&self) -> IndexSet<String> {
        self.enabled.union(&self.forced).cloned().collect()
    }
}

/// Resolve the enabled flag set for one package: a declared flag is
/// enabled iff it is user-enabled or forced, and not masked.
///
/// # Examples
///
/// ```
/// use indexmap::IndexSet;
/// use portage_depexpr::{resolve_enabled, DeclaredFlag};
///
/// let declared = DeclaredFlag::parse_line("+ssl debug static").unwrap();
/// let user = IndexSet::from(["ssl".to_string(), "debug".to_string()]);
/// let forced = IndexSet::from(["static".to_string()]);
/// let masked = IndexSet::from(["debug".to_string()]);
///
/// let enabled = resolve_enabled(&declared, &user, &forced, &masked);
/// assert!(enabled.contains("ssl"));
/// assert!(enabled.contains("static"));
/// assert!(!enabled.contains("debug"));
/// ```
pub fn resolve_enabled(
    declared: &[DeclaredFlag],
    enabled_use: &IndexSet<String>,
    forced: &IndexSet<String>,
    masked: &IndexSet<String>,
) -> IndexSet<String> {
    declared
        .iter()
        .filter(|flag| {
            (enabled_use.contains(&flag.name) || forced.contains(&flag.name))
                && !masked.contains(&flag.name)
        })
        .map(|flag| flag.name.clone())
        .collect()
}
