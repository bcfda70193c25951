use std::fmt::Display;

/// Which stored version of a user's configuration a read refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionRef {
    /// Whatever the user's latest pointer currently names
    Latest,
    Explicit(String),
}

impl VersionRef {
    /// `None` (no version requested) means the latest version.
    pub fn from_option(version: Option<String>) -> VersionRef {
        match version {
            Some(v) => VersionRef::Explicit(v),
            None => VersionRef::Latest,
        }
    }
}

impl From<Option<String>> for VersionRef {
    fn from(version: Option<String>) -> Self {
        VersionRef::from_option(version)
    }
}

impl From<&str> for VersionRef {
    fn from(version: &str) -> Self {
        VersionRef::Explicit(version.to_string())
    }
}

impl Display for VersionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionRef::Latest => write!(f, "latest version"),
            VersionRef::Explicit(v) => write!(f, "version {}", v),
        }
    }
}
