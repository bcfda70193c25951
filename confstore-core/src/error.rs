use std::error::Error as StdError;

/// Failure of a store operation.
///
/// Callers must be able to tell "could not resolve" ([`Error::NotFound`])
/// apart from "storage broke" ([`Error::StorageFault`]); an empty
/// [`crate::Diff`] is not an error at all.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no configuration stored for user '{user}' at {version}")]
    NotFound { user: String, version: String },

    #[error("{context}: {source}")]
    StorageFault {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("malformed configuration document: {0}")]
    MalformedDocument(String),

    #[error("the {backend} backend does not support {capability}")]
    Unsupported {
        backend: &'static str,
        capability: &'static str,
    },

    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn storage(
        context: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Error {
        Error::StorageFault {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Error {
        Error::MalformedDocument(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Attach a description of the failed operation to an I/O style error.
///
/// Mirrors `anyhow::Context` for the typed [`Error`].
pub trait StorageContext<T> {
    fn storage_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> StorageContext<T> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn storage_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::storage(f(), e))
    }
}
