use serde::Serialize;

use crate::document::{ConfigDocument, UserId};
use crate::error::Result;

/// Storage for user configuration documents.
///
/// Every backend can store a document and return the user's latest one.
/// Retrieving an older version is a separate capability, [`VersionHistory`],
/// which a backend advertises through [`ConfigBackend::history`].
pub trait ConfigBackend: Send + Sync {
    /// Short name for messages, e.g. `"filesystem"`.
    fn name(&self) -> &'static str;

    /// The document the user's latest pointer refers to, if any.
    fn latest(&self, user: &UserId) -> Result<Option<ConfigDocument>>;

    /// Persist `document` under its version and make it the latest.
    ///
    /// Must not publish the new latest pointer before the document itself
    /// has been written.
    fn save(&self, user: &UserId, document: &ConfigDocument) -> Result<()>;

    /// Access to past versions, for backends that keep them.
    fn history(&self) -> Option<&dyn VersionHistory> {
        None
    }
}

/// Retrieval of explicitly named versions.
pub trait VersionHistory {
    /// The document saved as `version`, if that version exists for `user`.
    fn version(&self, user: &UserId, version: &str) -> Result<Option<ConfigDocument>>;

    /// Saved revisions in save order.
    fn revisions(&self, user: &UserId) -> Result<Vec<Revision>>;
}

/// Metadata of one save, as recorded by a history-keeping backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revision {
    /// Position in the user's history, starting at 0
    pub index: u64,
    pub version: String,
    /// RFC 3339 timestamp, when the backend records one
    pub time: Option<String>,
}

impl<B: ConfigBackend + ?Sized> ConfigBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn latest(&self, user: &UserId) -> Result<Option<ConfigDocument>> {
        (**self).latest(user)
    }

    fn save(&self, user: &UserId, document: &ConfigDocument) -> Result<()> {
        (**self).save(user, document)
    }

    fn history(&self) -> Option<&dyn VersionHistory> {
        (**self).history()
    }
}
