use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{ConfigBackend, Revision};
use crate::diff::{diff, Diff};
use crate::document::{ConfigDocument, UserId};
use crate::error::{Error, Result};
use crate::version::VersionRef;

/// Turns a [`VersionRef`] into a stored document using the backend's own
/// notion of "latest" and, for explicit versions, its history capability.
pub struct VersionResolver<'a> {
    backend: &'a dyn ConfigBackend,
}

impl<'a> VersionResolver<'a> {
    pub fn new(backend: &'a dyn ConfigBackend) -> Self {
        VersionResolver { backend }
    }

    pub fn resolve(&self, user: &UserId, version: &VersionRef) -> Result<ConfigDocument> {
        let found = match version {
            VersionRef::Latest => self.backend.latest(user)?,
            VersionRef::Explicit(id) => self
                .backend
                .history()
                .ok_or(Error::Unsupported {
                    backend: self.backend.name(),
                    capability: "retrieving explicit versions",
                })?
                .version(user, id)?,
        };
        found.ok_or_else(|| Error::NotFound {
            user: user.to_string(),
            version: version.to_string(),
        })
    }
}

/// Entry point for collaborators: get, save and diff user configurations.
///
/// Holds nothing but the injected backend; every call goes to storage.
pub struct ConfigStore {
    backend: Box<dyn ConfigBackend>,
}

impl ConfigStore {
    pub fn new(backend: Box<dyn ConfigBackend>) -> Self {
        ConfigStore { backend }
    }

    pub fn backend(&self) -> &dyn ConfigBackend {
        self.backend.as_ref()
    }

    fn resolver(&self) -> VersionResolver<'_> {
        VersionResolver::new(self.backend.as_ref())
    }

    pub fn get(&self, user: &UserId, version: &VersionRef) -> Result<ConfigDocument> {
        debug!(%user, %version, backend = self.backend.name(), "get");
        self.resolver().resolve(user, version)
    }

    /// Store `document` under its own version and make it the latest,
    /// whatever versions were saved before.
    pub fn save(&self, user: &UserId, document: ConfigDocument) -> Result<ConfigDocument> {
        self.backend.save(user, &document)?;
        info!(
            %user,
            version = document.version(),
            backend = self.backend.name(),
            "saved configuration"
        );
        Ok(document)
    }

    /// Save a request body under `version`, overriding any `version` it has.
    pub fn save_with_version(
        &self,
        user: &UserId,
        version: &str,
        body: Value,
    ) -> Result<ConfigDocument> {
        let document = ConfigDocument::with_version(body, version)?;
        self.save(user, document)
    }

    /// Changes from `current` to the user's latest version.
    ///
    /// Empty when `current` is the latest version. The `version` fields
    /// themselves are not compared.
    pub fn diff_against_latest(&self, user: &UserId, current: &str) -> Result<Diff> {
        let resolver = self.resolver();
        let current = resolver.resolve(user, &VersionRef::Explicit(current.to_string()))?;
        let latest = resolver.resolve(user, &VersionRef::Latest)?;
        if current.version() == latest.version() {
            debug!(%user, version = current.version(), "current version is the latest");
            return Ok(Diff::empty());
        }
        let d = diff(&current.content(), &latest.content());
        debug!(
            %user,
            from = current.version(),
            to = latest.version(),
            ops = d.len(),
            "computed diff"
        );
        Ok(d)
    }

    /// Save history, for backends that keep one.
    pub fn revisions(&self, user: &UserId) -> Result<Vec<Revision>> {
        self.backend
            .history()
            .ok_or(Error::Unsupported {
                backend: self.backend.name(),
                capability: "listing revisions",
            })?
            .revisions(user)
    }
}
