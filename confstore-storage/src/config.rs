use std::path::PathBuf;
use std::sync::Arc;

use confstore_core::{ConfigBackend, Result};
use serde::{Deserialize, Serialize};

use crate::fs::FilesystemBackend;
use crate::history::HistoryBackend;
use crate::object::{DirectoryClient, ObjectStoreBackend};

/// Which backend a deployment uses and where it keeps its data.
///
/// Exactly one is active per process. In JSON form:
///
/// ```json
/// { "backend": "filesystem", "path": "/var/lib/confstore" }
/// { "backend": "history", "path": "/var/lib/confstore-repo" }
/// { "backend": "object-store", "bucket": "configs", "endpoint": "/srv/objects" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case", deny_unknown_fields)]
pub enum BackendConfig {
    Filesystem {
        path: PathBuf,
    },
    History {
        path: PathBuf,
    },
    ObjectStore {
        bucket: String,
        /// Directory holding the buckets
        endpoint: PathBuf,
    },
}

impl BackendConfig {
    /// Construct the configured backend, creating its storage if needed.
    pub fn open(&self) -> Result<Box<dyn ConfigBackend>> {
        Ok(match self {
            BackendConfig::Filesystem { path } => Box::new(FilesystemBackend::open(path)?),
            BackendConfig::History { path } => Box::new(HistoryBackend::open(path)?),
            BackendConfig::ObjectStore { bucket, endpoint } => Box::new(ObjectStoreBackend::open(
                Arc::new(DirectoryClient::new(endpoint)),
                bucket,
            )?),
        })
    }
}
