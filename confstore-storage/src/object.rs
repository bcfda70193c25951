//! Backend keeping exactly one object per user in an object-store bucket.
//!
//! Objects are named `<user>/config.json` and overwritten on every save.
//! There is no history: explicit versions are reported as unsupported
//! rather than answered with whatever object happens to be stored.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use confstore_core::{is_safe_name, ConfigBackend, ConfigDocument, Error, Result, UserId};
use tracing::debug;

use crate::files::{ensure_dir, write_atomic};

/// Minimal object-store client surface used by [`ObjectStoreBackend`].
pub trait ObjectClient: Send + Sync {
    /// Create `bucket` unless it exists.
    fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// `None` when the bucket has no object named `key`.
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous object atomically.
    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()>;
}

pub struct ObjectStoreBackend {
    client: Arc<dyn ObjectClient>,
    bucket: String,
}

impl ObjectStoreBackend {
    /// Use `bucket` through `client`, creating the bucket if needed.
    pub fn open(client: Arc<dyn ObjectClient>, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        client.ensure_bucket(&bucket)?;
        Ok(ObjectStoreBackend { client, bucket })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_key(user: &UserId) -> String {
        format!("{}/config.json", user)
    }
}

impl ConfigBackend for ObjectStoreBackend {
    fn name(&self) -> &'static str {
        "object-store"
    }

    fn latest(&self, user: &UserId) -> Result<Option<ConfigDocument>> {
        let key = Self::object_key(user);
        match self.client.get_object(&self.bucket, &key)? {
            Some(bytes) => ConfigDocument::from_slice(&bytes).map(Some).map_err(|e| match e {
                Error::MalformedDocument(reason) => {
                    Error::MalformedDocument(format!("{}/{}: {}", self.bucket, key, reason))
                }
                other => other,
            }),
            None => Ok(None),
        }
    }

    fn save(&self, user: &UserId, document: &ConfigDocument) -> Result<()> {
        let key = Self::object_key(user);
        self.client
            .put_object(&self.bucket, &key, &document.to_vec()?)?;
        debug!(bucket = %self.bucket, %key, "put object");
        Ok(())
    }
}

fn check_bucket(bucket: &str) -> Result<()> {
    if is_safe_name(bucket) {
        Ok(())
    } else {
        Err(Error::storage(
            format!("invalid bucket name {:?}", bucket),
            io::Error::from(io::ErrorKind::InvalidInput),
        ))
    }
}

fn missing_bucket(bucket: &str) -> Error {
    Error::storage(
        format!("bucket {:?} does not exist", bucket),
        io::Error::from(io::ErrorKind::NotFound),
    )
}

/// Buckets as directories under an endpoint directory; object keys map to
/// relative paths inside the bucket.
pub struct DirectoryClient {
    endpoint: PathBuf,
}

impl DirectoryClient {
    pub fn new(endpoint: impl Into<PathBuf>) -> Self {
        DirectoryClient {
            endpoint: endpoint.into(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        check_bucket(bucket)?;
        let mut path = self.endpoint.join(bucket);
        for segment in key.split('/') {
            if !is_safe_name(segment) {
                return Err(Error::storage(
                    format!("invalid object key {:?}", key),
                    io::Error::from(io::ErrorKind::InvalidInput),
                ));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

impl ObjectClient for DirectoryClient {
    fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket(bucket)?;
        ensure_dir(&self.endpoint.join(bucket))
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key)?;
        if !self.endpoint.join(bucket).is_dir() {
            return Err(missing_bucket(bucket));
        }
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!("reading {}", path.display()), e)),
        }
    }

    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if !self.endpoint.join(bucket).is_dir() {
            return Err(missing_bucket(bucket));
        }
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        write_atomic(&path, bytes)
    }
}

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// In-process buckets, for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryClient {
    buckets: Mutex<Buckets>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn buckets(&self) -> Result<MutexGuard<'_, Buckets>> {
        self.buckets.lock().map_err(|_| {
            Error::storage(
                "memory object store",
                io::Error::new(io::ErrorKind::Other, "lock poisoned"),
            )
        })
    }
}

impl ObjectClient for MemoryClient {
    fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket(bucket)?;
        self.buckets()?.entry(bucket.to_string()).or_default();
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let buckets = self.buckets()?;
        let objects = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        Ok(objects.get(key).cloned())
    }

    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let mut buckets = self.buckets()?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
