//! One JSON file per saved version plus a per-user "latest" file.
//!
//! Layout under the storage root:
//!
//! ```text
//! <user>_<version>.json   every saved version
//! <user>_latest.json      copy of the most recently saved version
//! ```
//!
//! `%` and `_` in the user part are percent-escaped, so the first `_` of a
//! file name always ends the user id and no two (user, version) pairs share
//! a file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use confstore_core::{
    is_safe_name, ConfigBackend, ConfigDocument, Error, Result, Revision, StorageContext as _,
    UserId, VersionHistory,
};
use tracing::warn;

use crate::files::{ensure_dir, read_document, write_atomic};

const LATEST: &str = "latest";

pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Use `root` as the storage directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<FilesystemBackend> {
        let backend = FilesystemBackend { root: root.into() };
        ensure_dir(&backend.root)?;
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_path(&self, user: &UserId, version: &str) -> PathBuf {
        self.root.join(format!("{}_{}.json", file_prefix(user), version))
    }

    fn latest_path(&self, user: &UserId) -> PathBuf {
        self.root.join(format!("{}_{}.json", file_prefix(user), LATEST))
    }
}

/// User part of a file name, with `%` and `_` escaped.
fn file_prefix(user: &UserId) -> String {
    let mut prefix = String::with_capacity(user.as_str().len());
    for c in user.as_str().chars() {
        match c {
            '%' => prefix.push_str("%25"),
            '_' => prefix.push_str("%5F"),
            c => prefix.push(c),
        }
    }
    prefix
}

/// Stored under `path` as `expected`, but the document says otherwise.
fn mismatched_version(path: &Path, expected: &str, found: &str) -> Error {
    Error::malformed(format!(
        "{} should hold version {:?} but holds {:?}",
        path.display(),
        expected,
        found
    ))
}

/// Whether `version` can name a file without clashing with the layout.
fn is_storable_version(version: &str) -> bool {
    is_safe_name(version) && version != LATEST
}

impl ConfigBackend for FilesystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn latest(&self, user: &UserId) -> Result<Option<ConfigDocument>> {
        let Some(pointer) = read_document(&self.latest_path(user))? else {
            return Ok(None);
        };
        if !is_storable_version(pointer.version()) {
            return Err(Error::malformed(format!(
                "{} names unusable version {:?}",
                self.latest_path(user).display(),
                pointer.version()
            )));
        }
        let path = self.version_path(user, pointer.version());
        match read_document(&path)? {
            Some(doc) if doc.version() != pointer.version() => Err(mismatched_version(
                &path,
                pointer.version(),
                doc.version(),
            )),
            Some(doc) => Ok(Some(doc)),
            None => {
                warn!(
                    %user,
                    version = pointer.version(),
                    "versioned file missing, using the latest pointer's copy"
                );
                Ok(Some(pointer))
            }
        }
    }

    fn save(&self, user: &UserId, document: &ConfigDocument) -> Result<()> {
        let version = document.version();
        if !is_storable_version(version) {
            return Err(Error::malformed(format!(
                "version id {:?} cannot be stored by the filesystem backend",
                version
            )));
        }
        ensure_dir(&self.root)?;
        let bytes = document.to_vec()?;
        let path = self.version_path(user, version);
        if path.exists() {
            warn!(%user, version, "version already saved, replacing it");
        }
        write_atomic(&path, &bytes)?;
        write_atomic(&self.latest_path(user), &bytes)
    }

    fn history(&self) -> Option<&dyn VersionHistory> {
        Some(self)
    }
}

impl VersionHistory for FilesystemBackend {
    fn version(&self, user: &UserId, version: &str) -> Result<Option<ConfigDocument>> {
        if !is_storable_version(version) {
            return Ok(None);
        }
        let path = self.version_path(user, version);
        match read_document(&path)? {
            Some(doc) if doc.version() != version => {
                Err(mismatched_version(&path, version, doc.version()))
            }
            found => Ok(found),
        }
    }

    /// Versions ordered by file modification time.
    ///
    /// A file only counts when its `version` field matches the name it is
    /// stored under.
    fn revisions(&self, user: &UserId) -> Result<Vec<Revision>> {
        let prefix = format!("{}_", file_prefix(user));
        let entries = fs::read_dir(&self.root)
            .storage_context(|| format!("listing {}", self.root.display()))?;

        let mut found: Vec<(SystemTime, String)> = Vec::new();
        for entry in entries {
            let entry = entry.storage_context(|| format!("listing {}", self.root.display()))?;
            let file_name = entry.file_name();
            let Some(version) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if !is_storable_version(version) {
                continue;
            }
            match read_document(&entry.path())? {
                Some(doc) if doc.version() == version => {}
                _ => continue,
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .storage_context(|| format!("reading metadata of {}", entry.path().display()))?;
            found.push((modified, version.to_string()));
        }
        found.sort();

        Ok(found
            .into_iter()
            .enumerate()
            .map(|(index, (modified, version))| Revision {
                index: index as u64,
                version,
                time: Some(DateTime::<Utc>::from(modified).to_rfc3339()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confstore_core::{ConfigStore, VersionRef};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> ConfigDocument {
        ConfigDocument::new(value).unwrap()
    }

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        backend
            .save(&u, &doc(json!({"version": "v1", "theme": "dark"})))
            .unwrap();

        let versioned: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("u1_v1.json")).unwrap()).unwrap();
        let latest: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("u1_latest.json")).unwrap()).unwrap();
        assert_eq!(versioned, json!({"version": "v1", "theme": "dark"}));
        assert_eq!(latest, versioned);
    }

    #[test]
    fn test_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        let backend = FilesystemBackend::open(&root).unwrap();
        assert!(root.is_dir());

        // Removed behind our back: recreated before the next write
        fs::remove_dir_all(&root).unwrap();
        let u = UserId::new("u1").unwrap();
        backend.save(&u, &doc(json!({"version": "v1"}))).unwrap();
        assert!(root.join("u1_v1.json").is_file());
    }

    #[test]
    fn test_rejects_reserved_version() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        for bad in ["latest", "a/b", ".."] {
            assert!(matches!(
                backend.save(&u, &doc(json!({ "version": bad }))),
                Err(Error::MalformedDocument(_))
            ));
        }
        assert_eq!(backend.version(&u, "latest").unwrap(), None);
    }

    #[test]
    fn test_latest_survives_missing_versioned_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        let d = doc(json!({"version": "v1", "a": 1}));
        backend.save(&u, &d).unwrap();
        fs::remove_file(dir.path().join("u1_v1.json")).unwrap();
        assert_eq!(backend.latest(&u).unwrap(), Some(d));
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(Box::new(FilesystemBackend::open(dir.path()).unwrap()));
        let u = UserId::new("u1").unwrap();
        let v1 = doc(json!({"version": "v1", "theme": "dark", "retries": 3}));
        let v2 = doc(json!({"version": "v2", "theme": "light", "retries": 3}));
        store.save(&u, v1.clone()).unwrap();
        store.save(&u, v2.clone()).unwrap();

        assert_eq!(store.get(&u, &VersionRef::from("v1")).unwrap(), v1);
        assert_eq!(store.get(&u, &VersionRef::Latest).unwrap(), v2);
        assert!(store
            .get(&u, &VersionRef::from("nonexistent"))
            .unwrap_err()
            .is_not_found());
        let d = store.diff_against_latest(&u, "v1").unwrap();
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            json!([{"op": "replace", "path": "/theme", "value": "light"}])
        );
        assert!(store.diff_against_latest(&u, "v2").unwrap().is_empty());
    }

    #[test]
    fn test_users_sharing_a_name_prefix_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(Box::new(FilesystemBackend::open(dir.path()).unwrap()));
        let a = UserId::new("a").unwrap();
        let a_b = UserId::new("a_b").unwrap();
        let victim = doc(json!({"version": "v1", "who": "a_b"}));
        store.save(&a_b, victim.clone()).unwrap();
        store
            .save(&a, doc(json!({"version": "b_latest", "who": "a"})))
            .unwrap();
        store
            .save(&a, doc(json!({"version": "b_v1", "who": "a"})))
            .unwrap();

        assert_eq!(store.get(&a_b, &VersionRef::Latest).unwrap(), victim);
        assert_eq!(store.get(&a_b, &VersionRef::from("v1")).unwrap(), victim);
        assert_eq!(
            store.get(&a, &VersionRef::from("b_latest")).unwrap().as_value()["who"],
            "a"
        );
        assert!(dir.path().join("a%5Fb_v1.json").is_file());
        assert!(dir.path().join("a_b_v1.json").is_file());
        assert_eq!(file_prefix(&UserId::new("x%_y").unwrap()), "x%25%5Fy");
    }

    #[test]
    fn test_version_field_must_match_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        backend.save(&u, &doc(json!({"version": "v1"}))).unwrap();
        fs::write(dir.path().join("u1_v2.json"), br#"{"version":"v1"}"#).unwrap();
        assert!(matches!(
            backend.version(&u, "v2"),
            Err(Error::MalformedDocument(_))
        ));

        fs::write(dir.path().join("u1_v1.json"), br#"{"version":"v9"}"#).unwrap();
        assert!(matches!(
            backend.latest(&u),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_resave_replaces_version() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        backend.save(&u, &doc(json!({"version": "v1", "a": 1}))).unwrap();
        backend.save(&u, &doc(json!({"version": "v2", "a": 2}))).unwrap();
        let resaved = doc(json!({"version": "v1", "a": 3}));
        backend.save(&u, &resaved).unwrap();
        assert_eq!(backend.version(&u, "v1").unwrap(), Some(resaved.clone()));
        assert_eq!(backend.latest(&u).unwrap(), Some(resaved));
    }

    #[test]
    fn test_unwritable_root_is_storage_fault() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let backend = FilesystemBackend::open(&root).unwrap();
        fs::remove_dir_all(&root).unwrap();
        fs::write(&root, b"not a directory").unwrap();

        let u = UserId::new("u1").unwrap();
        assert!(matches!(
            backend.save(&u, &doc(json!({"version": "v1"}))),
            Err(Error::StorageFault { .. })
        ));
    }

    #[test]
    fn test_revisions_ignore_other_users() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path()).unwrap();
        let a = UserId::new("a").unwrap();
        let a_b = UserId::new("a_b").unwrap();
        backend.save(&a, &doc(json!({"version": "v1"}))).unwrap();
        backend.save(&a_b, &doc(json!({"version": "v1"}))).unwrap();

        let versions: Vec<String> = backend
            .revisions(&a)
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec!["v1"]);
        let revisions = backend.revisions(&a_b).unwrap();
        assert_eq!(revisions.len(), 1);
        assert!(revisions[0].time.is_some());
    }
}
