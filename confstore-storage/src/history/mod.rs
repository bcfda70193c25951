//! Backend that records every save in a per-user revision log.
//!
//! ```text
//! <root>/<user>_config.json     current document, rewritten on every save
//! <root>/.history/<user>.log    revision log, appended on every save
//! ```
//!
//! Explicit versions are materialized from the log only. The current-state
//! file is a read shortcut for the latest version and is never consulted
//! for history, so overwriting it cannot lose a past version.

pub mod log;

use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::Utc;
use confstore_core::{
    ConfigBackend, ConfigDocument, Error, Result, Revision, UserId, VersionHistory,
};
use tracing::debug;

use crate::files::{ensure_dir, read_document, write_atomic};
use self::log::{read_locked, replay, RevisionLog, RevisionStream};

const HISTORY_DIR: &str = ".history";

pub struct HistoryBackend {
    root: PathBuf,
}

impl HistoryBackend {
    /// Use `root` as the repository directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<HistoryBackend> {
        let backend = HistoryBackend { root: root.into() };
        ensure_dir(&backend.history_dir())?;
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn history_dir(&self) -> PathBuf {
        self.root.join(HISTORY_DIR)
    }

    fn current_path(&self, user: &UserId) -> PathBuf {
        self.root.join(format!("{}_config.json", user))
    }

    fn log_path(&self, user: &UserId) -> PathBuf {
        self.history_dir().join(format!("{}.log", user))
    }
}

impl ConfigBackend for HistoryBackend {
    fn name(&self) -> &'static str {
        "history"
    }

    fn latest(&self, user: &UserId) -> Result<Option<ConfigDocument>> {
        read_document(&self.current_path(user))
    }

    fn save(&self, user: &UserId, document: &ConfigDocument) -> Result<()> {
        ensure_dir(&self.history_dir())?;
        let mut log = RevisionLog::open(&self.log_path(user))?;
        let event = log.append(document, Utc::now().to_rfc3339())?;
        debug!(
            %user,
            index = event.index,
            version = %event.meta.version,
            ops = event.patch.0.len(),
            "appended revision"
        );
        write_atomic(&self.current_path(user), &document.to_vec()?)
    }

    fn history(&self) -> Option<&dyn VersionHistory> {
        Some(self)
    }
}

impl VersionHistory for HistoryBackend {
    /// The document as of the most recent revision tagged `version`.
    fn version(&self, user: &UserId, version: &str) -> Result<Option<ConfigDocument>> {
        let found = read_locked(&self.log_path(user), |file| {
            let mut found: Option<serde_json::Value> = None;
            replay(BufReader::new(file), |event, state| {
                if event.meta.version == version {
                    found = Some(state.clone());
                }
                Ok(())
            })?;
            Ok(found)
        })?
        .flatten();

        let Some(value) = found else {
            return Ok(None);
        };
        let document = ConfigDocument::new(value)?;
        if document.version() != version {
            return Err(Error::malformed(format!(
                "revision log of user '{}' tags version {:?} but materializes {:?}",
                user,
                version,
                document.version()
            )));
        }
        Ok(Some(document))
    }

    fn revisions(&self, user: &UserId) -> Result<Vec<Revision>> {
        let revisions = read_locked(&self.log_path(user), |file| {
            RevisionStream::open_from_reader(BufReader::new(file))?
                .map(|event| {
                    event.map(|event| Revision {
                        index: event.index,
                        version: event.meta.version,
                        time: Some(event.meta.time),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(revisions.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confstore_core::{ConfigStore, VersionRef};
    use serde_json::json;
    use std::fs;

    fn doc(value: serde_json::Value) -> ConfigDocument {
        ConfigDocument::new(value).unwrap()
    }

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HistoryBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        backend.save(&u, &doc(json!({"version": "v1"}))).unwrap();
        assert!(dir.path().join("u1_config.json").is_file());
        assert!(dir.path().join(".history").join("u1.log").is_file());
    }

    #[test]
    fn test_explicit_versions_come_from_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HistoryBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        let v1 = doc(json!({"version": "v1", "theme": "dark", "list": [1, 2, 3]}));
        let v2 = doc(json!({"version": "v2", "theme": "light", "list": [1]}));
        let v3 = doc(json!({"version": "v3", "theme": "light", "list": [], "new": true}));
        for d in [&v1, &v2, &v3] {
            backend.save(&u, d).unwrap();
        }

        // Tamper with the current-state file; history must not notice
        fs::write(
            dir.path().join("u1_config.json"),
            br#"{"version":"v1","theme":"tampered"}"#,
        )
        .unwrap();

        assert_eq!(backend.version(&u, "v1").unwrap(), Some(v1));
        assert_eq!(backend.version(&u, "v2").unwrap(), Some(v2));
        assert_eq!(backend.version(&u, "v3").unwrap(), Some(v3));
        assert_eq!(backend.version(&u, "v4").unwrap(), None);
    }

    #[test]
    fn test_latest_reads_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HistoryBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        assert_eq!(backend.latest(&u).unwrap(), None);
        backend.save(&u, &doc(json!({"version": "v1"}))).unwrap();
        backend.save(&u, &doc(json!({"version": "v0"}))).unwrap();
        assert_eq!(backend.latest(&u).unwrap().unwrap().version(), "v0");
    }

    #[test]
    fn test_resaved_version_resolves_to_last_save() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HistoryBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        backend.save(&u, &doc(json!({"version": "v1", "a": 1}))).unwrap();
        backend.save(&u, &doc(json!({"version": "v2", "a": 2}))).unwrap();
        backend.save(&u, &doc(json!({"version": "v1", "a": 3}))).unwrap();
        assert_eq!(
            backend.version(&u, "v1").unwrap().unwrap().as_value(),
            &json!({"version": "v1", "a": 3})
        );
    }

    #[test]
    fn test_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HistoryBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        assert!(backend.revisions(&u).unwrap().is_empty());
        backend.save(&u, &doc(json!({"version": "b"}))).unwrap();
        backend.save(&u, &doc(json!({"version": "a"}))).unwrap();
        let revisions = backend.revisions(&u).unwrap();
        assert_eq!(
            revisions
                .iter()
                .map(|r| (r.index, r.version.as_str()))
                .collect::<Vec<_>>(),
            vec![(0, "b"), (1, "a")]
        );
    }

    #[test]
    fn test_corrupt_log_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HistoryBackend::open(dir.path()).unwrap();
        let u = UserId::new("u1").unwrap();
        fs::write(dir.path().join(".history").join("u1.log"), b"{ nope").unwrap();
        assert!(matches!(
            backend.version(&u, "v1"),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_unwritable_history_dir_is_storage_fault() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HistoryBackend::open(dir.path()).unwrap();
        let history = dir.path().join(".history");
        fs::remove_dir_all(&history).unwrap();
        fs::write(&history, b"not a directory").unwrap();

        let u = UserId::new("u1").unwrap();
        assert!(matches!(
            backend.save(&u, &doc(json!({"version": "v1"}))),
            Err(Error::StorageFault { .. })
        ));
        assert_eq!(backend.latest(&u).unwrap(), None);
    }

    #[test]
    fn test_store_scenarios() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(Box::new(HistoryBackend::open(dir.path()).unwrap()));
        let u = UserId::new("u1").unwrap();
        store
            .save(&u, doc(json!({"version": "v1", "a": 1})))
            .unwrap();
        store
            .save(&u, doc(json!({"version": "v2", "b": 2})))
            .unwrap();
        let d = store.diff_against_latest(&u, "v1").unwrap();
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            json!([
                {"op": "remove", "path": "/a"},
                {"op": "add", "path": "/b", "value": 2},
            ])
        );
        assert!(store.diff_against_latest(&u, "v2").unwrap().is_empty());
        assert_eq!(
            store.get(&u, &VersionRef::from("v1")).unwrap().as_value(),
            &json!({"version": "v1", "a": 1})
        );
    }
}
