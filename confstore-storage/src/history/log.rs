//! Append-only revision log.
//!
//! A log file is a sequence of JSON objects, one per save:
//!
//! ```json
//! {
//!   "index": 1,
//!   "meta": { "time": "2024-05-01T10:00:00+00:00", "version": "v2", "message": "Save user config version: v2" },
//!   "patch": [ { "op": "replace", "path": "/theme", "value": "light" } ]
//! }
//! ```
//!
//! The patch of revision `n` turns the document of revision `n - 1` into the
//! document of revision `n`; revision 0 adds the whole document. Replaying
//! the log from the start therefore materializes any past version without
//! consulting anything but the log itself.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use confstore_core::{
    diff, ConfigDocument, Diff, DiffOp, Error, Result, StorageContext as _,
};
use serde_json::{de::IoRead, Deserializer, StreamDeserializer, Value};

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RevisionEvent {
    pub index: u64,
    pub meta: RevisionMeta,
    pub patch: json_patch::Patch,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RevisionMeta {
    pub time: String,
    /// Version id of the document this revision produces
    pub version: String,
    pub message: String,
}

impl RevisionMeta {
    pub fn new(version: &str, time: String) -> RevisionMeta {
        RevisionMeta {
            time,
            version: version.to_string(),
            message: format!("Save user config version: {}", version),
        }
    }
}

pub struct RevisionStream<'a, R: io::Read> {
    iter: StreamDeserializer<'a, IoRead<R>, RevisionEvent>,
    /// Save the validated first event for processing by our caller
    /// (basically prepend it to the iterator)
    first_event: Option<RevisionEvent>,
    next_index: u64,
}

impl<'a, R: io::Read> RevisionStream<'a, R> {
    /// Start reading a log. An empty log has no revisions; a non-empty one
    /// must start at index 0.
    pub fn open_from_reader(reader: R) -> Result<RevisionStream<'a, R>> {
        let deserializer = Deserializer::from_reader(reader);
        let mut iter = deserializer.into_iter();
        let first_event = match iter.next() {
            Some(Ok(ev @ RevisionEvent { index, .. })) => {
                if index != 0 {
                    return Err(Error::malformed(format!(
                        "expected initial revision with index 0, got {}",
                        index
                    )));
                }
                Some(ev)
            }
            Some(Err(e)) => {
                return Err(Error::malformed(format!(
                    "revision log invalid: error parsing initial revision: {}",
                    e
                )))
            }
            None => None,
        };
        Ok(RevisionStream {
            iter,
            first_event,
            next_index: 0,
        })
    }
}

impl<'a, R: io::Read> Iterator for RevisionStream<'a, R> {
    type Item = Result<RevisionEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.first_event.take() {
            Some(ev) => ev,
            None => match self.iter.next()? {
                Ok(ev) => ev,
                Err(e) => {
                    return Some(Err(Error::malformed(format!(
                        "revision log invalid after index {}: {}",
                        self.next_index.saturating_sub(1),
                        e
                    ))))
                }
            },
        };
        if event.index != self.next_index {
            return Some(Err(Error::malformed(format!(
                "revision log out of sequence: expected index {}, got {}",
                self.next_index, event.index
            ))));
        }
        self.next_index += 1;
        Some(Ok(event))
    }
}

pub fn apply_revision(state: &mut Value, event: &RevisionEvent) -> Result<()> {
    json_patch::patch(state, event.patch.0.as_slice()).map_err(|e| {
        Error::malformed(format!(
            "revision {} ({}) does not apply: {}",
            event.index, event.meta.version, e
        ))
    })
}

/// Apply every revision in order, calling `visit` with each event and the
/// document it produces. Returns the final document and the index the next
/// revision will get.
pub fn replay<R: io::Read>(
    reader: R,
    mut visit: impl FnMut(&RevisionEvent, &Value) -> Result<()>,
) -> Result<(Value, u64)> {
    let mut state = Value::Null;
    let mut next_index = 0;
    for event in RevisionStream::open_from_reader(reader)? {
        let event = event?;
        apply_revision(&mut state, &event)?;
        visit(&event, &state)?;
        next_index = event.index + 1;
    }
    Ok((state, next_index))
}

/// Monitor a task which may take a long time, and log messages as needed.
/// After SILENT_INTERVAL: log activity
/// After LOG_INTERVAL: log activity and duration
pub struct WaitMonitor {
    done: Arc<AtomicBool>,
}

impl WaitMonitor {
    const SILENT_INTERVAL: Duration = Duration::from_millis(500);
    const LOG_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(activity: String) -> WaitMonitor {
        let done = Arc::new(AtomicBool::new(false));
        let r = WaitMonitor { done: done.clone() };
        std::thread::spawn(move || {
            WaitMonitor::run(done, activity);
        });
        r
    }

    fn run(done: Arc<AtomicBool>, activity: String) {
        let start = Instant::now();
        let mut next_log = start + Self::SILENT_INTERVAL;
        loop {
            std::thread::sleep(next_log.saturating_duration_since(Instant::now()));
            if done.load(Ordering::Relaxed) {
                break;
            }
            tracing::info!(
                waited_secs = next_log.duration_since(start).as_secs(),
                "{}",
                activity
            );
            next_log += Self::LOG_INTERVAL;
        }
    }

    pub fn done(&self) {
        self.done.store(true, Ordering::Relaxed);
    }
}

impl Drop for WaitMonitor {
    fn drop(&mut self) {
        self.done()
    }
}

/// A user's revision log, opened for appending.
pub struct RevisionLog {
    path: PathBuf,
    locking: fd_lock::RwLock<File>,
}

impl RevisionLog {
    /// Open the log at `path`, creating an empty one if needed.
    pub fn open(path: &Path) -> Result<RevisionLog> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .storage_context(|| format!("opening revision log {}", path.display()))?;
        Ok(RevisionLog {
            path: path.to_path_buf(),
            locking: fd_lock::RwLock::new(file),
        })
    }

    /// Record `document` as the next revision and return the written event.
    ///
    /// Holds an exclusive lock on the log while it reads the previous
    /// revision and appends, so concurrent savers never interleave records.
    pub fn append(&mut self, document: &ConfigDocument, time: String) -> Result<RevisionEvent> {
        let path = self.path.clone();
        let mut guard = {
            let lock_wait_mon = WaitMonitor::new(format!(
                "Waiting for revision log write lock: {}",
                path.display()
            ));
            let guard = self
                .locking
                .write()
                .storage_context(|| format!("locking {}", path.display()))?;
            lock_wait_mon.done();
            guard
        };
        let file: &mut File = &mut guard;

        file.seek(io::SeekFrom::Start(0))
            .storage_context(|| format!("reading {}", path.display()))?;
        let (previous, index) = replay(BufReader::new(&*file), |_, _| Ok(()))?;

        let changes = if index == 0 {
            Diff::from(vec![DiffOp::Add {
                path: confstore_core::Path::root(),
                value: document.as_value().clone(),
            }])
        } else {
            diff(&previous, document.as_value())
        };
        let event = RevisionEvent {
            index,
            meta: RevisionMeta::new(document.version(), time),
            patch: changes.to_json_patch()?,
        };

        // Opened in append mode: writes land at the end whatever the position
        let mut writer = BufWriter::new(&*file);
        // Prettified for human readers, like the rest of the stored files are
        // plain JSON.
        serde_json::to_writer_pretty(&mut writer, &event)
            .map_err(io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .storage_context(|| format!("appending to {}", path.display()))?;
        drop(writer);
        file.sync_data()
            .storage_context(|| format!("syncing {}", path.display()))?;

        drop(guard);
        Ok(event)
    }
}

/// Read a log under a shared lock. `None` when the log does not exist.
pub fn read_locked<T>(path: &Path, f: impl FnOnce(&File) -> Result<T>) -> Result<Option<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::storage(format!("opening {}", path.display()), e)),
    };
    let locking = fd_lock::RwLock::new(file);
    let guard = locking
        .read()
        .storage_context(|| format!("locking {}", path.display()))?;
    f(&guard).map(Some)
}
