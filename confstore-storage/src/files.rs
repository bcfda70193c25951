use std::fs;
use std::io::{self, Write as _};
use std::path::Path;

use confstore_core::{ConfigDocument, Error, Result, StorageContext as _};
use tracing::debug;

/// Read a stored document; `None` if the file does not exist.
pub(crate) fn read_document(path: &Path) -> Result<Option<ConfigDocument>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::storage(format!("reading {}", path.display()), e)),
    };
    debug!(path = %path.display(), size = bytes.len(), "read document");
    ConfigDocument::from_slice(&bytes)
        .map(Some)
        .map_err(|e| match e {
            Error::MalformedDocument(reason) => {
                Error::MalformedDocument(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
}

/// Replace `path` with `bytes` so that readers see either the old or the
/// new contents, never a mix.
///
/// The data is written to a temporary file next to `path` and renamed over
/// it once complete.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::malformed(format!("{} has no parent", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .storage_context(|| format!("creating temporary file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_data())
        .storage_context(|| format!("writing {}", tmp.path().display()))?;
    tmp.persist(path)
        .storage_context(|| format!("replacing {}", path.display()))?;
    debug!(path = %path.display(), size = bytes.len(), "wrote file");
    Ok(())
}

pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .storage_context(|| format!("creating storage directory {}", path.display()))
}
