//! Versioned per-user configuration documents.
//!
//! A [`ConfigStore`] wraps one [`ConfigBackend`] chosen at startup and
//! answers three questions for a user: what is stored at a version, store
//! this document, and what changed between a version and the latest one.
//! The last one is computed by the structural [`diff`] engine and reported
//! as a list of JSON Patch style operations.
//!
//! Backends live in `confstore-storage`.

pub mod backend;
pub mod diff;
pub mod document;
pub mod error;
pub mod store;
pub mod version;

pub use backend::{ConfigBackend, Revision, VersionHistory};
pub use diff::{diff, Diff, DiffOp, Path, PathStep};
pub use document::{is_safe_name, ConfigDocument, UserId, VERSION_FIELD};
pub use error::{Error, Result, StorageContext};
pub use store::{ConfigStore, VersionResolver};
pub use version::VersionRef;
