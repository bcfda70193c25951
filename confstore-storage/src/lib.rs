//! Storage backends for `confstore`.
//!
//! - [`FilesystemBackend`]: a file per version and a "latest" file per user.
//! - [`HistoryBackend`]: a current-state file per user plus an append-only
//!   revision log from which any past version can be replayed.
//! - [`ObjectStoreBackend`]: a single object per user, no history.
//!
//! [`BackendConfig`] selects and constructs one of them.

pub mod config;
mod files;
pub mod fs;
pub mod history;
pub mod object;

pub use config::BackendConfig;
pub use fs::FilesystemBackend;
pub use history::HistoryBackend;
pub use object::{DirectoryClient, MemoryClient, ObjectClient, ObjectStoreBackend};
