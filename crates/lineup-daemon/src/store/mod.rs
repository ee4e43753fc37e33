//! Store backends.
//!
//! Two implementations of the `lineup-core` store trait: an in-process map
//! for tests and ephemeral deployments, and a `SQLite` file for anything
//! that must survive a restart. Both apply writes through the shared
//! mutation/update helpers in `lineup-core`, so their commit semantics are
//! identical, and both emit a change event for every List mutation.

mod memory;
mod sqlite;

#[cfg(test)]
mod tests;

pub use memory::MemoryListStore;
pub use sqlite::SqliteListStore;
