//! Key-value store adapters.
//!
//! Implements the [`pipeline::KeyValueStore`] trait with two backends:
//!
//! - [`MemoryStore`]: process-local map; state is lost on exit. Used in tests
//!   and for throwaway runs.
//! - [`JsonFileStore`]: the whole key space kept in memory and written to a
//!   single JSON document after every change. Writes go to a sibling temporary
//!   file first and are renamed into place, so a crash never leaves a
//!   half-written state file.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The relay only sees [`pipeline::KeyValueStore`].

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
