//! Keyed string persistence for learned estimates.
//!
//! This crate provides a small trait-based key-value interface with an
//! in-memory backend, a JSON file backend and, behind the `sqlite`
//! feature, an embedded database backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
#[cfg(feature = "json")]
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{Storage, StorageError, Result};
pub use memory::MemoryStorage;
#[cfg(feature = "json")]
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
