//! Registry Store: the shared `network -> contract -> record` JSON document.
//!
//! Writers go through [`Registry::update`], which re-reads the document under
//! an advisory lock and replaces the file atomically, so concurrent readers
//! only ever observe a complete document.

pub mod api;
pub mod document;
pub mod error;
pub mod lock;
pub mod store;
pub mod store_db;

pub use api::RegistryEngine;
pub use document::{EntryState, METADATA_PREFIX, RegistryDocument, RegistryEntry, SCHEMA_VERSION};
pub use error::RegistryError;
pub use lock::{LockGuard, LockOptions};
pub use store::{EngineType, Registry};
pub use store_db::{in_memory::InMemoryRegistry, json_file::JsonFileRegistry};
