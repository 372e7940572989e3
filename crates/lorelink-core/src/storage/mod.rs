//! Storage layer
//!
//! # Architecture
//!
//! - `database`: Opens and migrates the SQLite pool
//! - `migrations`: Versioned schema steps
//! - `sqlite`: SQLite implementations of the graph and suggestion stores
//! - `memory`: In-process implementation of both stores
//! - `ephemeral`: SQLite-backed ephemeral store for cross-process progress
//! - `document`: JSON interchange format for importing graphs
//!
//! # Usage
//!
//! ```ignore
//! use lorelink_core::storage::{Database, SqliteGraphStore, SqliteSuggestionStore};
//!
//! let db = Database::open("lorelink.db").await?;
//! let graph = SqliteGraphStore::new(db.pool().clone());
//! let suggestions = SqliteSuggestionStore::new(db.pool().clone());
//! ```

pub mod database;
pub mod document;
pub mod ephemeral;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use database::Database;
pub use document::GraphDocument;
pub use ephemeral::SqliteEphemeralStore;
pub use memory::InMemoryStore;
pub use sqlite::{SqliteGraphStore, SqliteSuggestionStore};
