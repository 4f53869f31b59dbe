//! Session-scoped token storage backends.
//!
//! Provides an in-memory store for the proxy process and tests, and a
//! SQLite-backed store that keeps the CLI's tokens across invocations.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryTokenStore;
pub use sqlite::SqliteTokenStore;
