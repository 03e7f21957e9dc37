//! Parley storage crate - SQLite persistence for conversations.
//!
//! Provides a WAL-mode SQLite database with migrations and the
//! `ConversationStore` repository holding each conversation's ordered,
//! append-only message log.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{ConversationStore, StoreStats};
