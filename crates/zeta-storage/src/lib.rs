//! Local storage engine for the Zeta Network session manager.
//!
//! Provides durable, key-indexed persistence for received and sent
//! messages backed by sled, with a secondary time-ordered index for
//! newest-first history replay, and a small key-value settings table.
//!
//! # Layout
//!
//! - `messages`: record id → bincode [`MessageRecord`](zeta_types::MessageRecord)
//! - `messages_by_time`: `timestamp || id` → record id
//! - `settings`: string key → string value
//! - `meta`: schema version
//!
//! Network operation never depends on this crate succeeding: the
//! [`MessageStore`] trait has a no-op [`NullStore`] implementation for
//! when the database cannot be opened.

pub mod engine;
pub mod messages;
pub mod settings;
pub mod store;
pub mod tree;

pub use engine::{LocalStore, SCHEMA_VERSION};
pub use store::{MessageStore, NullStore};
