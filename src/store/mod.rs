//! Persistent key-value storage.
//!
//! This module provides the `KvStore` seam the rest of the application
//! persists through: the match list and the admin credential record each
//! live under a single fixed key. Values are opaque strings (JSON by
//! convention); there are no transactions and writes are last-write-wins.

pub mod kv;

pub use kv::{FileKvStore, KvStore};

#[cfg(test)]
pub use kv::MemoryKvStore;
