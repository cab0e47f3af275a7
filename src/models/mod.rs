//! Data records for the match list.
//!
//! Match entries are plain free-text records with a generated unique id and
//! no cross-entity relationships. The list itself is an explicit context
//! object owned by the application, persisted as a JSON array.

pub mod match_entry;

pub use match_entry::{MatchEntry, MatchList};
