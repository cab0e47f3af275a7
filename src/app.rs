//! Application context.
//!
//! `App` owns the persistent store, the admin credentials, and the
//! in-memory match list, replacing the original's module-level mutable
//! state with one explicit object created at startup and dropped at
//! teardown. Match-list operations persist after every mutation;
//! admin-gated actions (export/import/wipe/password changes) expect the
//! caller to have verified the password first.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::auth::AdminCredentials;
use crate::config::Config;
use crate::models::{MatchEntry, MatchList};
use crate::store::{FileKvStore, KvStore};

/// Storage key for the serialized match list.
pub const MATCHES_STORAGE_KEY: &str = "matchday_matches_v1";

pub struct App<S: KvStore> {
    store: Arc<S>,
    pub credentials: AdminCredentials<Arc<S>>,
    pub matches: MatchList,
}

impl App<FileKvStore> {
    pub fn new(config: &Config) -> Result<Self> {
        let store = FileKvStore::new(config.data_dir()?)?;
        Self::with_store(store)
    }
}

impl<S: KvStore> App<S> {
    pub fn with_store(store: S) -> Result<Self> {
        let store = Arc::new(store);
        let credentials = AdminCredentials::new(Arc::clone(&store));
        credentials.initialize()?;

        let matches = MatchList::from_stored(store.get(MATCHES_STORAGE_KEY));
        Ok(Self {
            store,
            credentials,
            matches,
        })
    }

    fn save_matches(&self) -> Result<()> {
        self.store.set(MATCHES_STORAGE_KEY, &self.matches.to_json()?)
    }

    pub fn add_match(&mut self, entry: MatchEntry) -> Result<()> {
        info!(team1 = %entry.team1, team2 = %entry.team2, "Adding match");
        self.matches.add(entry);
        self.save_matches()
    }

    pub fn remove_match(&mut self, id: &str) -> Result<bool> {
        let removed = self.matches.remove(id);
        if removed {
            self.save_matches()?;
        }
        Ok(removed)
    }

    pub fn update_match(&mut self, entry: MatchEntry) -> Result<bool> {
        let updated = self.matches.update(entry);
        if updated {
            self.save_matches()?;
        }
        Ok(updated)
    }

    /// Admin action: drop every match permanently.
    pub fn wipe_matches(&mut self) -> Result<()> {
        info!(count = self.matches.len(), "Wiping all matches");
        self.matches.clear();
        self.save_matches()
    }

    /// Admin action: the full list as pretty JSON, suitable for backup.
    pub fn export_matches(&self) -> Result<String> {
        self.matches.to_pretty_json()
    }

    /// Admin action: prepend-merge an exported list onto the current one.
    pub fn import_matches(&mut self, raw: &str) -> Result<usize> {
        let count = self.matches.merge_import(raw)?;
        self.save_matches()?;
        info!(count, "Imported matches");
        Ok(count)
    }

    /// Gate for the admin actions above.
    pub fn login(&self, password: &str) -> bool {
        self.credentials.verify(password)
    }
}

// ============================================================================
// Tests
// ============================================================================
