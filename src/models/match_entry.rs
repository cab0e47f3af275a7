// Allow dead code: Infrastructure methods for future use
#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One listed match. Everything except the id is free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEntry {
    pub id: String,
    #[serde(default)]
    pub time: String,
    pub team1: String,
    pub team2: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub note: String,
}

impl MatchEntry {
    pub fn new(time: &str, team1: &str, team2: &str, link: &str, note: &str) -> Self {
        Self {
            id: generate_id(),
            time: time.to_string(),
            team1: team1.to_string(),
            team2: team2.to_string(),
            link: link.to_string(),
            note: note.to_string(),
        }
    }

    /// Kickoff time for display ("20h30" entered by hand becomes "20:30").
    /// Only the first separator is rewritten.
    pub fn display_time(&self) -> String {
        self.time.replacen('h', ":", 1)
    }
}

/// Timestamp plus random suffix; unique enough for a single-device list.
fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{:x}{:06x}", millis, suffix)
}

/// The in-memory match list. Owned by the application context; callers
/// persist it through the key-value store after each mutation.
#[derive(Debug, Default, Clone)]
pub struct MatchList {
    entries: Vec<MatchEntry>,
}

impl MatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserialize a stored list; absent or corrupt data yields an empty
    /// list rather than an error.
    pub fn from_stored(raw: Option<String>) -> Self {
        let entries = match raw {
            Some(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(error = %e, "Unreadable match list, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Self { entries }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.entries).context("Failed to serialize match list")
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.entries).context("Failed to serialize match list")
    }

    /// Newest entries go on top.
    pub fn add(&mut self, entry: MatchEntry) {
        self.entries.insert(0, entry);
    }

    pub fn get(&self, id: &str) -> Option<&MatchEntry> {
        self.entries.iter().find(|m| m.id == id)
    }

    /// Replace the entry with the same id. Returns false if no such entry.
    pub fn update(&mut self, entry: MatchEntry) -> bool {
        match self.entries.iter_mut().find(|m| m.id == entry.id) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|m| m.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Merge an exported JSON array onto this list: imported entries are
    /// prepended ahead of the existing ones, nothing is deduplicated.
    /// Returns how many entries were imported.
    pub fn merge_import(&mut self, raw: &str) -> Result<usize> {
        let mut imported: Vec<MatchEntry> =
            serde_json::from_str(raw).context("Import is not a JSON array of matches")?;
        let count = imported.len();
        imported.append(&mut self.entries);
        self.entries = imported;
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchEntry> {
        self.entries.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
