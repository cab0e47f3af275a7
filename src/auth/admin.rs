use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::store::KvStore;

/// Storage key for the credential record. One record, ever.
pub const ADMIN_STORAGE_KEY: &str = "matchday_admin_v1";

/// First-run password. Weak by design: the original shipped this default
/// and the behavior is reproduced rather than redesigned.
const DEFAULT_PASSWORD: &str = "admin123";

/// Salt length in characters. Matches the entropy of the original
/// timestamp+random salt without its predictable prefix.
const SALT_LENGTH: usize = 20;

/// The stored admin credential.
///
/// Current records carry both fields. Legacy records carry only `hash`,
/// holding a base64 encoding of the plaintext instead of a digest; they
/// are upgraded the first time the password verifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    pub hash: String,
}

impl CredentialRecord {
    fn salted(password: &str) -> Self {
        let salt = generate_salt();
        let hash = hash_password(password, &salt);
        Self {
            salt: Some(salt),
            hash,
        }
    }
}

fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Hex-encoded SHA-256 of `password + salt`.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Guards the admin panel actions behind a password without ever storing
/// the plaintext.
pub struct AdminCredentials<S: KvStore> {
    store: S,
}

impl<S: KvStore> AdminCredentials<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the record, treating absent or unparseable data as no record.
    fn load(&self) -> Option<CredentialRecord> {
        let raw = self.store.get(ADMIN_STORAGE_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "Unreadable credential record, treating as absent");
                None
            }
        }
    }

    fn persist(&self, record: &CredentialRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.store.set(ADMIN_STORAGE_KEY, &raw)
    }

    /// Create the default credential if none exists. Safe to call on every
    /// start; an existing record is never overwritten.
    pub fn initialize(&self) -> Result<()> {
        if self.load().is_some() {
            return Ok(());
        }
        let record = CredentialRecord::salted(DEFAULT_PASSWORD);
        self.persist(&record)?;
        info!("Created default admin credential");
        Ok(())
    }

    /// Check `input` against the stored credential.
    ///
    /// Always resolves to a boolean: a missing record and a wrong password
    /// are indistinguishable to the caller. A legacy record that verifies
    /// is re-persisted in salted form before this returns.
    pub fn verify(&self, input: &str) -> bool {
        let Some(record) = self.load() else {
            return false;
        };

        match record.salt {
            Some(ref salt) => hash_password(input, salt) == record.hash,
            None => {
                let ok = BASE64.encode(input) == record.hash;
                if ok {
                    // Upgrade in place; once salted this path never runs again.
                    let upgraded = CredentialRecord::salted(input);
                    match self.persist(&upgraded) {
                        Ok(()) => info!("Migrated legacy credential record to salted format"),
                        Err(e) => warn!(error = %e, "Failed to persist migrated credential"),
                    }
                }
                ok
            }
        }
    }

    /// Reset the credential back to the default password.
    pub fn reset(&self) -> Result<()> {
        self.set_password(DEFAULT_PASSWORD)
    }

    /// Replace the credential with a fresh salted record for `new_password`.
    ///
    /// No old-password check here; the caller gates access (a prior
    /// successful `verify`).
    pub fn set_password(&self, new_password: &str) -> Result<()> {
        let record = CredentialRecord::salted(new_password);
        self.persist(&record)?;
        info!("Admin password updated");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
