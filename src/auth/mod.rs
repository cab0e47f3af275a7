//! Admin credential management.
//!
//! This module owns the single admin credential record: a salted SHA-256
//! hash persisted through the key-value store. Legacy records (a reversible
//! base64 encoding of the password, no salt) are recognized and upgraded in
//! place on the first successful verification.

pub mod admin;

pub use admin::{AdminCredentials, CredentialRecord};
