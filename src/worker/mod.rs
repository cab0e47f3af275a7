//! Offline cache worker.
//!
//! This module implements the application's offline layer: a cache
//! controller that pre-populates a versioned cache generation with the
//! application shell assets, intercepts outgoing requests cache-first with
//! network fallback, and garbage-collects superseded generations when a new
//! one activates.
//!
//! The controller is driven by explicit `WorkerEvent`s dispatched from a
//! host loop (`spawn`/`run`); it never registers callbacks of its own.

pub mod cache;
pub mod controller;
pub mod fetch;

pub use cache::DiskCache;
pub use controller::{spawn, CacheController};
pub use fetch::{HttpFetcher, Request};

/// Name of the current cache generation. Bump the version suffix whenever
/// the asset set or caching behavior changes; activation deletes every
/// generation that does not match this name.
pub const CACHE_NAME: &str = "matchday-v1";

/// Canonical document served when a navigation fails offline.
pub const OFFLINE_URL: &str = "/index.html";

/// Application shell assets pre-cached at install. A failure to fetch any
/// single one is tolerated; the generation still activates.
pub const ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/styles.css",
    "/app.js",
    "/manifest.json",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
];
