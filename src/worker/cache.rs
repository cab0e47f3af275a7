use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::fetch::{Request, Response};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Named, versioned request→response store.
///
/// Generations are independent: `open` creates one, `delete` removes one
/// wholesale, `generations` enumerates what exists. Lookups address a single
/// generation by name.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the store for `generation` if it does not exist.
    async fn open(&self, generation: &str) -> Result<(), StoreError>;

    /// Exact-match lookup by request method and URL.
    async fn lookup(
        &self,
        generation: &str,
        request: &Request,
    ) -> Result<Option<Response>, StoreError>;

    async fn put(
        &self,
        generation: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), StoreError>;

    /// Delete a whole generation. Returns whether it existed.
    async fn delete(&self, generation: &str) -> Result<bool, StoreError>;

    /// Names of every generation currently on disk, sorted.
    async fn generations(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for std::sync::Arc<T> {
    async fn open(&self, generation: &str) -> Result<(), StoreError> {
        (**self).open(generation).await
    }

    async fn lookup(
        &self,
        generation: &str,
        request: &Request,
    ) -> Result<Option<Response>, StoreError> {
        (**self).lookup(generation, request).await
    }

    async fn put(
        &self,
        generation: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), StoreError> {
        (**self).put(generation, request, response).await
    }

    async fn delete(&self, generation: &str) -> Result<bool, StoreError> {
        (**self).delete(generation).await
    }

    async fn generations(&self) -> Result<Vec<String>, StoreError> {
        (**self).generations().await
    }
}

/// Key for a cached entry: hex SHA-256 over method and URL. Exact-match
/// semantics fall out of the digest.
fn entry_key(request: &Request) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}", request.method).as_bytes());
    hasher.update(b" ");
    hasher.update(request.url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One cached response on disk. The URL is redundant with the file name's
/// digest but kept for inspectability.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    stored_at: DateTime<Utc>,
    response: Response,
}

/// Disk-backed cache storage: one directory per generation, one JSON file
/// per cached entry.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root.join(generation)
    }

    fn entry_path(&self, generation: &str, request: &Request) -> PathBuf {
        self.generation_dir(generation)
            .join(format!("{}.json", entry_key(request)))
    }
}

#[async_trait]
impl CacheStorage for DiskCache {
    async fn open(&self, generation: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(self.generation_dir(generation))?;
        Ok(())
    }

    async fn lookup(
        &self,
        generation: &str,
        request: &Request,
    ) -> Result<Option<Response>, StoreError> {
        let path = self.entry_path(generation, request);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let entry: CacheEntry = serde_json::from_str(&contents)?;
        Ok(Some(entry.response))
    }

    async fn put(
        &self,
        generation: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry {
            url: request.url.clone(),
            stored_at: Utc::now(),
            response: response.clone(),
        };
        let path = self.entry_path(generation, request);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string(&entry)?)?;
        Ok(())
    }

    async fn delete(&self, generation: &str) -> Result<bool, StoreError> {
        let dir = self.generation_dir(generation);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        debug!(generation, "Deleted cache generation");
        Ok(true)
    }

    async fn generations(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory cache storage for tests.
#[cfg(test)]
pub struct MemoryCache {
    generations: std::sync::Mutex<
        std::collections::BTreeMap<String, std::collections::HashMap<String, Response>>,
    >,
}

#[cfg(test)]
impl MemoryCache {
    pub fn new() -> Self {
        Self {
            generations: std::sync::Mutex::new(std::collections::BTreeMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CacheStorage for MemoryCache {
    async fn open(&self, generation: &str) -> Result<(), StoreError> {
        self.generations
            .lock()
            .unwrap()
            .entry(generation.to_string())
            .or_default();
        Ok(())
    }

    async fn lookup(
        &self,
        generation: &str,
        request: &Request,
    ) -> Result<Option<Response>, StoreError> {
        Ok(self
            .generations
            .lock()
            .unwrap()
            .get(generation)
            .and_then(|entries| entries.get(&entry_key(request)))
            .cloned())
    }

    async fn put(
        &self,
        generation: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), StoreError> {
        self.generations
            .lock()
            .unwrap()
            .entry(generation.to_string())
            .or_default()
            .insert(entry_key(request), response.clone());
        Ok(())
    }

    async fn delete(&self, generation: &str) -> Result<bool, StoreError> {
        Ok(self
            .generations
            .lock()
            .unwrap()
            .remove(generation)
            .is_some())
    }

    async fn generations(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.generations.lock().unwrap().keys().cloned().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> Response {
        Response {
            status: 200,
            content_type: Some("text/plain".to_string()),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf()).unwrap();
        let req = Request::get("http://localhost/styles.css");

        cache.open("gen-1").await.unwrap();
        assert!(cache.lookup("gen-1", &req).await.unwrap().is_none());

        cache.put("gen-1", &req, &response("body")).await.unwrap();
        let hit = cache.lookup("gen-1", &req).await.unwrap().unwrap();
        assert_eq!(hit.body_text(), "body");
        assert_eq!(hit.status, 200);
    }

    #[tokio::test]
    async fn test_disk_cache_generations_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf()).unwrap();
        let req = Request::get("http://localhost/app.js");

        cache.open("gen-1").await.unwrap();
        cache.open("gen-2").await.unwrap();
        cache.put("gen-1", &req, &response("old")).await.unwrap();

        assert!(cache.lookup("gen-2", &req).await.unwrap().is_none());
        assert_eq!(
            cache.generations().await.unwrap(),
            vec!["gen-1".to_string(), "gen-2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_disk_cache_delete_removes_generation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf()).unwrap();

        cache.open("gen-1").await.unwrap();
        assert!(cache.delete("gen-1").await.unwrap());
        assert!(!cache.delete("gen-1").await.unwrap());
        assert!(cache.generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_is_exact_match_on_method_and_url() {
        let cache = MemoryCache::new();
        let get = Request::get("http://localhost/api");
        let post = Request::post("http://localhost/api", Vec::new());

        cache.open("gen-1").await.unwrap();
        cache.put("gen-1", &get, &response("cached")).await.unwrap();

        assert!(cache.lookup("gen-1", &get).await.unwrap().is_some());
        assert!(cache.lookup("gen-1", &post).await.unwrap().is_none());
        assert!(cache
            .lookup("gen-1", &Request::get("http://localhost/api2"))
            .await
            .unwrap()
            .is_none());
    }
}
