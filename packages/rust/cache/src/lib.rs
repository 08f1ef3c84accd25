//! Directory-backed TTL cache for expansion and metrics lookups.
//!
//! One JSON file per key under the cache directory. Entries older than the TTL are
//! ignored (not deleted) and get overwritten by the next `put` for the same key.
//! Writes go to a temp file first and are renamed into place, so concurrent readers
//! never observe a torn entry; the last writer wins.

mod key;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use kwplanner_shared::{CacheConfig, KwPlannerError, Result};

pub use key::{CacheKey, CacheKind};

/// Default time-to-live for cache entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// On-disk representation of one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub key: String,
    pub payload: Value,
    pub written_at: DateTime<Utc>,
}

/// Process-wide expansion/metrics cache. Construct once and share by reference.
#[derive(Debug, Clone)]
pub struct ExpansionCache {
    dir: Option<PathBuf>,
    ttl: Duration,
}

impl ExpansionCache {
    /// Open (creating if needed) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| KwPlannerError::io(&dir, e))?;
        debug!(?dir, ttl_secs = ttl.as_secs(), "opened cache directory");
        Ok(Self {
            dir: Some(dir),
            ttl,
        })
    }

    /// A cache that always misses and drops writes.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            ttl: DEFAULT_TTL,
        }
    }

    /// Build the cache described by `[cache]`.
    ///
    /// When the directory is unusable the cache is disabled with a warning, unless
    /// `required` is set, in which case the failure is returned.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        if !config.enabled {
            debug!("cache disabled by configuration");
            return Ok(Self::disabled());
        }
        let ttl = Duration::from_secs(config.ttl_hours.saturating_mul(3600));

        let opened = match config.resolved_dir() {
            Ok(dir) => Self::open(dir, ttl).await,
            Err(e) => Err(e),
        };
        match opened {
            Ok(cache) => Ok(cache),
            Err(e) if config.required => Err(KwPlannerError::cache(format!(
                "cache is required but unavailable: {e}"
            ))),
            Err(e) => {
                warn!(error = %e, "cache directory unavailable, continuing without cache");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entry_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(key.file_name()))
    }

    /// Whether an entry written at `written_at` is still valid at `now`.
    pub fn is_fresh(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - written_at).to_std() {
            Ok(age) => age <= self.ttl,
            // Written "in the future" (clock skew): treat as fresh.
            Err(_) => true,
        }
    }

    /// Fetch a fresh payload. Missing, stale, and corrupt entries all return `None`.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let Some(path) = self.entry_path(key) else {
            return Ok(None);
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KwPlannerError::io(&path, e)),
        };

        let envelope: CacheEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(?path, error = %e, "ignoring corrupt cache entry");
                return Ok(None);
            }
        };

        if envelope.key != key.digest() {
            warn!(?path, "cache entry key mismatch, ignoring");
            return Ok(None);
        }
        if !self.is_fresh(envelope.written_at, Utc::now()) {
            debug!(%key, written_at = %envelope.written_at, "stale cache entry");
            return Ok(None);
        }

        debug!(%key, "cache hit");
        Ok(Some(envelope.payload))
    }

    /// Fetch and decode a payload. A payload of the wrong shape counts as a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let Some(payload) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(%key, error = %e, "cached payload has unexpected shape, ignoring");
                Ok(None)
            }
        }
    }

    /// Store a payload, overwriting any previous entry for the key.
    pub async fn put(&self, key: &CacheKey, payload: Value) -> Result<()> {
        let Some(path) = self.entry_path(key) else {
            return Ok(());
        };

        let envelope = CacheEnvelope {
            key: key.digest().to_string(),
            payload,
            written_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| KwPlannerError::cache(format!("failed to encode cache entry: {e}")))?;

        let tmp = path.with_extension(format!("{}.tmp", Uuid::now_v7()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| KwPlannerError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(KwPlannerError::io(&path, e));
        }

        debug!(%key, "cache write");
        Ok(())
    }

    /// Encode and store a payload.
    pub async fn put_as<T: Serialize>(&self, key: &CacheKey, payload: &T) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let value = serde_json::to_value(payload)
            .map_err(|e| KwPlannerError::cache(format!("failed to encode cache payload: {e}")))?;
        self.put(key, value).await
    }
}
