//! Opportunistic on-disk cache for slow listing payloads.
//!
//! The catalog backend serves large, rarely changing listings; refetching
//! them on every invocation is the slowest part of a resolution. Payloads
//! are cached by hashed key with a freshness window based on file age. A
//! corrupt or stale entry is simply treated as a miss; the cache never makes
//! an operation fail.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Default freshness window for cached listings.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub struct HttpCache {
    dir: PathBuf,
    ttl: Duration,
}

impl HttpCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.body", hasher.finalize()))
    }

    /// Return the cached body for `key` when present and fresh.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        let age = entry_age(&path)?;
        if age > self.ttl {
            debug!(%key, ?age, "cache entry stale");
            return None;
        }
        fs::read_to_string(&path).ok()
    }

    /// Store `body` under `key`. Failures are swallowed; the cache is an
    /// optimization, not a dependency.
    pub fn save(&self, key: &str, body: &str) {
        let path = self.entry_path(key);
        if fs::create_dir_all(&self.dir).is_err() {
            return;
        }
        if let Err(e) = fs::write(&path, body) {
            debug!(%key, error = %e, "cache write failed");
        }
    }
}

fn entry_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), DEFAULT_TTL);
        assert!(cache.lookup("candidates/all").is_none());
        cache.save("candidates/all", "java,maven,gradle");
        assert_eq!(
            cache.lookup("candidates/all").as_deref(),
            Some("java,maven,gradle")
        );
    }

    #[test]
    fn test_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), DEFAULT_TTL);
        cache.save("a", "one");
        cache.save("b", "two");
        assert_eq!(cache.lookup("a").as_deref(), Some("one"));
        assert_eq!(cache.lookup("b").as_deref(), Some("two"));
    }

    #[test]
    fn test_stale_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), Duration::ZERO);
        cache.save("k", "v");
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.lookup("k").is_none());
    }
}
