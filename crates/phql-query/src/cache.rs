//! Statement and result caching.
//!
//! [`IrCache`] keeps resolved statements keyed by a hash of the normalized
//! PHQL, so repeated queries skip parsing and resolution. [`CacheBackend`] is
//! the result cache service consulted by `Query::execute` when a query has
//! cache options.

use crate::resultset::Snapshot;
use phql_core::bind::BindTypes;
use phql_core::ir::Intermediate;
use phql_core::Result;
use regex::Regex;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// A resolved statement together with the bind types found while resolving it.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub intermediate: Arc<Intermediate>,
    pub bind_types: BindTypes,
}

#[derive(Debug, Clone)]
struct CachedIr {
    prepared: Prepared,
    last_used: Instant,
    hit_count: u64,
}

/// LRU cache of resolved statements.
///
/// Entries are write-once: inserting a key that is already present keeps the
/// first entry.
#[derive(Debug)]
pub struct IrCache {
    cache: HashMap<u64, CachedIr>,
    max_size: usize,
}

impl IrCache {
    /// Create a new cache with the given maximum number of entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(max_size.min(256)),
            max_size,
        }
    }

    /// Look up a statement, marking it as recently used.
    pub fn get(&mut self, key: u64) -> Option<Prepared> {
        let entry = self.cache.get_mut(&key)?;
        entry.last_used = Instant::now();
        entry.hit_count += 1;
        Some(entry.prepared.clone())
    }

    /// Store a statement unless one is already cached under `key`.
    ///
    /// Returns the entry that ends up cached.
    pub fn insert(&mut self, key: u64, prepared: Prepared) -> Prepared {
        if self.max_size == 0 {
            return prepared;
        }
        if !self.cache.contains_key(&key) && self.cache.len() >= self.max_size {
            self.evict_lru();
        }
        let entry = self.cache.entry(key).or_insert_with(|| CachedIr {
            prepared,
            last_used: Instant::now(),
            hit_count: 0,
        });
        entry.last_used = Instant::now();
        entry.prepared.clone()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.cache.contains_key(&key)
    }

    /// Number of times the entry was served from the cache.
    pub fn hits(&self, key: u64) -> u64 {
        self.cache.get(&key).map_or(0, |e| e.hit_count)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached statement.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn evict_lru(&mut self) {
        if let Some((&lru_key, _)) = self.cache.iter().min_by_key(|(_, entry)| entry.last_used) {
            tracing::trace!(key = lru_key, "Evicting prepared statement");
            self.cache.remove(&lru_key);
        }
    }
}

impl Default for IrCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Compute a hash key from any hashable value.
pub fn cache_key(value: &impl Hash) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn layout() -> Option<&'static Regex> {
    static LAYOUT: OnceLock<Option<Regex>> = OnceLock::new();
    LAYOUT
        .get_or_init(|| {
            Regex::new(r#"(?s)'(?:[^'\\]|\\.)*'?|"(?:[^"\\]|\\.)*"?|\[[^\]]*\]?|\s+"#).ok()
        })
        .as_ref()
}

/// Collapse runs of whitespace so formatting differences share a cache entry.
///
/// Quoted strings and bracketed identifiers are kept verbatim.
pub fn normalize_phql(phql: &str) -> String {
    let phql = phql.trim();
    match layout() {
        Some(re) => re
            .replace_all(phql, |caps: &regex::Captures<'_>| {
                let span = &caps[0];
                if span.starts_with(char::is_whitespace) {
                    " ".to_string()
                } else {
                    span.to_string()
                }
            })
            .into_owned(),
        None => phql.to_string(),
    }
}

/// IR cache key of a PHQL statement.
pub fn phql_key(phql: &str) -> u64 {
    cache_key(&normalize_phql(phql))
}

/// Default lifetime of cached result sets.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Name of the cache service used when options do not name one.
pub const DEFAULT_SERVICE: &str = "modelsCache";

/// Result caching options of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Key the result set is stored under
    pub key: String,
    /// How long a cached result stays valid (default: one hour)
    pub lifetime: Duration,
    /// Cache service registered on the manager (default: `modelsCache`)
    pub service: Option<String>,
}

impl CacheOptions {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            lifetime: DEFAULT_LIFETIME,
            service: None,
        }
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn service_name(&self) -> &str {
        self.service.as_deref().unwrap_or(DEFAULT_SERVICE)
    }
}

/// A result cache service.
pub trait CacheBackend: Send + Sync {
    /// Fetch a cached result set that is younger than `lifetime`.
    fn get(&self, key: &str, lifetime: Duration) -> Result<Option<Snapshot>>;

    /// Store a result set for `lifetime`.
    fn save(&self, key: &str, value: &Snapshot, lifetime: Duration) -> Result<()>;

    /// Remove a cached result set. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Snapshot,
    expires_at: Instant,
}

/// In-process result cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str, _lifetime: Duration) -> Result<Option<Snapshot>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, value: &Snapshot, lifetime: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + lifetime,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(key).is_some())
    }
}
