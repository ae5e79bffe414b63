//! Bounded cache for map tiles.
//!
//! Tiles are stored in their own named cache and tracked by an explicit
//! ordered index. After every insertion the cache is trimmed back to
//! `max_tiles` by evicting exactly one entry, the first in index order.
//!
//! The index is a `LruCache` with no capacity of its own: the storage cap is
//! enforced here, so the index only supplies ordering. Under
//! [`TileEviction::InsertionOrder`] hits use `peek` and never reorder it.

use log::{debug, info};
use lru::LruCache;

use crate::cache::CacheStorage;
use crate::config::{AppConfig, TileEviction};
use crate::error::{NetworkError, Result};
use crate::http::{Network, Request, Response};

pub struct TileCache {
    name: String,
    max_tiles: usize,
    policy: TileEviction,
    index: LruCache<String, ()>,
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("name", &self.name)
            .field("max_tiles", &self.max_tiles)
            .field("policy", &self.policy)
            .field("len", &self.index.len())
            .finish()
    }
}

impl TileCache {
    /// Open the tile cache and rebuild the index from stored entries.
    pub fn load(config: &AppConfig, storage: &CacheStorage) -> Result<Self> {
        storage.open(&config.tile_cache_name)?;
        let mut index = LruCache::unbounded();
        for key in storage.keys(&config.tile_cache_name)? {
            index.put(key, ());
        }
        info!(
            "[TileCache] Loaded {} tiles from '{}' (max {}, {:?})",
            index.len(),
            config.tile_cache_name,
            config.max_tiles,
            config.tile_eviction
        );
        Ok(Self {
            name: config.tile_cache_name.clone(),
            max_tiles: config.max_tiles,
            policy: config.tile_eviction,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Keys in eviction order, next victim first.
    pub fn keys(&self) -> Vec<String> {
        self.index.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// Serve from cache, or fetch, store and trim. Network failures are
    /// returned as-is; there is no fallback for tiles.
    pub async fn respond<N: Network>(
        &mut self,
        storage: &mut CacheStorage,
        request: &Request,
        network: &N,
    ) -> Result<Response> {
        if let Some(cached) = self.lookup(storage, request)? {
            return Ok(cached);
        }
        let outcome = network.fetch(request).await;
        self.store(storage, request, outcome)
    }

    /// Cached tile for `request`. A hit counts as a use under
    /// [`TileEviction::LeastRecentlyUsed`].
    pub fn lookup(&mut self, storage: &CacheStorage, request: &Request) -> Result<Option<Response>> {
        let key = request.cache_key();
        let cached = storage.match_in(&self.name, &key)?;
        if cached.is_some() {
            self.touch(key);
        }
        Ok(cached)
    }

    /// Keep a fresh network answer if it is a successful GET, then trim.
    pub fn store(
        &mut self,
        storage: &CacheStorage,
        request: &Request,
        outcome: std::result::Result<Response, NetworkError>,
    ) -> Result<Response> {
        let response = outcome?;
        if response.is_success() && request.method == reqwest::Method::GET {
            self.insert(storage, request.cache_key(), &response)?;
        } else {
            debug!("[TileCache] not caching {} (HTTP {})", request.url, response.status);
        }
        Ok(response)
    }

    fn touch(&mut self, key: String) {
        match self.policy {
            TileEviction::LeastRecentlyUsed => {
                if self.index.get(&key).is_none() {
                    self.index.put(key, ());
                }
            }
            TileEviction::InsertionOrder => {
                if self.index.peek(&key).is_none() {
                    self.index.put(key, ());
                }
            }
        }
    }

    /// Store then trim. Returns the evicted key, if any.
    fn insert(&mut self, storage: &CacheStorage, key: String, response: &Response) -> Result<Option<String>> {
        storage.put(&self.name, &key, response)?;
        self.index.put(key, ());

        if self.index.len() <= self.max_tiles {
            return Ok(None);
        }
        match self.index.pop_lru() {
            Some((victim, ())) => {
                storage.remove(&self.name, &victim)?;
                debug!("[TileCache] evicted {}", victim);
                Ok(Some(victim))
            }
            None => Ok(None),
        }
    }
}
