//! Dispatches intercepted requests to the tile cache or the shell cache.

use log::debug;

use crate::cache::CacheStorage;
use crate::config::AppConfig;
use crate::error::{NetworkError, Result};
use crate::http::{Network, Request, Response};
use crate::shell::ResourceCache;
use crate::tiles::TileCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Tile,
    Resource,
}

/// Owns the cache storage and both caches. Routing itself is a pure
/// function of the request host.
#[derive(Debug)]
pub struct FetchRouter {
    tile_hosts: Vec<String>,
    storage: CacheStorage,
    shell: ResourceCache,
    tiles: TileCache,
}

impl FetchRouter {
    pub fn new(config: &AppConfig, storage: CacheStorage) -> Result<Self> {
        let shell = ResourceCache::new(config)?;
        let tiles = TileCache::load(config, &storage)?;
        Ok(Self {
            tile_hosts: config.tile_hosts.clone(),
            storage,
            shell,
            tiles,
        })
    }

    pub fn route(&self, request: &Request) -> RouteTarget {
        let host = request.host();
        if self.tile_hosts.iter().any(|pattern| host.contains(pattern.as_str())) {
            RouteTarget::Tile
        } else {
            RouteTarget::Resource
        }
    }

    /// Answer `request` end to end: cache, then network.
    pub async fn handle<N: Network>(&mut self, request: &Request, network: &N) -> Result<Response> {
        if let Some(cached) = self.lookup(request)? {
            return Ok(cached);
        }
        let outcome = network.fetch(request).await;
        self.complete(request, outcome)
    }

    /// Cache step of [`handle`](Self::handle). `None` means the request
    /// has to go to the network and come back through [`complete`](Self::complete).
    pub fn lookup(&mut self, request: &Request) -> Result<Option<Response>> {
        let target = self.route(request);
        debug!("[FetchRouter] {} {} -> {:?}", request.method, request.url, target);
        match target {
            RouteTarget::Tile => self.tiles.lookup(&self.storage, request),
            RouteTarget::Resource => self.shell.lookup(&self.storage, request),
        }
    }

    pub fn complete(
        &mut self,
        request: &Request,
        outcome: std::result::Result<Response, NetworkError>,
    ) -> Result<Response> {
        match self.route(request) {
            RouteTarget::Tile => self.tiles.store(&self.storage, request, outcome),
            RouteTarget::Resource => self.shell.fallback(&self.storage, request, outcome),
        }
    }

    /// Write a downloaded shell (see [`ResourceCache::download`]).
    pub fn commit_install(&mut self, entries: &[(String, Response)]) -> Result<usize> {
        self.shell.commit(&mut self.storage, entries)
    }

    pub fn activate(&mut self) -> Result<Vec<String>> {
        self.shell.activate(&mut self.storage)
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn tiles(&self) -> &TileCache {
        &self.tiles
    }

    pub fn shell(&self) -> &ResourceCache {
        &self.shell
    }
}
