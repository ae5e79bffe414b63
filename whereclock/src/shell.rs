//! The app shell cache: a fixed manifest installed atomically, served
//! cache-first.

use futures::future::try_join_all;
use log::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::config::AppConfig;
use crate::error::{AppError, NetworkError, Result};
use crate::http::{Destination, Network, Request, Response};

#[derive(Debug, Clone)]
pub struct ResourceCache {
    version: String,
    tile_cache_name: String,
    manifest: Vec<Request>,
    offline_page: Request,
}

impl ResourceCache {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            version: config.cache_name.clone(),
            tile_cache_name: config.tile_cache_name.clone(),
            manifest: config.manifest_urls()?.into_iter().map(Request::get).collect(),
            offline_page: Request::get(config.offline_url()?),
        })
    }

    /// Name of the cache holding this version of the shell.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn manifest(&self) -> &[Request] {
        &self.manifest
    }

    /// Fetch the whole manifest and store it under the version tag.
    ///
    /// All entries are fetched before anything is written. If any fetch
    /// fails or answers a non-2xx status the install fails and the cache is
    /// left as it was.
    pub async fn install<N: Network>(&self, storage: &mut CacheStorage, network: &N) -> Result<usize> {
        let entries = self.download(network).await?;
        self.commit(storage, &entries)
    }

    /// Network half of [`install`](Self::install): every manifest entry, or
    /// the first failure. Touches no storage.
    pub async fn download<N: Network>(&self, network: &N) -> Result<Vec<(String, Response)>> {
        info!(
            "[ResourceCache] Installing {} ({} resources)",
            self.version,
            self.manifest.len()
        );

        let fetches = self.manifest.iter().map(|request| async move {
            let response = network.fetch(request).await?;
            if !response.is_success() {
                return Err(AppError::InstallFailed {
                    url: request.url.to_string(),
                    status: response.status,
                });
            }
            Ok::<_, AppError>((request.cache_key(), response))
        });

        match try_join_all(fetches).await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!("[ResourceCache] Install of {} aborted: {}", self.version, e);
                Err(e)
            }
        }
    }

    /// Storage half of [`install`](Self::install): replace the version's
    /// cache with `entries` in one transaction.
    pub fn commit(&self, storage: &mut CacheStorage, entries: &[(String, Response)]) -> Result<usize> {
        storage.replace_all(&self.version, entries)?;
        info!("[ResourceCache] Installed {}", self.version);
        Ok(entries.len())
    }

    /// Delete every cache other than this version and the tile cache.
    pub fn activate(&self, storage: &mut CacheStorage) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in storage.names()? {
            if name != self.version && name != self.tile_cache_name {
                storage.delete(&name)?;
                deleted.push(name);
            }
        }
        info!(
            "[ResourceCache] Activated {} (removed {} stale caches)",
            self.version,
            deleted.len()
        );
        Ok(deleted)
    }

    /// Cache first, then network. A navigation that fails on the network is
    /// answered with the cached offline page. Responses are never cached
    /// here.
    pub async fn respond<N: Network>(
        &self,
        storage: &mut CacheStorage,
        request: &Request,
        network: &N,
    ) -> Result<Response> {
        if let Some(cached) = self.lookup(storage, request)? {
            return Ok(cached);
        }
        let outcome = network.fetch(request).await;
        self.fallback(storage, request, outcome)
    }

    pub fn lookup(&self, storage: &CacheStorage, request: &Request) -> Result<Option<Response>> {
        let cached = storage.match_any(&request.cache_key())?;
        if cached.is_some() {
            debug!("[ResourceCache] hit {}", request.url);
        }
        Ok(cached)
    }

    /// Turn a network outcome into the answer, substituting the offline
    /// page for failed navigations.
    pub fn fallback(
        &self,
        storage: &CacheStorage,
        request: &Request,
        outcome: std::result::Result<Response, NetworkError>,
    ) -> Result<Response> {
        match outcome {
            Ok(response) => Ok(response),
            Err(e) if request.destination == Destination::Document => {
                debug!("[ResourceCache] {} unreachable ({}), serving offline page", request.url, e);
                match storage.match_any(&self.offline_page.cache_key())? {
                    Some(page) => Ok(page),
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
