//! Application configuration.
//!
//! Every field has a default matching the shipped app, so a config file only
//! needs to name what it changes:
//!
//! ```json
//! { "cacheName": "whereclock-v2", "maxTiles": 500, "autoStopSecs": null }
//! ```

use std::path::Path;
use std::time::Duration;

use log::info;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use whereclock_core::AutoStopPolicy;

use crate::error::{AppError, Result};

/// App shell fetched and stored at install time.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/offline.html",
    "/style.css",
    "/script.js",
    "/manifest.json",
    "/iconos/icono-192.png",
    "/img/area.jpg",
    "/img/trayecto.jpg",
    "/img/alarmas.jpg",
    "/sounds/alarma1.mp3",
    "/sounds/alarma2.mp3",
    "/sounds/alarma3.mp3",
    "/sounds/alarma4.mp3",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
];

/// Which tile is dropped when the tile cache goes over its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TileEviction {
    /// Oldest inserted first; hits do not refresh a tile
    #[default]
    InsertionOrder,
    /// Least recently served first; hits refresh a tile
    LeastRecentlyUsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Origin the app is served from; relative manifest entries resolve
    /// against it
    pub origin: String,
    /// Version tag of the app-shell cache. Bump to evict the previous shell.
    pub cache_name: String,
    /// Tag of the tile cache, kept across shell versions
    pub tile_cache_name: String,
    pub manifest: Vec<String>,
    /// Document served to navigations when both cache and network miss
    pub offline_page: String,
    /// Host substrings identifying map tile servers
    pub tile_hosts: Vec<String>,
    pub max_tiles: usize,
    pub tile_eviction: TileEviction,
    /// Seconds before a ringing alarm stops by itself; `None` rings until
    /// stopped
    pub auto_stop_secs: Option<u64>,
    /// Keep the zone across restarts
    pub persist_zone: bool,
    pub db_path: String,
    pub http_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "https://whereclock.app/".to_string(),
            cache_name: "whereclock-v1".to_string(),
            tile_cache_name: "tiles-cache-v1".to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            offline_page: "/offline.html".to_string(),
            tile_hosts: vec!["tile.openstreetmap".to_string()],
            max_tiles: 200,
            tile_eviction: TileEviction::default(),
            auto_stop_secs: Some(10),
            persist_zone: false,
            db_path: "whereclock.db".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!("[Config] Loaded {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tiles == 0 {
            return Err(AppError::Config("maxTiles must be at least 1".to_string()));
        }
        if self.cache_name == self.tile_cache_name {
            return Err(AppError::Config(
                "cacheName and tileCacheName must differ".to_string(),
            ));
        }
        if self.tile_hosts.iter().any(|h| h.is_empty()) {
            return Err(AppError::Config("tileHosts must not contain empty patterns".to_string()));
        }
        self.origin_url()?;
        Ok(())
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).map_err(|e| AppError::InvalidUrl {
            url: self.origin.clone(),
            message: e.to_string(),
        })
    }

    /// Resolve a manifest-style path (absolute or origin-relative).
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| AppError::InvalidUrl {
                url: path.to_string(),
                message: e.to_string(),
            })
    }

    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.manifest.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn offline_url(&self) -> Result<Url> {
        self.resolve(&self.offline_page)
    }

    pub fn auto_stop_policy(&self) -> AutoStopPolicy {
        match self.auto_stop_secs {
            Some(secs) => AutoStopPolicy::After(Duration::from_secs(secs)),
            None => AutoStopPolicy::Manual,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.manifest.len(), 16);
        assert_eq!(
            config.auto_stop_policy(),
            AutoStopPolicy::After(Duration::from_secs(10))
        );
        assert!(!config.persist_zone);
    }

    #[test]
    fn test_partial_json() {
        let config =
            AppConfig::from_json(r#"{"cacheName":"whereclock-v2","autoStopSecs":null}"#).unwrap();
        assert_eq!(config.cache_name, "whereclock-v2");
        assert_eq!(config.tile_cache_name, "tiles-cache-v1");
        assert_eq!(config.auto_stop_policy(), AutoStopPolicy::Manual);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AppConfig::from_json(r#"{"maxTiles":0}"#).is_err());
        assert!(AppConfig::from_json(r#"{"cacheName":"tiles-cache-v1"}"#).is_err());
        assert!(AppConfig::from_json(r#"{"origin":"not a url"}"#).is_err());
    }

    #[test]
    fn test_manifest_resolution() {
        let config = AppConfig::default();
        let urls = config.manifest_urls().unwrap();
        assert_eq!(urls[0].as_str(), "https://whereclock.app/");
        assert_eq!(urls[1].as_str(), "https://whereclock.app/index.html");
        assert_eq!(
            urls[15].as_str(),
            "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"
        );
        assert_eq!(
            config.offline_url().unwrap().as_str(),
            "https://whereclock.app/offline.html"
        );
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"maxTiles": 50}"#).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().max_tiles, 50);
        assert!(AppConfig::load(dir.path().join("missing.json")).is_err());
    }
}
