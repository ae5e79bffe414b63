//! WhereClock - offline geofence alarm runtime
//!
//! This crate provides:
//! - SQLite-backed response caches for the app shell and map tiles
//! - The background worker that serves requests and raises notifications
//! - The foreground session driving the zone monitor, alarm and recorder
//! - SQLite key-value persistence for trajectories and the zone

// Re-export all public types from whereclock-core
pub use whereclock_core::*;

pub mod error;
pub use error::{AppError, NetworkError, NotifyError};

pub mod config;
pub use config::{AppConfig, TileEviction};

// Network boundary
pub mod http;
pub use http::{Destination, HttpNetwork, MemoryNetwork, Network, Request, Response};

// Caches
pub mod cache;
pub mod router;
pub mod shell;
pub mod tiles;
pub use cache::CacheStorage;
pub use router::{FetchRouter, RouteTarget};
pub use shell::ResourceCache;
pub use tiles::TileCache;

// Key-value persistence
pub mod persistence;
pub use persistence::{KeyValueStore, ZoneStore};

pub mod position;
pub use position::{PositionFeed, PositionSource};

// Foreground/background contexts
pub mod bridge;
pub mod session;
pub mod worker;
pub use bridge::{ClientId, MemoryNotifier, MemoryWindowHost, NotificationBridge, Notifier, WindowHost};
pub use session::{Session, SessionHandle, SessionStatus};
pub use worker::{Worker, WorkerHandle};

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("whereclock"),
    );
}

/// Initialize logging for iOS
#[cfg(target_os = "ios")]
pub(crate) fn init_logging() {
    use log::LevelFilter;

    // Fails only if a logger is already installed
    let _ = oslog::OsLogger::new("app.whereclock")
        .level_filter(LevelFilter::Debug)
        .init();
}

#[cfg(not(any(target_os = "android", target_os = "ios")))]
pub(crate) fn init_logging() {
    // No-op elsewhere; hosts install their own logger
}
