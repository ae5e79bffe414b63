//! Durable key-value settings (trajectories, zone) in SQLite.
//!
//! Values are JSON text. Writes replace the whole value; the last write for
//! a key wins.

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use whereclock_core::{TRAJECTORIES_KEY, Trajectory, TrajectoryStore, WhereClockError, Zone};

use crate::error::Result;

/// Storage key for the persisted zone.
pub const ZONE_KEY: &str = "zona";

/// Optional zone persistence.
pub trait ZoneStore {
    fn load_zone(&self) -> Result<Option<Zone>>;
    fn save_zone(&mut self, zone: &Zone) -> Result<()>;
}

pub struct KeyValueStore {
    db: Connection,
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore").finish_non_exhaustive()
    }
}

impl KeyValueStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )?;
        info!("[KeyValueStore] Opened {}", db_path);
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))",
            params![key, value],
        )?;
        debug!("[KeyValueStore] set {} ({} bytes)", key, value.len());
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.db.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &serde_json::to_string(value)?)
    }
}

impl TrajectoryStore for KeyValueStore {
    fn load(&self) -> whereclock_core::Result<Vec<Trajectory>> {
        let trajectories = self
            .get_json(TRAJECTORIES_KEY)
            .map_err(WhereClockError::from)?;
        Ok(trajectories.unwrap_or_default())
    }

    fn save(&mut self, trajectories: &[Trajectory]) -> whereclock_core::Result<()> {
        self.set_json(TRAJECTORIES_KEY, trajectories)
            .map_err(WhereClockError::from)
    }
}

impl ZoneStore for KeyValueStore {
    /// Stored zones go through the same validation as edited ones.
    fn load_zone(&self) -> Result<Option<Zone>> {
        match self.get_json::<Zone>(ZONE_KEY)? {
            Some(z) => Ok(Some(Zone::new(z.latitude, z.longitude, z.radius_meters)?)),
            None => Ok(None),
        }
    }

    fn save_zone(&mut self, zone: &Zone) -> Result<()> {
        self.set_json(ZONE_KEY, zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use whereclock_core::{GpsPoint, TrajectoryLog};

    fn trajectory() -> Trajectory {
        Trajectory::from_track(
            vec![GpsPoint::new(40.0, -3.0), GpsPoint::new(40.01, -3.0)],
            120,
            1_760_000_000,
        )
        .unwrap()
    }

    #[test]
    fn test_get_set_remove() {
        let store = KeyValueStore::in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn test_trajectory_store() {
        let mut store = KeyValueStore::in_memory().unwrap();
        assert!(TrajectoryStore::load(&store).unwrap().is_empty());

        let mut log = TrajectoryLog::load(&store).unwrap();
        log.append(trajectory(), &mut store).unwrap();
        log.append(trajectory(), &mut store).unwrap();

        let raw = store.get(TRAJECTORIES_KEY).unwrap().unwrap();
        assert!(raw.starts_with('['));
        assert_eq!(TrajectoryLog::load(&store).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        let store = KeyValueStore::in_memory().unwrap();
        store.set(TRAJECTORIES_KEY, "{not json").unwrap();
        assert!(TrajectoryLog::load(&store).is_err());
    }

    #[test]
    fn test_zone_round_trip() {
        let mut store = KeyValueStore::in_memory().unwrap();
        assert_eq!(store.load_zone().unwrap(), None);
        let zone = Zone::new(41.3874, 2.1686, 450.0).unwrap();
        store.save_zone(&zone).unwrap();
        assert_eq!(store.load_zone().unwrap(), Some(zone));
    }

    #[test]
    fn test_stored_zone_is_validated() {
        let store = KeyValueStore::in_memory().unwrap();
        for bad in [
            r#"{"latitude":41.3874,"longitude":2.1686,"radiusMeters":0.0}"#,
            r#"{"latitude":41.3874,"longitude":2.1686,"radiusMeters":-50.0}"#,
            r#"{"latitude":120.0,"longitude":2.1686,"radiusMeters":300.0}"#,
        ] {
            store.set(ZONE_KEY, bad).unwrap();
            let err = store.load_zone().unwrap_err();
            assert!(matches!(err, AppError::Core(_)), "{bad}: {err}");
        }
    }
}
