//! Named response caches stored in SQLite.
//!
//! Each cache is a set of request-key → response entries. Entries carry a
//! global insertion sequence so [`CacheStorage::keys`] enumerates them in the
//! order they were stored.

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::http::Response;

pub struct CacheStorage {
    db: Connection,
    db_path: String,
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl CacheStorage {
    /// Open (or create) the cache database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS caches (
                name TEXT PRIMARY KEY,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                request_key TEXT NOT NULL,
                seq INTEGER NOT NULL,
                status INTEGER NOT NULL,
                headers BLOB NOT NULL,    -- MessagePack [(name, value)]
                body BLOB NOT NULL,
                PRIMARY KEY (cache_name, request_key),
                FOREIGN KEY (cache_name) REFERENCES caches(name) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_seq ON cache_entries(cache_name, seq);
            "#,
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Create the cache if it does not exist yet.
    pub fn open(&self, name: &str) -> Result<()> {
        self.db
            .execute("INSERT OR IGNORE INTO caches (name) VALUES (?1)", params![name])?;
        Ok(())
    }

    pub fn has(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .db
            .query_row("SELECT 1 FROM caches WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Cache names in creation order.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut stmt = self.db.prepare("SELECT name FROM caches ORDER BY rowid")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Delete a cache and all its entries. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let removed = self
            .db
            .execute("DELETE FROM caches WHERE name = ?1", params![name])?;
        if removed > 0 {
            info!("[CacheStorage] Deleted cache '{}'", name);
        }
        Ok(removed > 0)
    }

    /// Look up `key` in one cache.
    pub fn match_in(&self, name: &str, key: &str) -> Result<Option<Response>> {
        let row: Option<(u16, Vec<u8>, Vec<u8>)> = self
            .db
            .query_row(
                "SELECT status, headers, body FROM cache_entries
                 WHERE cache_name = ?1 AND request_key = ?2",
                params![name, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(decode_response).transpose()
    }

    /// Look up `key` across every cache, oldest cache first.
    pub fn match_any(&self, key: &str) -> Result<Option<Response>> {
        let row: Option<(u16, Vec<u8>, Vec<u8>)> = self
            .db
            .query_row(
                "SELECT e.status, e.headers, e.body FROM cache_entries e
                 JOIN caches c ON c.name = e.cache_name
                 WHERE e.request_key = ?1
                 ORDER BY c.rowid LIMIT 1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(decode_response).transpose()
    }

    /// Store a response, replacing any previous entry for the key. A replaced
    /// entry moves to the end of the enumeration order.
    pub fn put(&self, name: &str, key: &str, response: &Response) -> Result<()> {
        self.open(name)?;
        let headers = rmp_serde::to_vec(&response.headers)?;
        self.db.execute(
            "INSERT OR REPLACE INTO cache_entries (cache_name, request_key, seq, status, headers, body)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries), ?3, ?4, ?5)",
            params![name, key, response.status, headers, response.body],
        )?;
        debug!("[CacheStorage] put {} in '{}'", key, name);
        Ok(())
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&self, name: &str, key: &str) -> Result<bool> {
        let removed = self.db.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1 AND request_key = ?2",
            params![name, key],
        )?;
        Ok(removed > 0)
    }

    /// Entry keys in insertion order.
    pub fn keys(&self, name: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .prepare("SELECT request_key FROM cache_entries WHERE cache_name = ?1 ORDER BY seq")?;
        let keys = stmt
            .query_map(params![name], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    pub fn len(&self, name: &str) -> Result<usize> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Replace the whole contents of a cache in one transaction. On error
    /// the cache keeps its previous contents.
    pub fn replace_all(&mut self, name: &str, entries: &[(String, Response)]) -> Result<()> {
        let tx = self.db.transaction()?;
        tx.execute("INSERT OR IGNORE INTO caches (name) VALUES (?1)", params![name])?;
        tx.execute("DELETE FROM cache_entries WHERE cache_name = ?1", params![name])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO cache_entries (cache_name, request_key, seq, status, headers, body)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries), ?3, ?4, ?5)",
            )?;
            for (key, response) in entries {
                let headers = rmp_serde::to_vec(&response.headers)?;
                stmt.execute(params![name, key, response.status, headers, response.body])?;
            }
        }
        tx.commit()?;
        info!("[CacheStorage] Stored {} entries in '{}'", entries.len(), name);
        Ok(())
    }
}

fn decode_response((status, headers, body): (u16, Vec<u8>, Vec<u8>)) -> Result<Response> {
    Ok(Response {
        status,
        headers: rmp_serde::from_slice(&headers)?,
        body,
    })
}
