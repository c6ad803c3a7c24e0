//! Preference table CRUD operations.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Database;

impl Database {
    /// Load and decode one preference. `None` when the key was never written.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|v| serde_json::from_str(&v).with_context(|| format!("corrupt preference '{key}'")))
            .transpose()
    }

    /// Encode and upsert one preference.
    pub fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
            params![key, encoded],
        )?;
        Ok(())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get_json(key)
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.put_json(key, &value)
    }

    /// Upsert several boolean preferences in one transaction.
    pub fn set_bools(&self, entries: &BTreeMap<String, bool>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)")?;
            for (key, value) in entries {
                stmt.execute(params![key, serde_json::to_string(value)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Upsert several preferences of mixed types in one transaction.
    pub fn put_json_many(&self, entries: &[(&str, serde_json::Value)]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)")?;
            for (key, value) in entries {
                stmt.execute(params![key, value.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All boolean preferences whose key starts with `prefix`.
    pub fn bools_with_prefix(&self, prefix: &str) -> Result<BTreeMap<String, bool>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT key, value FROM preferences WHERE substr(key, 1, length(?1)) = ?1",
        )?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = BTreeMap::new();
        for row in rows {
            let (key, raw) = row?;
            match serde_json::from_str::<bool>(&raw) {
                Ok(value) => {
                    results.insert(key, value);
                }
                Err(e) => tracing::warn!("Skipping corrupt preference '{key}': {e}"),
            }
        }
        Ok(results)
    }

    /// Delete every preference whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM preferences WHERE substr(key, 1, length(?1)) = ?1",
            params![prefix],
        )?;
        Ok(deleted)
    }
}
