//! Snapshot storage: a small in-memory LRU cache in front of a durable
//! SQLite-backed table, so recent rollbacks are fast while the guard can
//! still restore state after a restart.

use std::collections::VecDeque;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::error::RollbackError;

use super::handler::Snapshot;

const DEFAULT_LRU_CAPACITY: usize = 256;

struct LruCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: std::collections::HashMap<String, Snapshot>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    fn put(&mut self, snapshot: Snapshot) {
        let key = snapshot.action_id.clone();
        if self.entries.insert(key.clone(), snapshot).is_some() {
            self.order.retain(|k| k != &key);
        } else if self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key);
    }

    fn get(&self, action_id: &str) -> Option<Snapshot> {
        self.entries.get(action_id).cloned()
    }

    fn remove(&mut self, action_id: &str) {
        self.entries.remove(action_id);
        self.order.retain(|k| k != action_id);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Captures and retrieves action snapshots, backed by an embedded SQLite
/// store when the `sqlite` feature is enabled (the default) and falling
/// back to the in-memory cache alone otherwise.
pub struct SnapshotManager {
    cache: Mutex<LruCache>,
    #[cfg(feature = "sqlite")]
    pool: sqlx::SqlitePool,
}

impl SnapshotManager {
    #[cfg(feature = "sqlite")]
    pub async fn connect(database_url: &str) -> Result<Self, RollbackError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                action_id TEXT PRIMARY KEY,
                action_type TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                snapshot_data TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                expires_at TEXT,
                restored INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            cache: Mutex::new(LruCache::new(DEFAULT_LRU_CAPACITY)),
            pool,
        })
    }

    #[cfg(not(feature = "sqlite"))]
    pub fn in_memory() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(DEFAULT_LRU_CAPACITY)),
        }
    }

    pub async fn capture(&self, snapshot: Snapshot) -> Result<(), RollbackError> {
        #[cfg(feature = "sqlite")]
        {
            sqlx::query(
                "INSERT OR REPLACE INTO snapshots (action_id, action_type, agent_id, snapshot_data, captured_at, expires_at, restored) VALUES (?, ?, ?, ?, ?, ?, 0)",
            )
            .bind(&snapshot.action_id)
            .bind(&snapshot.action_type)
            .bind(&snapshot.agent_id)
            .bind(serde_json::to_string(&snapshot.data).map_err(|e| RollbackError::HandlerFailed {
                action_id: snapshot.action_id.clone(),
                source: e.into(),
            })?)
            .bind(snapshot.captured_at.to_rfc3339())
            .bind(snapshot.expires_at.map(|t| t.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        }

        self.cache.lock().put(snapshot);
        Ok(())
    }

    pub async fn get(&self, action_id: &str) -> Result<Snapshot, RollbackError> {
        if let Some(snapshot) = self.cache.lock().get(action_id) {
            return Ok(snapshot);
        }

        #[cfg(feature = "sqlite")]
        {
            let row: Option<(String, String, String, String, String, Option<String>)> = sqlx::query_as(
                "SELECT action_id, action_type, agent_id, snapshot_data, captured_at, expires_at FROM snapshots WHERE action_id = ?",
            )
            .bind(action_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some((action_id, action_type, agent_id, data, captured_at, expires_at)) = row {
                let snapshot = Snapshot {
                    action_id,
                    action_type,
                    agent_id,
                    data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
                    captured_at: DateTime::parse_from_rfc3339(&captured_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    expires_at: expires_at
                        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                        .map(|t| t.with_timezone(&Utc)),
                };
                self.cache.lock().put(snapshot.clone());
                return Ok(snapshot);
            }
        }

        Err(RollbackError::SnapshotNotFound(action_id.to_string()))
    }

    pub async fn mark_restored(&self, action_id: &str) -> Result<(), RollbackError> {
        #[cfg(feature = "sqlite")]
        {
            sqlx::query("UPDATE snapshots SET restored = 1 WHERE action_id = ?")
                .bind(action_id)
                .execute(&self.pool)
                .await?;
        }
        let _ = action_id;
        Ok(())
    }

    pub async fn remove(&self, action_id: &str) -> Result<(), RollbackError> {
        #[cfg(feature = "sqlite")]
        {
            sqlx::query("DELETE FROM snapshots WHERE action_id = ?")
                .bind(action_id)
                .execute(&self.pool)
                .await?;
        }
        self.cache.lock().remove(action_id);
        Ok(())
    }

    /// Deletes snapshots older than `older_than_hours`. Expired snapshots
    /// are never restorable even if still present on disk.
    pub async fn cleanup(&self, older_than_hours: i64) -> Result<u64, RollbackError> {
        let cutoff = Utc::now() - ChronoDuration::hours(older_than_hours);

        #[cfg(feature = "sqlite")]
        {
            let result = sqlx::query("DELETE FROM snapshots WHERE captured_at < ?")
                .bind(cutoff.to_rfc3339())
                .execute(&self.pool)
                .await?;
            return Ok(result.rows_affected());
        }

        #[cfg(not(feature = "sqlite"))]
        {
            let mut cache = self.cache.lock();
            let stale: Vec<String> = cache
                .entries
                .iter()
                .filter(|(_, s)| s.captured_at < cutoff)
                .map(|(k, _)| k.clone())
                .collect();
            for key in &stale {
                cache.remove(key);
            }
            Ok(stale.len() as u64)
        }
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(action_id: &str) -> Snapshot {
        Snapshot {
            action_id: action_id.to_string(),
            action_type: "file.write".to_string(),
            agent_id: "agent-1".to_string(),
            data: json!({"path": "/tmp/x", "original": "hello"}),
            captured_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    #[cfg(feature = "sqlite")]
    async fn capture_and_get_round_trip() {
        let manager = SnapshotManager::connect("sqlite::memory:").await.unwrap();
        manager.capture(snapshot("a1")).await.unwrap();
        let fetched = manager.get("a1").await.unwrap();
        assert_eq!(fetched.action_id, "a1");
    }

    #[tokio::test]
    #[cfg(feature = "sqlite")]
    async fn remove_makes_snapshot_unavailable() {
        let manager = SnapshotManager::connect("sqlite::memory:").await.unwrap();
        manager.capture(snapshot("a1")).await.unwrap();
        manager.remove("a1").await.unwrap();
        assert!(manager.get("a1").await.is_err());
    }
}
