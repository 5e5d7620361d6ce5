/// Repository layer for persisted local state
use crate::domain::Apod;
use crate::errors::ApiResult;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Storage key of the favorites list
pub const FAVORITES_KEY: &str = "nasa-favorites";

/// String key/value storage, the server-side stand-in for browser local storage
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> ApiResult<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>("SELECT value FROM local_storage WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn set(&self, key: &str, value: &str) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO local_storage(key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> ApiResult<()> {
        sqlx::query("DELETE FROM local_storage WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Ordered list of favorite pictures, keyed by date.
///
/// The list lives in memory and is written through to the store after every
/// mutation. Each read-modify-write holds the lock for its whole duration.
pub struct FavoritesRepo {
    store: LocalStore,
    items: Mutex<Vec<Apod>>,
}

impl FavoritesRepo {
    /// Load the persisted list; unreadable data starts an empty list
    pub async fn load(store: LocalStore) -> ApiResult<Self> {
        let items = match store.get(FAVORITES_KEY).await? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<Apod>>(&raw) {
                Ok(items) => dedup_by_date(items),
                Err(e) => {
                    warn!("Ignoring unreadable favorites ({}), starting empty", e);
                    Vec::new()
                }
            },
        };
        info!("Loaded {} favorites", items.len());

        Ok(Self {
            store,
            items: Mutex::new(items),
        })
    }

    pub async fn list(&self) -> Vec<Apod> {
        self.items.lock().await.clone()
    }

    pub async fn contains(&self, date: NaiveDate) -> bool {
        self.items.lock().await.iter().any(|a| a.date == date)
    }

    /// Append `apod` unless its date is already present
    pub async fn add(&self, apod: Apod) -> ApiResult<bool> {
        let mut items = self.items.lock().await;
        if items.iter().any(|a| a.date == apod.date) {
            return Ok(false);
        }
        let mut next = items.clone();
        next.push(apod);
        self.persist(&next).await?;
        *items = next;
        Ok(true)
    }

    /// Remove the entry for `date`, if any
    pub async fn remove(&self, date: NaiveDate) -> ApiResult<bool> {
        let mut items = self.items.lock().await;
        if !items.iter().any(|a| a.date == date) {
            return Ok(false);
        }
        let next: Vec<Apod> = items.iter().filter(|a| a.date != date).cloned().collect();
        self.persist(&next).await?;
        *items = next;
        Ok(true)
    }

    /// Flip membership of `apod`; returns whether it is a favorite afterwards
    pub async fn toggle(&self, apod: Apod) -> ApiResult<bool> {
        let mut items = self.items.lock().await;
        let mut next = items.clone();
        let now_favorite = if next.iter().any(|a| a.date == apod.date) {
            next.retain(|a| a.date != apod.date);
            false
        } else {
            next.push(apod);
            true
        };
        self.persist(&next).await?;
        *items = next;
        Ok(now_favorite)
    }

    /// Drop every favorite and the stored key
    pub async fn clear(&self) -> ApiResult<usize> {
        let mut items = self.items.lock().await;
        self.store.remove(FAVORITES_KEY).await?;
        let removed = items.len();
        items.clear();
        Ok(removed)
    }

    /// Memory only changes once storage has accepted the new list
    async fn persist(&self, items: &[Apod]) -> ApiResult<()> {
        let raw = serde_json::to_string(items)?;
        self.store.set(FAVORITES_KEY, &raw).await
    }
}

fn dedup_by_date(items: Vec<Apod>) -> Vec<Apod> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|a| seen.insert(a.date)).collect()
}

/// Initialize database tables
pub async fn init_db(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS local_storage(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
