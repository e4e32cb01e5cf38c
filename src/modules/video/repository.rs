use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{NewVideoRecord, OwnerSummary, VideoRecord};
use crate::common::error::CatalogError;
use crate::infrastructure::db::pool::DbPool;

/// Durable record of published videos.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Stores a record and returns it with its assigned id.
    ///
    /// Appending twice for the same `job_id` returns the first record.
    async fn append(&self, record: NewVideoRecord) -> Result<VideoRecord, CatalogError>;

    /// Every record in insertion order. Each call starts a fresh pass.
    fn list(&self) -> BoxStream<'_, Result<VideoRecord, CatalogError>>;

    async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>, CatalogError>;
}

/// Read side of the user-account store, used to decorate catalog entries.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn owners(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, OwnerSummary>, CatalogError>;
}

macro_rules! video_columns {
    () => {
        "id, job_id, title, description, user_id, source_path, output_path, manifest_path, created_at"
    };
}

const INSERT_VIDEO: &str = concat!(
    "INSERT INTO videos (",
    video_columns!(),
    ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (job_id) DO NOTHING RETURNING ",
    video_columns!()
);
const SELECT_BY_JOB: &str = concat!("SELECT ", video_columns!(), " FROM videos WHERE job_id = $1");
const SELECT_BY_ID: &str = concat!("SELECT ", video_columns!(), " FROM videos WHERE id = $1");
const SELECT_ALL: &str = concat!("SELECT ", video_columns!(), " FROM videos ORDER BY created_at, id");

#[derive(Clone)]
pub struct PgVideoCatalog {
    pool: DbPool,
}

impl PgVideoCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoCatalog for PgVideoCatalog {
    async fn append(&self, record: NewVideoRecord) -> Result<VideoRecord, CatalogError> {
        let row = record.into_record(Uuid::new_v4(), OffsetDateTime::now_utc());

        // The unique job_id constraint serializes concurrent appends for one job.
        let inserted = sqlx::query_as::<_, VideoRecord>(INSERT_VIDEO)
            .bind(row.id)
            .bind(row.job_id)
            .bind(&row.title)
            .bind(&row.description)
            .bind(row.user_id)
            .bind(&row.source_path)
            .bind(&row.output_path)
            .bind(&row.manifest_path)
            .bind(row.created_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(video) = inserted {
            return Ok(video);
        }

        let existing = sqlx::query_as::<_, VideoRecord>(SELECT_BY_JOB)
            .bind(row.job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(existing)
    }

    fn list(&self) -> BoxStream<'_, Result<VideoRecord, CatalogError>> {
        sqlx::query_as::<_, VideoRecord>(SELECT_ALL)
            .fetch(&self.pool)
            .map(|row| row.map_err(CatalogError::from))
            .boxed()
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>, CatalogError> {
        let video = sqlx::query_as::<_, VideoRecord>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }
}

#[derive(Clone)]
pub struct PgOwnerDirectory {
    pool: DbPool,
}

impl PgOwnerDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerDirectory for PgOwnerDirectory {
    async fn owners(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, OwnerSummary>, CatalogError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let owners = sqlx::query_as::<_, OwnerSummary>(
            "SELECT id, username, email FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(owners.into_iter().map(|o| (o.id, o)).collect())
    }
}

/// Process-local catalog. Records live as long as the value does.
#[derive(Default)]
pub struct MemoryCatalog {
    records: RwLock<Vec<VideoRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VideoCatalog for MemoryCatalog {
    async fn append(&self, record: NewVideoRecord) -> Result<VideoRecord, CatalogError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.iter().find(|r| r.job_id == record.job_id) {
            return Ok(existing.clone());
        }
        let video = record.into_record(Uuid::new_v4(), OffsetDateTime::now_utc());
        records.push(video.clone());
        Ok(video)
    }

    fn list(&self) -> BoxStream<'_, Result<VideoRecord, CatalogError>> {
        stream::once(async move { self.records.read().await.clone() })
            .flat_map(|records| stream::iter(records.into_iter().map(Ok)))
            .boxed()
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>, CatalogError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryOwnerDirectory {
    owners: HashMap<Uuid, OwnerSummary>,
}

impl MemoryOwnerDirectory {
    pub fn new(owners: impl IntoIterator<Item = OwnerSummary>) -> Self {
        Self {
            owners: owners.into_iter().map(|o| (o.id, o)).collect(),
        }
    }
}

#[async_trait]
impl OwnerDirectory for MemoryOwnerDirectory {
    async fn owners(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, OwnerSummary>, CatalogError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.owners.get(id).map(|o| (*id, o.clone())))
            .collect())
    }
}
