//! Idempotent destination writer: one existence check + insert per entity
//! type, keyed by the import key (the source record id).
//!
//! The check-then-act sequence is not transactionally guarded; the run is
//! single-process and the import key is checked on every run, which keeps
//! repeated runs from duplicating rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use crate::db::Db;
use crate::model::{
    ArticlePayload, ColumnPayload, DestinationPayload, InfographicPayload, ShortPayload,
    VideoArticlePayload, WriteResult,
};

/// Seam between the router and the destination store; the pipeline tests
/// run against an in-memory implementation.
#[async_trait]
pub trait ContentWriter: Send + Sync {
    async fn write(&self, payload: &DestinationPayload) -> Result<WriteResult>;
}

pub struct PgContentWriter {
    db: Db,
}

impl PgContentWriter {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Look up a destination row by import key. `table` is always a static
    /// table name from the dispatch below, never user input.
    async fn existing_id(&self, table: &str, import_id: &str) -> Result<Option<String>> {
        let query = format!("SELECT id FROM {table} WHERE import_id = $1 LIMIT 1");
        let row = sqlx::query(&query)
            .persistent(false)
            .bind(import_id)
            .fetch_optional(&self.db.pool)
            .await
            .with_context(|| format!("checking {table} for import {import_id}"))?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Authorship relation, created only when a news/video row was actually
    /// inserted in this run.
    async fn link_editor(&self, news_id: &str, editor_id: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO news_writers_pivot(news_id, editor_id, "createdAt", "updatedAt")
               VALUES ($1,$2,$3,$4)"#,
        )
        .persistent(false)
        .bind(news_id)
        .bind(editor_id)
        .bind(now)
        .bind(now)
        .execute(&self.db.pool)
        .await
        .context("inserting news/editor relation")?;
        Ok(())
    }

    async fn insert_article(&self, p: &ArticlePayload) -> Result<WriteResult> {
        if self.existing_id("news", &p.core.import_id).await?.is_some() {
            return Ok(WriteResult::AlreadyExists);
        }
        sqlx::query(
            "INSERT INTO news(id, slug, title, description, content, brand_id, seo, status, \
             is_premium, thumbnails, number_of_views, import_id, published_at, created_by, \
             created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .persistent(false)
        .bind(&p.core.id)
        .bind(&p.core.slug)
        .bind(&p.core.title)
        .bind(&p.core.description)
        .bind(&p.content)
        .bind(&p.core.brand_id)
        .bind(&p.core.seo)
        .bind(&p.core.status)
        .bind(p.core.is_premium)
        .bind(&p.core.thumbnails)
        .bind(p.core.number_of_views)
        .bind(&p.core.import_id)
        .bind(p.core.published_at)
        .bind(&p.editor_id)
        .bind(p.core.created_at)
        .bind(p.core.updated_at)
        .execute(&self.db.pool)
        .await
        .context("inserting news row")?;

        self.link_editor(&p.core.id, &p.editor_id).await?;
        Ok(WriteResult::Inserted(p.core.id.clone()))
    }

    async fn insert_video_article(&self, p: &VideoArticlePayload) -> Result<WriteResult> {
        if self
            .existing_id("video_news", &p.core.import_id)
            .await?
            .is_some()
        {
            return Ok(WriteResult::AlreadyExists);
        }
        sqlx::query(
            "INSERT INTO video_news(id, slug, title, description, content, video, brand_id, seo, \
             status, is_premium, thumbnails, number_of_views, import_id, published_at, \
             created_by, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)",
        )
        .persistent(false)
        .bind(&p.core.id)
        .bind(&p.core.slug)
        .bind(&p.core.title)
        .bind(&p.core.description)
        .bind(&p.content)
        .bind(&p.video_url)
        .bind(&p.core.brand_id)
        .bind(&p.core.seo)
        .bind(&p.core.status)
        .bind(p.core.is_premium)
        .bind(&p.core.thumbnails)
        .bind(p.core.number_of_views)
        .bind(&p.core.import_id)
        .bind(p.core.published_at)
        .bind(&p.editor_id)
        .bind(p.core.created_at)
        .bind(p.core.updated_at)
        .execute(&self.db.pool)
        .await
        .context("inserting video_news row")?;

        self.link_editor(&p.core.id, &p.editor_id).await?;
        Ok(WriteResult::Inserted(p.core.id.clone()))
    }

    async fn insert_short(&self, p: &ShortPayload) -> Result<WriteResult> {
        if self
            .existing_id("shorts", &p.core.import_id)
            .await?
            .is_some()
        {
            return Ok(WriteResult::AlreadyExists);
        }
        sqlx::query(
            "INSERT INTO shorts(id, slug, title, description, url, brand_id, status, thumbnails, \
             number_of_views, import_id, created_by, published_at, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
        )
        .persistent(false)
        .bind(&p.core.id)
        .bind(&p.core.slug)
        .bind(&p.core.title)
        .bind(&p.core.description)
        .bind(&p.url)
        .bind(&p.core.brand_id)
        .bind(&p.core.status)
        .bind(&p.core.thumbnails)
        .bind(p.core.number_of_views)
        .bind(&p.core.import_id)
        .bind(&p.editor_id)
        .bind(p.core.published_at)
        .bind(p.core.created_at)
        .bind(p.core.updated_at)
        .execute(&self.db.pool)
        .await
        .context("inserting shorts row")?;
        Ok(WriteResult::Inserted(p.core.id.clone()))
    }

    async fn insert_column(&self, p: &ColumnPayload) -> Result<WriteResult> {
        if self
            .existing_id("columns", &p.core.import_id)
            .await?
            .is_some()
        {
            return Ok(WriteResult::AlreadyExists);
        }
        sqlx::query(
            "INSERT INTO columns(id, slug, title, description, content, brand_id, seo, status, \
             writer_id, thumbnails, number_of_views, import_id, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
        )
        .persistent(false)
        .bind(&p.core.id)
        .bind(&p.core.slug)
        .bind(&p.core.title)
        .bind(&p.core.description)
        .bind(&p.content)
        .bind(&p.core.brand_id)
        .bind(&p.core.seo)
        .bind(&p.core.status)
        .bind(&p.writer_id)
        .bind(&p.core.thumbnails)
        .bind(p.core.number_of_views)
        .bind(&p.core.import_id)
        .bind(p.core.created_at)
        .bind(p.core.updated_at)
        .execute(&self.db.pool)
        .await
        .context("inserting columns row")?;
        Ok(WriteResult::Inserted(p.core.id.clone()))
    }

    async fn insert_infographic(&self, p: &InfographicPayload) -> Result<WriteResult> {
        if self
            .existing_id("infographics", &p.core.import_id)
            .await?
            .is_some()
        {
            return Ok(WriteResult::AlreadyExists);
        }
        sqlx::query(
            "INSERT INTO infographics(id, slug, title, description, images, seo, status, \
             thumbnails, number_of_views, import_id, published_at, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .persistent(false)
        .bind(&p.core.id)
        .bind(&p.core.slug)
        .bind(&p.core.title)
        .bind(&p.core.description)
        .bind(&p.images)
        .bind(&p.core.seo)
        .bind(&p.core.status)
        .bind(&p.core.thumbnails)
        .bind(p.core.number_of_views)
        .bind(&p.core.import_id)
        .bind(p.core.published_at)
        .bind(p.core.created_at)
        .bind(p.core.updated_at)
        .execute(&self.db.pool)
        .await
        .context("inserting infographics row")?;
        Ok(WriteResult::Inserted(p.core.id.clone()))
    }
}

#[async_trait]
impl ContentWriter for PgContentWriter {
    async fn write(&self, payload: &DestinationPayload) -> Result<WriteResult> {
        let result = match payload {
            DestinationPayload::Article(p) => self.insert_article(p).await?,
            DestinationPayload::VideoArticle(p) => self.insert_video_article(p).await?,
            DestinationPayload::Short(p) => self.insert_short(p).await?,
            DestinationPayload::Column(p) => self.insert_column(p).await?,
            DestinationPayload::Infographic(p) => self.insert_infographic(p).await?,
        };
        debug!(
            kind = payload.kind(),
            import_id = %payload.core().import_id,
            result = ?result,
            "write finished"
        );
        Ok(result)
    }
}
