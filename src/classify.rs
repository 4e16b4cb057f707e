//! Classifier/router: decides which destination shape(s) a resolved source
//! record produces and assembles the payloads.
//!
//! The decision sequence is evaluated per record, first matching rule wins:
//!   1. unresolved editor, or neither brand nor category maps -> skip
//!   2. fixed (brand slug, author) editorial exclusion -> skip
//!   3. infographic sentinel + at least one image -> infographic payload
//!      (emitted in addition to any payload from the later rules)
//!   4. structured content document -> article, or column for the column
//!      brand when the author is in the columnist allow-list
//!   5. video descriptor -> short (9:16) or video article, by probed ratio
//!   6. otherwise the record contributes nothing

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::markup;
use crate::model::{
    content_id, ArticlePayload, ColumnPayload, DestinationPayload, InfographicPayload,
    PayloadCore, ShortPayload, SkipReason, SourceRecord, VideoArticlePayload,
};
use crate::probes::Enricher;
use crate::resolver::{ReferenceData, WriterResolver};
use crate::slug::unique_slug;
use crate::text::clean_title;

/// Router verdict for one record.
#[derive(Debug)]
pub enum Routed {
    Skip(SkipReason),
    /// Zero payloads means the record fell through every branch.
    Emit(Vec<DestinationPayload>),
}

pub struct Router<'a> {
    cfg: &'a MigrationConfig,
    refs: &'a ReferenceData,
    enricher: &'a Enricher,
    writers: &'a dyn WriterResolver,
}

impl<'a> Router<'a> {
    pub fn new(
        cfg: &'a MigrationConfig,
        refs: &'a ReferenceData,
        enricher: &'a Enricher,
        writers: &'a dyn WriterResolver,
    ) -> Self {
        Self {
            cfg,
            refs,
            enricher,
            writers,
        }
    }

    pub async fn classify(&self, record: &SourceRecord) -> Result<Routed> {
        let editor = self.refs.authors.resolve(record.author_id);
        let brand = self
            .refs
            .brands
            .resolve(record.brand_id, record.category_id);
        let is_infographic = self
            .refs
            .brands
            .is_infographic(record.brand_id, record.category_id);

        // Rule 1
        let Some(editor) = editor else {
            return Ok(Routed::Skip(SkipReason::MissingIdentity));
        };
        if brand.is_none() && !is_infographic {
            return Ok(Routed::Skip(SkipReason::MissingIdentity));
        }

        // Rule 2
        if let Some(brand) = brand {
            if self.cfg.is_excluded(&brand.slug, &editor.full_name) {
                debug!(story_id = record.id, brand = %brand.slug, "editorial exclusion");
                return Ok(Routed::Skip(SkipReason::EditorialExclusion));
            }
        }

        let mut payloads = Vec::new();

        // Rule 3: independent of content-document presence.
        if is_infographic && !record.images.is_empty() {
            payloads.push(self.infographic(record).await?);
        }

        // Rules 4/5 need a mapped brand to hang the payload on; a
        // sentinel-only record stops at the infographic.
        if let Some(brand) = brand {
            if record.content_data.is_some() {
                let is_column = brand.slug == self.cfg.column_brand_slug
                    && self.cfg.is_column_author(&editor.full_name);
                if is_column {
                    payloads.push(self.column(record, &brand.id, &editor.full_name).await?);
                } else {
                    payloads.push(self.article(record, &brand.id, &editor.id).await?);
                }
            } else if record.video.is_some() {
                match self.enricher.video_meta(record).await {
                    Some(meta) if meta.is_vertical() => {
                        payloads.push(self.short(record, &brand.id, &editor.id, &meta.url).await?);
                    }
                    Some(meta) => {
                        payloads.push(
                            self.video_article(record, &brand.id, &editor.id, &meta.url)
                                .await?,
                        );
                    }
                    None => {
                        debug!(story_id = record.id, "video meta absent; nothing to emit");
                    }
                }
            }
        }

        Ok(Routed::Emit(payloads))
    }

    /// Display title per the title policy: the cleaned original when short
    /// enough, else the cached/generated list title (also cleaned).
    async fn display_title(&self, record: &SourceRecord) -> Result<String> {
        let raw = record.title_source();
        let cleaned = clean_title(raw);
        if cleaned.chars().count() <= self.cfg.title_max_chars {
            return Ok(cleaned);
        }
        let short = self.enricher.short_title(record, raw).await?;
        Ok(clean_title(&short))
    }

    async fn core(&self, record: &SourceRecord, brand_id: Option<String>) -> Result<PayloadCore> {
        let id = content_id();
        let title = self.display_title(record).await?;
        // Slug from the best-available text: explicit hint, else the title.
        let slug_text = record
            .slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&title);
        let now = Utc::now();

        Ok(PayloadCore {
            slug: unique_slug(slug_text, &id),
            id,
            title,
            description: record.message.clone().unwrap_or_default(),
            brand_id,
            seo: record.seo.clone().unwrap_or_else(|| json!({})),
            thumbnails: record.thumbnails(),
            status: "published".into(),
            is_premium: record.premium,
            number_of_views: record.stat_views,
            import_id: record.id.to_string(),
            published_at: record.published_at,
            created_at: record.created_at.unwrap_or(now),
            updated_at: record.updated_at.unwrap_or(now),
        })
    }

    async fn article(
        &self,
        record: &SourceRecord,
        brand_id: &str,
        editor_id: &str,
    ) -> Result<DestinationPayload> {
        let content = record
            .content_data
            .as_ref()
            .map(markup::render)
            .unwrap_or_default();
        Ok(DestinationPayload::Article(ArticlePayload {
            core: self.core(record, Some(brand_id.to_string())).await?,
            content,
            editor_id: editor_id.to_string(),
        }))
    }

    async fn column(
        &self,
        record: &SourceRecord,
        brand_id: &str,
        author_name: &str,
    ) -> Result<DestinationPayload> {
        let writer_id = self.writers.writer_id(author_name).await?;
        if writer_id.is_none() {
            warn!(
                story_id = record.id,
                author = %author_name,
                "column emitted with null writer reference"
            );
        }
        let content = record
            .content_data
            .as_ref()
            .map(markup::render)
            .unwrap_or_default();
        Ok(DestinationPayload::Column(ColumnPayload {
            core: self.core(record, Some(brand_id.to_string())).await?,
            content,
            writer_id,
        }))
    }

    async fn video_article(
        &self,
        record: &SourceRecord,
        brand_id: &str,
        editor_id: &str,
        video_url: &str,
    ) -> Result<DestinationPayload> {
        Ok(DestinationPayload::VideoArticle(VideoArticlePayload {
            core: self.core(record, Some(brand_id.to_string())).await?,
            content: record.content_data.as_ref().map(markup::render),
            video_url: video_url.to_string(),
            editor_id: editor_id.to_string(),
        }))
    }

    async fn short(
        &self,
        record: &SourceRecord,
        brand_id: &str,
        editor_id: &str,
        video_url: &str,
    ) -> Result<DestinationPayload> {
        Ok(DestinationPayload::Short(ShortPayload {
            core: self.core(record, Some(brand_id.to_string())).await?,
            url: video_url.to_string(),
            editor_id: editor_id.to_string(),
        }))
    }

    async fn infographic(&self, record: &SourceRecord) -> Result<DestinationPayload> {
        let images = json!(record
            .images
            .iter()
            .map(|i| i.url.clone())
            .collect::<Vec<_>>());
        Ok(DestinationPayload::Infographic(InfographicPayload {
            core: self.core(record, None).await?,
            images,
        }))
    }
}
