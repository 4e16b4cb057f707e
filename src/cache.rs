//! Durable enrichment cache: one JSON document on disk holding every probed
//! video aspect ratio and every generated list title, keyed by source id.
//!
//! The document is loaded once at startup and rewritten in full after each
//! new entry. Entries are append-only and never updated once written. All
//! read-modify-rewrite cycles run under one internal mutex so concurrent
//! record pipelines cannot lose updates.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

/// Cached probe result for one source record's video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoMeta {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Simplified "W:H", e.g. "16:9".
    pub ratio: String,
}

impl VideoMeta {
    /// The narrow class that routes a record to the shorts table.
    pub fn is_vertical(&self) -> bool {
        self.ratio == "9:16"
    }
}

/// Cached shortened title for one source record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TitleMeta {
    pub id: String,
    pub title: String,
    pub list_title: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    ratios: Vec<VideoMeta>,
    #[serde(default)]
    news: Vec<TitleMeta>,
}

pub struct EnrichmentCache {
    path: PathBuf,
    inner: Mutex<CacheDocument>,
}

impl EnrichmentCache {
    /// Load the document, defaulting to the empty shape when the file does
    /// not exist yet. A present-but-corrupt file is an error: silently
    /// starting empty would re-invoke every external service.
    pub async fn load(path: &Path) -> Result<Self> {
        let doc = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice::<CacheDocument>(&bytes)
                .with_context(|| format!("parsing enrichment cache {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheDocument::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading enrichment cache {}", path.display()))
            }
        };
        info!(
            path = %path.display(),
            ratios = doc.ratios.len(),
            titles = doc.news.len(),
            "enrichment cache loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(doc),
        })
    }

    pub async fn video_meta(&self, source_id: i64) -> Option<VideoMeta> {
        let key = source_id.to_string();
        let doc = self.inner.lock().await;
        doc.ratios.iter().find(|m| m.id == key).cloned()
    }

    pub async fn title_meta(&self, source_id: i64) -> Option<TitleMeta> {
        let key = source_id.to_string();
        let doc = self.inner.lock().await;
        doc.news.iter().find(|m| m.id == key).cloned()
    }

    /// Append a probe result and rewrite the document. First write wins;
    /// a duplicate key leaves the stored entry untouched.
    pub async fn put_video_meta(&self, meta: VideoMeta) -> Result<()> {
        let mut doc = self.inner.lock().await;
        if doc.ratios.iter().any(|m| m.id == meta.id) {
            return Ok(());
        }
        doc.ratios.push(meta);
        self.persist(&doc).await
    }

    /// Append a generated list title and rewrite the document.
    pub async fn put_title_meta(&self, meta: TitleMeta) -> Result<()> {
        let mut doc = self.inner.lock().await;
        if doc.news.iter().any(|m| m.id == meta.id) {
            return Ok(());
        }
        doc.news.push(meta);
        self.persist(&doc).await
    }

    async fn persist(&self, doc: &CacheDocument) -> Result<()> {
        let bytes = serde_json::to_vec(doc)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing enrichment cache {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ratio(id: &str, ratio: &str) -> VideoMeta {
        VideoMeta {
            id: id.into(),
            title: "Video".into(),
            url: "https://cdn.example/v.m3u8".into(),
            thumbnail: None,
            ratio: ratio.into(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty_and_persists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");

        let cache = EnrichmentCache::load(&path).await.unwrap();
        assert!(cache.video_meta(7).await.is_none());

        cache.put_video_meta(sample_ratio("7", "16:9")).await.unwrap();
        assert_eq!(cache.video_meta(7).await.unwrap().ratio, "16:9");

        // Reload from disk: the rewrite must have landed.
        let reloaded = EnrichmentCache::load(&path).await.unwrap();
        assert_eq!(reloaded.video_meta(7).await.unwrap().ratio, "16:9");
    }

    #[tokio::test]
    async fn entries_are_never_updated_once_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let cache = EnrichmentCache::load(&path).await.unwrap();

        cache.put_video_meta(sample_ratio("9", "9:16")).await.unwrap();
        cache.put_video_meta(sample_ratio("9", "16:9")).await.unwrap();
        assert_eq!(cache.video_meta(9).await.unwrap().ratio, "9:16");
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(EnrichmentCache::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn vertical_ratio_is_the_shorts_class() {
        assert!(sample_ratio("1", "9:16").is_vertical());
        assert!(!sample_ratio("1", "16:9").is_vertical());
    }
}
