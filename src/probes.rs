//! Enrichment probes: thin adapters over the two external services, with
//! cache-first lookup and per-record timeouts.
//!
//! The video prober and the title shortener are black boxes behind traits so
//! the classifier can be exercised against in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use crate::cache::{EnrichmentCache, TitleMeta, VideoMeta};
use crate::model::SourceRecord;
use crate::util::env as env_util;

/// Media analysis service: URL in, video dimensions out.
/// `Ok(None)` is the soft "not found" outcome (source unreachable).
#[async_trait]
pub trait VideoProbe: Send + Sync {
    async fn dimensions(&self, url: &str) -> Result<Option<(u32, u32)>>;
}

/// Text-shortening service: title in, list title out.
#[async_trait]
pub trait TitleShortener: Send + Sync {
    async fn shorten(&self, title: &str) -> Result<String>;
}

/// Reduce a width:height pair to lowest terms, e.g. 1920x1080 -> "16:9".
pub fn simplify_ratio(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }
    let d = gcd(width, height).max(1);
    format!("{}:{}", width / d, height / d)
}

/// HTTP client for the media analysis service. The service fetches the
/// media behind `url` and reports its track list; we only consume the video
/// track's dimensions.
pub struct MediaProbeClient {
    base_url: String,
    http: Client,
}

impl MediaProbeClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent("story-migrator/0.1")
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_env() -> Result<Self> {
        let base = env_util::env_req("MEDIA_PROBE_URL")?;
        Self::new(&base, env_util::env_parse("MEDIA_PROBE_TIMEOUT_SECS", 60))
    }

    fn value_as_u32(v: &Value) -> Option<u32> {
        if let Some(n) = v.as_u64() {
            return u32::try_from(n).ok();
        }
        if let Some(s) = v.as_str() {
            return s.parse::<u32>().ok();
        }
        None
    }
}

#[async_trait]
impl VideoProbe for MediaProbeClient {
    async fn dimensions(&self, url: &str) -> Result<Option<(u32, u32)>> {
        let resp = self
            .http
            .get(format!("{}/analyze", self.base_url))
            .query(&[("url", url)])
            .send()
            .await
            .context("media probe request failed")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().context("media probe error status")?;
        let body: Value = resp.json().await.context("media probe returned non-JSON")?;

        let tracks = body
            .get("media")
            .and_then(|m| m.get("track"))
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();
        let video = tracks
            .iter()
            .find(|t| t.get("@type").and_then(|k| k.as_str()) == Some("Video"));
        let Some(video) = video else {
            warn!(url, "no video track in probe result");
            return Ok(None);
        };

        let width = video.get("Width").and_then(Self::value_as_u32);
        let height = video.get("Height").and_then(Self::value_as_u32);
        match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok(Some((w, h))),
            _ => Ok(None),
        }
    }
}

/// Fixed system instruction for the shortening task (kept in the source
/// language of the content).
const SHORTEN_SYSTEM_PROMPT: &str = "Sen bir başlık kısaltma uzmanısın. Sana verilen başlığı \
60 karakterin altında olacak şekilde yeniden yaz. Başlığın tarzını ve mesajını koru. \
Sadece kısaltılmış başlığı döndür, başka açıklama yapma.";

/// Chat-completions client for the local model host.
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent("story-migrator/0.1")
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http,
        })
    }

    pub fn from_env() -> Result<Self> {
        let base =
            env_util::env_opt("OLLAMA_URL").unwrap_or_else(|| "http://127.0.0.1:11434".into());
        let model = env_util::env_opt("OLLAMA_MODEL").unwrap_or_else(|| "gemma2:latest".into());
        Self::new(&base, &model, env_util::env_parse("OLLAMA_TIMEOUT_SECS", 120))
    }
}

#[async_trait]
impl TitleShortener for OllamaClient {
    async fn shorten(&self, title: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": SHORTEN_SYSTEM_PROMPT},
                {"role": "user", "content": title},
            ],
        });
        let resp: Value = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("shortener request failed")?
            .error_for_status()
            .context("shortener error status")?
            .json()
            .await
            .context("shortener returned non-JSON")?;

        resp.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("shortener response had no message content"))
    }
}

/// Cache-first enrichment over both probes. Every fresh computation is
/// persisted before it is returned.
pub struct Enricher {
    cache: Arc<EnrichmentCache>,
    probe: Arc<dyn VideoProbe>,
    shortener: Arc<dyn TitleShortener>,
    timeout: Duration,
}

impl Enricher {
    pub fn new(
        cache: Arc<EnrichmentCache>,
        probe: Arc<dyn VideoProbe>,
        shortener: Arc<dyn TitleShortener>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            probe,
            shortener,
            timeout,
        }
    }

    /// Resolve the record's video metadata. Absence (no descriptor, probe
    /// not-found, probe error, timeout) is soft: the record simply falls
    /// through to the non-video branches.
    pub async fn video_meta(&self, record: &SourceRecord) -> Option<VideoMeta> {
        if let Some(hit) = self.cache.video_meta(record.id).await {
            return Some(hit);
        }
        let url = record.video.as_ref().and_then(|v| v.probe_url())?;

        let probed = tokio::time::timeout(self.timeout, self.probe.dimensions(url)).await;
        let dims = match probed {
            Err(_) => {
                warn!(story_id = record.id, "video probe timed out; treating as absent");
                return None;
            }
            Ok(Err(e)) => {
                warn!(story_id = record.id, error = %e, "video probe failed; treating as absent");
                return None;
            }
            Ok(Ok(dims)) => dims?,
        };

        let meta = VideoMeta {
            id: record.id.to_string(),
            title: record.title_source().to_string(),
            url: url.to_string(),
            thumbnail: record.images.first().map(|i| i.url.clone()),
            ratio: simplify_ratio(dims.0, dims.1),
        };
        if let Err(e) = self.cache.put_video_meta(meta.clone()).await {
            warn!(story_id = record.id, error = %e, "failed to persist video meta");
        }
        Some(meta)
    }

    /// Resolve the shortened list title, computing it at most once per
    /// source id. Errors here abandon the record's pipeline.
    pub async fn short_title(&self, record: &SourceRecord, title: &str) -> Result<String> {
        if let Some(hit) = self.cache.title_meta(record.id).await {
            return Ok(hit.list_title);
        }
        let shortened = tokio::time::timeout(self.timeout, self.shortener.shorten(title))
            .await
            .map_err(|_| anyhow!("title shortener timed out for story {}", record.id))??;

        self.cache
            .put_title_meta(TitleMeta {
                id: record.id.to_string(),
                title: title.to_string(),
                list_title: shortened.clone(),
            })
            .await?;
        Ok(shortened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct FixedProbe(pub Option<(u32, u32)>);

    #[async_trait]
    impl VideoProbe for FixedProbe {
        async fn dimensions(&self, _url: &str) -> Result<Option<(u32, u32)>> {
            Ok(self.0)
        }
    }

    pub(crate) struct CountingShortener {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl TitleShortener for CountingShortener {
        async fn shorten(&self, _title: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Kısa başlık".into())
        }
    }

    fn record_with_video() -> SourceRecord {
        let mut rec = crate::model::testutil::sample_record();
        rec.video = Some(crate::model::VideoDescriptor {
            url: Some("https://cdn.example/v/original".into()),
            playlist: None,
        });
        rec
    }

    async fn enricher_with(
        probe: Arc<dyn VideoProbe>,
        shortener: Arc<dyn TitleShortener>,
    ) -> (Enricher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = EnrichmentCache::load(&dir.path().join("metadata.json"))
            .await
            .unwrap();
        (
            Enricher::new(Arc::new(cache), probe, shortener, Duration::from_secs(5)),
            dir,
        )
    }

    #[test]
    fn simplifies_common_ratios() {
        assert_eq!(simplify_ratio(1920, 1080), "16:9");
        assert_eq!(simplify_ratio(1080, 1920), "9:16");
        assert_eq!(simplify_ratio(640, 480), "4:3");
    }

    #[tokio::test]
    async fn probe_not_found_is_soft_absence() {
        let shortener = Arc::new(CountingShortener {
            calls: AtomicUsize::new(0),
        });
        let (enricher, _dir) = enricher_with(Arc::new(FixedProbe(None)), shortener).await;
        assert!(enricher.video_meta(&record_with_video()).await.is_none());
    }

    #[tokio::test]
    async fn probed_ratio_is_cached_and_returned() {
        let shortener = Arc::new(CountingShortener {
            calls: AtomicUsize::new(0),
        });
        let (enricher, _dir) =
            enricher_with(Arc::new(FixedProbe(Some((1080, 1920)))), shortener).await;
        let rec = record_with_video();

        let meta = enricher.video_meta(&rec).await.unwrap();
        assert_eq!(meta.ratio, "9:16");
        assert!(meta.is_vertical());

        // Second call must be served from the cache even if the probe would
        // now disagree.
        let meta2 = enricher.video_meta(&rec).await.unwrap();
        assert_eq!(meta2, meta);
    }

    #[tokio::test]
    async fn short_title_is_computed_at_most_once_per_id() {
        let shortener = Arc::new(CountingShortener {
            calls: AtomicUsize::new(0),
        });
        let (enricher, _dir) =
            enricher_with(Arc::new(FixedProbe(None)), shortener.clone()).await;
        let rec = crate::model::testutil::sample_record();
        let long = "a".repeat(85);

        let first = enricher.short_title(&rec, &long).await.unwrap();
        let second = enricher.short_title(&rec, &long).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(shortener.calls.load(Ordering::SeqCst), 1);
    }
}
