//! Pipeline driver: streams the source cursor in fixed-size pages, fans each
//! row out to its own classify -> enrich -> write pipeline, and drains the
//! in-flight set at the batch ceiling and at every page boundary.
//!
//! No ordering is guaranteed across records. Any error inside one record's
//! pipeline is caught here and counted; it never affects sibling pipelines,
//! the page loop, or the run. The run itself only fails when the source
//! cursor cannot be read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::classify::{Routed, Router};
use crate::config::MigrationConfig;
use crate::db::Db;
use crate::model::{RecordOutcome, SourceRecord, WriteResult};
use crate::probes::Enricher;
use crate::resolver::{ReferenceData, WriterResolver};
use crate::writer::ContentWriter;

const SOURCE_CURSOR_QUERY: &str = "SELECT id, title, message, content_data, video, images, \
     brand_id, category_id, author_id, slug, seo, premium, stat_views, published_at, \
     created_at, updated_at \
     FROM story \
     WHERE status = 'published' AND author_id IS NOT NULL \
       AND (content_data IS NOT NULL OR video IS NOT NULL) \
     ORDER BY published_at DESC";

/// Aggregate run counters, shared by every record pipeline.
#[derive(Debug, Default)]
pub struct RunStats {
    pub processed: AtomicU64,
    pub written: AtomicU64,
    pub duplicates: AtomicU64,
    pub skipped: AtomicU64,
    pub no_op: AtomicU64,
    pub failed: AtomicU64,
}

/// Immutable snapshot for the end-of-run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub written: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub no_op: u64,
    pub failed: u64,
}

impl RunStats {
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            processed: self.processed.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            no_op: self.no_op.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Everything a record pipeline needs, constructed once at startup and
/// passed explicitly; nothing here is reachable through globals.
pub struct PipelineContext {
    pub cfg: MigrationConfig,
    pub refs: ReferenceData,
    pub enricher: Enricher,
    pub writers: Arc<dyn WriterResolver>,
    pub writer: Arc<dyn ContentWriter>,
    pub stats: RunStats,
}

/// Stream the whole source cursor to completion.
pub async fn run(source: &Db, ctx: Arc<PipelineContext>) -> Result<RunSummary> {
    let mut pages = sqlx::query(SOURCE_CURSOR_QUERY)
        .persistent(false)
        .fetch(&source.pool)
        .chunks(ctx.cfg.read_count);

    let mut page_no = 0usize;
    while let Some(page) = pages.next().await {
        page_no += 1;
        let mut records = Vec::with_capacity(page.len());
        for row in page {
            let row = row.context("reading source cursor")?;
            match SourceRecord::from_row(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    ctx.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "unreadable source row; counted as failed");
                }
            }
        }
        let rows = records.len();
        let drains = process_page(Arc::clone(&ctx), records).await;
        info!(page = page_no, rows, drains, "page drained");
    }

    Ok(ctx.stats.snapshot())
}

/// Launch one pipeline per record, draining whenever the in-flight set hits
/// the ceiling and once more at the page boundary. Returns the number of
/// drain points, and only after every outcome for the page is accounted.
pub async fn process_page(ctx: Arc<PipelineContext>, records: Vec<SourceRecord>) -> usize {
    let mut inflight: Vec<JoinHandle<()>> = Vec::new();
    let mut drains = 0usize;

    for record in records {
        let task_ctx = Arc::clone(&ctx);
        inflight.push(tokio::spawn(async move {
            process_record(task_ctx, record).await;
        }));
        if inflight.len() >= ctx.cfg.batch_ceiling {
            drain(&ctx, &mut inflight).await;
            drains += 1;
        }
    }
    if !inflight.is_empty() {
        drain(&ctx, &mut inflight).await;
        drains += 1;
    }
    drains
}

async fn drain(ctx: &PipelineContext, inflight: &mut Vec<JoinHandle<()>>) {
    debug!(count = inflight.len(), "draining in-flight pipelines");
    for result in futures::future::join_all(inflight.drain(..)).await {
        if let Err(join_err) = result {
            // A panicked pipeline is just another failed record.
            ctx.stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(error = %join_err, "record pipeline panicked");
        }
    }
}

/// Pipeline boundary: every error below this point is caught and counted.
async fn process_record(ctx: Arc<PipelineContext>, record: SourceRecord) {
    ctx.stats.processed.fetch_add(1, Ordering::Relaxed);
    let story_id = record.id;
    match migrate_record(&ctx, &record).await {
        Ok(RecordOutcome::Written {
            inserted,
            duplicates,
        }) => {
            ctx.stats
                .written
                .fetch_add(inserted as u64, Ordering::Relaxed);
            ctx.stats
                .duplicates
                .fetch_add(duplicates as u64, Ordering::Relaxed);
            debug!(story_id, inserted, duplicates, "record migrated");
        }
        Ok(RecordOutcome::Skipped(reason)) => {
            ctx.stats.skipped.fetch_add(1, Ordering::Relaxed);
            info!(story_id, reason = reason.as_str(), "record skipped");
        }
        Ok(RecordOutcome::Nothing) => {
            ctx.stats.no_op.fetch_add(1, Ordering::Relaxed);
            debug!(story_id, "record contributed nothing");
        }
        Err(e) => {
            ctx.stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(story_id, error = %e, "record pipeline failed");
        }
    }
}

async fn migrate_record(ctx: &PipelineContext, record: &SourceRecord) -> Result<RecordOutcome> {
    let router = Router::new(&ctx.cfg, &ctx.refs, &ctx.enricher, ctx.writers.as_ref());
    match router.classify(record).await? {
        Routed::Skip(reason) => Ok(RecordOutcome::Skipped(reason)),
        Routed::Emit(payloads) if payloads.is_empty() => Ok(RecordOutcome::Nothing),
        Routed::Emit(payloads) => {
            let mut inserted = 0usize;
            let mut duplicates = 0usize;
            for payload in &payloads {
                match ctx.writer.write(payload).await? {
                    WriteResult::Inserted(_) => inserted += 1,
                    WriteResult::AlreadyExists => duplicates += 1,
                }
            }
            Ok(RecordOutcome::Written {
                inserted,
                duplicates,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::cache::EnrichmentCache;
    use crate::model::testutil::sample_record;
    use crate::model::{DestBrand, DestinationPayload, Editor};
    use crate::probes::{TitleShortener, VideoProbe};
    use crate::resolver::{AuthorIndex, BrandMap};

    struct NoVideoProbe;

    #[async_trait]
    impl VideoProbe for NoVideoProbe {
        async fn dimensions(&self, _url: &str) -> Result<Option<(u32, u32)>> {
            Ok(None)
        }
    }

    struct NoShortener;

    #[async_trait]
    impl TitleShortener for NoShortener {
        async fn shorten(&self, title: &str) -> Result<String> {
            Ok(title.chars().take(40).collect())
        }
    }

    struct NullWriters;

    #[async_trait]
    impl crate::resolver::WriterResolver for NullWriters {
        async fn writer_id(&self, _full_name: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    /// Destination store stand-in: one import-key set per entity type, with
    /// the same check-then-insert protocol as the real writer.
    struct MemoryWriter {
        tables: Mutex<HashMap<&'static str, HashSet<String>>>,
    }

    impl MemoryWriter {
        fn new() -> Self {
            Self {
                tables: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ContentWriter for MemoryWriter {
        async fn write(&self, payload: &DestinationPayload) -> Result<WriteResult> {
            let mut tables = self.tables.lock().await;
            let table = tables.entry(payload.kind()).or_default();
            let key = payload.core().import_id.clone();
            if table.contains(&key) {
                Ok(WriteResult::AlreadyExists)
            } else {
                table.insert(key);
                Ok(WriteResult::Inserted(payload.core().id.clone()))
            }
        }
    }

    async fn context(ceiling: usize) -> (Arc<PipelineContext>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = EnrichmentCache::load(&dir.path().join("metadata.json"))
            .await
            .unwrap();
        let enricher = Enricher::new(
            Arc::new(cache),
            Arc::new(NoVideoProbe),
            Arc::new(NoShortener),
            Duration::from_secs(5),
        );
        let refs = ReferenceData {
            authors: AuthorIndex::from_entries(vec![(
                3,
                Editor {
                    id: "ed-1".into(),
                    full_name: "Ayşe Demir".into(),
                    email: None,
                },
            )]),
            brands: BrandMap::from_parts(
                vec![(
                    7,
                    DestBrand {
                        id: "dest-gundem".into(),
                        slug: "gundem".into(),
                        name: "GUNDEM".into(),
                    },
                )],
                vec![],
                vec![],
            ),
        };
        let ctx = PipelineContext {
            cfg: MigrationConfig {
                batch_ceiling: ceiling,
                ..Default::default()
            },
            refs,
            enricher,
            writers: Arc::new(NullWriters),
            writer: Arc::new(MemoryWriter::new()),
            stats: RunStats::default(),
        };
        (Arc::new(ctx), dir)
    }

    fn eligible_record(id: i64) -> SourceRecord {
        let mut rec = sample_record();
        rec.id = id;
        rec.content_data = Some(serde_json::json!({"blocks": [
            {"type": "paragraph", "data": {"text": "Metin"}}
        ]}));
        rec
    }

    #[tokio::test]
    async fn full_page_with_ceiling_512_drains_exactly_twice() {
        let (ctx, _dir) = context(512).await;
        let records: Vec<_> = (1..=1000).map(eligible_record).collect();

        let drains = process_page(Arc::clone(&ctx), records).await;
        assert_eq!(drains, 2);

        // Every outcome is accounted before the next page would be pulled.
        let s = ctx.stats.snapshot();
        assert_eq!(s.processed, 1000);
        assert_eq!(s.written, 1000);
        assert_eq!(s.failed, 0);
    }

    #[tokio::test]
    async fn second_run_over_same_records_is_all_duplicates() {
        let (ctx, _dir) = context(64).await;
        let records: Vec<_> = (1..=100).map(eligible_record).collect();

        process_page(Arc::clone(&ctx), records.clone()).await;
        let first = ctx.stats.snapshot();
        assert_eq!(first.written, 100);
        assert_eq!(first.duplicates, 0);

        process_page(Arc::clone(&ctx), records).await;
        let second = ctx.stats.snapshot();
        assert_eq!(second.written, 100, "no new rows on the second run");
        assert_eq!(second.duplicates, 100);
    }

    #[tokio::test]
    async fn unresolved_records_are_counted_skipped_not_failed() {
        let (ctx, _dir) = context(8).await;
        let mut rec = eligible_record(5);
        rec.author_id = 999;

        process_page(Arc::clone(&ctx), vec![rec]).await;
        let s = ctx.stats.snapshot();
        assert_eq!(s.skipped, 1);
        assert_eq!(s.failed, 0);
        assert_eq!(s.written, 0);
    }

    #[tokio::test]
    async fn ineligible_video_record_is_a_no_op() {
        let (ctx, _dir) = context(8).await;
        let mut rec = sample_record();
        rec.id = 6;
        rec.video = Some(crate::model::VideoDescriptor {
            url: Some("https://cdn.example/v".into()),
            playlist: None,
        });

        process_page(Arc::clone(&ctx), vec![rec]).await;
        let s = ctx.stats.snapshot();
        assert_eq!(s.no_op, 1);
        assert_eq!(s.written, 0);
    }
}
