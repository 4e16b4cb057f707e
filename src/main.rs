use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use story_migrator::cache::EnrichmentCache;
use story_migrator::config::MigrationConfig;
use story_migrator::db::Db;
use story_migrator::pipeline::{self, PipelineContext, RunStats};
use story_migrator::probes::{Enricher, MediaProbeClient, OllamaClient};
use story_migrator::resolver::{self, PgWriterDirectory};
use story_migrator::tracing::init_tracing;
use story_migrator::util::env as env_util;
use story_migrator::writer::PgContentWriter;

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing("info")?;

    // DSNs are validated by composition below; they can come as one URL or
    // as OLD_/NEW_ prefixed components.
    env_util::preflight_check(
        "story-migrator",
        &["MEDIA_PROBE_URL"],
        &[
            "OLD_DB_URL",
            "OLD_DB_HOST",
            "NEW_DB_URL",
            "NEW_DB_HOST",
            "OLLAMA_URL",
            "OLLAMA_MODEL",
            "READ_COUNT",
            "BATCH_CEILING",
            "ENRICH_TIMEOUT_SECS",
            "ENRICHMENT_CACHE_PATH",
            "AUTO_CREATE_MISSING_IDENTITIES",
        ],
    )?;

    let cfg = MigrationConfig::from_env();

    let source = Db::connect(
        "source",
        &env_util::source_db_url()?,
        env_util::env_parse("OLD_DB_MAX_CONNECTIONS", 5u32),
    )
    .await
    .context("connecting to legacy store")?;
    let dest = Db::connect(
        "dest",
        &env_util::dest_db_url()?,
        env_util::env_parse("NEW_DB_MAX_CONNECTIONS", 20u32),
    )
    .await
    .context("connecting to destination store")?;

    let refs = resolver::resolve(&source, &dest, &cfg).await?;
    let cache = EnrichmentCache::load(&cfg.cache_path)
        .await
        .context("loading enrichment cache")?;
    let enricher = Enricher::new(
        Arc::new(cache),
        Arc::new(MediaProbeClient::from_env()?),
        Arc::new(OllamaClient::from_env()?),
        cfg.enrich_timeout,
    );
    let writers = PgWriterDirectory::load(&dest, cfg.auto_create_missing_identities).await?;
    let writer = PgContentWriter::new(dest.clone());

    let ctx = Arc::new(PipelineContext {
        cfg,
        refs,
        enricher,
        writers: Arc::new(writers),
        writer: Arc::new(writer),
        stats: RunStats::default(),
    });

    let summary = pipeline::run(&source, ctx).await?;
    info!(
        processed = summary.processed,
        written = summary.written,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        no_op = summary.no_op,
        failed = summary.failed,
        "migration finished"
    );
    Ok(())
}
