//! End-to-end news pipeline: scrape → raw dedup → store → embed dedup → enrich → store.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use mojarung_dedup::{DedupConfig, Embedder, dedup_articles};
use mojarung_llm::ChatModel;
use mojarung_parsers::{Fetcher, SourceRegistry};
use mojarung_shared::{AppConfig, MojarungError, Result, ScrapedArticle, expand_home};
use mojarung_storage::Storage;

use crate::enrichment;

const RAW_DUMP_FILE: &str = "raw_news.json";
const DEDUP_DUMP_FILE: &str = "deduplicated_news.json";

/// Settings for [`run_news_pipeline`].
#[derive(Debug, Clone)]
pub struct NewsPipelineConfig {
    /// Articles requested from each source.
    pub max_articles: usize,
    pub dedup: DedupConfig,
    /// Where to write the JSON snapshots, if anywhere.
    pub dump_dir: Option<PathBuf>,
}

impl NewsPipelineConfig {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let dump_dir = match &config.parsers.dump_dir {
            Some(dir) => Some(expand_home(dir)?),
            None => None,
        };
        Ok(Self {
            max_articles: config.parsers.max_articles,
            dedup: DedupConfig::from(&config.dedup),
            dump_dir,
        })
    }
}

/// The collaborators the pipeline drives.
pub struct NewsPipeline<'a> {
    pub storage: &'a Storage,
    pub llm: &'a dyn ChatModel,
    pub embedder: &'a dyn Embedder,
    pub fetcher: &'a Fetcher,
    pub sources: &'a SourceRegistry,
}

/// Counters of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Articles returned by all sources.
    pub parsed: usize,
    /// Articles already present in raw storage.
    pub duplicates: usize,
    /// Articles stored as new raw news.
    pub unique: usize,
    /// Articles left after embedding deduplication.
    pub after_dedup: usize,
    /// Enriched articles stored.
    pub saved: usize,
    /// Articles the model failed on, could not tag, or that failed to store.
    pub rejected: usize,
}

/// Progress callback for long-running jobs.
pub trait PipelineProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each item of the current phase.
    fn step(&self, current: usize, total: usize);
    /// Called once when the job finishes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for background and test usage.
pub struct SilentProgress;

impl PipelineProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn step(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &str) {}
}

/// Run every configured source once and store what survives.
///
/// A failing source is logged and treated as empty. If the embedding
/// deduplication fails, every unique article goes on to enrichment. A
/// storage error on one article is logged and the run moves on to the next.
#[instrument(skip_all, fields(sources = pipeline.sources.len()))]
pub async fn run_news_pipeline(
    pipeline: &NewsPipeline<'_>,
    config: &NewsPipelineConfig,
    progress: &dyn PipelineProgress,
) -> Result<PipelineReport> {
    let start = Instant::now();
    let mut report = PipelineReport::default();

    // --- Phase 1: Scrape and filter raw duplicates ---
    let mut unique: Vec<ScrapedArticle> = Vec::new();
    for source in pipeline.sources.iter() {
        progress.phase(&format!("Parsing {}", source.name()));
        let articles = match source.fetch(pipeline.fetcher, config.max_articles).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(source = source.name(), error = %e, "source failed, skipping");
                Vec::new()
            }
        };
        info!(source = source.name(), count = articles.len(), "source parsed");

        for article in articles {
            report.parsed += 1;
            match pipeline
                .storage
                .raw_news_exists(&article.title, &article.full_text)
                .await
            {
                Ok(true) => {
                    report.duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(title = %article.title, error = %e, "raw duplicate check failed, skipping");
                    continue;
                }
            }
            if let Err(e) = pipeline.storage.insert_raw_news(&article).await {
                warn!(title = %article.title, error = %e, "raw news not stored, skipping");
                continue;
            }
            unique.push(article);
        }
    }
    report.unique = unique.len();
    info!(
        parsed = report.parsed,
        duplicates = report.duplicates,
        unique = report.unique,
        "scraping finished"
    );

    if unique.is_empty() {
        progress.done("No new articles");
        return Ok(report);
    }
    if let Some(dir) = &config.dump_dir {
        dump_json(dir, RAW_DUMP_FILE, &unique).await;
    }

    // --- Phase 2: Embedding deduplication ---
    progress.phase("Deduplicating");
    let articles = match dedup_articles(pipeline.embedder, unique.clone(), &config.dedup).await {
        Ok(kept) => {
            if let Some(dir) = &config.dump_dir {
                dump_json(dir, DEDUP_DUMP_FILE, &kept).await;
            }
            kept
        }
        Err(e) => {
            warn!(error = %e, "deduplication failed, keeping every article");
            unique
        }
    };
    report.after_dedup = articles.len();

    // --- Phase 3: Enrich and store ---
    progress.phase("Enriching");
    let total = articles.len();
    for (i, article) in articles.iter().enumerate() {
        match enrichment::enrich_article(pipeline.llm, article).await {
            Ok(Some(enriched)) => match pipeline.storage.insert_article(&enriched).await {
                Ok(_) => report.saved += 1,
                Err(e) => {
                    warn!(title = %enriched.title, error = %e, "article not stored");
                    report.rejected += 1;
                }
            },
            Ok(None) => report.rejected += 1,
            Err(e) => {
                warn!(title = %article.title, error = %e, "enrichment failed");
                report.rejected += 1;
            }
        }
        progress.step(i + 1, total);
    }

    info!(
        saved = report.saved,
        rejected = report.rejected,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "news pipeline finished"
    );
    progress.done(&format!("Saved {} of {} articles", report.saved, total));
    Ok(report)
}

/// Write a pretty-printed JSON snapshot. Failures are only logged.
async fn dump_json<T: Serialize + ?Sized>(dir: &Path, file: &str, value: &T) {
    let path = dir.join(file);
    let result = async {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| MojarungError::parse(format!("failed to serialize {file}: {e}")))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| MojarungError::io(dir, e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| MojarungError::io(&path, e))
    }
    .await;

    match result {
        Ok(()) => info!(path = %path.display(), "snapshot written"),
        Err(e) => warn!(error = %e, "snapshot not written"),
    }
}
