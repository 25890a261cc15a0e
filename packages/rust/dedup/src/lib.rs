//! Near-duplicate filtering for scraped news.
//!
//! Texts are embedded, indexed in an [`AngularForest`], and every surviving
//! article checks its nearest neighbours with exact cosine similarity. The
//! earliest article of a duplicate group is kept.

mod embed;
mod forest;
mod vector;

use tracing::{debug, info, instrument};

use mojarung_shared::{DedupSettings, MojarungError, Result, ScrapedArticle};

pub use embed::{Embedder, HashingEmbedder, RemoteEmbedder, embedder_from_config};
pub use forest::AngularForest;
pub use vector::cosine_similarity;

/// Seed used for the forest so repeated runs make the same decisions.
const FOREST_SEED: u64 = 0x6d6f_6a61_7275_6e67;

/// Tuning for [`deduplicate`].
#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    /// Cosine similarity strictly above which two items are duplicates.
    pub threshold: f32,
    /// Neighbours fetched per item, the item itself included.
    pub neighbors: usize,
    pub trees: usize,
    pub seed: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            neighbors: 5,
            trees: 10,
            seed: FOREST_SEED,
        }
    }
}

impl From<&DedupSettings> for DedupConfig {
    fn from(settings: &DedupSettings) -> Self {
        Self {
            threshold: settings.threshold,
            neighbors: settings.neighbors,
            trees: settings.trees,
            seed: FOREST_SEED,
        }
    }
}

/// Indices of the items that survive deduplication, in input order.
///
/// Items are visited in order. An item already marked as a duplicate is
/// skipped. Otherwise each of its nearest neighbours that is not yet marked
/// and whose similarity exceeds the threshold is resolved: a later neighbour
/// is marked, while an earlier (kept) neighbour marks the current item and
/// ends its scan.
///
/// Unlike a plain "mark every similar neighbour" pass, an earlier kept item
/// is never marked, so a duplicate pair never loses both members.
pub fn deduplicate(embeddings: &[Vec<f32>], config: &DedupConfig) -> Result<Vec<usize>> {
    let n = embeddings.len();
    if n < 2 {
        return Ok((0..n).collect());
    }
    let forest = AngularForest::build(embeddings, config.trees, config.seed)?;

    let mut duplicate = vec![false; n];
    for i in 0..n {
        if duplicate[i] {
            continue;
        }
        for j in forest.nearest(i, config.neighbors) {
            if j == i || duplicate[j] {
                continue;
            }
            let similarity = cosine_similarity(&embeddings[i], &embeddings[j]);
            if similarity <= config.threshold {
                continue;
            }
            if j > i {
                debug!(kept = i, dropped = j, similarity, "duplicate found");
                duplicate[j] = true;
            } else {
                debug!(kept = j, dropped = i, similarity, "duplicate found");
                duplicate[i] = true;
                break;
            }
        }
    }

    Ok((0..n).filter(|&i| !duplicate[i]).collect())
}

/// Text embedded for an article.
pub fn article_text(article: &ScrapedArticle) -> String {
    format!("{}. {}", article.title, article.full_text)
}

/// Embed `articles` and drop near-duplicates, keeping input order.
#[instrument(skip_all, fields(count = articles.len()))]
pub async fn dedup_articles(
    embedder: &dyn Embedder,
    articles: Vec<ScrapedArticle>,
    config: &DedupConfig,
) -> Result<Vec<ScrapedArticle>> {
    if articles.len() < 2 {
        return Ok(articles);
    }
    let texts: Vec<String> = articles.iter().map(article_text).collect();
    let embeddings = embedder.embed(&texts).await?;
    if embeddings.len() != articles.len() {
        return Err(MojarungError::validation(format!(
            "embedder returned {} vectors for {} articles",
            embeddings.len(),
            articles.len()
        )));
    }

    let keep = deduplicate(&embeddings, config)?;
    info!(
        before = articles.len(),
        after = keep.len(),
        "deduplication finished"
    );

    let mut keep = keep.into_iter().peekable();
    Ok(articles
        .into_iter()
        .enumerate()
        .filter_map(|(i, a)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(a)
            } else {
                None
            }
        })
        .collect())
}
