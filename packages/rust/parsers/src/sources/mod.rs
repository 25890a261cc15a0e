//! News source trait and the built-in Russian financial news sources.
//!
//! Each source knows its listing page and how to pull title + body out of
//! an article page. HTML parsing happens in plain functions so no parsed
//! document is held across an `.await`.

mod bcs;
mod kommersant;
mod rbc;
mod tradingview;

use async_trait::async_trait;

use mojarung_shared::{MojarungError, ParsersConfig, Result, ScrapedArticle};

use crate::fetch::Fetcher;

pub use bcs::BcsSource;
pub use kommersant::KommersantSource;
pub use rbc::RbcSource;
pub use tradingview::TradingViewSource;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A site that yields news articles.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Stable name stored with each raw article.
    fn name(&self) -> &str;

    /// Scrape up to `max` articles. A failing listing page is an error;
    /// failing individual articles are logged and skipped.
    async fn fetch(&self, fetcher: &Fetcher, max: usize) -> Result<Vec<ScrapedArticle>>;
}

/// Build an article if both title and body are non-empty.
pub(crate) fn article(source: &str, title: String, full_text: String) -> Option<ScrapedArticle> {
    let title = title.trim().to_string();
    let full_text = full_text.trim().to_string();
    if title.is_empty() || full_text.is_empty() {
        return None;
    }
    Some(ScrapedArticle {
        title,
        full_text,
        source: source.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Enabled sources in run order.
pub struct SourceRegistry {
    sources: Vec<Box<dyn NewsSource>>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Box<dyn NewsSource>>) -> Self {
        Self { sources }
    }

    /// Build the registry named by `[parsers] sources`. Setting `bcs_file`
    /// enables the BCS source even when it is not listed.
    pub fn from_config(config: &ParsersConfig) -> Result<Self> {
        let mut sources: Vec<Box<dyn NewsSource>> = Vec::new();
        let mut names: Vec<&str> = config.sources.iter().map(String::as_str).collect();
        if config.bcs_file.is_some() && !names.contains(&"bcs") {
            names.push("bcs");
        }

        for name in names {
            let source: Box<dyn NewsSource> = match name {
                "rbc" => Box::new(RbcSource::new()?),
                "kommersant" => Box::new(KommersantSource::new()?),
                "tradingview" => Box::new(TradingViewSource::new()?),
                "bcs" => {
                    let path = config.bcs_file.as_deref().ok_or_else(|| {
                        MojarungError::config("source \"bcs\" requires parsers.bcs_file")
                    })?;
                    Box::new(BcsSource::new(path)?)
                }
                other => {
                    return Err(MojarungError::config(format!(
                        "unknown news source {other:?} (expected rbc, kommersant, tradingview or bcs)"
                    )));
                }
            };
            sources.push(source);
        }
        Ok(Self { sources })
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn NewsSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_follows_config_order() {
        let config = ParsersConfig {
            sources: vec!["tradingview".into(), "rbc".into()],
            ..ParsersConfig::default()
        };
        let registry = SourceRegistry::from_config(&config).expect("registry");
        assert_eq!(registry.names(), vec!["tradingview", "rbc"]);
    }

    #[test]
    fn bcs_file_enables_bcs() {
        let config = ParsersConfig {
            sources: vec!["kommersant".into()],
            bcs_file: Some("/tmp/bcs.html".into()),
            ..ParsersConfig::default()
        };
        let registry = SourceRegistry::from_config(&config).expect("registry");
        assert_eq!(registry.names(), vec!["kommersant", "bcs"]);
    }

    #[test]
    fn bad_source_names_are_config_errors() {
        let config = ParsersConfig {
            sources: vec!["lenta".into()],
            ..ParsersConfig::default()
        };
        let err = SourceRegistry::from_config(&config).err().expect("error");
        assert!(err.to_string().contains("lenta"));

        let config = ParsersConfig {
            sources: vec!["bcs".into()],
            ..ParsersConfig::default()
        };
        assert!(SourceRegistry::from_config(&config).is_err());
    }

    #[test]
    fn empty_articles_are_dropped() {
        assert!(article("rbc", "  ".into(), "текст".into()).is_none());
        assert!(article("rbc", "Заголовок".into(), "\n".into()).is_none());
        let a = article("rbc", " Заголовок ".into(), "текст".into()).expect("article");
        assert_eq!(a.title, "Заголовок");
        assert_eq!(a.source, "rbc");
    }
}
