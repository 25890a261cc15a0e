//! RBC quotes news feed.

use async_trait::async_trait;
use scraper::Html;
use tracing::{info, warn};
use url::Url;

use mojarung_shared::{MojarungError, Result, ScrapedArticle};

use super::{NewsSource, article};
use crate::fetch::{Fetcher, element_text, resolve_link, selector, texts_of};

const LISTING_URL: &str = "https://www.rbc.ru/quote?utm_source=topline";

pub struct RbcSource {
    listing_url: Url,
}

impl RbcSource {
    pub fn new() -> Result<Self> {
        let listing_url = Url::parse(LISTING_URL)
            .map_err(|e| MojarungError::config(format!("invalid RBC url: {e}")))?;
        Ok(Self { listing_url })
    }

    /// Point the source at another listing page.
    pub fn with_listing_url(listing_url: Url) -> Self {
        Self { listing_url }
    }
}

fn article_links(html: &str, base: &Url, max: usize) -> Result<Vec<Url>> {
    let doc = Html::parse_document(html);
    let items = selector("a.news-feed__item")?;
    Ok(doc
        .select(&items)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(base, href))
        .take(max)
        .collect())
}

fn parse_article(html: &str) -> Result<Option<ScrapedArticle>> {
    let doc = Html::parse_document(html);
    let h1 = selector("h1")?;
    let body = selector(".article__text, .article_text")?;
    let paragraph = selector("p")?;

    let Some(title) = doc.select(&h1).next().map(element_text) else {
        return Ok(None);
    };
    let Some(body) = doc.select(&body).next() else {
        return Ok(None);
    };
    let text = texts_of(body, &paragraph).join("\n");
    Ok(article("rbc", title, text))
}

#[async_trait]
impl NewsSource for RbcSource {
    fn name(&self) -> &str {
        "rbc"
    }

    async fn fetch(&self, fetcher: &Fetcher, max: usize) -> Result<Vec<ScrapedArticle>> {
        let listing = fetcher.fetch_html(&self.listing_url).await?;
        let links = article_links(&listing, &self.listing_url, max)?;
        info!(count = links.len(), "rbc article links found");
        if links.is_empty() {
            warn!("rbc feed is empty, the page may be rendered by JavaScript");
        }

        let mut articles = Vec::new();
        for (i, url) in links.iter().enumerate() {
            match fetcher.fetch_html(url).await {
                Ok(html) => match parse_article(&html)? {
                    Some(a) => articles.push(a),
                    None => warn!(%url, "rbc article has no title or text"),
                },
                Err(e) => warn!(%url, error = %e, "failed to fetch rbc article"),
            }
            if i + 1 < links.len() {
                fetcher.pause().await;
            }
        }
        Ok(articles)
    }
}
