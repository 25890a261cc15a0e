//! Kommersant finance section.

use async_trait::async_trait;
use scraper::Html;
use tracing::{info, warn};
use url::Url;

use mojarung_shared::{MojarungError, Result, ScrapedArticle};

use super::{NewsSource, article};
use crate::fetch::{Fetcher, element_text, resolve_link, selector, texts_of};

const LISTING_URL: &str = "https://www.kommersant.ru/finance?from=main";

pub struct KommersantSource {
    listing_url: Url,
}

impl KommersantSource {
    pub fn new() -> Result<Self> {
        let listing_url = Url::parse(LISTING_URL)
            .map_err(|e| MojarungError::config(format!("invalid Kommersant url: {e}")))?;
        Ok(Self { listing_url })
    }

    /// Point the source at another listing page.
    pub fn with_listing_url(listing_url: Url) -> Self {
        Self { listing_url }
    }
}

/// Article URLs from the feed: the `data-article-url` attribute, falling back
/// to the overlay link inside the item.
fn article_links(html: &str, base: &Url, max: usize) -> Result<Vec<Url>> {
    let doc = Html::parse_document(html);
    let items = selector("article.uho.rubric_lenta__item.js-article")?;
    let overlay = selector("a.uho__link.uho__link--overlay")?;

    let mut links = Vec::new();
    for item in doc.select(&items).take(max) {
        let href = item.value().attr("data-article-url").or_else(|| {
            item.select(&overlay)
                .next()
                .and_then(|a| a.value().attr("href"))
        });
        match href.and_then(|h| resolve_link(base, h)) {
            Some(url) => links.push(url),
            None => warn!("kommersant feed item without a link"),
        }
    }
    Ok(links)
}

fn parse_article(html: &str) -> Result<Option<ScrapedArticle>> {
    let doc = Html::parse_document(html);
    let h1 = selector("h1.doc_header__name")?;
    let body = selector("div.doc__body")?;
    let paragraph = selector("p.doc__text")?;

    let Some(title) = doc.select(&h1).next().map(element_text) else {
        return Ok(None);
    };
    let Some(body) = doc.select(&body).next() else {
        return Ok(None);
    };
    let text = texts_of(body, &paragraph).join("\n");
    Ok(article("kommersant", title, text))
}

#[async_trait]
impl NewsSource for KommersantSource {
    fn name(&self) -> &str {
        "kommersant"
    }

    async fn fetch(&self, fetcher: &Fetcher, max: usize) -> Result<Vec<ScrapedArticle>> {
        let listing = fetcher.fetch_html(&self.listing_url).await?;
        let links = article_links(&listing, &self.listing_url, max)?;
        info!(count = links.len(), "kommersant article links found");

        let mut articles = Vec::new();
        for (i, url) in links.iter().enumerate() {
            match fetcher.fetch_html(url).await {
                Ok(html) => match parse_article(&html)? {
                    Some(a) => {
                        info!(title = %a.title, "kommersant article parsed");
                        articles.push(a);
                    }
                    None => warn!(%url, "kommersant article has too little data"),
                },
                Err(e) => warn!(%url, error = %e, "failed to fetch kommersant article"),
            }
            if i + 1 < links.len() {
                fetcher.pause().await;
            }
        }
        Ok(articles)
    }
}
