//! TradingView market news.
//!
//! The listing page embeds its stories as JSON in
//! `script[type="application/prs.init-data+json"]`. Each story links to the
//! provider's article, whose text is found with a cascade of common article
//! selectors. Every article ends with a metadata block (publish time,
//! provider, link, related symbols).

use async_trait::async_trait;
use chrono::DateTime;
use scraper::Html;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use mojarung_shared::{MojarungError, Result, ScrapedArticle};

use super::{NewsSource, article};
use crate::fetch::{Fetcher, element_text, resolve_link, selector};

const LISTING_URL: &str = "https://ru.tradingview.com/news/markets/all/";

/// Keys that usually hold the stories array.
const STORY_KEYS: &[&str] = &["stories", "news", "items", "data", "articles"];

/// Fields that mark an object as a news story.
const STORY_FIELDS: &[&str] = &["title", "published", "provider", "story_path", "id"];

/// Article body selectors, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    ".post-content, .entry-content, .article-content",
    ".content-text, .post-text, .article-text",
    ".article__text, .article_text",
    ".StandardArticleBody_body, .ArticleBodyWrapper",
    "article, .article, .content, .main-content",
    "[data-module=\"ArticleBody\"], [data-testid=\"paragraph\"]",
];

pub struct TradingViewSource {
    listing_url: Url,
}

impl TradingViewSource {
    pub fn new() -> Result<Self> {
        let listing_url = Url::parse(LISTING_URL)
            .map_err(|e| MojarungError::config(format!("invalid TradingView url: {e}")))?;
        Ok(Self { listing_url })
    }

    /// Point the source at another listing page.
    pub fn with_listing_url(listing_url: Url) -> Self {
        Self { listing_url }
    }
}

/// A story from the embedded JSON, reduced to what the scraper needs.
#[derive(Debug, Clone, PartialEq)]
struct Story {
    title: String,
    link: Option<String>,
    metadata: String,
}

fn init_data_scripts(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let scripts = selector(r#"script[type="application/prs.init-data+json"]"#)?;
    Ok(doc
        .select(&scripts)
        .map(|s| s.text().collect::<String>())
        .filter(|s| !s.trim().is_empty())
        .collect())
}

/// Depth-first search for an array that looks like a list of stories.
fn find_stories(json: &Value) -> Option<&Vec<Value>> {
    match json {
        Value::Array(items) => {
            let first = items.first()?.as_object()?;
            let looks_like_story = STORY_FIELDS.iter().any(|f| first.contains_key(*f));
            let has_real_title = first
                .get("title")
                .is_some_and(|t| value_text(t).chars().count() > 10);
            (looks_like_story && has_real_title).then_some(items)
        }
        Value::Object(map) => {
            for key in STORY_KEYS {
                if let Some(found) = map.get(*key).filter(|v| v.is_array()).and_then(find_stories) {
                    return Some(found);
                }
            }
            map.values()
                .filter(|v| v.is_object() || v.as_array().is_some_and(|a| !a.is_empty()))
                .find_map(find_stories)
        }
        _ => None,
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stories from the first init-data script that contains any.
fn extract_stories(html: &str, max: usize) -> Result<Vec<Story>> {
    for (i, script) in init_data_scripts(html)?.iter().enumerate() {
        let json: Value = match serde_json::from_str(script) {
            Ok(json) => json,
            Err(e) => {
                debug!(script = i, error = %e, "init-data script is not JSON");
                continue;
            }
        };
        let Some(items) = find_stories(&json) else {
            continue;
        };

        let stories = items
            .iter()
            .take(max)
            .filter_map(|item| {
                let title = item.get("title")?.as_str()?.trim().to_string();
                if title.is_empty() {
                    return None;
                }
                let link = item
                    .get("link")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from);
                Some(Story {
                    metadata: metadata_description(item, &title),
                    title,
                    link,
                })
            })
            .collect();
        return Ok(stories);
    }
    Ok(Vec::new())
}

fn metadata_description(story: &Value, title: &str) -> String {
    let mut parts = vec![title.to_string()];

    let published = match story.get("published") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if let Some(at) = published.and_then(|ts| DateTime::from_timestamp(ts, 0)) {
        parts.push(format!("Опубликовано: {}", at.format("%Y-%m-%d %H:%M:%S")));
    }

    if let Some(provider) = story
        .get("provider")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
    {
        parts.push(format!("Источник: {provider}"));
    }

    if let Some(link) = story
        .get("link")
        .and_then(Value::as_str)
        .filter(|l| !l.is_empty())
    {
        parts.push(format!("Ссылка: {link}"));
    }

    if let Some(symbols) = story.get("related_symbols").and_then(Value::as_array) {
        let names: Vec<&str> = symbols
            .iter()
            .take(3)
            .filter_map(|s| {
                ["logoid", "symbol"]
                    .iter()
                    .filter_map(|k| s.get(*k).and_then(Value::as_str))
                    .find(|n| !n.is_empty())
            })
            .collect();
        if !names.is_empty() {
            parts.push(format!("Символы: {}", names.join(", ")));
        }
    }

    parts.join("\n")
}

/// Main text of a provider article, or `None` when nothing substantial is found.
fn extract_article_text(html: &str) -> Result<Option<String>> {
    let doc = Html::parse_document(html);
    let blocks = selector("p, div")?;

    for css in CONTENT_SELECTORS {
        let container = selector(css)?;
        let Some(root) = doc.select(&container).next() else {
            continue;
        };
        let parts: Vec<String> = root
            .select(&blocks)
            .filter(|el| el.id() != root.id())
            .map(element_text)
            .filter(|t| t.chars().count() > 20)
            .collect();
        let text = parts.join("\n\n");
        if text.chars().count() > 100 {
            return Ok(Some(text));
        }
    }

    let paragraph = selector("p")?;
    let parts: Vec<String> = doc
        .select(&paragraph)
        .map(element_text)
        .filter(|t| t.chars().count() > 30)
        .collect();
    if parts.len() >= 3 {
        return Ok(Some(parts[..parts.len().min(10)].join("\n\n")));
    }
    Ok(None)
}

#[async_trait]
impl NewsSource for TradingViewSource {
    fn name(&self) -> &str {
        "tradingview"
    }

    async fn fetch(&self, fetcher: &Fetcher, max: usize) -> Result<Vec<ScrapedArticle>> {
        let listing = fetcher.fetch_html(&self.listing_url).await?;
        let stories = extract_stories(&listing, max)?;
        info!(count = stories.len(), "tradingview stories found");
        if stories.is_empty() {
            warn!("no stories in tradingview init data");
        }

        let mut articles = Vec::new();
        for story in stories {
            let link = story
                .link
                .as_deref()
                .and_then(|l| resolve_link(&self.listing_url, l));

            let body = match link {
                Some(url) => {
                    let text = match fetcher.fetch_html(&url).await {
                        Ok(html) => extract_article_text(&html)?,
                        Err(e) => {
                            debug!(%url, error = %e, "provider article unavailable");
                            None
                        }
                    };
                    fetcher.pause().await;
                    match text {
                        Some(text) => format!("{text}\n\n{}", story.metadata),
                        None => story.metadata.clone(),
                    }
                }
                None => story.metadata.clone(),
            };

            if let Some(a) = article("tradingview", story.title, body) {
                articles.push(a);
            }
        }
        Ok(articles)
    }
}
