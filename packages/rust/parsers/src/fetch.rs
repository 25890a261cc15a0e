//! Shared HTTP fetching and HTML text helpers for all scrapers.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Selector};
use tracing::debug;
use url::Url;

use mojarung_shared::{MojarungError, ParsersConfig, Result};

/// Desktop browser identities rotated between requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
];

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_RU: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP client with browser-like headers and a politeness delay.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    delay: Duration,
}

impl Fetcher {
    /// Create a fetcher with a per-request timeout and a pause used between
    /// consecutive article requests.
    pub fn new(timeout: Duration, delay: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_RU));

        let client = Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| MojarungError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, delay })
    }

    pub fn from_config(config: &ParsersConfig) -> Result<Self> {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            Duration::from_millis(config.rate_limit_ms),
        )
    }

    /// GET a page and return its body. Non-2xx statuses are errors.
    pub async fn fetch_html(&self, url: &Url) -> Result<String> {
        debug!(%url, "fetching page");
        let agent = USER_AGENTS[fastrand::usize(..USER_AGENTS.len())];

        let response = self
            .client
            .get(url.as_str())
            .header(USER_AGENT, agent)
            .send()
            .await
            .map_err(|e| MojarungError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MojarungError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| MojarungError::Network(format!("{url}: body read failed: {e}")))
    }

    /// Sleep for the configured politeness delay.
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// HTML helpers
// ---------------------------------------------------------------------------

/// Parse a CSS selector, reporting failures as parse errors.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| MojarungError::parse(format!("bad selector {css:?}: {e:?}")))
}

/// Element text with whitespace runs collapsed to single spaces.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of each matching descendant, empty ones dropped.
pub(crate) fn texts_of(root: ElementRef<'_>, sel: &Selector) -> Vec<String> {
    root.select(sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Resolve `href` against `base`, ignoring unparseable links.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn collapses_whitespace() {
        let doc = Html::parse_fragment("<p>  Индекс\n  <b>Мосбиржи</b>   вырос </p>");
        let p = selector("p").expect("selector");
        let el = doc.select(&p).next().expect("p");
        assert_eq!(element_text(el), "Индекс Мосбиржи вырос");
    }

    #[test]
    fn resolves_relative_and_absolute_links() {
        let base = Url::parse("https://www.rbc.ru/quote").expect("url");
        assert_eq!(
            resolve_link(&base, "/news/1").map(|u| u.to_string()),
            Some("https://www.rbc.ru/news/1".into())
        );
        assert_eq!(
            resolve_link(&base, "https://quote.rbc.ru/news/2").map(|u| u.to_string()),
            Some("https://quote.rbc.ru/news/2".into())
        );
        assert!(resolve_link(&base, "  ").is_none());
    }

    #[test]
    fn invalid_selector_is_parse_error() {
        assert!(matches!(
            selector("p[").unwrap_err(),
            MojarungError::Parse { .. }
        ));
    }
}
