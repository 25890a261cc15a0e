//! BCS Express article from a locally saved page.
//!
//! The site renders articles client-side, so this source reads a page that
//! was saved from a browser instead of fetching it.

use std::path::PathBuf;

use async_trait::async_trait;
use scraper::Html;
use tracing::{info, warn};

use mojarung_shared::{MojarungError, Result, ScrapedArticle, expand_home};

use super::{NewsSource, article};
use crate::fetch::{Fetcher, selector, texts_of};

pub struct BcsSource {
    path: PathBuf,
}

impl BcsSource {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self {
            path: expand_home(path)?,
        })
    }
}

fn parse_page(html: &str) -> Result<Option<ScrapedArticle>> {
    let doc = Html::parse_document(html);
    let h1 = selector("h1.rp1F")?;
    let content = selector(r#"div[data-id="publication-content"]"#)?;
    let paragraph = selector("p")?;

    // Only the heading's own text; nested spans hold badges and dates.
    let title = doc
        .select(&h1)
        .next()
        .and_then(|h| {
            h.children()
                .filter_map(|c| c.value().as_text())
                .map(|t| t.trim())
                .find(|t| !t.is_empty())
                .map(String::from)
        })
        .unwrap_or_default();

    let text = doc
        .select(&content)
        .next()
        .map(|div| texts_of(div, &paragraph).join("\n"))
        .unwrap_or_default();

    Ok(article("bcs", title, text))
}

#[async_trait]
impl NewsSource for BcsSource {
    fn name(&self) -> &str {
        "bcs"
    }

    async fn fetch(&self, _fetcher: &Fetcher, max: usize) -> Result<Vec<ScrapedArticle>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let html = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MojarungError::io(&self.path, e))?;

        match parse_page(&html)? {
            Some(a) => {
                info!(path = %self.path.display(), "bcs article loaded");
                Ok(vec![a])
            }
            None => {
                warn!(path = %self.path.display(), "bcs page has no title or text");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PAGE: &str = r#"<html><body>
        <h1 class="rp1F">
            Акции Сбербанка обновили максимум
            <span class="badge">Новость</span>
        </h1>
        <div data-id="publication-content">
            <p>Бумаги подорожали на 3%.</p>
            <p>  </p>
            <p>Объём торгов вырос вдвое.</p>
        </div>
    </body></html>"#;

    #[test]
    fn parses_own_heading_text() {
        let a = parse_page(PAGE).expect("parse").expect("article");
        assert_eq!(a.title, "Акции Сбербанка обновили максимум");
        assert_eq!(a.full_text, "Бумаги подорожали на 3%.\nОбъём торгов вырос вдвое.");
        assert_eq!(a.source, "bcs");
    }

    #[test]
    fn page_without_content_is_skipped() {
        let html = r#"<h1 class="rp1F">Заголовок</h1>"#;
        assert!(parse_page(html).expect("parse").is_none());
    }

    #[tokio::test]
    async fn reads_saved_page() {
        let path = std::env::temp_dir().join(format!("bcs-{}.html", fastrand::u64(..)));
        std::fs::write(&path, PAGE).expect("write");

        let source = BcsSource::new(path.to_str().expect("utf-8 path")).expect("source");
        let fetcher = Fetcher::new(Duration::from_secs(5), Duration::ZERO).expect("fetcher");
        let articles = source.fetch(&fetcher, 10).await.expect("fetch");
        assert_eq!(articles.len(), 1);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let source = BcsSource::new("/nonexistent/mojarung/bcs.html").expect("source");
        let fetcher = Fetcher::new(Duration::from_secs(5), Duration::ZERO).expect("fetcher");
        let err = source.fetch(&fetcher, 10).await.unwrap_err();
        assert!(matches!(err, MojarungError::Io { .. }));
    }
}
