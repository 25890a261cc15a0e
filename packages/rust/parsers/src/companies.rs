//! Russian stock universe from the TradingView market movers page.

use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use mojarung_shared::Result;

use crate::fetch::{Fetcher, element_text, resolve_link, selector};

/// Name used when the listing carries no tooltip for a ticker.
pub const UNKNOWN_COMPANY_NAME: &str = "Название не найдено";

const SYMBOL_PREFIX: &str = "/symbols/RUS-";

/// One row of the stock listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedCompany {
    pub ticker: String,
    pub name: String,
    /// Absolute URL of the company page.
    pub link: String,
}

/// Parse every `/symbols/RUS-` link on the listing. The company name is the
/// `title` of the first `sup.apply-common-tooltip` that follows the link in
/// document order.
pub fn parse_stock_list(html: &str, base: &Url) -> Result<Vec<ListedCompany>> {
    let doc = Html::parse_document(html);
    let marks = selector(r#"a[href^="/symbols/RUS-"], sup.apply-common-tooltip"#)?;

    enum Mark<'a> {
        Symbol(ElementRef<'a>),
        Tooltip(Option<&'a str>),
    }

    let ordered: Vec<Mark<'_>> = doc
        .select(&marks)
        .map(|el| {
            if el.value().name() == "a" {
                Mark::Symbol(el)
            } else {
                Mark::Tooltip(el.value().attr("title"))
            }
        })
        .collect();

    let mut companies = Vec::new();
    for (i, mark) in ordered.iter().enumerate() {
        let Mark::Symbol(anchor) = mark else {
            continue;
        };
        let Some(href) = anchor.value().attr("href").filter(|h| h.starts_with(SYMBOL_PREFIX))
        else {
            continue;
        };
        let Some(link) = resolve_link(base, href) else {
            continue;
        };

        let name = ordered[i + 1..]
            .iter()
            .find_map(|m| match m {
                Mark::Tooltip(title) => Some(*title),
                Mark::Symbol(_) => None,
            })
            .flatten()
            .unwrap_or(UNKNOWN_COMPANY_NAME);

        companies.push(ListedCompany {
            ticker: element_text(*anchor),
            name: name.to_string(),
            link: link.to_string(),
        });
    }
    Ok(companies)
}

/// Logo URL from a company page: `og:image`, then the symbol header logo,
/// then the circle logo. Relative sources are resolved against `base`.
pub fn extract_company_image(html: &str, base: &Url) -> Result<Option<String>> {
    let doc = Html::parse_document(html);

    let og = selector(r#"meta[property="og:image"]"#)?;
    if let Some(content) = doc
        .select(&og)
        .filter_map(|m| m.value().attr("content"))
        .find(|c| !c.trim().is_empty())
    {
        return Ok(Some(content.trim().to_string()));
    }

    for css in [".tv-symbol-header__logo-container img", ".tv-circle-logo__image"] {
        let sel = selector(css)?;
        if let Some(src) = doc
            .select(&sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .filter(|s| !s.trim().is_empty())
        {
            let src = src.trim();
            if src.starts_with("http") {
                return Ok(Some(src.to_string()));
            }
            return Ok(resolve_link(base, src).map(|u| u.to_string()));
        }
    }
    Ok(None)
}

/// Download and parse the stock listing.
pub async fn fetch_stock_list(fetcher: &Fetcher, listing_url: &Url) -> Result<Vec<ListedCompany>> {
    let html = fetcher.fetch_html(listing_url).await?;
    let companies = parse_stock_list(&html, listing_url)?;
    info!(count = companies.len(), "companies found on listing");
    Ok(companies)
}

/// Download a company page and extract its logo.
pub async fn fetch_company_image(fetcher: &Fetcher, company_url: &Url) -> Result<Option<String>> {
    let html = fetcher.fetch_html(company_url).await?;
    let image = extract_company_image(&html, company_url)?;
    debug!(url = %company_url, found = image.is_some(), "company image lookup");
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn base() -> Url {
        Url::parse("https://ru.tradingview.com/markets/stocks-russia/market-movers-all-stocks/")
            .expect("url")
    }

    #[test]
    fn names_come_from_following_tooltip() {
        let html = r#"<table>
            <tr><td><a href="/symbols/RUS-SBER/">SBER</a>
                <sup class="apply-common-tooltip" title="Сбербанк">Сбербанк</sup></td></tr>
            <tr><td><a href="/symbols/RUS-GAZP/"> GAZP </a></td></tr>
            <tr><td><a href="/symbols/NASDAQ-AAPL/">AAPL</a></td></tr>
            <tr><td><sup class="apply-common-tooltip" title="Газпром">Газпром</sup></td></tr>
            <tr><td><a href="/symbols/RUS-LKOH/">LKOH</a></td></tr>
        </table>"#;

        let companies = parse_stock_list(html, &base()).expect("parse");
        assert_eq!(companies.len(), 3);
        assert_eq!(companies[0].ticker, "SBER");
        assert_eq!(companies[0].name, "Сбербанк");
        assert_eq!(companies[0].link, "https://ru.tradingview.com/symbols/RUS-SBER/");
        assert_eq!(companies[1].ticker, "GAZP");
        assert_eq!(companies[1].name, "Газпром");
        assert_eq!(companies[2].name, UNKNOWN_COMPANY_NAME);
    }

    #[test]
    fn image_prefers_open_graph() {
        let html = r#"<head><meta property="og:image" content="https://s3.tv/sber.png"></head>
            <div class="tv-circle-logo__image" src="/x.svg"></div>"#;
        assert_eq!(
            extract_company_image(html, &base()).expect("parse").as_deref(),
            Some("https://s3.tv/sber.png")
        );
    }

    #[test]
    fn relative_logo_is_made_absolute() {
        let html = r#"<img class="tv-circle-logo__image" src="/static/logo/gazprom.svg">"#;
        assert_eq!(
            extract_company_image(html, &base()).expect("parse").as_deref(),
            Some("https://ru.tradingview.com/static/logo/gazprom.svg")
        );
        assert!(extract_company_image("<p></p>", &base()).expect("parse").is_none());
    }

    #[tokio::test]
    async fn fetches_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movers"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/symbols/RUS-YDEX/">YDEX</a>
                   <sup class="apply-common-tooltip" title="Яндекс">Яндекс</sup>"#,
            ))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/movers", server.uri())).expect("url");
        let fetcher = Fetcher::new(Duration::from_secs(5), Duration::ZERO).expect("fetcher");
        let companies = fetch_stock_list(&fetcher, &url).await.expect("fetch");
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].link, format!("{}/symbols/RUS-YDEX/", server.uri()));
    }
}
