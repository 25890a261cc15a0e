//! Company catalogue pipeline: listing → name cleaning → image → description → tags.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use mojarung_llm::{ChatModel, ChatRequest};
use mojarung_parsers::{Fetcher, ListedCompany, fetch_company_image, fetch_stock_list};
use mojarung_shared::{AppConfig, CompanyUpsert, MojarungError, Result, Tag, join_tags};
use mojarung_storage::Storage;

use crate::pipeline::PipelineProgress;

/// Settings for [`run_company_pipeline`].
#[derive(Debug, Clone)]
pub struct CompanyPipelineConfig {
    pub listing_url: Url,
    /// Pause between companies.
    pub delay: Duration,
}

impl CompanyPipelineConfig {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let listing_url = Url::parse(&config.companies.listing_url).map_err(|e| {
            MojarungError::config(format!(
                "invalid companies.listing_url '{}': {e}",
                config.companies.listing_url
            ))
        })?;
        Ok(Self {
            listing_url,
            delay: Duration::from_millis(config.companies.rate_limit_ms),
        })
    }
}

/// Counters of one company run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompanyReport {
    pub listed: usize,
    /// Companies that already had a description and tags.
    pub skipped: usize,
    pub saved: usize,
    pub failed: usize,
}

/// Refresh the company catalogue from the stock listing.
///
/// Companies that already carry both a description and tags are skipped
/// without any model call. For the rest, only missing fields are filled.
#[instrument(skip_all, fields(listing = %config.listing_url))]
pub async fn run_company_pipeline(
    storage: &Storage,
    llm: &dyn ChatModel,
    fetcher: &Fetcher,
    config: &CompanyPipelineConfig,
    progress: &dyn PipelineProgress,
) -> Result<CompanyReport> {
    progress.phase("Fetching stock listing");
    let listed = fetch_stock_list(fetcher, &config.listing_url).await?;
    info!(count = listed.len(), "companies listed");

    let mut report = CompanyReport {
        listed: listed.len(),
        ..CompanyReport::default()
    };

    progress.phase("Enriching companies");
    let total = listed.len();
    for (i, company) in listed.iter().enumerate() {
        let existing = storage.get_company_by_ticker(&company.ticker).await?;
        if existing.as_ref().is_some_and(|c| c.is_enriched()) {
            debug!(ticker = %company.ticker, "already enriched, skipping");
            report.skipped += 1;
            progress.step(i + 1, total);
            continue;
        }

        if report.saved + report.failed > 0 {
            tokio::time::sleep(config.delay).await;
        }

        let name = clean_company_name(llm, &company.name).await;
        let mut upsert = CompanyUpsert {
            ticker: company.ticker.clone(),
            company_name: name,
            link: Some(company.link.clone()),
            ..CompanyUpsert::default()
        };

        let (has_image, has_description, has_tags) = existing
            .as_ref()
            .map(|c| (filled(&c.image_url), filled(&c.description), filled(&c.tags)))
            .unwrap_or_default();

        if !has_image {
            upsert.image_url = company_image(fetcher, company).await;
        }
        if !has_description {
            upsert.description = describe_company(llm, &upsert.company_name, &company.ticker).await;
        }
        if !has_tags {
            upsert.tags = company_tags(llm, &upsert.company_name, &company.ticker).await;
        }

        match storage.upsert_company(&upsert).await {
            Ok(saved) => {
                info!(
                    ticker = %saved.ticker,
                    name = %saved.company_name,
                    tags = saved.tags.as_deref().unwrap_or(""),
                    "company saved"
                );
                report.saved += 1;
            }
            Err(e) => {
                warn!(ticker = %company.ticker, error = %e, "company not saved");
                report.failed += 1;
            }
        }
        progress.step(i + 1, total);
    }

    progress.done(&format!(
        "Saved {} companies, {} already complete",
        report.saved, report.skipped
    ));
    Ok(report)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Model reply trimmed, or `None` for errors and blank replies.
async fn ask(llm: &dyn ChatModel, prompt: String) -> Option<String> {
    match llm.complete(ChatRequest::new(prompt)).await {
        Ok(reply) => {
            let reply = reply.trim();
            (!reply.is_empty()).then(|| reply.to_string())
        }
        Err(e) => {
            warn!(error = %e, "model call failed");
            None
        }
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn strip_quotes(text: &str) -> String {
    text.trim().replace(['"', '\''], "")
}

/// Two-pass cleanup of a listing name such as `Аэрофлот-росс.авиалин(ПАО)ао`.
///
/// Falls back to the original name when the first pass gives nothing, and
/// to the first pass without quotes when the second gives nothing.
pub async fn clean_company_name(llm: &dyn ChatModel, raw_name: &str) -> String {
    let Some(first) = ask(llm, name_prompt(raw_name)).await else {
        warn!(name = raw_name, "name cleaning gave nothing, keeping original");
        return raw_name.to_string();
    };

    let cleaned = match ask(llm, name_check_prompt(&first)).await {
        Some(second) => strip_quotes(&second),
        None => strip_quotes(&first),
    };
    if cleaned.is_empty() {
        raw_name.to_string()
    } else {
        cleaned
    }
}

async fn company_image(fetcher: &Fetcher, company: &ListedCompany) -> Option<String> {
    let url = Url::parse(&company.link).ok()?;
    match fetch_company_image(fetcher, &url).await {
        Ok(image) => image,
        Err(e) => {
            warn!(ticker = %company.ticker, error = %e, "company image lookup failed");
            None
        }
    }
}

pub async fn describe_company(llm: &dyn ChatModel, name: &str, ticker: &str) -> Option<String> {
    ask(llm, description_prompt(name, ticker)).await
}

/// Two-pass tag generation restricted to the catalogue.
///
/// When the second pass gives nothing, catalogue labels found in the first
/// reply are used. A trailing comma is dropped; nothing left means `None`.
pub async fn company_tags(llm: &dyn ChatModel, name: &str, ticker: &str) -> Option<String> {
    let Some(first) = ask(llm, tags_prompt(name, ticker)).await else {
        warn!(ticker, "tag generation gave nothing");
        return None;
    };

    let tags = match ask(llm, tags_check_prompt(&first)).await {
        Some(second) => second.trim_end_matches(',').trim().to_string(),
        None => {
            let lowered = first.to_lowercase();
            let found: Vec<Tag> = Tag::ALL
                .into_iter()
                .filter(|t| lowered.contains(t.label()))
                .collect();
            join_tags(&found)
        }
    };
    (!tags.is_empty()).then_some(tags)
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn name_prompt(raw_name: &str) -> String {
    format!(
        "Извлеки чистое, общеупотребительное название компании из следующей строки: '{raw_name}'.
Убери все юридические формы (ПАО, АО, и т.д.), типы акций (обыкн.), кавычки и лишние символы.
Верни ТОЛЬКО название.

Примеры:
- Из \"Абрау-Дюрсо ПАО - обыкн.\" должно получиться Абрау-Дюрсо.
- Из \"Аэрофлот-росс.авиалин(ПАО)ао\" должно получиться Аэрофлот.
- Из \"Группа Позитив (ПАО)\" должно получиться Группа Позитив."
    )
}

fn name_check_prompt(first_pass: &str) -> String {
    format!(
        "Из следующего текста извлеки ТОЛЬКО название компании. Убери АБСОЛЮТНО все кавычки, пояснения и любой другой текст.
Если на входе '\"Аэрофлот\"', на выходе должно быть Аэрофлот.
Если на входе 'Название компании: \"АПРИ\"', на выходе должно быть АПРИ.

Текст для обработки:
'{first_pass}'"
    )
}

fn description_prompt(name: &str, ticker: &str) -> String {
    format!(
        "Напиши краткое деловое описание компании {name} (тикер: {ticker}). Описание должно включать \
         основную сферу деятельности компании, её позицию на рынке, ключевые направления бизнеса. \
         Ответ должен быть на русском языке, 3-5 предложений."
    )
}

fn tags_prompt(name: &str, ticker: &str) -> String {
    format!(
        "Определи от 3 до 5 ключевых тегов для компании {name} (тикер: {ticker}), выбрав их СТРОГО \
         из следующего списка: [{}]. Не придумывай новые теги. Формат ответа: тег1, тег2, тег3.",
        Tag::label_list()
    )
}

fn tags_check_prompt(first_pass: &str) -> String {
    format!(
        "Из следующего текста извлеки ТОЛЬКО те теги, которые есть в этом списке: [{}].
Убери все пояснения, примечания, заголовки, звездочки и любой другой текст.
Верни только теги, разделенные запятой.

Текст для обработки:
'{first_pass}'",
        Tag::label_list()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::test_support::{ScriptedModel, test_storage};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn name_cleaning_fallbacks() {
        let model = ScriptedModel::new(["\"Аэрофлот\"", "Аэрофлот"]);
        assert_eq!(clean_company_name(&model, "Аэрофлот(ПАО)ао").await, "Аэрофлот");

        // Second pass blank: first pass without quotes.
        let model = ScriptedModel::new(["'Группа Позитив'", ""]);
        assert_eq!(clean_company_name(&model, "Группа Позитив (ПАО)").await, "Группа Позитив");

        // First pass fails: original name.
        let model = ScriptedModel::new(Vec::<String>::new());
        assert_eq!(clean_company_name(&model, "Абрау-Дюрсо ПАО").await, "Абрау-Дюрсо ПАО");
    }

    #[tokio::test]
    async fn tag_fallbacks() {
        let model = ScriptedModel::new(["Финансы и технологии", "финансы, технологии,"]);
        assert_eq!(
            company_tags(&model, "Сбербанк", "SBER").await.as_deref(),
            Some("финансы, технологии")
        );

        // Second pass fails: catalogue labels found in the first reply.
        let model = ScriptedModel::new(["**Теги:** Финансы, технологии, космос"]);
        assert_eq!(
            company_tags(&model, "Сбербанк", "SBER").await.as_deref(),
            Some("финансы, технологии")
        );

        let model = ScriptedModel::new(["нет подходящих"]);
        assert_eq!(company_tags(&model, "X", "X").await, None);

        let model = ScriptedModel::new(Vec::<String>::new());
        assert_eq!(company_tags(&model, "X", "X").await, None);
    }

    #[tokio::test]
    async fn pipeline_skips_enriched_companies() {
        let server = MockServer::start().await;
        let listing = r#"<html><body>
            <a href="/symbols/RUS-SBER/">SBER</a><sup class="apply-common-tooltip" title="Сбербанк ПАО ао">x</sup>
            <a href="/symbols/RUS-AFLT/">AFLT</a><sup class="apply-common-tooltip" title="Аэрофлот(ПАО)ао">x</sup>
        </body></html>"#;
        Mock::given(method("GET"))
            .and(path("/markets/russia/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/symbols/RUS-AFLT/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        storage
            .upsert_company(&CompanyUpsert {
                ticker: "SBER".into(),
                company_name: "Сбербанк".into(),
                description: Some("Крупнейший банк.".into()),
                tags: Some("финансы".into()),
                ..CompanyUpsert::default()
            })
            .await
            .expect("seed");

        let model = ScriptedModel::new([
            "Аэрофлот",
            "Аэрофлот",
            "Крупнейшая авиакомпания России.",
            "транспорт, инфраструктура",
            "инфраструктура",
        ]);
        let fetcher = Fetcher::new(Duration::from_secs(5), Duration::ZERO).expect("fetcher");
        let config = CompanyPipelineConfig {
            listing_url: Url::parse(&format!("{}/markets/russia/", server.uri())).expect("url"),
            delay: Duration::ZERO,
        };

        let report = run_company_pipeline(&storage, &model, &fetcher, &config, &SilentProgress)
            .await
            .expect("pipeline");
        assert_eq!(
            report,
            CompanyReport {
                listed: 2,
                skipped: 1,
                saved: 1,
                failed: 0,
            }
        );
        assert_eq!(model.requests().len(), 5);

        let aflt = storage
            .get_company_by_ticker("AFLT")
            .await
            .expect("query")
            .expect("saved");
        assert_eq!(aflt.company_name, "Аэрофлот");
        assert_eq!(aflt.description.as_deref(), Some("Крупнейшая авиакомпания России."));
        assert_eq!(aflt.tags.as_deref(), Some("инфраструктура"));
        assert!(aflt.image_url.is_none());
        assert!(aflt.link.as_deref().is_some_and(|l| l.ends_with("/symbols/RUS-AFLT/")));
    }
}
