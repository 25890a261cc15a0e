//! LLM rewriting and tagging of scraped news.
//!
//! Each unique article is sent to the model once in JSON mode. The reply is
//! validated against the tag catalogue; articles the model cannot place in
//! any known sector are rejected rather than stored untagged.

use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use mojarung_llm::{ChatModel, ChatRequest, parse_json_reply};
use mojarung_shared::{NewArticle, Result, ScrapedArticle, Tag, join_tags, split_list};

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Build the enrichment prompt for one article.
pub fn news_prompt(article: &ScrapedArticle) -> String {
    format!(
        "Ты — продвинутый AI-аналитик новостей. Твоя задача — обработать одну новостную статью и определить, была ли она сгенерирована AI.

Для данной статьи сгенерируй:
- `title`: Новый, краткий и емкий заголовок, отражающий суть статьи.
- `full_text`: Связный и подробный текст, сохраняющий всю важную информацию из оригинала.
- `summary`: Очень краткое содержание (2-3 предложения).
- `is_positive`: Булево значение. `true`, если новость позитивная или нейтральная, `false` — если негативная.
- `is_ai_generated`: Булево значение. Проанализируй ИСХОДНЫЙ текст статьи на предмет AI-генерации, используя следующие критерии:
  * Лингвистические паттерны: повторяющиеся фразы, чрезмерно формальный или общий язык
  * Структурная согласованность: неестественная связность, резкие смены тем
  * Контекстная глубина: наличие оригинальных инсайтов или опора на общие знания
  * Стилистические маркеры: аномалии в тоне, выборе слов
  Верни `true` если текст сгенерирован AI, `false` если написан человеком.
- `tags`: Массив из 1-3 самых релевантных тегов, выбранных СТРОГО из этого списка: [{tags}].
- `tickers`: Массив биржевых тикеров компаний, упомянутых в статье (например, SBER, GAZP). Пустой массив, если компании не упоминаются.

Важные правила:
- Если ни один тег из списка не подходит к статье, верни пустой массив `tags`.
- Твой ответ должен быть ТОЛЬКО JSON-объектом обработанной статьи. Без лишних слов и комментариев.

Исходная статья для анализа:
Заголовок: {title}
Текст: {text}
",
        tags = Tag::label_list(),
        title = article.title,
        text = article.full_text,
    )
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// The model's JSON reply for one article.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessedNews {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub is_positive: Option<bool>,
    #[serde(default)]
    pub is_ai_generated: bool,
    /// Either a JSON array or a comma-separated string.
    #[serde(default, deserialize_with = "list_or_text")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "list_or_text")]
    pub tickers: Vec<String>,
}

impl ProcessedNews {
    /// Known tags in reply order, without repeats.
    pub fn valid_tags(&self) -> Vec<Tag> {
        let mut tags = Vec::new();
        for tag in self.tags.iter().flat_map(|t| Tag::parse_list(t)) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Turn the reply into a storable article. `None` when no known tag
    /// survives. Empty title or text fall back to the scraped values.
    pub fn into_article(self, source: &ScrapedArticle) -> Option<NewArticle> {
        let tags = self.valid_tags();
        if tags.is_empty() {
            return None;
        }

        let mut tickers: Vec<String> = Vec::new();
        for ticker in &self.tickers {
            let ticker = ticker.trim().to_uppercase();
            if !ticker.is_empty() && !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }

        Some(NewArticle {
            title: non_empty(self.title).unwrap_or_else(|| source.title.clone()),
            full_text: non_empty(self.full_text).unwrap_or_else(|| source.full_text.clone()),
            summary: self.summary.and_then(non_empty),
            is_positive: self.is_positive,
            is_ai_generated: self.is_ai_generated,
            tags: Some(join_tags(&tags)),
            tickers: (!tickers.is_empty()).then(|| tickers.join(", ")),
        })
    }
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn list_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Wire>::deserialize(deserializer)? {
        Some(Wire::List(items)) => items,
        Some(Wire::Text(text)) => split_list(&text),
        None => Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Ask the model to rewrite and tag one article.
///
/// `Ok(None)` means the model answered but no allowed tag fits; transport
/// and JSON errors are returned as `Err`.
#[instrument(skip_all, fields(source = %article.source))]
pub async fn enrich_article(
    llm: &dyn ChatModel,
    article: &ScrapedArticle,
) -> Result<Option<NewArticle>> {
    let reply = llm
        .complete(ChatRequest::new(news_prompt(article)).json())
        .await?;
    let processed: ProcessedNews = parse_json_reply(&reply)?;

    let enriched = processed.into_article(article);
    match &enriched {
        Some(a) => debug!(tags = a.tags.as_deref().unwrap_or(""), "article enriched"),
        None => debug!(title = %article.title, "no allowed tag fits, article rejected"),
    }
    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    fn scraped() -> ScrapedArticle {
        ScrapedArticle {
            title: "Сбербанк отчитался о прибыли".into(),
            full_text: "Чистая прибыль Сбербанка за квартал выросла на 12%.".into(),
            source: "rbc".into(),
        }
    }

    #[test]
    fn prompt_lists_every_tag_and_the_article() {
        let prompt = news_prompt(&scraped());
        for tag in Tag::ALL {
            assert!(prompt.contains(tag.label()), "missing {tag}");
        }
        assert!(prompt.contains("Заголовок: Сбербанк отчитался о прибыли"));
        assert!(prompt.contains("`tickers`"));
    }

    #[test]
    fn tags_accept_array_or_string() {
        let a: ProcessedNews =
            serde_json::from_str(r#"{"tags": ["финансы", "технологии"]}"#).expect("array");
        let b: ProcessedNews =
            serde_json::from_str(r#"{"tags": "финансы, технологии"}"#).expect("string");
        assert_eq!(a.valid_tags(), b.valid_tags());
        assert_eq!(a.valid_tags(), vec![Tag::Finance, Tag::Tech]);

        let c: ProcessedNews = serde_json::from_str(r#"{"tags": null}"#).expect("null");
        assert!(c.tags.is_empty());
    }

    #[test]
    fn unknown_tags_are_dropped() {
        let reply: ProcessedNews = serde_json::from_str(
            r#"{"title": "T", "full_text": "X", "tags": ["космос", "Финансы", "финансы"],
                "tickers": [" sber ", "SBER", ""]}"#,
        )
        .expect("parse");
        let article = reply.into_article(&scraped()).expect("kept");
        assert_eq!(article.tags.as_deref(), Some("финансы"));
        assert_eq!(article.tickers.as_deref(), Some("SBER"));
    }

    #[test]
    fn no_valid_tag_rejects_the_article() {
        let reply: ProcessedNews =
            serde_json::from_str(r#"{"title": "T", "tags": ["космос"]}"#).expect("parse");
        assert!(reply.into_article(&scraped()).is_none());
    }

    #[test]
    fn empty_fields_fall_back_to_scraped_text() {
        let reply: ProcessedNews = serde_json::from_str(
            r#"{"title": "  ", "summary": " ", "is_positive": false, "tags": "финансы"}"#,
        )
        .expect("parse");
        let article = reply.into_article(&scraped()).expect("kept");
        assert_eq!(article.title, "Сбербанк отчитался о прибыли");
        assert!(article.full_text.starts_with("Чистая прибыль"));
        assert!(article.summary.is_none());
        assert_eq!(article.is_positive, Some(false));
        assert!(article.tickers.is_none());
    }

    #[tokio::test]
    async fn enrich_uses_json_mode() {
        let model = ScriptedModel::new([
            "```json\n{\"title\": \"Прибыль Сбера выросла\", \"full_text\": \"Текст\", \
             \"summary\": \"Кратко\", \"is_positive\": true, \"is_ai_generated\": false, \
             \"tags\": [\"финансы\"], \"tickers\": [\"SBER\"]}\n```",
        ]);
        let article = enrich_article(&model, &scraped())
            .await
            .expect("enrich")
            .expect("kept");
        assert_eq!(article.title, "Прибыль Сбера выросла");
        assert_eq!(article.summary.as_deref(), Some("Кратко"));

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_mode);
    }

    #[tokio::test]
    async fn garbage_reply_is_an_error() {
        let model = ScriptedModel::new(["not json at all"]);
        assert!(enrich_article(&model, &scraped()).await.is_err());
    }
}
