//! LLM trade recommendations and the news question assistant.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use mojarung_invest::{Operation, SandboxClient, recent_operations};
use mojarung_llm::{ChatModel, ChatRequest, parse_json_reply};
use mojarung_shared::{InvestConfig, NewsArticle, Result, Tag, User};

use crate::preferences::TagBuckets;

/// Days of account history shown to the model.
const OPERATIONS_WINDOW_DAYS: i64 = 30;

const DEFAULT_REASONING: &str = "Нет достаточной информации.";

/// What the model knows about the user.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub buckets: TagBuckets,
    pub tickers: Vec<String>,
    pub operations: Vec<Operation>,
}

/// A buy/sell/hold decision for one article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub buy: bool,
    pub sell: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub ticker: Option<String>,
    pub quantity: Option<i64>,
}

impl Recommendation {
    /// Interpret the model's JSON object. Unknown actions become hold and a
    /// ticker is only kept for buy or sell.
    pub fn from_reply(reply: &Value) -> Self {
        let action = reply
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("hold")
            .trim()
            .to_lowercase();
        let (buy, sell) = match action.as_str() {
            "buy" => (true, false),
            "sell" => (false, true),
            "hold" => (false, false),
            other => {
                warn!(action = other, "unknown action, treating as hold");
                (false, false)
            }
        };

        let ticker = if buy || sell {
            reply
                .get("ticker")
                .and_then(Value::as_str)
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
        } else {
            None
        };

        Self {
            buy,
            sell,
            confidence: number(reply.get("confidence")).unwrap_or(0.0),
            reasoning: reply
                .get("reasoning")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_REASONING.to_string()),
            ticker,
            quantity: Some(number(reply.get("quantity")).map_or(0, |q| q as i64)),
        }
    }
}

/// A JSON number or a numeric string.
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn tag_list(tags: &[Tag]) -> String {
    if tags.is_empty() {
        "Нет".to_string()
    } else {
        tags.iter().map(|t| t.label()).collect::<Vec<_>>().join(", ")
    }
}

/// Build the recommendation prompt for an article and a user.
pub fn recommendation_prompt(article: &NewsArticle, user: &UserContext) -> String {
    let tickers = if user.tickers.is_empty() {
        "Нет".to_string()
    } else {
        user.tickers.join(", ")
    };
    let operations = if user.operations.is_empty() {
        "Нет недавних операций.".to_string()
    } else {
        serde_json::to_string_pretty(&user.operations)
            .unwrap_or_else(|_| "Нет недавних операций.".to_string())
    };

    format!(
        r#"Ты — опытный финансовый аналитик. Твоя задача — проанализировать новость и предоставить инвестиционную рекомендацию для пользователя.

**Новость:**
- Заголовок: {title}
- Текст: {text}
- Теги новости: {tags}
- Тикеры, упомянутые в новости: {news_tickers}

**Профиль пользователя:**
- Любимые теги (высокий интерес): {loved}
- Нейтральные теги (средний интерес): {neutral}
- Нелюбимые теги (низкий интерес): {unloved}
- Отслеживаемые тикеры: {tickers}

**Недавние операции пользователя:**
{operations}

**Твоя задача:**
Проанализируй всю предоставленную информацию и прими решение: стоит ли покупать, продавать или держать акции, связанные с этой новостью.

Верни ответ СТРОГО в формате JSON со следующими полями:
- "action": одно из трёх строковых значений: "buy", "sell" или "hold".
- "ticker": тикер компании для операции (если action 'buy' или 'sell'). Если 'hold', это поле должно быть null. Выбери наиболее релевантный тикер из новости.
- "confidence": число от 0 до 100, представляющее твою уверенность в рекомендации.
- "reasoning": краткое объяснение твоего решения (1-2 предложения) на русском языке.
- "quantity": рекомендуемое количество лотов для покупки или продажи, небольшое целое число (например, 1-10), основанное на значимости новости.

Если информации хоть немного хватает на принятие решения о покупке или продаже, лучше предложи купить или продать, чем держать.

Пример ответа:
{{"action": "buy", "ticker": "SBER", "confidence": 85.0, "reasoning": "Новость позитивна для банковского сектора.", "quantity": 5}}
"#,
        title = article.title,
        text = article.full_text,
        tags = article.tags.as_deref().unwrap_or("Нет"),
        news_tickers = article.tickers.as_deref().unwrap_or("Нет"),
        loved = tag_list(&user.buckets.loved),
        neutral = tag_list(&user.buckets.neutral),
        unloved = tag_list(&user.buckets.unloved),
    )
}

/// Ask the model for a recommendation on `article`.
#[instrument(skip_all, fields(article_id = article.id))]
pub async fn recommend(
    llm: &dyn ChatModel,
    article: &NewsArticle,
    user: &UserContext,
) -> Result<Recommendation> {
    let request = ChatRequest::new(recommendation_prompt(article, user))
        .max_tokens(1024)
        .temperature(0.2)
        .json();
    let reply: Value = parse_json_reply(&llm.complete(request).await?)?;
    let recommendation = Recommendation::from_reply(&reply);
    info!(
        buy = recommendation.buy,
        sell = recommendation.sell,
        confidence = recommendation.confidence,
        "recommendation ready"
    );
    Ok(recommendation)
}

/// Recent sandbox operations of a user; empty when the user has no token or
/// the brokerage cannot be reached.
pub async fn user_operations(user: &User, config: &InvestConfig) -> Vec<Operation> {
    let Some(token) = user.invest_token.as_deref().filter(|t| !t.is_empty()) else {
        return Vec::new();
    };
    let result = async {
        let client = SandboxClient::from_config(config, token)?;
        recent_operations(&client, OPERATIONS_WINDOW_DAYS).await
    }
    .await;

    match result {
        Ok(operations) => operations,
        Err(e) => {
            warn!(user = %user.id, error = %e, "operations unavailable");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

pub fn assistant_prompt(news_text: &str, question: &str) -> String {
    format!(
        "Ты — полезный ассистент, который помогает пользователям понять новостные статьи.
Твоя задача — ответить на вопрос пользователя, основываясь ИСКЛЮЧИТЕЛЬНО на тексте предоставленной новости.
Не придумывай информацию и не используй свои общие знания. Если ответ на вопрос не содержится в тексте, прямо сообщи об этом.

**Текст новости:**
---
{news_text}
---

**Вопрос пользователя:**
{question}

**Твой ответ:**
"
    )
}

/// Answer a question using only the given article text.
pub async fn answer_question(llm: &dyn ChatModel, news_text: &str, question: &str) -> Result<String> {
    let request = ChatRequest::new(assistant_prompt(news_text, question))
        .max_tokens(1500)
        .temperature(0.3);
    let answer = llm.complete(request).await?;
    Ok(answer.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;
    use serde_json::json;

    fn article() -> NewsArticle {
        NewsArticle {
            id: 7,
            title: "Сбербанк увеличил дивиденды".into(),
            full_text: "Набсовет Сбербанка рекомендовал рекордные дивиденды.".into(),
            summary: None,
            is_positive: Some(true),
            is_ai_generated: false,
            tags: Some("финансы".into()),
            tickers: Some("SBER".into()),
            created_at: Default::default(),
        }
    }

    #[test]
    fn parses_buy_and_coerces_numbers() {
        let r = Recommendation::from_reply(&json!({
            "action": "BUY", "ticker": "sber", "confidence": "85.5",
            "reasoning": "Дивиденды растут.", "quantity": 3.0
        }));
        assert!(r.buy && !r.sell);
        assert_eq!(r.ticker.as_deref(), Some("SBER"));
        assert_eq!(r.confidence, 85.5);
        assert_eq!(r.quantity, Some(3));
    }

    #[test]
    fn invalid_action_becomes_hold_without_ticker() {
        let r = Recommendation::from_reply(&json!({ "action": "panic", "ticker": "SBER" }));
        assert!(!r.buy && !r.sell);
        assert!(r.ticker.is_none());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.quantity, Some(0));
        assert_eq!(r.reasoning, DEFAULT_REASONING);
    }

    #[test]
    fn prompt_shows_context_or_placeholders() {
        let empty = recommendation_prompt(&article(), &UserContext::default());
        assert!(empty.contains("Отслеживаемые тикеры: Нет"));
        assert!(empty.contains("Нет недавних операций."));
        assert!(empty.contains("Любимые теги (высокий интерес): Нет"));

        let user = UserContext {
            buckets: TagBuckets {
                loved: vec![Tag::Finance],
                ..TagBuckets::default()
            },
            tickers: vec!["SBER".into(), "GAZP".into()],
            operations: vec![Operation {
                figi: "BBG004730N88".into(),
                quantity: 2,
                ..Operation::default()
            }],
        };
        let prompt = recommendation_prompt(&article(), &user);
        assert!(prompt.contains("Любимые теги (высокий интерес): финансы"));
        assert!(prompt.contains("Отслеживаемые тикеры: SBER, GAZP"));
        assert!(prompt.contains("BBG004730N88"));
    }

    #[tokio::test]
    async fn recommend_uses_low_temperature_json() {
        let model = ScriptedModel::new([r#"{"action": "sell", "ticker": "SBER", "confidence": 60, "reasoning": "Риски.", "quantity": 2}"#]);
        let r = recommend(&model, &article(), &UserContext::default())
            .await
            .expect("recommend");
        assert!(r.sell);
        assert_eq!(r.quantity, Some(2));

        let request = &model.requests()[0];
        assert!(request.json_mode);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(1024));
    }

    #[tokio::test]
    async fn assistant_answers_trimmed() {
        let model = ScriptedModel::new(["  В тексте об этом не сказано.\n"]);
        let answer = answer_question(&model, "Текст новости", "Когда выплата?")
            .await
            .expect("answer");
        assert_eq!(answer, "В тексте об этом не сказано.");
        assert!(model.requests()[0].prompt.contains("Когда выплата?"));
    }

    #[tokio::test]
    async fn no_token_means_no_operations() {
        let user = User {
            id: uuid::Uuid::now_v7(),
            email: "a@b.c".into(),
            username: "a".into(),
            hashed_password: String::new(),
            is_active: true,
            invest_token: None,
            telegram_id: None,
            tickers: None,
            created_at: Default::default(),
            updated_at: Default::default(),
        };
        assert!(user_operations(&user, &InvestConfig::default()).await.is_empty());
    }
}
