//! Core domain types for Mojarung.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// PHC-formatted password hash. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    pub is_active: bool,
    /// Brokerage API token used for sandbox calls. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub invest_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<String>,
    /// Followed tickers, comma-separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tickers: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Followed tickers as a list.
    pub fn ticker_list(&self) -> Vec<String> {
        self.tickers.as_deref().map(split_list).unwrap_or_default()
    }
}

/// Fields for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub hashed_password: String,
}

/// A partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(skip)]
    pub hashed_password: Option<String>,
    #[serde(default)]
    pub invest_token: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<String>,
    #[serde(default)]
    pub tickers: Option<String>,
}

// ---------------------------------------------------------------------------
// News
// ---------------------------------------------------------------------------

/// An article as scraped, before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub title: String,
    pub full_text: String,
    /// Name of the source that produced it.
    pub source: String,
}

/// A stored scraped article, kept for duplicate checks and auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNews {
    pub id: i64,
    pub title: String,
    pub full_text: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// An LLM-processed article served to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: i64,
    pub title: String,
    pub full_text: String,
    pub summary: Option<String>,
    pub is_positive: Option<bool>,
    pub is_ai_generated: bool,
    /// Sector labels, comma-separated.
    pub tags: Option<String>,
    /// Mentioned tickers, comma-separated.
    pub tickers: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a processed article.
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub full_text: String,
    pub summary: Option<String>,
    pub is_positive: Option<bool>,
    pub is_ai_generated: bool,
    pub tags: Option<String>,
    pub tickers: Option<String>,
}

/// Restricts a news listing to articles matching any tag or any ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsFilter {
    pub tags: Vec<String>,
    pub tickers: Vec<String>,
}

impl NewsFilter {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.tickers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Companies
// ---------------------------------------------------------------------------

/// A listed company with LLM-written description and sector tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub ticker: String,
    pub company_name: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Company {
    /// Both description and tags are present, so enrichment can skip it.
    pub fn is_enriched(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.description) && filled(&self.tags)
    }
}

/// Fields for inserting or updating a company by ticker.
#[derive(Debug, Clone, Default)]
pub struct CompanyUpsert {
    pub ticker: String,
    pub company_name: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
}

/// Split a comma-separated list into trimmed, non-empty items.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::now_v7(),
            email: "ivan@example.com".into(),
            username: "ivan".into(),
            hashed_password: "$argon2id$secret".into(),
            is_active: true,
            invest_token: None,
            telegram_id: None,
            tickers: Some(" SBER, GAZP ,,".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut user = sample_user();
        user.invest_token = Some("t.sandbox-secret".into());
        let json = serde_json::to_string(&user).expect("serialize");
        assert!(!json.contains("argon2"));
        assert!(!json.contains("invest_token"));
        assert!(!json.contains("sandbox-secret"));
    }

    #[test]
    fn ticker_list_is_trimmed() {
        assert_eq!(sample_user().ticker_list(), vec!["SBER", "GAZP"]);
    }

    #[test]
    fn company_enrichment_state() {
        let mut company = Company {
            id: 1,
            ticker: "SBER".into(),
            company_name: "Сбербанк".into(),
            link: None,
            image_url: None,
            description: Some("Крупнейший банк".into()),
            tags: Some("  ".into()),
            created_at: Utc::now(),
        };
        assert!(!company.is_enriched());
        company.tags = Some("финансы".into());
        assert!(company.is_enriched());
    }
}
