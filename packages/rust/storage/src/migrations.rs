//! SQL migration definitions for the Mojarung database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Tables created by the migrations, in drop order.
pub(crate) const TABLES: &[&str] = &[
    "user_tag_scores",
    "users",
    "news_articles",
    "raw_news",
    "companies",
    "schema_migrations",
];

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: users, tag scores, raw_news, news_articles, companies",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Accounts
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    email           TEXT NOT NULL UNIQUE,
    username        TEXT NOT NULL UNIQUE,
    hashed_password TEXT NOT NULL,
    is_active       INTEGER NOT NULL DEFAULT 1,
    invest_token    TEXT,
    telegram_id     TEXT,
    tickers         TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Per-user interest score for each sector tag (absent row = 0)
CREATE TABLE IF NOT EXISTS user_tag_scores (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    tag     TEXT NOT NULL,
    score   INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, tag)
);

-- Articles exactly as scraped
CREATE TABLE IF NOT EXISTS raw_news (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    title      TEXT NOT NULL,
    full_text  TEXT NOT NULL,
    source     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_news_title ON raw_news(title);

-- LLM-processed articles
CREATE TABLE IF NOT EXISTS news_articles (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    title           TEXT NOT NULL,
    full_text       TEXT NOT NULL,
    summary         TEXT,
    is_positive     INTEGER,
    is_ai_generated INTEGER NOT NULL DEFAULT 0,
    tags            TEXT,
    tickers         TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_news_articles_created ON news_articles(created_at);

-- Listed companies
CREATE TABLE IF NOT EXISTS companies (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker       TEXT NOT NULL UNIQUE,
    company_name TEXT NOT NULL,
    link         TEXT,
    image_url    TEXT,
    description  TEXT,
    tags         TEXT,
    created_at   TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
