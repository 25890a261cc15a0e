//! Scraped (`raw_news`) and processed (`news_articles`) news.

use chrono::Utc;
use libsql::{Value, params};
use mojarung_shared::{
    MojarungError, NewArticle, NewsArticle, NewsFilter, RawNews, Result, ScrapedArticle,
};

use crate::{Storage, col_date, col_i64, col_string, paging, storage_err, timestamp};

/// Characters of body text compared when looking for raw duplicates.
const DUPLICATE_PREFIX_CHARS: usize = 20;

const ARTICLE_COLUMNS: &str =
    "id, title, full_text, summary, is_positive, is_ai_generated, tags, tickers, created_at";

impl Storage {
    // -----------------------------------------------------------------------
    // Raw news
    // -----------------------------------------------------------------------

    /// Store a scraped article. Returns the new row id.
    pub async fn insert_raw_news(&self, article: &ScrapedArticle) -> Result<i64> {
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO raw_news (title, full_text, source, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    article.title.as_str(),
                    article.full_text.as_str(),
                    article.source.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Whether a stored raw article has exactly this title and the same
    /// opening characters of body text.
    pub async fn raw_news_exists(&self, title: &str, full_text: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT full_text FROM raw_news WHERE title = ?1",
                params![title],
            )
            .await
            .map_err(storage_err)?;

        let prefix = text_prefix(full_text);
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            if text_prefix(&col_string(&row, 0)?) == prefix {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn get_raw_news(&self, id: i64) -> Result<Option<RawNews>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, full_text, source, created_at FROM raw_news WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_raw_news(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Raw articles in insertion order.
    pub async fn list_raw_news(&self, skip: usize, limit: usize) -> Result<Vec<RawNews>> {
        let (skip, limit) = paging(skip, limit);
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, full_text, source, created_at FROM raw_news
                 ORDER BY id LIMIT ?1 OFFSET ?2",
                params![limit, skip],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_raw_news(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Processed articles
    // -----------------------------------------------------------------------

    /// Store a processed article and return it.
    pub async fn insert_article(&self, article: &NewArticle) -> Result<NewsArticle> {
        let now = timestamp(Utc::now());
        let is_positive = match article.is_positive {
            Some(flag) => Value::Integer(i64::from(flag)),
            None => Value::Null,
        };
        self.conn
            .execute(
                "INSERT INTO news_articles
                 (title, full_text, summary, is_positive, is_ai_generated, tags, tickers, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    article.title.as_str(),
                    article.full_text.as_str(),
                    article.summary.as_deref(),
                    is_positive,
                    i64::from(article.is_ai_generated),
                    article.tags.as_deref(),
                    article.tickers.as_deref(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        let id = self.conn.last_insert_rowid();
        self.get_article(id)
            .await?
            .ok_or_else(|| MojarungError::Storage("inserted article vanished".into()))
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<NewsArticle>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM news_articles WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_article(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Processed articles in insertion order.
    pub async fn list_articles(&self, skip: usize, limit: usize) -> Result<Vec<NewsArticle>> {
        let (skip, limit) = paging(skip, limit);
        let sql =
            format!("SELECT {ARTICLE_COLUMNS} FROM news_articles ORDER BY id LIMIT ?1 OFFSET ?2");
        let mut rows = self
            .conn
            .query(&sql, params![limit, skip])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_article(&row)?);
        }
        Ok(results)
    }

    /// Newest articles first. With a non-empty filter, only articles whose
    /// tags contain any filter tag or whose tickers contain any filter ticker.
    pub async fn latest_articles(
        &self,
        limit: usize,
        filter: Option<&NewsFilter>,
    ) -> Result<Vec<NewsArticle>> {
        let mut values: Vec<Value> = Vec::new();
        let mut clauses = Vec::new();

        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            for tag in &filter.tags {
                values.push(Value::Text(tag.clone()));
                clauses.push(format!("instr(COALESCE(tags, ''), ?{}) > 0", values.len()));
            }
            for ticker in &filter.tickers {
                values.push(Value::Text(ticker.clone()));
                clauses.push(format!("instr(COALESCE(tickers, ''), ?{}) > 0", values.len()));
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" OR "))
        };
        values.push(Value::Integer(paging(0, limit).1));
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM news_articles {where_clause}
             ORDER BY created_at DESC, id DESC LIMIT ?{}",
            values.len()
        );

        let mut rows = self
            .conn
            .query(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_article(&row)?);
        }
        Ok(results)
    }
}

fn text_prefix(text: &str) -> &str {
    match text.char_indices().nth(DUPLICATE_PREFIX_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn row_to_raw_news(row: &libsql::Row) -> Result<RawNews> {
    Ok(RawNews {
        id: col_i64(row, 0)?,
        title: col_string(row, 1)?,
        full_text: col_string(row, 2)?,
        source: col_string(row, 3)?,
        created_at: col_date(row, 4)?,
    })
}

fn row_to_article(row: &libsql::Row) -> Result<NewsArticle> {
    Ok(NewsArticle {
        id: col_i64(row, 0)?,
        title: col_string(row, 1)?,
        full_text: col_string(row, 2)?,
        summary: row.get::<String>(3).ok(),
        is_positive: row.get::<i64>(4).ok().map(|v| v != 0),
        is_ai_generated: col_i64(row, 5)? != 0,
        tags: row.get::<String>(6).ok(),
        tickers: row.get::<String>(7).ok(),
        created_at: col_date(row, 8)?,
    })
}
