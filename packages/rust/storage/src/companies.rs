//! Listed companies, keyed by ticker.

use chrono::Utc;
use libsql::params;
use mojarung_shared::{Company, CompanyUpsert, MojarungError, Result};

use crate::{Storage, col_date, col_i64, col_string, paging, storage_err, timestamp};

const COMPANY_COLUMNS: &str =
    "id, ticker, company_name, link, image_url, description, tags, created_at";

impl Storage {
    /// Insert a company or update the existing row with the same ticker.
    /// `None` fields never overwrite stored values.
    pub async fn upsert_company(&self, company: &CompanyUpsert) -> Result<Company> {
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO companies (ticker, company_name, link, image_url, description, tags, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(ticker) DO UPDATE SET
                    company_name = excluded.company_name,
                    link = COALESCE(excluded.link, companies.link),
                    image_url = COALESCE(excluded.image_url, companies.image_url),
                    description = COALESCE(excluded.description, companies.description),
                    tags = COALESCE(excluded.tags, companies.tags)",
                params![
                    company.ticker.as_str(),
                    company.company_name.as_str(),
                    company.link.as_deref(),
                    company.image_url.as_deref(),
                    company.description.as_deref(),
                    company.tags.as_deref(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        self.get_company_by_ticker(&company.ticker)
            .await?
            .ok_or_else(|| MojarungError::Storage("upserted company vanished".into()))
    }

    pub async fn get_company_by_ticker(&self, ticker: &str) -> Result<Option<Company>> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE ticker = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![ticker])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_company(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    pub async fn get_company(&self, id: i64) -> Result<Option<Company>> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_company(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    pub async fn list_companies(&self, skip: usize, limit: usize) -> Result<Vec<Company>> {
        let (skip, limit) = paging(skip, limit);
        let sql =
            format!("SELECT {COMPANY_COLUMNS} FROM companies ORDER BY id LIMIT ?1 OFFSET ?2");
        let mut rows = self
            .conn
            .query(&sql, params![limit, skip])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_company(&row)?);
        }
        Ok(results)
    }
}

fn row_to_company(row: &libsql::Row) -> Result<Company> {
    Ok(Company {
        id: col_i64(row, 0)?,
        ticker: col_string(row, 1)?,
        company_name: col_string(row, 2)?,
        link: row.get::<String>(3).ok(),
        image_url: row.get::<String>(4).ok(),
        description: row.get::<String>(5).ok(),
        tags: row.get::<String>(6).ok(),
        created_at: col_date(row, 7)?,
    })
}
