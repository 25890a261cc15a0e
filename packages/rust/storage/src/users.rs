//! User accounts and per-user tag scores.

use chrono::Utc;
use libsql::{Value, params};
use mojarung_shared::{MojarungError, NewUser, Result, Tag, TagScores, User, UserUpdate};
use uuid::Uuid;

use crate::{Storage, col_date, col_i64, col_string, storage_err, timestamp};

const USER_COLUMNS: &str = "id, email, username, hashed_password, is_active, invest_token, \
                            telegram_id, tickers, created_at, updated_at";

impl Storage {
    // -----------------------------------------------------------------------
    // User operations
    // -----------------------------------------------------------------------

    /// Insert a new active user. Duplicate email or username is a conflict.
    pub async fn insert_user(&self, user: &NewUser) -> Result<User> {
        let id = Uuid::now_v7();
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO users (id, email, username, hashed_password, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                params![
                    id.to_string(),
                    user.email.as_str(),
                    user.username.as_str(),
                    user.hashed_password.as_str(),
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        self.get_user_by_id(id)
            .await?
            .ok_or_else(|| MojarungError::Storage("inserted user vanished".into()))
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.query_user("id", id.to_string()).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("email", email.to_string()).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.query_user("username", username.to_string()).await
    }

    async fn query_user(&self, column: &str, value: String) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![value])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Apply a partial update and bump `updated_at`. Returns the new record.
    pub async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let fields = [
            ("email", &update.email),
            ("username", &update.username),
            ("hashed_password", &update.hashed_password),
            ("invest_token", &update.invest_token),
            ("telegram_id", &update.telegram_id),
            ("tickers", &update.tickers),
        ];
        for (column, field) in fields {
            if let Some(v) = field {
                values.push(Value::Text(v.clone()));
                sets.push(format!("{column} = ?{}", values.len()));
            }
        }

        values.push(Value::Text(timestamp(Utc::now())));
        sets.push(format!("updated_at = ?{}", values.len()));
        values.push(Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len()
        );

        let changed = self
            .conn
            .execute(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(MojarungError::not_found("User"));
        }

        self.get_user_by_id(id)
            .await?
            .ok_or_else(|| MojarungError::not_found("User"))
    }

    /// Replace the followed-ticker list.
    pub async fn set_user_tickers(&self, id: Uuid, tickers: &[String]) -> Result<User> {
        let joined = tickers.join(", ");
        let update = UserUpdate {
            tickers: Some(joined),
            ..UserUpdate::default()
        };
        self.update_user(id, &update).await
    }

    // -----------------------------------------------------------------------
    // Tag scores
    // -----------------------------------------------------------------------

    /// All tag scores of a user; tags never touched score zero.
    pub async fn get_tag_scores(&self, user_id: Uuid) -> Result<TagScores> {
        let mut rows = self
            .conn
            .query(
                "SELECT tag, score FROM user_tag_scores WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut scores = TagScores::default();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let key = col_string(&row, 0)?;
            match Tag::from_key(&key) {
                Some(tag) => scores.set(tag, col_i64(&row, 1)?),
                None => tracing::warn!(%key, "ignoring unknown tag score"),
            }
        }
        Ok(scores)
    }

    /// Add `delta` to each listed tag's score in one transaction.
    pub async fn adjust_tag_scores(&self, user_id: Uuid, tags: &[Tag], delta: i64) -> Result<()> {
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for tag in tags {
            tx.execute(
                "INSERT INTO user_tag_scores (user_id, tag, score) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, tag) DO UPDATE SET score = score + excluded.score",
                params![user_id.to_string(), tag.key(), delta],
            )
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

fn row_to_user(row: &libsql::Row) -> Result<User> {
    let id = col_string(row, 0)?;
    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| MojarungError::Storage(format!("invalid id: {e}")))?,
        email: col_string(row, 1)?,
        username: col_string(row, 2)?,
        hashed_password: col_string(row, 3)?,
        is_active: col_i64(row, 4)? != 0,
        invest_token: row.get::<String>(5).ok(),
        telegram_id: row.get::<String>(6).ok(),
        tickers: row.get::<String>(7).ok(),
        created_at: col_date(row, 8)?,
        updated_at: col_date(row, 9)?,
    })
}
