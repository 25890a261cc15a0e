//! Registration, login and profile.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use mojarung_shared::{NewUser, User, UserUpdate};

use crate::auth::{CurrentUser, expired_cookie, hash_password, session_cookie, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::routes::message;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

const EMAIL_TAKEN: &str = "Пользователь с таким email уже существует";
const USERNAME_TAKEN: &str = "Пользователь с таким именем уже существует";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me).put(update_me))
        .route("/api/auth/me/invest-token", put(set_invest_token))
        .route("/api/auth/me/telegram-id", put(set_telegram_id))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Public view of a user. Secrets stay on the server.
#[derive(Debug, Serialize)]
pub struct UserOut {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub has_invest_token: bool,
    pub telegram_id: Option<String>,
    pub tickers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        Self {
            has_invest_token: user.invest_token.as_deref().is_some_and(|t| !t.is_empty()),
            tickers: user.ticker_list(),
            id: user.id,
            email: user.email,
            username: user.username,
            is_active: user.is_active,
            telegram_id: user.telegram_id,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    /// Email or username.
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenOut {
    access_token: String,
    token_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ProfileUpdate {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvestTokenUpdate {
    invest_token: String,
}

#[derive(Debug, Deserialize)]
struct TelegramIdUpdate {
    telegram_id: String,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// `local@domain.tld` with no whitespace.
fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(name, tld)| !name.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
        && !email.chars().any(char::is_whitespace)
}

fn check_email(email: &str) -> ApiResult<()> {
    if valid_email(email) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid email address"))
    }
}

fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )))
    }
}

fn check_username(username: &str) -> ApiResult<()> {
    if username.trim().is_empty() {
        Err(ApiError::bad_request("Username must not be empty"))
    } else {
        Ok(())
    }
}

/// Reject an email or username that belongs to someone other than `owner`.
async fn ensure_available(
    state: &AppState,
    email: Option<&str>,
    username: Option<&str>,
    owner: Option<Uuid>,
) -> ApiResult<()> {
    let taken_by_other = |user: Option<User>| user.is_some_and(|u| Some(u.id) != owner);

    if let Some(email) = email {
        if taken_by_other(state.storage.get_user_by_email(email).await?) {
            return Err(ApiError::bad_request(EMAIL_TAKEN));
        }
    }
    if let Some(username) = username {
        if taken_by_other(state.storage.get_user_by_username(username).await?) {
            return Err(ApiError::bad_request(USERNAME_TAKEN));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserOut>)> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();
    check_email(&email)?;
    check_username(&username)?;
    check_password(&req.password)?;
    ensure_available(&state, Some(&email), Some(&username), None).await?;

    let user = state
        .storage
        .insert_user(&NewUser {
            email,
            username,
            hashed_password: hash_password(&req.password)?,
        })
        .await?;
    info!(user = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<impl IntoResponse> {
    let login = form.username.trim();
    let user = match state.storage.get_user_by_email(&login.to_lowercase()).await? {
        Some(user) => Some(user),
        None => state.storage.get_user_by_username(login).await?,
    };
    let user = user
        .filter(|u| verify_password(&form.password, &u.hashed_password))
        .ok_or_else(|| ApiError::unauthorized("Incorrect username or password"))?;
    if !user.is_active {
        return Err(ApiError::bad_request("Inactive user"));
    }

    let token = state.tokens.issue(user.id)?;
    let cookie = session_cookie(
        &token,
        state.tokens.lifetime_secs(),
        state.config.auth.cookie_secure,
    );
    info!(user = %user.id, "user logged in");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(TokenOut {
            access_token: token,
            token_type: "bearer",
        }),
    ))
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, expired_cookie(state.config.auth.cookie_secure))],
        message("Successfully logged out"),
    )
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserOut> {
    Json(user.into())
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ProfileUpdate>,
) -> ApiResult<Json<UserOut>> {
    let email = req.email.map(|e| e.trim().to_lowercase());
    let username = req.username.map(|u| u.trim().to_string());
    if let Some(email) = &email {
        check_email(email)?;
    }
    if let Some(username) = &username {
        check_username(username)?;
    }
    if let Some(password) = &req.password {
        check_password(password)?;
    }
    ensure_available(&state, email.as_deref(), username.as_deref(), Some(user.id)).await?;

    let update = UserUpdate {
        email,
        username,
        hashed_password: req.password.as_deref().map(hash_password).transpose()?,
        ..UserUpdate::default()
    };
    let updated = state.storage.update_user(user.id, &update).await?;
    info!(user = %user.id, "profile updated");
    Ok(Json(updated.into()))
}

async fn set_invest_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<InvestTokenUpdate>,
) -> ApiResult<Json<UserOut>> {
    let update = UserUpdate {
        invest_token: Some(req.invest_token.trim().to_string()),
        ..UserUpdate::default()
    };
    Ok(Json(state.storage.update_user(user.id, &update).await?.into()))
}

async fn set_telegram_id(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<TelegramIdUpdate>,
) -> ApiResult<Json<UserOut>> {
    let update = UserUpdate {
        telegram_id: Some(req.telegram_id.trim().to_string()),
        ..UserUpdate::default()
    };
    Ok(Json(state.storage.update_user(user.id, &update).await?.into()))
}
