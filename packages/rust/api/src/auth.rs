//! Password hashing, access tokens and the current-user extractor.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use mojarung_shared::{MojarungError, Result, User};

use crate::error::ApiError;
use crate::state::AppState;

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "access_token";

const INVALID_CREDENTIALS: &str = "Could not validate credentials";

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MojarungError::Auth(format!("failed to hash password: {e}")))
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// HS256 signing and verification keys.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, expire_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::minutes(expire_minutes),
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime.num_seconds()
    }

    /// Signed token with the user id as `sub`.
    pub fn issue(&self, user_id: Uuid) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (Utc::now() + self.lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| MojarungError::Auth(format!("failed to sign token: {e}")))
    }

    /// User id of a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                MojarungError::Auth(INVALID_CREDENTIALS.into())
            })?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| MojarungError::Auth(INVALID_CREDENTIALS.into()))
    }
}

/// `Set-Cookie` value storing the token.
pub fn session_cookie(token: &str, max_age: i64, secure: bool) -> String {
    let same_site = if secure { "SameSite=None; Secure" } else { "SameSite=Lax" };
    format!("{ACCESS_COOKIE}={token}; HttpOnly; Path=/; Max-Age={max_age}; {same_site}")
}

/// `Set-Cookie` value removing the token.
pub fn expired_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Token from `Authorization: Bearer`, else from the session cookie.
fn request_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// The authenticated, active user of a request.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token =
            request_token(parts).ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
        let user_id = state.tokens.verify(&token)?;

        let user = state
            .storage
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        if !user.is_active {
            return Err(ApiError::bad_request("Inactive user"));
        }
        Ok(Self(user))
    }
}
