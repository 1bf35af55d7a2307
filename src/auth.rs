use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::{Role, User},
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the session JWT handed out at login. The role travels in the token so the
/// client can render role-specific views; the server re-reads it from the database on
/// every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Issued At, seconds since the epoch.
    pub iat: usize,
    /// Expiration Time, seconds since the epoch.
    pub exp: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. The route guard stores it in the
/// request extensions; handlers receive it as an extractor argument.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        AuthUser {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Resolution order:
/// 1. Session already resolved by the route guard (request extensions).
/// 2. Local-only bypass: an `x-user-id` header naming an existing user.
/// 3. `Authorization: Bearer <jwt>`: signature and expiry are validated, then the user
///    is loaded so a deleted account or a changed role takes effect immediately.
///
/// Rejection: a 401 envelope on any failure (500 if the store itself fails).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(user.into());
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("You are not authorized"))?;

        let claims = decode_token(token, &config)?;

        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

        Ok(user.into())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Signs a session token for `user`, valid for `config.jwt_ttl_secs`.
pub fn issue_token(user: &User, config: &AppConfig) -> Result<String, ApiError> {
    let now = now_secs();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        iat: now as usize,
        exp: (now + config.jwt_ttl_secs) as usize,
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    let token = encode(&Header::default(), &claims, &key).context("failed to sign session token")?;
    Ok(token)
}

/// Validates signature and expiry of a session token.
pub fn decode_token(token: &str, config: &AppConfig) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Tokens minted in the same second are checked exactly.
    validation.leeway = 0;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::unauthorized("Session has expired"),
            _ => ApiError::unauthorized("Invalid session token"),
        })
}

/// Hashes on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("hashing task failed")?
        .context("hashing error")?;
    Ok(hashed)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("verification task failed")?
        // A malformed stored hash never matches.
        .unwrap_or(false);
    Ok(matches)
}
