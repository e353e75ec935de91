//! Admin accounts, password verification, and bearer tokens.

pub mod router;

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AuthConfig;
use crate::forms::repository::RepositoryError;

pub use router::{auth_router, require_admin};

const DEFAULT_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

pub trait AdminRepository: Send + Sync {
    fn insert_admin(&self, user: AdminUser) -> Result<AdminUser, RepositoryError>;
    fn update_admin(&self, user: AdminUser) -> Result<(), RepositoryError>;
    fn fetch_admin_by_email(&self, email: &str) -> Result<Option<AdminUser>, RepositoryError>;
    fn fetch_admin(&self, id: &str) -> Result<Option<AdminUser>, RepositoryError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: AdminUser,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no token provided")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Hashing(_) | AuthError::Signing(_) | AuthError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, code) = if status.is_server_error() {
            tracing::error!(error = %self, "authentication failed internally");
            ("internal server error".to_string(), "INTERNAL_ERROR")
        } else if let AuthError::InvalidRequest(_) = self {
            (self.to_string(), "VALIDATION_ERROR")
        } else {
            (self.to_string(), "UNAUTHORIZED")
        };
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::InvalidRequest(rejection.body_text())
    }
}

/// Argon2id PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|err| AuthError::Hashing(err.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

/// False for mismatches and for hashes that do not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct AuthService {
    admins: Arc<dyn AdminRepository>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(admins: Arc<dyn AdminRepository>, config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            admins,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            token_ttl: Duration::hours(config.token_ttl_hours),
        }
    }

    /// Creates the bootstrap admin unless an account with that email exists.
    pub fn seed_admin(&self, email: &str, password: &str) -> Result<AdminUser, AuthError> {
        let email = email.trim();
        if let Some(existing) = self.admins.fetch_admin_by_email(email)? {
            tracing::debug!(email, "bootstrap admin already present");
            return Ok(existing);
        }

        let user = AdminUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            role: DEFAULT_ROLE.to_string(),
            created_at: Utc::now(),
            last_login_at: None,
        };
        let stored = self.admins.insert_admin(user)?;
        tracing::info!(email, "bootstrap admin created");
        Ok(stored)
    }

    pub fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let mut user = self
            .admins
            .fetch_admin_by_email(request.email.trim())?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&request.password, &user.password_hash) {
            tracing::warn!(email = %user.email, "admin login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        user.last_login_at = Some(Utc::now());
        self.admins.update_admin(user.clone())?;
        let token = self.issue_token(&user)?;
        tracing::info!(email = %user.email, "admin logged in");
        Ok(LoginResponse { token, user })
    }

    pub fn issue_token(&self, user: &AdminUser) -> Result<String, AuthError> {
        let expires = Utc::now() + self.token_ttl;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            exp: usize::try_from(expires.timestamp()).unwrap_or_default(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Admin behind a bearer token. Expired, forged, or orphaned tokens fail.
    pub fn authenticate(&self, token: &str) -> Result<AdminUser, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?
            .claims;
        self.admins
            .fetch_admin(&claims.sub)?
            .ok_or(AuthError::InvalidToken)
    }
}
