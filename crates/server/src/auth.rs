use argon2::{
    password_hash::{rand_core::OsRng, rand_core::RngCore, SaltString},
    Argon2,
    PasswordHash,
    PasswordHasher,
    PasswordVerifier,
};
use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::app_state::AppState;
use crate::errors::ServerError;
use crate::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Candidate,
    Company,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Candidate => "candidate",
            Role::Company => "company",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "candidate" => Some(Role::Candidate),
            "company" => Some(Role::Company),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The caller behind a valid bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn require(self, role: Role) -> Result<Self, ServerError> {
        if self.role != role {
            return Err(ServerError::new(
                StatusCode::FORBIDDEN,
                format!("{} account required", role.as_str()),
            ));
        }
        Ok(self)
    }

    pub fn is_admin(self) -> bool {
        self.role == Role::Admin
    }
}

pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ServerError> {
    let token = bearer_token(headers)?;
    let token_hash = hash_token(&token);
    let now = now_ms();

    let row = if let Some(pool) = &state.postgres {
        sqlx::query_as::<_, (i64, String)>(
            "SELECT u.id, u.role FROM user_tokens t JOIN users u ON u.id = t.user_id \
             WHERE t.token_hash = $1 AND t.expires_at_ms > $2",
        )
        .bind(&token_hash)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)?
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query_as::<_, (i64, String)>(
            "SELECT u.id, u.role FROM user_tokens t JOIN users u ON u.id = t.user_id \
             WHERE t.token_hash = ?1 AND t.expires_at_ms > ?2",
        )
        .bind(&token_hash)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)?
    };

    let (id, role) =
        row.ok_or_else(|| ServerError::new(StatusCode::UNAUTHORIZED, "invalid token"))?;
    let role = Role::parse(&role)
        .ok_or_else(|| ServerError::internal(format!("user {id} has unknown role {role}")))?;
    Ok(AuthUser { id, role })
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, ServerError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let token = value.strip_prefix("Bearer ").unwrap_or("").trim();
    if token.is_empty() {
        return Err(ServerError::new(
            StatusCode::UNAUTHORIZED,
            "missing bearer token",
        ));
    }
    Ok(token.to_string())
}

/// Lowercased, trimmed email; `None` when it is not shaped like `local@domain`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || email.contains(' ') {
        return None;
    }
    Some(email)
}

pub fn check_password_len(password: &str, min_len: usize) -> Result<(), ServerError> {
    if password.chars().count() < min_len {
        return Err(ServerError::new(
            StatusCode::BAD_REQUEST,
            format!("password must be at least {min_len} characters"),
        ));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| format!("password hash error: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(hash: &str, password: &str) -> Result<(), String> {
    let parsed = PasswordHash::new(hash).map_err(|e| format!("password hash parse error: {e}"))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|e| format!("password verify error: {e}"))
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two shared secrets through their SHA-256 digests, folding every
/// byte so the time taken does not depend on where they differ.
pub fn secrets_match(given: &str, expected: &str) -> bool {
    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
