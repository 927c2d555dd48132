use axum::{extract::State, http::{HeaderMap, StatusCode}, Json};

use crate::app_state::AppState;
use crate::auth::{bearer_token, generate_token, hash_token, normalize_email, verify_password};
use crate::errors::ServerError;
use crate::models::{LoginRequest, TokenResponse};
use crate::time::now_ms;

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ServerError> {
    let password = payload.password.trim();
    if payload.email.trim().is_empty() || password.is_empty() {
        return Err(ServerError::new(
            StatusCode::BAD_REQUEST,
            "email and password required",
        ));
    }
    let email = normalize_email(&payload.email)
        .ok_or_else(|| ServerError::new(StatusCode::UNAUTHORIZED, "invalid credentials"))?;

    let (user_id, password_hash) = if let Some(pool) = &state.postgres {
        sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)?
        .ok_or_else(|| ServerError::new(StatusCode::UNAUTHORIZED, "invalid credentials"))?
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM users WHERE email = ?1",
        )
        .bind(&email)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)?
        .ok_or_else(|| ServerError::new(StatusCode::UNAUTHORIZED, "invalid credentials"))?
    };

    verify_password(&password_hash, password)
        .map_err(|_| ServerError::new(StatusCode::UNAUTHORIZED, "invalid credentials"))?;

    let token = generate_token();
    let token_hash = hash_token(&token);
    let now = now_ms();
    let expires_at_ms = now + (state.token_ttl_seconds as i64) * 1000;

    if let Some(pool) = &state.postgres {
        sqlx::query("DELETE FROM user_tokens WHERE user_id = $1 AND expires_at_ms <= $2")
            .bind(user_id)
            .bind(now)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
        sqlx::query(
            "INSERT INTO user_tokens (user_id, token_hash, expires_at_ms, created_at_ms) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at_ms)
        .bind(now)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query("DELETE FROM user_tokens WHERE user_id = ?1 AND expires_at_ms <= ?2")
            .bind(user_id)
            .bind(now)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
        sqlx::query(
            "INSERT INTO user_tokens (user_id, token_hash, expires_at_ms, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at_ms)
        .bind(now)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    }

    tracing::info!(user_id, "user logged in");

    Ok(Json(TokenResponse {
        token,
        token_type: "bearer".to_string(),
        expires_in: state.token_ttl_seconds,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ServerError> {
    let token = bearer_token(&headers)?;
    let token_hash = hash_token(&token);

    if let Some(pool) = &state.postgres {
        sqlx::query("DELETE FROM user_tokens WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query("DELETE FROM user_tokens WHERE token_hash = ?1")
            .bind(&token_hash)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    }

    Ok(StatusCode::NO_CONTENT)
}
