use axum::Json;
use axum::extract::State;
use axum::http::{
  HeaderMap,
  StatusCode
};

use crate::app_state::AppState;
use crate::auth::{
  Role,
  authenticate,
  check_password_len,
  hash_password,
  normalize_email,
  verify_password
};
use crate::errors::{
  ServerError,
  map_db_error
};
use crate::models::{
  CreateUserRequest,
  PasswordChangeRequest,
  UserResponse
};
use crate::time::now_ms;

pub async fn create_user(
  State(state): State<AppState>,
  Json(payload): Json<
    CreateUserRequest
  >
) -> Result<
  (StatusCode, Json<UserResponse>),
  ServerError
> {
  let password =
    payload.password.trim();

  if payload.email.trim().is_empty()
    || password.is_empty()
  {
    return Err(ServerError::new(
      StatusCode::BAD_REQUEST,
      "email and password required"
    ));
  }

  let email = normalize_email(
    &payload.email
  )
  .ok_or_else(|| {
    ServerError::new(
      StatusCode::BAD_REQUEST,
      "invalid email"
    )
  })?;

  let role = match Role::parse(
    &payload.role
  ) {
    | Some(
      role @ (Role::Candidate
      | Role::Company)
    ) => role,
    | _ => {
      return Err(ServerError::new(
        StatusCode::BAD_REQUEST,
        "role must be candidate or \
         company"
      ));
    }
  };

  check_password_len(
    password,
    state.min_password_len
  )?;

  let password_hash = hash_password(
    password
  )
  .map_err(ServerError::internal)?;

  let now = now_ms();

  let user_id = if let Some(pool) =
    &state.postgres
  {
    sqlx::query_scalar::<_, i64>(
      "INSERT INTO users (email, \
       password_hash, role, \
       created_at_ms) VALUES ($1, $2, \
       $3, $4) RETURNING id"
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| {
      map_db_error(
        e,
        "email already registered"
      )
    })?
  } else {
    let pool = state.sqlite_pool()?;

    sqlx::query_scalar::<_, i64>(
      "INSERT INTO users (email, \
       password_hash, role, \
       created_at_ms) VALUES (?1, ?2, \
       ?3, ?4) RETURNING id"
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| {
      map_db_error(
        e,
        "email already registered"
      )
    })?
  };

  tracing::info!(
    user_id,
    role = role.as_str(),
    "user registered"
  );

  Ok((
    StatusCode::CREATED,
    Json(UserResponse {
      id: user_id,
      email,
      role: role.as_str().to_string()
    })
  ))
}

pub async fn me(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<
  Json<UserResponse>,
  ServerError
> {
  let user =
    authenticate(&state, &headers)
      .await?;

  let row = if let Some(pool) =
    &state.postgres
  {
    sqlx::query_as::<_, UserResponse>(
      "SELECT id, email, role FROM \
       users WHERE id = $1"
    )
    .bind(user.id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::internal)?
  } else {
    let pool = state.sqlite_pool()?;

    sqlx::query_as::<_, UserResponse>(
      "SELECT id, email, role FROM \
       users WHERE id = ?1"
    )
    .bind(user.id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::internal)?
  };

  let row = row.ok_or_else(|| {
    ServerError::new(
      StatusCode::NOT_FOUND,
      "user not found"
    )
  })?;

  Ok(Json(row))
}

pub async fn change_password(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<
    PasswordChangeRequest
  >
) -> Result<StatusCode, ServerError> {
  let user =
    authenticate(&state, &headers)
      .await?;

  let current_password =
    payload.current_password.trim();

  let new_password =
    payload.new_password.trim();

  if current_password.is_empty()
    || new_password.is_empty()
  {
    return Err(ServerError::new(
      StatusCode::BAD_REQUEST,
      "current_password and \
       new_password required"
    ));
  }

  check_password_len(
    new_password,
    state.min_password_len
  )?;

  let password_hash = if let Some(
    pool
  ) =
    &state.postgres
  {
    sqlx::query_scalar::<_, String>(
      "SELECT password_hash FROM \
       users WHERE id = $1"
    )
    .bind(user.id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::internal)?
  } else {
    let pool = state.sqlite_pool()?;

    sqlx::query_scalar::<_, String>(
      "SELECT password_hash FROM \
       users WHERE id = ?1"
    )
    .bind(user.id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::internal)?
  }
  .ok_or_else(|| {
    ServerError::new(
      StatusCode::NOT_FOUND,
      "user not found"
    )
  })?;

  verify_password(
    &password_hash,
    current_password
  )
  .map_err(|_| {
    ServerError::new(
      StatusCode::UNAUTHORIZED,
      "invalid credentials"
    )
  })?;

  let new_hash =
    hash_password(new_password)
      .map_err(ServerError::internal)?;

  if let Some(pool) = &state.postgres {
    sqlx::query(
      "UPDATE users SET password_hash \
       = $1 WHERE id = $2"
    )
    .bind(&new_hash)
    .bind(user.id)
    .execute(pool)
    .await
    .map_err(ServerError::internal)?;
  } else {
    let pool = state.sqlite_pool()?;

    sqlx::query(
      "UPDATE users SET password_hash \
       = ?1 WHERE id = ?2"
    )
    .bind(&new_hash)
    .bind(user.id)
    .execute(pool)
    .await
    .map_err(ServerError::internal)?;
  }

  Ok(StatusCode::NO_CONTENT)
}

const DELETE_USER_POSTGRES: &[&str] = &[
  "DELETE FROM matches WHERE \
   candidate_id IN (SELECT id FROM \
   candidates WHERE user_id = $1)",
  "DELETE FROM matches WHERE \
   vacancy_id IN (SELECT v.id FROM \
   vacancies v JOIN companies c ON \
   c.id = v.company_id WHERE \
   c.user_id = $1)",
  "DELETE FROM vacancies WHERE \
   company_id IN (SELECT id FROM \
   companies WHERE user_id = $1)",
  "DELETE FROM candidates WHERE \
   user_id = $1",
  "DELETE FROM companies WHERE \
   user_id = $1",
  "DELETE FROM payments WHERE \
   user_id = $1",
  "DELETE FROM subscriptions WHERE \
   user_id = $1",
  "DELETE FROM user_tokens WHERE \
   user_id = $1",
  "DELETE FROM users WHERE id = $1"
];

const DELETE_USER_SQLITE: &[&str] = &[
  "DELETE FROM matches WHERE \
   candidate_id IN (SELECT id FROM \
   candidates WHERE user_id = ?1)",
  "DELETE FROM matches WHERE \
   vacancy_id IN (SELECT v.id FROM \
   vacancies v JOIN companies c ON \
   c.id = v.company_id WHERE \
   c.user_id = ?1)",
  "DELETE FROM vacancies WHERE \
   company_id IN (SELECT id FROM \
   companies WHERE user_id = ?1)",
  "DELETE FROM candidates WHERE \
   user_id = ?1",
  "DELETE FROM companies WHERE \
   user_id = ?1",
  "DELETE FROM payments WHERE \
   user_id = ?1",
  "DELETE FROM subscriptions WHERE \
   user_id = ?1",
  "DELETE FROM user_tokens WHERE \
   user_id = ?1",
  "DELETE FROM users WHERE id = ?1"
];

pub async fn delete_user(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<StatusCode, ServerError> {
  let user =
    authenticate(&state, &headers)
      .await?;

  if user.is_admin() {
    return Err(ServerError::new(
      StatusCode::FORBIDDEN,
      "admin accounts cannot be \
       deleted"
    ));
  }

  if let Some(pool) = &state.postgres {
    let mut tx = pool
      .begin()
      .await
      .map_err(ServerError::internal)?;

    for stmt in DELETE_USER_POSTGRES {
      sqlx::query(stmt)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(ServerError::internal)?;
    }

    tx.commit()
      .await
      .map_err(ServerError::internal)?;
  } else {
    let pool = state.sqlite_pool()?;

    let mut tx = pool
      .begin()
      .await
      .map_err(ServerError::internal)?;

    for stmt in DELETE_USER_SQLITE {
      sqlx::query(stmt)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(ServerError::internal)?;
    }

    tx.commit()
      .await
      .map_err(ServerError::internal)?;
  }

  tracing::info!(
    user_id = user.id,
    "user deleted"
  );

  Ok(StatusCode::NO_CONTENT)
}
