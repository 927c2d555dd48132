use axum::Json;
use axum::extract::{
  Path as AxumPath,
  State
};
use axum::http::{
  HeaderMap,
  StatusCode
};

use crate::app_state::AppState;
use crate::auth::{
  Role,
  authenticate
};
use crate::errors::{
  ServerError,
  map_db_error
};
use crate::models::{
  Company,
  CompanyPayload
};
use crate::time::now_ms;
use crate::validate::{
  optional_text,
  patch_text,
  required_text,
  website
};

const COMPANY_COLUMNS: &str =
  "id, user_id, name, industry, \
   website, description, location, \
   created_at_ms, updated_at_ms";

pub(crate) async fn company_by_user(
  state: &AppState,
  user_id: i64
) -> Result<Option<Company>, ServerError>
{
  if let Some(pool) = &state.postgres {
    let sql = format!(
      "SELECT {COMPANY_COLUMNS} FROM \
       companies WHERE user_id = $1"
    );

    return sqlx::query_as::<_, Company>(
      &sql
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::internal);
  }

  let pool = state.sqlite_pool()?;

  let sql = format!(
    "SELECT {COMPANY_COLUMNS} FROM \
     companies WHERE user_id = ?1"
  );

  sqlx::query_as::<_, Company>(&sql)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::internal)
}

/// The caller's company profile, or
/// 404.
pub(crate) async fn require_company(
  state: &AppState,
  user_id: i64
) -> Result<Company, ServerError> {
  company_by_user(state, user_id)
    .await?
    .ok_or_else(|| {
      ServerError::new(
        StatusCode::NOT_FOUND,
        "company profile not found"
      )
    })
}

struct CompanyFields {
  name:        String,
  industry:    Option<String>,
  website:     Option<String>,
  description: Option<String>,
  location:    Option<String>
}

pub async fn create_company(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<CompanyPayload>
) -> Result<
  (StatusCode, Json<Company>),
  ServerError
> {
  let user =
    authenticate(&state, &headers)
      .await?
      .require(Role::Company)?;

  let fields = CompanyFields {
    name:        required_text(
      "name",
      payload.name.as_deref(),
      160
    )?,
    industry:    optional_text(
      "industry",
      payload.industry.as_deref(),
      120
    )?,
    website:     website(
      optional_text(
        "website",
        payload.website.as_deref(),
        300
      )?
    )?,
    description: optional_text(
      "description",
      payload.description.as_deref(),
      4000
    )?,
    location:    optional_text(
      "location",
      payload.location.as_deref(),
      120
    )?
  };

  let now = now_ms();

  if let Some(pool) = &state.postgres {
    sqlx::query(
      "INSERT INTO companies (user_id, \
       name, industry, website, \
       description, location, \
       created_at_ms, updated_at_ms) \
       VALUES ($1, $2, $3, $4, $5, $6, \
       $7, $7)"
    )
    .bind(user.id)
    .bind(&fields.name)
    .bind(&fields.industry)
    .bind(&fields.website)
    .bind(&fields.description)
    .bind(&fields.location)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
      map_db_error(
        e,
        "company profile already \
         exists"
      )
    })?;
  } else {
    let pool = state.sqlite_pool()?;

    sqlx::query(
      "INSERT INTO companies (user_id, \
       name, industry, website, \
       description, location, \
       created_at_ms, updated_at_ms) \
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, \
       ?7, ?7)"
    )
    .bind(user.id)
    .bind(&fields.name)
    .bind(&fields.industry)
    .bind(&fields.website)
    .bind(&fields.description)
    .bind(&fields.location)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
      map_db_error(
        e,
        "company profile already \
         exists"
      )
    })?;
  }

  let company =
    require_company(&state, user.id)
      .await?;

  tracing::info!(
    user_id = user.id,
    company_id = company.id,
    "company profile created"
  );

  Ok((
    StatusCode::CREATED,
    Json(company)
  ))
}

pub async fn my_company(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<Company>, ServerError>
{
  let user =
    authenticate(&state, &headers)
      .await?
      .require(Role::Company)?;

  Ok(Json(
    require_company(&state, user.id)
      .await?
  ))
}

pub async fn update_company(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<CompanyPayload>
) -> Result<Json<Company>, ServerError>
{
  let user =
    authenticate(&state, &headers)
      .await?
      .require(Role::Company)?;

  let current =
    require_company(&state, user.id)
      .await?;

  let name = match payload
    .name
    .as_deref()
  {
    | Some(name) => {
      required_text(
        "name",
        Some(name),
        160
      )?
    }
    | None => current.name.clone()
  };

  let fields = CompanyFields {
    name,
    industry: patch_text(
      "industry",
      payload.industry.as_deref(),
      current.industry.clone(),
      120
    )?,
    website: website(patch_text(
      "website",
      payload.website.as_deref(),
      current.website.clone(),
      300
    )?)?,
    description: patch_text(
      "description",
      payload.description.as_deref(),
      current.description.clone(),
      4000
    )?,
    location: patch_text(
      "location",
      payload.location.as_deref(),
      current.location.clone(),
      120
    )?
  };

  let now = now_ms();

  if let Some(pool) = &state.postgres {
    sqlx::query(
      "UPDATE companies SET name = $1, \
       industry = $2, website = $3, \
       description = $4, location = \
       $5, updated_at_ms = $6 WHERE id \
       = $7"
    )
    .bind(&fields.name)
    .bind(&fields.industry)
    .bind(&fields.website)
    .bind(&fields.description)
    .bind(&fields.location)
    .bind(now)
    .bind(current.id)
    .execute(pool)
    .await
    .map_err(ServerError::internal)?;
  } else {
    let pool = state.sqlite_pool()?;

    sqlx::query(
      "UPDATE companies SET name = ?1, \
       industry = ?2, website = ?3, \
       description = ?4, location = \
       ?5, updated_at_ms = ?6 WHERE id \
       = ?7"
    )
    .bind(&fields.name)
    .bind(&fields.industry)
    .bind(&fields.website)
    .bind(&fields.description)
    .bind(&fields.location)
    .bind(now)
    .bind(current.id)
    .execute(pool)
    .await
    .map_err(ServerError::internal)?;
  }

  Ok(Json(
    require_company(&state, user.id)
      .await?
  ))
}

pub async fn company_detail(
  State(state): State<AppState>,
  AxumPath(company_id): AxumPath<i64>
) -> Result<Json<Company>, ServerError>
{
  let row = if let Some(pool) =
    &state.postgres
  {
    let sql = format!(
      "SELECT {COMPANY_COLUMNS} FROM \
       companies WHERE id = $1"
    );

    sqlx::query_as::<_, Company>(&sql)
      .bind(company_id)
      .fetch_optional(pool)
      .await
      .map_err(ServerError::internal)?
  } else {
    let pool = state.sqlite_pool()?;

    let sql = format!(
      "SELECT {COMPANY_COLUMNS} FROM \
       companies WHERE id = ?1"
    );

    sqlx::query_as::<_, Company>(&sql)
      .bind(company_id)
      .fetch_optional(pool)
      .await
      .map_err(ServerError::internal)?
  };

  let row = row.ok_or_else(|| {
    ServerError::new(
      StatusCode::NOT_FOUND,
      "company not found"
    )
  })?;

  Ok(Json(row))
}
