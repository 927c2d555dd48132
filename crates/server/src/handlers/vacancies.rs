use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use sqlx::{Postgres, QueryBuilder, Sqlite};

use crate::app_state::AppState;
use crate::auth::{authenticate, AuthUser, Role};
use crate::errors::ServerError;
use crate::handlers::companies::require_company;
use crate::models::{Vacancy, VacancyListQuery, VacancyPayload};
use crate::time::now_ms;
use crate::validate::{self, bad_request, optional_text, patch_text, required_text};

const VACANCY_SELECT: &str = "SELECT v.id, v.company_id, c.name AS company_name, v.title, \
     v.description, v.location, v.modality, v.employment_type, v.salary_min, v.salary_max, \
     v.requirements, v.status, v.created_at_ms, v.updated_at_ms \
     FROM vacancies v JOIN companies c ON c.id = v.company_id";

struct VacancyFields {
    title: String,
    description: String,
    location: Option<String>,
    modality: String,
    employment_type: Option<String>,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    requirements: Option<String>,
}

fn new_fields(payload: &VacancyPayload) -> Result<VacancyFields, ServerError> {
    validate::salary_range(payload.salary_min, payload.salary_max)?;
    Ok(VacancyFields {
        title: required_text("title", payload.title.as_deref(), 160)?,
        description: required_text("description", payload.description.as_deref(), 10_000)?,
        location: optional_text("location", payload.location.as_deref(), 120)?,
        modality: validate::modality(payload.modality.as_deref())?,
        employment_type: optional_text("employment_type", payload.employment_type.as_deref(), 60)?,
        salary_min: payload.salary_min,
        salary_max: payload.salary_max,
        requirements: optional_text("requirements", payload.requirements.as_deref(), 4000)?,
    })
}

fn merged_fields(current: Vacancy, payload: &VacancyPayload) -> Result<VacancyFields, ServerError> {
    let salary_min = payload.salary_min.or(current.salary_min);
    let salary_max = payload.salary_max.or(current.salary_max);
    validate::salary_range(salary_min, salary_max)?;

    Ok(VacancyFields {
        title: match payload.title.as_deref() {
            Some(title) => required_text("title", Some(title), 160)?,
            None => current.title,
        },
        description: match payload.description.as_deref() {
            Some(description) => required_text("description", Some(description), 10_000)?,
            None => current.description,
        },
        location: patch_text("location", payload.location.as_deref(), current.location, 120)?,
        modality: match payload.modality.as_deref() {
            Some(modality) => validate::modality(Some(modality))?,
            None => current.modality,
        },
        employment_type: patch_text(
            "employment_type",
            payload.employment_type.as_deref(),
            current.employment_type,
            60,
        )?,
        salary_min,
        salary_max,
        requirements: patch_text(
            "requirements",
            payload.requirements.as_deref(),
            current.requirements,
            4000,
        )?,
    })
}

pub(crate) async fn vacancy_by_id(state: &AppState, id: i64) -> Result<Option<Vacancy>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!("{VACANCY_SELECT} WHERE v.id = $1");
        return sqlx::query_as::<_, Vacancy>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }

    let pool = state.sqlite_pool()?;
    let sql = format!("{VACANCY_SELECT} WHERE v.id = ?1");
    sqlx::query_as::<_, Vacancy>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

/// Loads a vacancy and checks that `user`'s company owns it.
pub(crate) async fn owned_vacancy(
    state: &AppState,
    user: AuthUser,
    id: i64,
) -> Result<Vacancy, ServerError> {
    let user = user.require(Role::Company)?;
    let vacancy = vacancy_by_id(state, id)
        .await?
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "vacancy not found"))?;
    let company = require_company(state, user.id).await?;
    if company.id != vacancy.company_id {
        return Err(ServerError::new(
            StatusCode::FORBIDDEN,
            "vacancy belongs to another company",
        ));
    }
    Ok(vacancy)
}

pub async fn create_vacancy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VacancyPayload>,
) -> Result<(StatusCode, Json<Vacancy>), ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Company)?;
    let company = require_company(&state, user.id).await?;
    let fields = new_fields(&payload)?;
    let now = now_ms();

    let id = if let Some(pool) = &state.postgres {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO vacancies (company_id, title, description, location, modality, employment_type, \
             salary_min, salary_max, requirements, status, created_at_ms, updated_at_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'open', $10, $10) RETURNING id",
        )
        .bind(company.id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.location)
        .bind(&fields.modality)
        .bind(&fields.employment_type)
        .bind(fields.salary_min)
        .bind(fields.salary_max)
        .bind(&fields.requirements)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(ServerError::internal)?
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO vacancies (company_id, title, description, location, modality, employment_type, \
             salary_min, salary_max, requirements, status, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'open', ?10, ?10) RETURNING id",
        )
        .bind(company.id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.location)
        .bind(&fields.modality)
        .bind(&fields.employment_type)
        .bind(fields.salary_min)
        .bind(fields.salary_max)
        .bind(&fields.requirements)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(ServerError::internal)?
    };

    tracing::info!(company_id = company.id, vacancy_id = id, "vacancy created");
    let vacancy = vacancy_by_id(&state, id)
        .await?
        .ok_or_else(|| ServerError::internal("vacancy vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(vacancy)))
}

/// Substring pattern for `lower(col) LIKE ? ESCAPE '\'`. Lowercasing happens
/// here because SQLite's `lower` only folds ASCII.
fn contains_pattern(raw: &str) -> String {
    let mut pattern = String::with_capacity(raw.len() + 2);
    pattern.push('%');
    for ch in raw.to_lowercase().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub async fn list_vacancies(
    State(state): State<AppState>,
    Query(query): Query<VacancyListQuery>,
) -> Result<Json<Vec<Vacancy>>, ServerError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100) as i64;
    let offset = query.offset.unwrap_or(0) as i64;
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("open") => Some("open"),
        Some("closed") => Some("closed"),
        Some("all") => None,
        Some(other) => return Err(bad_request(format!("invalid status filter: {other}"))),
    };
    let modality = match query.modality.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(m) => Some(validate::modality(Some(m))?),
    };
    let text = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(contains_pattern);
    let location = query
        .location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(contains_pattern);

    if let Some(pool) = &state.postgres {
        let mut builder = QueryBuilder::<Postgres>::new(VACANCY_SELECT);
        builder.push(" WHERE 1=1");
        if let Some(status) = status {
            builder.push(" AND v.status = ").push_bind(status);
        }
        if let Some(pattern) = &text {
            builder.push(" AND (lower(v.title) LIKE ").push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR lower(v.description) LIKE ").push_bind(pattern.clone());
            builder.push(" ESCAPE '\\')");
        }
        if let Some(pattern) = &location {
            builder.push(" AND lower(v.location) LIKE ").push_bind(pattern.clone());
            builder.push(" ESCAPE '\\'");
        }
        if let Some(modality) = &modality {
            builder.push(" AND v.modality = ").push_bind(modality.clone());
        }
        if let Some(company_id) = query.company_id {
            builder.push(" AND v.company_id = ").push_bind(company_id);
        }
        builder.push(" ORDER BY v.created_at_ms DESC, v.id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build_query_as::<Vacancy>()
            .fetch_all(pool)
            .await
            .map_err(ServerError::internal)?;
        return Ok(Json(rows));
    }

    let pool = state.sqlite_pool()?;
    let mut builder = QueryBuilder::<Sqlite>::new(VACANCY_SELECT);
    builder.push(" WHERE 1=1");
    if let Some(status) = status {
        builder.push(" AND v.status = ").push_bind(status);
    }
    if let Some(pattern) = &text {
        builder.push(" AND (lower(v.title) LIKE ").push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR lower(v.description) LIKE ").push_bind(pattern.clone());
        builder.push(" ESCAPE '\\')");
    }
    if let Some(pattern) = &location {
        builder.push(" AND lower(v.location) LIKE ").push_bind(pattern.clone());
        builder.push(" ESCAPE '\\'");
    }
    if let Some(modality) = &modality {
        builder.push(" AND v.modality = ").push_bind(modality.clone());
    }
    if let Some(company_id) = query.company_id {
        builder.push(" AND v.company_id = ").push_bind(company_id);
    }
    builder.push(" ORDER BY v.created_at_ms DESC, v.id DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let rows = builder
        .build_query_as::<Vacancy>()
        .fetch_all(pool)
        .await
        .map_err(ServerError::internal)?;
    Ok(Json(rows))
}

pub async fn vacancy_detail(
    State(state): State<AppState>,
    AxumPath(vacancy_id): AxumPath<i64>,
) -> Result<Json<Vacancy>, ServerError> {
    let vacancy = vacancy_by_id(&state, vacancy_id)
        .await?
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "vacancy not found"))?;
    Ok(Json(vacancy))
}

pub async fn my_vacancies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Vacancy>>, ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Company)?;
    let company = require_company(&state, user.id).await?;

    if let Some(pool) = &state.postgres {
        let sql = format!("{VACANCY_SELECT} WHERE v.company_id = $1 ORDER BY v.created_at_ms DESC, v.id DESC");
        let rows = sqlx::query_as::<_, Vacancy>(&sql)
            .bind(company.id)
            .fetch_all(pool)
            .await
            .map_err(ServerError::internal)?;
        return Ok(Json(rows));
    }

    let pool = state.sqlite_pool()?;
    let sql = format!("{VACANCY_SELECT} WHERE v.company_id = ?1 ORDER BY v.created_at_ms DESC, v.id DESC");
    let rows = sqlx::query_as::<_, Vacancy>(&sql)
        .bind(company.id)
        .fetch_all(pool)
        .await
        .map_err(ServerError::internal)?;
    Ok(Json(rows))
}

pub async fn update_vacancy(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(vacancy_id): AxumPath<i64>,
    Json(payload): Json<VacancyPayload>,
) -> Result<Json<Vacancy>, ServerError> {
    let user = authenticate(&state, &headers).await?;
    let current = owned_vacancy(&state, user, vacancy_id).await?;
    let fields = merged_fields(current, &payload)?;
    let now = now_ms();

    if let Some(pool) = &state.postgres {
        sqlx::query(
            "UPDATE vacancies SET title = $1, description = $2, location = $3, modality = $4, \
             employment_type = $5, salary_min = $6, salary_max = $7, requirements = $8, \
             updated_at_ms = $9 WHERE id = $10",
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.location)
        .bind(&fields.modality)
        .bind(&fields.employment_type)
        .bind(fields.salary_min)
        .bind(fields.salary_max)
        .bind(&fields.requirements)
        .bind(now)
        .bind(vacancy_id)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query(
            "UPDATE vacancies SET title = ?1, description = ?2, location = ?3, modality = ?4, \
             employment_type = ?5, salary_min = ?6, salary_max = ?7, requirements = ?8, \
             updated_at_ms = ?9 WHERE id = ?10",
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.location)
        .bind(&fields.modality)
        .bind(&fields.employment_type)
        .bind(fields.salary_min)
        .bind(fields.salary_max)
        .bind(&fields.requirements)
        .bind(now)
        .bind(vacancy_id)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    }

    let vacancy = vacancy_by_id(&state, vacancy_id)
        .await?
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "vacancy not found"))?;
    Ok(Json(vacancy))
}

pub async fn close_vacancy(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(vacancy_id): AxumPath<i64>,
) -> Result<Json<Vacancy>, ServerError> {
    let user = authenticate(&state, &headers).await?;
    let mut vacancy = owned_vacancy(&state, user, vacancy_id).await?;
    let now = now_ms();

    if let Some(pool) = &state.postgres {
        sqlx::query("UPDATE vacancies SET status = 'closed', updated_at_ms = $1 WHERE id = $2")
            .bind(now)
            .bind(vacancy_id)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query("UPDATE vacancies SET status = 'closed', updated_at_ms = ?1 WHERE id = ?2")
            .bind(now)
            .bind(vacancy_id)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    }

    vacancy.status = "closed".to_string();
    vacancy.updated_at_ms = now;
    Ok(Json(vacancy))
}

pub async fn delete_vacancy(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(vacancy_id): AxumPath<i64>,
) -> Result<StatusCode, ServerError> {
    let user = authenticate(&state, &headers).await?;
    owned_vacancy(&state, user, vacancy_id).await?;

    if let Some(pool) = &state.postgres {
        let mut tx = pool.begin().await.map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM matches WHERE vacancy_id = $1")
            .bind(vacancy_id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM vacancies WHERE id = $1")
            .bind(vacancy_id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        tx.commit().await.map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        let mut tx = pool.begin().await.map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM matches WHERE vacancy_id = ?1")
            .bind(vacancy_id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM vacancies WHERE id = ?1")
            .bind(vacancy_id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        tx.commit().await.map_err(ServerError::internal)?;
    }

    tracing::info!(vacancy_id, "vacancy deleted");
    Ok(StatusCode::NO_CONTENT)
}
