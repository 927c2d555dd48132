use axum::Json;
use axum::extract::{Multipart, Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};

use crate::app_state::AppState;
use crate::auth::{authenticate, Role};
use crate::errors::{map_db_error, ServerError};
use crate::models::{CandidatePayload, CandidateProfile, CandidateRow};
use crate::time::now_ms;
use crate::validate::{
    bad_request, non_negative, normalize_skills, optional_text, patch_text, required_text,
};

const CANDIDATE_COLUMNS: &str = "id, user_id, full_name, phone, location, headline, summary, \
     skills, experience_years, cv_filename, cv_uploaded_at_ms, created_at_ms, updated_at_ms";

pub const MAX_CV_BYTES: usize = 5 * 1024 * 1024;

pub(crate) async fn candidate_by_user(
    state: &AppState,
    user_id: i64,
) -> Result<Option<CandidateRow>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE user_id = $1");
        return sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }

    let pool = state.sqlite_pool()?;
    let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE user_id = ?1");
    sqlx::query_as::<_, CandidateRow>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

async fn candidate_by_id(state: &AppState, id: i64) -> Result<Option<CandidateRow>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1");
        return sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }

    let pool = state.sqlite_pool()?;
    let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1");
    sqlx::query_as::<_, CandidateRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

/// The caller's candidate profile, or 404.
pub(crate) async fn require_candidate(
    state: &AppState,
    user_id: i64,
) -> Result<CandidateRow, ServerError> {
    candidate_by_user(state, user_id)
        .await?
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "candidate profile not found"))
}

struct CandidateFields {
    full_name: String,
    phone: Option<String>,
    location: Option<String>,
    headline: Option<String>,
    summary: Option<String>,
    skills_json: String,
    experience_years: Option<i64>,
}

fn skills_json(skills: &[String]) -> Result<String, ServerError> {
    let skills = normalize_skills(skills)?;
    serde_json::to_string(&skills).map_err(ServerError::internal)
}

fn new_fields(payload: &CandidatePayload) -> Result<CandidateFields, ServerError> {
    Ok(CandidateFields {
        full_name: required_text("full_name", payload.full_name.as_deref(), 120)?,
        phone: optional_text("phone", payload.phone.as_deref(), 40)?,
        location: optional_text("location", payload.location.as_deref(), 120)?,
        headline: optional_text("headline", payload.headline.as_deref(), 160)?,
        summary: optional_text("summary", payload.summary.as_deref(), 4000)?,
        skills_json: skills_json(payload.skills.as_deref().unwrap_or_default())?,
        experience_years: non_negative("experience_years", payload.experience_years)?,
    })
}

fn merged_fields(current: CandidateRow, payload: &CandidatePayload) -> Result<CandidateFields, ServerError> {
    let full_name = match payload.full_name.as_deref() {
        Some(name) => required_text("full_name", Some(name), 120)?,
        None => current.full_name,
    };
    let skills_json = match payload.skills.as_deref() {
        Some(skills) => skills_json(skills)?,
        None => current.skills,
    };
    Ok(CandidateFields {
        full_name,
        phone: patch_text("phone", payload.phone.as_deref(), current.phone, 40)?,
        location: patch_text("location", payload.location.as_deref(), current.location, 120)?,
        headline: patch_text("headline", payload.headline.as_deref(), current.headline, 160)?,
        summary: patch_text("summary", payload.summary.as_deref(), current.summary, 4000)?,
        skills_json,
        experience_years: match payload.experience_years {
            Some(v) => non_negative("experience_years", Some(v))?,
            None => current.experience_years,
        },
    })
}

pub async fn create_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CandidatePayload>,
) -> Result<(StatusCode, Json<CandidateProfile>), ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Candidate)?;
    let fields = new_fields(&payload)?;
    let now = now_ms();

    if let Some(pool) = &state.postgres {
        sqlx::query(
            "INSERT INTO candidates (user_id, full_name, phone, location, headline, summary, skills, \
             experience_years, created_at_ms, updated_at_ms) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)",
        )
        .bind(user.id)
        .bind(&fields.full_name)
        .bind(&fields.phone)
        .bind(&fields.location)
        .bind(&fields.headline)
        .bind(&fields.summary)
        .bind(&fields.skills_json)
        .bind(fields.experience_years)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| map_db_error(e, "candidate profile already exists"))?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query(
            "INSERT INTO candidates (user_id, full_name, phone, location, headline, summary, skills, \
             experience_years, created_at_ms, updated_at_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        )
        .bind(user.id)
        .bind(&fields.full_name)
        .bind(&fields.phone)
        .bind(&fields.location)
        .bind(&fields.headline)
        .bind(&fields.summary)
        .bind(&fields.skills_json)
        .bind(fields.experience_years)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| map_db_error(e, "candidate profile already exists"))?;
    }

    let row = require_candidate(&state, user.id).await?;
    tracing::info!(user_id = user.id, candidate_id = row.id, "candidate profile created");
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn my_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CandidateProfile>, ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Candidate)?;
    let row = require_candidate(&state, user.id).await?;
    Ok(Json(row.into()))
}

pub async fn update_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CandidatePayload>,
) -> Result<Json<CandidateProfile>, ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Candidate)?;
    let current = require_candidate(&state, user.id).await?;
    let id = current.id;
    let fields = merged_fields(current, &payload)?;
    let now = now_ms();

    if let Some(pool) = &state.postgres {
        sqlx::query(
            "UPDATE candidates SET full_name = $1, phone = $2, location = $3, headline = $4, \
             summary = $5, skills = $6, experience_years = $7, updated_at_ms = $8 WHERE id = $9",
        )
        .bind(&fields.full_name)
        .bind(&fields.phone)
        .bind(&fields.location)
        .bind(&fields.headline)
        .bind(&fields.summary)
        .bind(&fields.skills_json)
        .bind(fields.experience_years)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query(
            "UPDATE candidates SET full_name = ?1, phone = ?2, location = ?3, headline = ?4, \
             summary = ?5, skills = ?6, experience_years = ?7, updated_at_ms = ?8 WHERE id = ?9",
        )
        .bind(&fields.full_name)
        .bind(&fields.phone)
        .bind(&fields.location)
        .bind(&fields.headline)
        .bind(&fields.summary)
        .bind(&fields.skills_json)
        .bind(fields.experience_years)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    }

    let row = require_candidate(&state, user.id).await?;
    Ok(Json(row.into()))
}

pub async fn delete_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Candidate)?;
    let current = require_candidate(&state, user.id).await?;

    if let Some(pool) = &state.postgres {
        let mut tx = pool.begin().await.map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM matches WHERE candidate_id = $1")
            .bind(current.id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM candidates WHERE id = $1")
            .bind(current.id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        tx.commit().await.map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        let mut tx = pool.begin().await.map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM matches WHERE candidate_id = ?1")
            .bind(current.id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        sqlx::query("DELETE FROM candidates WHERE id = ?1")
            .bind(current.id)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        tx.commit().await.map_err(ServerError::internal)?;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn candidate_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(candidate_id): AxumPath<i64>,
) -> Result<Json<CandidateProfile>, ServerError> {
    let user = authenticate(&state, &headers).await?;
    let row = candidate_by_id(&state, candidate_id)
        .await?
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "candidate not found"))?;

    let allowed = matches!(user.role, Role::Company | Role::Admin) || row.user_id == user.id;
    if !allowed {
        return Err(ServerError::new(StatusCode::FORBIDDEN, "not allowed to view this candidate"));
    }

    Ok(Json(row.into()))
}

fn is_pdf(filename: &str, content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
        || filename.to_ascii_lowercase().ends_with(".pdf")
}

pub async fn upload_cv(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<CandidateProfile>, ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Candidate)?;
    let candidate = require_candidate(&state, user.id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("cv") {
            continue;
        }
        let filename = field.file_name().unwrap_or("cv.pdf").to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("invalid cv upload: {e}")))?;
        upload = Some((filename, content_type, bytes));
        break;
    }

    let (filename, content_type, bytes) = upload.ok_or_else(|| bad_request("cv file required"))?;
    if bytes.is_empty() {
        return Err(bad_request("cv file is empty"));
    }
    if bytes.len() > MAX_CV_BYTES {
        return Err(ServerError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "cv file exceeds 5 MiB",
        ));
    }
    if !is_pdf(&filename, content_type.as_deref()) {
        return Err(bad_request("cv must be a PDF"));
    }

    state
        .matching
        .upload_cv(candidate.id, &filename, "application/pdf", bytes.to_vec())
        .await?;

    let now = now_ms();
    if let Some(pool) = &state.postgres {
        sqlx::query(
            "UPDATE candidates SET cv_filename = $1, cv_uploaded_at_ms = $2, updated_at_ms = $2 WHERE id = $3",
        )
        .bind(&filename)
        .bind(now)
        .bind(candidate.id)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query(
            "UPDATE candidates SET cv_filename = ?1, cv_uploaded_at_ms = ?2, updated_at_ms = ?2 WHERE id = ?3",
        )
        .bind(&filename)
        .bind(now)
        .bind(candidate.id)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?;
    }

    tracing::info!(candidate_id = candidate.id, size = bytes.len(), "cv uploaded");
    let row = require_candidate(&state, user.id).await?;
    Ok(Json(row.into()))
}
