use axum::{
    extract::{Path as AxumPath, State},
    http::HeaderMap,
    Json,
};

use crate::app_state::AppState;
use crate::auth::{authenticate, Role};
use crate::billing::require_active_subscription;
use crate::errors::ServerError;
use crate::handlers::candidates::require_candidate;
use crate::handlers::vacancies::owned_vacancy;
use crate::matching::RemoteMatch;
use crate::models::{MatchView, MatchingHealthResponse, VacancyMatchView};
use crate::time::now_ms;

const MATCH_SELECT: &str = "SELECT m.vacancy_id, v.title, c.name AS company_name, \
     v.status AS vacancy_status, m.percentage, m.updated_at_ms \
     FROM matches m JOIN vacancies v ON v.id = m.vacancy_id JOIN companies c ON c.id = v.company_id";

async fn matches_for_candidate(state: &AppState, candidate_id: i64) -> Result<Vec<MatchView>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!("{MATCH_SELECT} WHERE m.candidate_id = $1 ORDER BY m.percentage DESC, m.vacancy_id");
        return sqlx::query_as::<_, MatchView>(&sql)
            .bind(candidate_id)
            .fetch_all(pool)
            .await
            .map_err(ServerError::internal);
    }

    let pool = state.sqlite_pool()?;
    let sql = format!("{MATCH_SELECT} WHERE m.candidate_id = ?1 ORDER BY m.percentage DESC, m.vacancy_id");
    sqlx::query_as::<_, MatchView>(&sql)
        .bind(candidate_id)
        .fetch_all(pool)
        .await
        .map_err(ServerError::internal)
}

/// Percentages outside 0..=100 are clamped; non-finite ones are dropped.
pub(crate) fn clamp_percentage(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 100.0))
}

async fn store_matches(
    state: &AppState,
    candidate_id: i64,
    remote: &[RemoteMatch],
) -> Result<usize, ServerError> {
    let now = now_ms();
    let mut stored = 0usize;

    if let Some(pool) = &state.postgres {
        let mut tx = pool.begin().await.map_err(ServerError::internal)?;
        for item in remote {
            let Some(percentage) = clamp_percentage(item.percentage) else {
                continue;
            };
            let known = sqlx::query_scalar::<_, i64>("SELECT id FROM vacancies WHERE id = $1")
                .bind(item.vacancy_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(ServerError::internal)?;
            if known.is_none() {
                tracing::debug!(candidate_id, vacancy_id = item.vacancy_id, "skipping unknown vacancy");
                continue;
            }
            sqlx::query(
                "INSERT INTO matches (candidate_id, vacancy_id, percentage, updated_at_ms) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (candidate_id, vacancy_id) \
                 DO UPDATE SET percentage = EXCLUDED.percentage, updated_at_ms = EXCLUDED.updated_at_ms",
            )
            .bind(candidate_id)
            .bind(item.vacancy_id)
            .bind(percentage)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
            stored += 1;
        }
        tx.commit().await.map_err(ServerError::internal)?;
        return Ok(stored);
    }

    let pool = state.sqlite_pool()?;
    let mut tx = pool.begin().await.map_err(ServerError::internal)?;
    for item in remote {
        let Some(percentage) = clamp_percentage(item.percentage) else {
            continue;
        };
        let known = sqlx::query_scalar::<_, i64>("SELECT id FROM vacancies WHERE id = ?1")
            .bind(item.vacancy_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ServerError::internal)?;
        if known.is_none() {
            tracing::debug!(candidate_id, vacancy_id = item.vacancy_id, "skipping unknown vacancy");
            continue;
        }
        sqlx::query(
            "INSERT INTO matches (candidate_id, vacancy_id, percentage, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (candidate_id, vacancy_id) \
             DO UPDATE SET percentage = excluded.percentage, updated_at_ms = excluded.updated_at_ms",
        )
        .bind(candidate_id)
        .bind(item.vacancy_id)
        .bind(percentage)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(ServerError::internal)?;
        stored += 1;
    }
    tx.commit().await.map_err(ServerError::internal)?;
    Ok(stored)
}

pub async fn list_my_matches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MatchView>>, ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Candidate)?;
    let candidate = require_candidate(&state, user.id).await?;
    require_active_subscription(&state, user.id).await?;

    Ok(Json(matches_for_candidate(&state, candidate.id).await?))
}

pub async fn refresh_my_matches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MatchView>>, ServerError> {
    let user = authenticate(&state, &headers).await?.require(Role::Candidate)?;
    let candidate = require_candidate(&state, user.id).await?;
    require_active_subscription(&state, user.id).await?;

    let remote = state.matching.candidate_matches(candidate.id).await.map_err(|e| {
        tracing::warn!(candidate_id = candidate.id, error = %e, "matching service failed");
        ServerError::from(e)
    })?;
    let stored = store_matches(&state, candidate.id, &remote).await?;
    tracing::info!(
        candidate_id = candidate.id,
        received = remote.len(),
        stored,
        "matches refreshed"
    );

    Ok(Json(matches_for_candidate(&state, candidate.id).await?))
}

pub async fn list_vacancy_matches(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(vacancy_id): AxumPath<i64>,
) -> Result<Json<Vec<VacancyMatchView>>, ServerError> {
    let user = authenticate(&state, &headers).await?;
    let vacancy = owned_vacancy(&state, user, vacancy_id).await?;

    if let Some(pool) = &state.postgres {
        let rows = sqlx::query_as::<_, VacancyMatchView>(
            "SELECT m.candidate_id, c.full_name, m.percentage, m.updated_at_ms \
             FROM matches m JOIN candidates c ON c.id = m.candidate_id \
             WHERE m.vacancy_id = $1 ORDER BY m.percentage DESC, m.candidate_id",
        )
        .bind(vacancy.id)
        .fetch_all(pool)
        .await
        .map_err(ServerError::internal)?;
        return Ok(Json(rows));
    }

    let pool = state.sqlite_pool()?;
    let rows = sqlx::query_as::<_, VacancyMatchView>(
        "SELECT m.candidate_id, c.full_name, m.percentage, m.updated_at_ms \
         FROM matches m JOIN candidates c ON c.id = m.candidate_id \
         WHERE m.vacancy_id = ?1 ORDER BY m.percentage DESC, m.candidate_id",
    )
    .bind(vacancy.id)
    .fetch_all(pool)
    .await
    .map_err(ServerError::internal)?;
    Ok(Json(rows))
}

pub async fn matching_health(State(state): State<AppState>) -> Json<MatchingHealthResponse> {
    let available = match state.matching.health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "matching service unavailable");
            false
        }
    };
    Json(MatchingHealthResponse { available })
}
