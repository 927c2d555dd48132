use axum::{extract::State, Json};

use crate::app_state::AppState;
use crate::billing;
use crate::errors::ServerError;
use crate::models::Plan;

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<Plan>>, ServerError> {
    Ok(Json(billing::active_plans(&state).await?))
}
