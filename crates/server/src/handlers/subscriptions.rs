use axum::Json;
use axum::extract::State;
use axum::http::{
  HeaderMap,
  StatusCode
};

use crate::app_state::AppState;
use crate::auth::authenticate;
use crate::billing;
use crate::errors::ServerError;
use crate::models::{
  AnnualSubscriptionRequest,
  CheckoutResponse,
  SubscriptionStatusResponse
};
use crate::time::epoch_ms_to_iso;

pub async fn my_subscription(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<
  Json<SubscriptionStatusResponse>,
  ServerError
> {
  let user =
    authenticate(&state, &headers)
      .await?;

  let subscription =
    billing::active_subscription(
      &state, user.id
    )
    .await?;

  let ends_at = subscription
    .as_ref()
    .map(|s| {
      epoch_ms_to_iso(s.ends_at_ms)
    });

  Ok(Json(SubscriptionStatusResponse {
    active: subscription.is_some(),
    subscription,
    ends_at
  }))
}

pub async fn create_annual_subscription(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<
    AnnualSubscriptionRequest
  >
) -> Result<
  (StatusCode, Json<CheckoutResponse>),
  ServerError
> {
  let user =
    authenticate(&state, &headers)
      .await?;

  let (status, body) =
    billing::create_annual_subscription(
      &state, user, payload
    )
    .await?;

  Ok((status, Json(body)))
}
