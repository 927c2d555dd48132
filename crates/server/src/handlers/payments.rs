use axum::{
    body::Bytes,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::Value;

use crate::app_state::AppState;
use crate::auth::{authenticate, secrets_match};
use crate::billing;
use crate::errors::ServerError;
use crate::models::{CheckoutResponse, PaymentRow, WebhookAck, WebhookQuery};
use crate::payments::{status_message, PaymentStatus, Provider};

pub async fn list_my_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PaymentRow>>, ServerError> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(billing::payments_for_user(&state, user.id).await?))
}

pub async fn refresh_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(payment_id): AxumPath<i64>,
) -> Result<Json<CheckoutResponse>, ServerError> {
    let user = authenticate(&state, &headers).await?;
    let payment = billing::payment_by_id(&state, payment_id)
        .await?
        .filter(|p| p.user_id == user.id || user.is_admin())
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "payment not found"))?;

    let (payment, subscription) = billing::reconcile_payment(&state, payment).await?;
    let status = PaymentStatus::parse(&payment.status);
    Ok(Json(CheckoutResponse {
        ok: true,
        status: status.outcome().as_str().to_string(),
        message: status_message(status, payment.status_detail.as_deref()).to_string(),
        subscription,
        payment: Some(payment),
    }))
}

fn check_webhook_token(state: &AppState, query: &WebhookQuery) -> Result<(), ServerError> {
    let expected = state.billing.webhook_token.as_str();
    match query.token.as_deref() {
        Some(token) if !expected.is_empty() && secrets_match(token, expected) => Ok(()),
        _ => Err(ServerError::new(StatusCode::UNAUTHORIZED, "invalid webhook token")),
    }
}

/// Ids arrive as JSON strings or numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Payment reference from a Mercado Pago notification, or `None` for other topics.
fn mercadopago_reference(query: &WebhookQuery, body: &Value) -> Option<String> {
    let topic = body
        .get("type")
        .and_then(Value::as_str)
        .or(query.kind.as_deref())
        .or(query.topic.as_deref())
        .unwrap_or("payment");
    if topic != "payment" {
        return None;
    }

    body.get("data")
        .and_then(|data| data.get("id"))
        .and_then(id_string)
        .or_else(|| query.data_id.clone())
        .or_else(|| query.id.clone())
        .filter(|id| !id.trim().is_empty())
}

fn clip_reference(query: &WebhookQuery, body: &Value) -> Option<String> {
    body.get("payment_id")
        .or_else(|| body.get("id"))
        .and_then(id_string)
        .or_else(|| query.id.clone())
        .filter(|id| !id.trim().is_empty())
}

async fn handle_webhook(
    state: &AppState,
    provider: Provider,
    reference: Option<String>,
) -> Result<Json<WebhookAck>, ServerError> {
    let Some(reference) = reference else {
        tracing::debug!(provider = provider.as_str(), "webhook ignored");
        return Ok(Json(WebhookAck { received: true, reconciled: false }));
    };

    let Some(payment) = billing::payment_by_reference(state, provider, &reference).await? else {
        tracing::info!(provider = provider.as_str(), reference = %reference, "webhook for unknown payment");
        return Ok(Json(WebhookAck { received: true, reconciled: false }));
    };

    let (payment, _) = billing::reconcile_payment(state, payment).await?;
    tracing::info!(
        provider = provider.as_str(),
        payment_id = payment.id,
        status = %payment.status,
        "webhook reconciled payment"
    );
    Ok(Json(WebhookAck { received: true, reconciled: true }))
}

fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServerError> {
    check_webhook_token(&state, &query)?;
    let reference = mercadopago_reference(&query, &parse_body(&body));
    handle_webhook(&state, Provider::MercadoPago, reference).await
}

pub async fn clip_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServerError> {
    check_webhook_token(&state, &query)?;
    let reference = clip_reference(&query, &parse_body(&body));
    handle_webhook(&state, Provider::Clip, reference).await
}
