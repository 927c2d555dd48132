//! Annual subscription checkout and payment reconciliation.
//!
//! A subscription row is only ever created from an approved payment row, and a
//! payment links to at most one subscription. Activation checks
//! `payments.subscription_id IS NULL` inside a transaction, so replays of the
//! same approval (retries, webhooks, manual refreshes) never grant twice.
use axum::http::StatusCode;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{AuthUser, Role};
use crate::errors::{is_unique_violation, ServerError};
use crate::models::{AnnualSubscriptionRequest, CheckoutResponse, PaymentRow, Plan, SubscriptionRow};
use crate::payments::{
    status_message, ChargeRequest, PaymentOutcome, PaymentStatus, Provider, ProviderPayment,
};
use crate::time::{add_days_ms, now_ms};
use crate::validate::bad_request;

pub const ANNUAL_PLAN_CODE: &str = "annual";

const PLAN_COLUMNS: &str = "id, code, name, price_cents, currency, duration_days, active";
const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, plan_id, status, starts_at_ms, ends_at_ms, payment_id, created_at_ms";
const PAYMENT_COLUMNS: &str = "id, user_id, plan_id, provider, provider_payment_id, amount_cents, \
     currency, status, status_detail, subscription_id, created_at_ms, updated_at_ms";

pub async fn plan_by_code(state: &AppState, code: &str) -> Result<Option<Plan>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE code = $1");
        return sqlx::query_as::<_, Plan>(&sql)
            .bind(code)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }
    let pool = state.sqlite_pool()?;
    let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE code = ?1");
    sqlx::query_as::<_, Plan>(&sql)
        .bind(code)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

async fn plan_by_id(state: &AppState, id: i64) -> Result<Plan, ServerError> {
    let row = if let Some(pool) = &state.postgres {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1");
        sqlx::query_as::<_, Plan>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal)?
    } else {
        let pool = state.sqlite_pool()?;
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1");
        sqlx::query_as::<_, Plan>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal)?
    };
    row.ok_or_else(|| ServerError::internal(format!("plan {id} missing")))
}

pub async fn active_plans(state: &AppState) -> Result<Vec<Plan>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE active = TRUE ORDER BY price_cents, id");
        return sqlx::query_as::<_, Plan>(&sql)
            .fetch_all(pool)
            .await
            .map_err(ServerError::internal);
    }
    let pool = state.sqlite_pool()?;
    let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE active = 1 ORDER BY price_cents, id");
    sqlx::query_as::<_, Plan>(&sql)
        .fetch_all(pool)
        .await
        .map_err(ServerError::internal)
}

/// Flips `active` subscriptions whose window has passed to `expired`.
async fn expire_stale(state: &AppState, user_id: i64, now: i64) -> Result<(), ServerError> {
    let result = if let Some(pool) = &state.postgres {
        sqlx::query(
            "UPDATE subscriptions SET status = 'expired' WHERE user_id = $1 AND status = 'active' AND ends_at_ms <= $2",
        )
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?
        .rows_affected()
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query(
            "UPDATE subscriptions SET status = 'expired' WHERE user_id = ?1 AND status = 'active' AND ends_at_ms <= ?2",
        )
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(ServerError::internal)?
        .rows_affected()
    };
    if result > 0 {
        info!(user_id, expired = result, "subscriptions expired");
    }
    Ok(())
}

pub async fn active_subscription(
    state: &AppState,
    user_id: i64,
) -> Result<Option<SubscriptionRow>, ServerError> {
    let now = now_ms();
    expire_stale(state, user_id, now).await?;

    if let Some(pool) = &state.postgres {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1 AND status = 'active' \
             AND starts_at_ms <= $2 AND ends_at_ms > $2 ORDER BY ends_at_ms DESC LIMIT 1"
        );
        return sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(user_id)
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }
    let pool = state.sqlite_pool()?;
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1 AND status = 'active' \
         AND starts_at_ms <= ?2 AND ends_at_ms > ?2 ORDER BY ends_at_ms DESC LIMIT 1"
    );
    sqlx::query_as::<_, SubscriptionRow>(&sql)
        .bind(user_id)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

/// Gate for paid features; 402 without an active subscription.
pub async fn require_active_subscription(
    state: &AppState,
    user_id: i64,
) -> Result<SubscriptionRow, ServerError> {
    active_subscription(state, user_id).await?.ok_or_else(|| {
        ServerError::new(StatusCode::PAYMENT_REQUIRED, "subscription required")
    })
}

async fn subscription_by_id(state: &AppState, id: i64) -> Result<SubscriptionRow, ServerError> {
    let row = if let Some(pool) = &state.postgres {
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1");
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal)?
    } else {
        let pool = state.sqlite_pool()?;
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1");
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal)?
    };
    row.ok_or_else(|| ServerError::internal(format!("subscription {id} missing")))
}

pub async fn payment_by_id(state: &AppState, id: i64) -> Result<Option<PaymentRow>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        return sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }
    let pool = state.sqlite_pool()?;
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1");
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

pub async fn payment_by_reference(
    state: &AppState,
    provider: Provider,
    provider_payment_id: &str,
) -> Result<Option<PaymentRow>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider = $1 AND provider_payment_id = $2"
        );
        return sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(provider.as_str())
            .bind(provider_payment_id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }
    let pool = state.sqlite_pool()?;
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider = ?1 AND provider_payment_id = ?2"
    );
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(provider.as_str())
        .bind(provider_payment_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

pub async fn payments_for_user(state: &AppState, user_id: i64) -> Result<Vec<PaymentRow>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at_ms DESC, id DESC"
        );
        return sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(ServerError::internal);
    }
    let pool = state.sqlite_pool()?;
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = ?1 ORDER BY created_at_ms DESC, id DESC"
    );
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(ServerError::internal)
}

async fn recent_payment(
    state: &AppState,
    user_id: i64,
    plan_id: i64,
    since_ms: i64,
) -> Result<Option<PaymentRow>, ServerError> {
    if let Some(pool) = &state.postgres {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 AND plan_id = $2 \
             AND created_at_ms >= $3 ORDER BY created_at_ms DESC, id DESC LIMIT 1"
        );
        return sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(user_id)
            .bind(plan_id)
            .bind(since_ms)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal);
    }
    let pool = state.sqlite_pool()?;
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = ?1 AND plan_id = ?2 \
         AND created_at_ms >= ?3 ORDER BY created_at_ms DESC, id DESC LIMIT 1"
    );
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(user_id)
        .bind(plan_id)
        .bind(since_ms)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::internal)
}

async fn insert_payment(
    state: &AppState,
    user_id: i64,
    plan: &Plan,
    provider: Provider,
    remote: &ProviderPayment,
) -> Result<PaymentRow, ServerError> {
    let now = now_ms();
    let amount = remote.amount_cents.unwrap_or(plan.price_cents);
    let currency = remote.currency.clone().unwrap_or_else(|| plan.currency.clone());

    let inserted = if let Some(pool) = &state.postgres {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO payments (user_id, plan_id, provider, provider_payment_id, amount_cents, currency, \
             status, status_detail, created_at_ms, updated_at_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) RETURNING id",
        )
        .bind(user_id)
        .bind(plan.id)
        .bind(provider.as_str())
        .bind(&remote.id)
        .bind(amount)
        .bind(&currency)
        .bind(remote.status.as_str())
        .bind(&remote.status_detail)
        .bind(now)
        .fetch_one(pool)
        .await
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO payments (user_id, plan_id, provider, provider_payment_id, amount_cents, currency, \
             status, status_detail, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) RETURNING id",
        )
        .bind(user_id)
        .bind(plan.id)
        .bind(provider.as_str())
        .bind(&remote.id)
        .bind(amount)
        .bind(&currency)
        .bind(remote.status.as_str())
        .bind(&remote.status_detail)
        .bind(now)
        .fetch_one(pool)
        .await
    };

    let id = match inserted {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            // The provider handed back a reference we already recorded.
            warn!(provider = provider.as_str(), reference = %remote.id, "payment reference already recorded");
            return payment_by_reference(state, provider, &remote.id)
                .await?
                .ok_or_else(|| ServerError::new(StatusCode::CONFLICT, "payment already recorded"));
        }
        Err(e) => return Err(ServerError::internal(e)),
    };

    payment_by_id(state, id)
        .await?
        .ok_or_else(|| ServerError::internal("payment vanished after insert"))
}

async fn update_payment_status(
    state: &AppState,
    payment_id: i64,
    remote: &ProviderPayment,
) -> Result<PaymentRow, ServerError> {
    let now = now_ms();
    if let Some(pool) = &state.postgres {
        sqlx::query("UPDATE payments SET status = $1, status_detail = $2, updated_at_ms = $3 WHERE id = $4")
            .bind(remote.status.as_str())
            .bind(&remote.status_detail)
            .bind(now)
            .bind(payment_id)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query("UPDATE payments SET status = ?1, status_detail = ?2, updated_at_ms = ?3 WHERE id = ?4")
            .bind(remote.status.as_str())
            .bind(&remote.status_detail)
            .bind(now)
            .bind(payment_id)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    }
    payment_by_id(state, payment_id)
        .await?
        .ok_or_else(|| ServerError::internal(format!("payment {payment_id} missing")))
}

/// Creates the subscription an approved payment pays for, or returns the one
/// it already activated.
pub async fn activate_from_payment(
    state: &AppState,
    payment: &PaymentRow,
) -> Result<SubscriptionRow, ServerError> {
    let plan = plan_by_id(state, payment.plan_id).await?;
    let now = now_ms();
    let ends_at = add_days_ms(now, plan.duration_days);

    let subscription_id = if let Some(pool) = &state.postgres {
        let mut tx = pool.begin().await.map_err(ServerError::internal)?;
        let linked = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT subscription_id FROM payments WHERE id = $1 FOR UPDATE",
        )
        .bind(payment.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(ServerError::internal)?;

        match linked {
            Some(id) => id,
            None => {
                let id = sqlx::query_scalar::<_, i64>(
                    "INSERT INTO subscriptions (user_id, plan_id, status, starts_at_ms, ends_at_ms, payment_id, created_at_ms) \
                     VALUES ($1, $2, 'active', $3, $4, $5, $3) RETURNING id",
                )
                .bind(payment.user_id)
                .bind(plan.id)
                .bind(now)
                .bind(ends_at)
                .bind(payment.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(ServerError::internal)?;
                sqlx::query("UPDATE payments SET subscription_id = $1, updated_at_ms = $2 WHERE id = $3 AND subscription_id IS NULL")
                    .bind(id)
                    .bind(now)
                    .bind(payment.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(ServerError::internal)?;
                tx.commit().await.map_err(ServerError::internal)?;
                info!(user_id = payment.user_id, payment_id = payment.id, subscription_id = id, "subscription activated");
                id
            }
        }
    } else {
        let pool = state.sqlite_pool()?;
        let mut tx = pool.begin().await.map_err(ServerError::internal)?;
        let linked = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT subscription_id FROM payments WHERE id = ?1",
        )
        .bind(payment.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(ServerError::internal)?;

        match linked {
            Some(id) => id,
            None => {
                let id = sqlx::query_scalar::<_, i64>(
                    "INSERT INTO subscriptions (user_id, plan_id, status, starts_at_ms, ends_at_ms, payment_id, created_at_ms) \
                     VALUES (?1, ?2, 'active', ?3, ?4, ?5, ?3) RETURNING id",
                )
                .bind(payment.user_id)
                .bind(plan.id)
                .bind(now)
                .bind(ends_at)
                .bind(payment.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(ServerError::internal)?;
                let updated = sqlx::query(
                    "UPDATE payments SET subscription_id = ?1, updated_at_ms = ?2 WHERE id = ?3 AND subscription_id IS NULL",
                )
                .bind(id)
                .bind(now)
                .bind(payment.id)
                .execute(&mut *tx)
                .await
                .map_err(ServerError::internal)?;
                if updated.rows_affected() == 0 {
                    return Err(ServerError::new(
                        StatusCode::CONFLICT,
                        "payment was activated concurrently",
                    ));
                }
                tx.commit().await.map_err(ServerError::internal)?;
                info!(user_id = payment.user_id, payment_id = payment.id, subscription_id = id, "subscription activated");
                id
            }
        }
    };

    subscription_by_id(state, subscription_id).await
}

async fn cancel_subscription(state: &AppState, subscription_id: i64) -> Result<(), ServerError> {
    if let Some(pool) = &state.postgres {
        sqlx::query("UPDATE subscriptions SET status = 'cancelled' WHERE id = $1 AND status = 'active'")
            .bind(subscription_id)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query("UPDATE subscriptions SET status = 'cancelled' WHERE id = ?1 AND status = 'active'")
            .bind(subscription_id)
            .execute(pool)
            .await
            .map_err(ServerError::internal)?;
    }
    Ok(())
}

/// Pulls the provider's current view of `payment` and applies it: approval
/// activates the subscription, a refund or chargeback revokes it.
pub async fn reconcile_payment(
    state: &AppState,
    payment: PaymentRow,
) -> Result<(PaymentRow, Option<SubscriptionRow>), ServerError> {
    let provider = Provider::parse(&payment.provider).ok_or_else(|| {
        ServerError::internal(format!("payment {} has unknown provider {}", payment.id, payment.provider))
    })?;
    let gateway = state.gateways.get(provider)?;
    let remote = gateway.fetch_payment(&payment.provider_payment_id).await?;

    let previous = PaymentStatus::parse(&payment.status);
    let updated = update_payment_status(state, payment.id, &remote).await?;
    if previous != remote.status {
        info!(
            payment_id = payment.id,
            from = previous.as_str(),
            to = remote.status.as_str(),
            "payment status changed"
        );
    }

    match remote.status.outcome() {
        PaymentOutcome::Approved => {
            let subscription = activate_from_payment(state, &updated).await?;
            let updated = payment_by_id(state, updated.id).await?.unwrap_or(updated);
            Ok((updated, Some(subscription)))
        }
        PaymentOutcome::Rejected => {
            if matches!(remote.status, PaymentStatus::Refunded | PaymentStatus::ChargedBack) {
                if let Some(subscription_id) = updated.subscription_id {
                    cancel_subscription(state, subscription_id).await?;
                    warn!(payment_id = updated.id, subscription_id, "subscription revoked after refund");
                }
            }
            Ok((updated, None))
        }
        PaymentOutcome::Pending => Ok((updated, None)),
    }
}

async fn user_email(state: &AppState, user_id: i64) -> Result<String, ServerError> {
    let email = if let Some(pool) = &state.postgres {
        sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal)?
    } else {
        let pool = state.sqlite_pool()?;
        sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::internal)?
    };
    email.ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "user not found"))
}

fn approved_response(payment: PaymentRow, subscription: SubscriptionRow) -> (StatusCode, CheckoutResponse) {
    let status = PaymentStatus::parse(&payment.status);
    (
        StatusCode::CREATED,
        CheckoutResponse {
            ok: true,
            status: PaymentOutcome::Approved.as_str().to_string(),
            message: status_message(status, payment.status_detail.as_deref()).to_string(),
            subscription: Some(subscription),
            payment: Some(payment),
        },
    )
}

pub async fn create_annual_subscription(
    state: &AppState,
    user: AuthUser,
    request: AnnualSubscriptionRequest,
) -> Result<(StatusCode, CheckoutResponse), ServerError> {
    let user = user.require(Role::Candidate)?;
    let provider = match request.provider.as_deref().map(str::trim) {
        None | Some("") => Provider::MercadoPago,
        Some(raw) => Provider::parse(raw)
            .ok_or_else(|| bad_request(format!("unknown payment provider: {raw}")))?,
    };
    let card_token = request.card_token.trim();
    if card_token.is_empty() {
        return Err(bad_request("card_token required"));
    }

    let plan = plan_by_code(state, ANNUAL_PLAN_CODE)
        .await?
        .filter(|plan| plan.active)
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, "annual plan not available"))?;

    if active_subscription(state, user.id).await?.is_some() {
        return Err(ServerError::new(StatusCode::CONFLICT, "subscription already active"));
    }

    let now = now_ms();
    let window_start = now - state.billing.idempotency_window_seconds.max(0) * 1000;
    if let Some(previous) = recent_payment(state, user.id, plan.id, window_start).await? {
        match PaymentStatus::parse(&previous.status).outcome() {
            // The linked subscription is no longer active; that payment is spent.
            PaymentOutcome::Approved if previous.subscription_id.is_some() => {
                info!(user_id = user.id, payment_id = previous.id, "approved payment already used, charging again");
            }
            PaymentOutcome::Approved => {
                info!(user_id = user.id, payment_id = previous.id, "reusing approved payment");
                let subscription = activate_from_payment(state, &previous).await?;
                let previous = payment_by_id(state, previous.id).await?.unwrap_or(previous);
                return Ok(approved_response(previous, subscription));
            }
            PaymentOutcome::Pending => {
                let (payment, subscription) = reconcile_payment(state, previous).await?;
                match (PaymentStatus::parse(&payment.status).outcome(), subscription) {
                    (PaymentOutcome::Approved, Some(subscription)) => {
                        return Ok(approved_response(payment, subscription));
                    }
                    (PaymentOutcome::Rejected, _) => {
                        info!(user_id = user.id, payment_id = payment.id, "previous payment rejected, charging again");
                    }
                    _ => {
                        return Err(ServerError::new(
                            StatusCode::CONFLICT,
                            "payment pending confirmation",
                        ));
                    }
                }
            }
            PaymentOutcome::Rejected => {}
        }
    }

    let gateway = state.gateways.get(provider)?;
    let payer_email = match request.payer_email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => user_email(state, user.id).await?,
    };
    let charge = ChargeRequest {
        amount_cents: plan.price_cents,
        currency: plan.currency.clone(),
        description: plan.name.clone(),
        card_token: card_token.to_string(),
        payment_method_id: request
            .payment_method_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        installments: request.installments.unwrap_or(1).max(1),
        payer_email,
        external_reference: format!("user-{}-{}-{}", user.id, plan.code, now),
        idempotency_key: Uuid::new_v4().to_string(),
    };

    let remote = gateway.create_payment(&charge).await.map_err(|e| {
        warn!(user_id = user.id, provider = provider.as_str(), error = %e, "payment creation failed");
        ServerError::from(e)
    })?;

    let payment = insert_payment(state, user.id, &plan, provider, &remote).await?;
    let status = PaymentStatus::parse(&payment.status);
    let message = status_message(status, payment.status_detail.as_deref()).to_string();
    info!(
        user_id = user.id,
        payment_id = payment.id,
        status = status.as_str(),
        "annual subscription checkout"
    );

    match status.outcome() {
        PaymentOutcome::Approved => {
            let subscription = activate_from_payment(state, &payment).await?;
            let payment = payment_by_id(state, payment.id).await?.unwrap_or(payment);
            Ok(approved_response(payment, subscription))
        }
        PaymentOutcome::Pending => Ok((
            StatusCode::ACCEPTED,
            CheckoutResponse {
                ok: true,
                status: PaymentOutcome::Pending.as_str().to_string(),
                message,
                subscription: None,
                payment: Some(payment),
            },
        )),
        PaymentOutcome::Rejected => Ok((
            StatusCode::PAYMENT_REQUIRED,
            CheckoutResponse {
                ok: false,
                status: PaymentOutcome::Rejected.as_str().to_string(),
                message,
                subscription: None,
                payment: Some(payment),
            },
        )),
    }
}
