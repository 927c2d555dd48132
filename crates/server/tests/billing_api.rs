mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{provider_payment, spawn_app, FakeGateway, TestApp, DEAD_MATCHING_URL, WEBHOOK_TOKEN};
use jobboard_server::payments::{GatewayError, Gateways, Provider};
use serde_json::json;

async fn app_with_mercadopago() -> (TestApp, Arc<FakeGateway>) {
    let gateway = FakeGateway::new(Provider::MercadoPago);
    let app = spawn_app(Gateways::default().with(gateway.clone()), DEAD_MATCHING_URL).await;
    (app, gateway)
}

fn checkout() -> serde_json::Value {
    json!({"card_token": "tok_visa", "payment_method_id": "visa", "installments": 1})
}

#[tokio::test]
async fn plans_are_public() {
    let (app, _) = app_with_mercadopago().await;
    let (status, body) = app.request("GET", "/v1/plans", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let plans = body.as_array().unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["code"], "annual");
    assert_eq!(plans[0]["price_cents"], 99900);
    assert_eq!(plans[0]["active"], true);
}

#[tokio::test]
async fn approved_payment_activates_subscription_once() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("ana@example.com", "candidate").await;
    gateway.reply(provider_payment("mp-1", "approved", Some("accredited")));

    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["message"], "Payment approved. Your annual subscription is now active.");
    assert_eq!(body["payment"]["provider"], "mercadopago");
    assert_eq!(body["payment"]["subscription_id"], body["subscription"]["id"]);
    let starts = body["subscription"]["starts_at_ms"].as_i64().unwrap();
    let ends = body["subscription"]["ends_at_ms"].as_i64().unwrap();
    assert_eq!(ends - starts, 365 * 24 * 60 * 60 * 1000);

    let charge = &gateway.charges()[0];
    assert_eq!(charge.amount_cents, 99900);
    assert_eq!(charge.payer_email, "ana@example.com");
    assert!(!charge.idempotency_key.is_empty());

    let (_, me) = app.request("GET", "/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(me["active"], true);
    assert!(me["ends_at"].as_str().is_some());

    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "subscription already active");
    assert_eq!(gateway.charges().len(), 1);
}

#[tokio::test]
async fn rejected_payment_is_recorded_and_explained() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("bo@example.com", "candidate").await;
    gateway.reply(provider_payment("mp-2", "rejected", Some("cc_rejected_insufficient_amount")));

    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["ok"], false);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["message"], "Your card has insufficient funds.");
    assert!(body["subscription"].is_null());
    assert_eq!(body["payment"]["provider_payment_id"], "mp-2");
    assert_eq!(body["payment"]["status"], "rejected");
    assert_eq!(body["payment"]["status_detail"], "cc_rejected_insufficient_amount");

    let (_, payments) = app.request("GET", "/v1/payments/me", Some(&token), None).await;
    assert_eq!(payments[0]["status"], "rejected");
    let (_, me) = app.request("GET", "/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(me["active"], false);

    // A rejection inside the window does not block a new attempt.
    gateway.reply(provider_payment("mp-3", "approved", Some("accredited")));
    let (status, _) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(gateway.charges().len(), 2);
    assert_eq!(app.count("SELECT COUNT(*) FROM payments").await, 2);
}

#[tokio::test]
async fn provider_rejection_maps_to_402_and_outage_to_502() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("cy@example.com", "candidate").await;

    gateway.fail(GatewayError::Rejected {
        status: 400,
        message: "invalid card token".into(),
    });
    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["message"], "invalid card token");

    gateway.fail(GatewayError::Transport("connection reset".into()));
    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "bad_gateway");
    assert_eq!(app.count("SELECT COUNT(*) FROM payments").await, 0);
}

#[tokio::test]
async fn pending_payment_blocks_a_second_charge() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("di@example.com", "candidate").await;
    gateway.reply(provider_payment("mp-4", "in_process", Some("pending_contingency")));

    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    assert!(body["subscription"].is_null());
    assert_eq!(
        body["message"],
        "We are processing your payment. You will be notified as soon as it is confirmed."
    );

    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "payment pending confirmation");
    assert_eq!(gateway.charges().len(), 1);

    // The provider approves later; retrying reuses the same payment.
    gateway.set_remote(provider_payment("mp-4", "approved", Some("accredited")));
    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["payment"]["provider_payment_id"], "mp-4");
    assert_eq!(gateway.charges().len(), 1);
    assert_eq!(app.count("SELECT COUNT(*) FROM subscriptions").await, 1);
}

#[tokio::test]
async fn checkout_guards() {
    let (app, _) = app_with_mercadopago().await;
    let (company, _) = app.company("hr@acme.test", "Acme").await;
    let (status, _) = app
        .request("POST", "/v1/subscriptions/annual", Some(&company), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = app.register("ed@example.com", "candidate").await;
    let (status, body) = app
        .request(
            "POST",
            "/v1/subscriptions/annual",
            Some(&token),
            Some(json!({"provider": "clip", "card_token": "tok"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = app
        .request(
            "POST",
            "/v1/subscriptions/annual",
            Some(&token),
            Some(json!({"provider": "paypal", "card_token": "tok"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(json!({"card_token": "  "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    sqlx::query("UPDATE plans SET active = 0")
        .execute(&app.pool)
        .await
        .unwrap();
    let (status, _) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_subscriptions_expire() {
    let (app, _) = app_with_mercadopago().await;
    let token = app.register("flo@example.com", "candidate").await;
    sqlx::query(
        "INSERT INTO subscriptions (user_id, plan_id, status, starts_at_ms, ends_at_ms, payment_id, created_at_ms) \
         SELECT u.id, p.id, 'active', 1000, 2000, NULL, 1000 FROM users u, plans p WHERE u.email = 'flo@example.com'",
    )
    .execute(&app.pool)
    .await
    .unwrap();

    let (_, me) = app.request("GET", "/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(me["active"], false);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM subscriptions WHERE status = 'expired'").await,
        1
    );
}

#[tokio::test]
async fn webhook_reconciles_pending_payment_idempotently() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("gus@example.com", "candidate").await;
    gateway.reply(provider_payment("777", "pending", None));
    let (status, _) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let hook = format!("/v1/payments/webhooks/mercadopago?token={WEBHOOK_TOKEN}");
    let event = json!({"type": "payment", "action": "payment.updated", "data": {"id": "777"}});

    for bad in ["wrong", "dev-webhook", "dev-webhook-token-extra", ""] {
        let (status, _) = app
            .request(
                "POST",
                &format!("/v1/payments/webhooks/mercadopago?token={bad}"),
                None,
                Some(event.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "token {bad:?}");
    }

    gateway.set_remote(provider_payment("777", "approved", Some("accredited")));
    for _ in 0..2 {
        let (status, ack) = app.request("POST", &hook, None, Some(event.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["reconciled"], true);
    }
    assert_eq!(app.count("SELECT COUNT(*) FROM subscriptions").await, 1);

    let (_, me) = app.request("GET", "/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(me["active"], true);
}

#[tokio::test]
async fn webhook_ignores_unknown_payments_and_topics() {
    let (app, _) = app_with_mercadopago().await;
    let hook = format!("/v1/payments/webhooks/mercadopago?token={WEBHOOK_TOKEN}");

    let (status, ack) = app
        .request("POST", &hook, None, Some(json!({"type": "payment", "data": {"id": 424242}})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert_eq!(ack["reconciled"], false);

    let (status, ack) = app
        .request("POST", &hook, None, Some(json!({"type": "merchant_order", "data": {"id": 1}})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["reconciled"], false);

    let (status, _) = app
        .request("POST", &format!("{hook}&topic=payment&id=999"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn clip_webhook_reads_payment_id() {
    let clip = FakeGateway::new(Provider::Clip);
    let app = spawn_app(Gateways::default().with(clip.clone()), DEAD_MATCHING_URL).await;
    let token = app.register("hal@example.com", "candidate").await;
    clip.reply(provider_payment("clip-1", "pending", None));

    let (status, _) = app
        .request(
            "POST",
            "/v1/subscriptions/annual",
            Some(&token),
            Some(json!({"provider": "clip", "card_token": "tok_clip"})),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    clip.set_remote(provider_payment("clip-1", "approved", None));
    let (status, ack) = app
        .request(
            "POST",
            &format!("/v1/payments/webhooks/clip?token={WEBHOOK_TOKEN}"),
            None,
            Some(json!({"payment_id": "clip-1", "event": "payment.paid"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["reconciled"], true);

    let (_, me) = app.request("GET", "/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(me["active"], true);
}

#[tokio::test]
async fn refresh_is_owner_only_and_refund_revokes_access() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("ian@example.com", "candidate").await;
    let other = app.register("joy@example.com", "candidate").await;
    gateway.reply(provider_payment("mp-9", "approved", Some("accredited")));
    let (_, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    let payment_id = body["payment"]["id"].as_i64().unwrap();
    let uri = format!("/v1/payments/{payment_id}/refresh");

    let (status, _) = app.request("POST", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.request("POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(app.count("SELECT COUNT(*) FROM subscriptions").await, 1);

    gateway.set_remote(provider_payment("mp-9", "refunded", None));
    let admin = app.login("admin@jobboard.local", "change-me-please").await;
    let (status, body) = app.request("POST", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["payment"]["status"], "refunded");

    let (_, me) = app.request("GET", "/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(me["active"], false);
}

#[tokio::test]
async fn lapsed_subscription_needs_a_fresh_charge() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("kai@example.com", "candidate").await;
    gateway.reply(provider_payment("mp-10", "approved", Some("accredited")));
    let (status, first) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Still inside the idempotency window, but the access it bought is over.
    sqlx::query("UPDATE subscriptions SET ends_at_ms = 1")
        .execute(&app.pool)
        .await
        .unwrap();

    gateway.reply(provider_payment("mp-11", "approved", Some("accredited")));
    let (status, second) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{second}");
    assert_eq!(second["payment"]["provider_payment_id"], "mp-11");
    assert_eq!(second["subscription"]["status"], "active");
    assert_ne!(second["subscription"]["id"], first["subscription"]["id"]);
    assert_eq!(gateway.charges().len(), 2);

    let (_, me) = app.request("GET", "/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(me["active"], true);
}

#[tokio::test]
async fn pending_payment_that_turns_rejected_allows_a_new_charge() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("lou@example.com", "candidate").await;
    gateway.reply(provider_payment("mp-20", "pending", None));
    let (status, _) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    gateway.set_remote(provider_payment("mp-20", "rejected", Some("cc_rejected_high_risk")));
    gateway.reply(provider_payment("mp-21", "approved", Some("accredited")));
    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["payment"]["provider_payment_id"], "mp-21");
    assert_eq!(gateway.charges().len(), 2);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM payments WHERE provider_payment_id = 'mp-20' AND status = 'rejected'")
            .await,
        1
    );
}

#[tokio::test]
async fn payments_outside_the_window_are_ignored() {
    let (app, gateway) = app_with_mercadopago().await;
    let token = app.register("mia@example.com", "candidate").await;
    gateway.reply(provider_payment("mp-30", "pending", None));
    let (status, _) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // The bundled config uses a 600 second window.
    sqlx::query("UPDATE payments SET created_at_ms = created_at_ms - 601000")
        .execute(&app.pool)
        .await
        .unwrap();

    gateway.reply(provider_payment("mp-31", "approved", Some("accredited")));
    let (status, body) = app
        .request("POST", "/v1/subscriptions/annual", Some(&token), Some(checkout()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["payment"]["provider_payment_id"], "mp-31");
    assert_eq!(gateway.charges().len(), 2);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM payments WHERE provider_payment_id = 'mp-30' AND status = 'pending'")
            .await,
        1
    );
}
