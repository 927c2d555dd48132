use httpmock::prelude::*;
use jobboard_server::payments::{
    ChargeRequest, ClipGateway, GatewayError, MercadoPagoGateway, PaymentGateway, PaymentStatus,
};
use serde_json::json;

fn charge() -> ChargeRequest {
    ChargeRequest {
        amount_cents: 99900,
        currency: "MXN".to_string(),
        description: "Annual candidate access".to_string(),
        card_token: "tok_123".to_string(),
        payment_method_id: Some("visa".to_string()),
        installments: 1,
        payer_email: "ana@example.com".to_string(),
        external_reference: "user-1-annual-1".to_string(),
        idempotency_key: "idem-1".to_string(),
    }
}

#[tokio::test]
async fn mercadopago_create_sends_expected_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/payments")
                .header("authorization", "Bearer TEST-token")
                .header("x-idempotency-key", "idem-1")
                .json_body(json!({
                    "transaction_amount": 999.0,
                    "token": "tok_123",
                    "description": "Annual candidate access",
                    "installments": 1,
                    "payment_method_id": "visa",
                    "payer": {"email": "ana@example.com"},
                    "external_reference": "user-1-annual-1"
                }));
            then.status(201).json_body(json!({
                "id": 123456789,
                "status": "approved",
                "status_detail": "accredited",
                "transaction_amount": 999.0,
                "currency_id": "MXN"
            }));
        })
        .await;

    let gateway = MercadoPagoGateway::new(&server.base_url(), "TEST-token").unwrap();
    let payment = gateway.create_payment(&charge()).await.unwrap();
    mock.assert_async().await;

    assert_eq!(payment.id, "123456789");
    assert_eq!(payment.status, PaymentStatus::Approved);
    assert_eq!(payment.status_detail.as_deref(), Some("accredited"));
    assert_eq!(payment.amount_cents, Some(99900));
    assert_eq!(payment.currency.as_deref(), Some("MXN"));
}

#[tokio::test]
async fn mercadopago_fetch_reads_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/payments/555");
            then.status(200).json_body(json!({
                "id": 555,
                "status": "in_process",
                "status_detail": "pending_contingency"
            }));
        })
        .await;

    let gateway = MercadoPagoGateway::new(&server.base_url(), "TEST-token").unwrap();
    let payment = gateway.fetch_payment("555").await.unwrap();
    assert_eq!(payment.status, PaymentStatus::InProcess);
    assert_eq!(payment.amount_cents, None);
}

#[tokio::test]
async fn mercadopago_4xx_is_a_rejection_with_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/payments");
            then.status(400)
                .json_body(json!({"message": "invalid card token", "error": "bad_request"}));
        })
        .await;

    let gateway = MercadoPagoGateway::new(&server.base_url(), "TEST-token").unwrap();
    let err = gateway.create_payment(&charge()).await.unwrap_err();
    match err {
        GatewayError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid card token");
        }
        other => panic!("expected rejection, got {other}"),
    }
}

#[tokio::test]
async fn mercadopago_5xx_is_upstream() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/payments");
            then.status(502).body("bad gateway");
        })
        .await;

    let gateway = MercadoPagoGateway::new(&server.base_url(), "TEST-token").unwrap();
    let err = gateway.create_payment(&charge()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Upstream { status: 502, .. }), "{err}");
}

#[tokio::test]
async fn clip_create_uses_basic_auth_and_object_detail() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            // base64("key:secret")
            when.method(POST)
                .path("/payments")
                .header("authorization", "Basic a2V5OnNlY3JldA==")
                .header("idempotency-key", "idem-1")
                .json_body(json!({
                    "amount": 999.0,
                    "currency": "MXN",
                    "description": "Annual candidate access",
                    "external_reference": "user-1-annual-1",
                    "payment_method": {"token": "tok_123"},
                    "customer": {"email": "ana@example.com"}
                }));
            then.status(200).json_body(json!({
                "id": "clip-abc",
                "status": "rejected",
                "status_detail": {"code": "insufficient_funds", "message": "Insufficient funds"},
                "amount": 999.0,
                "currency": "MXN"
            }));
        })
        .await;

    let gateway = ClipGateway::new(&server.base_url(), "key", "secret").unwrap();
    let payment = gateway.create_payment(&charge()).await.unwrap();
    mock.assert_async().await;

    assert_eq!(payment.id, "clip-abc");
    assert_eq!(payment.status, PaymentStatus::Rejected);
    assert_eq!(payment.status_detail.as_deref(), Some("insufficient_funds"));
}

#[tokio::test]
async fn clip_fetch_accepts_string_detail() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/payments/clip-xyz");
            then.status(200).json_body(json!({
                "payment_id": "clip-xyz",
                "status": "approved",
                "status_detail": "accredited"
            }));
        })
        .await;

    let gateway = ClipGateway::new(&server.base_url(), "key", "secret").unwrap();
    let payment = gateway.fetch_payment("clip-xyz").await.unwrap();
    assert_eq!(payment.id, "clip-xyz");
    assert_eq!(payment.status, PaymentStatus::Approved);
    assert_eq!(payment.status_detail.as_deref(), Some("accredited"));
}
