#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jobboard_server::app_state::AppState;
use jobboard_server::config::ServerConfig;
use jobboard_server::matching::{MatchingClient, RetryPolicy};
use jobboard_server::payments::{
    ChargeRequest, GatewayError, Gateways, PaymentGateway, PaymentStatus, Provider,
    ProviderPayment,
};
use jobboard_server::{db, handlers, schema};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;

pub const SCHEMA_JSON: &str = include_str!("../../res/schemas/server.schema.json");
pub const CONFIG_TOML: &str = include_str!("../../res/config.toml");
pub const SQLITE_SCHEMA: &str = include_str!("../../res/sql/sqlite/schema.sql");
pub const WEBHOOK_TOKEN: &str = "dev-webhook-token";
pub const PASSWORD: &str = "correct-horse-battery";

/// Nothing listens on the discard port, so calls fail fast.
pub const DEAD_MATCHING_URL: &str = "http://127.0.0.1:9";

pub fn test_config() -> ServerConfig {
    ServerConfig::parse(SCHEMA_JSON, CONFIG_TOML, "config.toml").expect("bundled config parses")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pool: SqlitePool,
}

pub async fn spawn_app(gateways: Gateways, matching_url: &str) -> TestApp {
    let config = test_config();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    schema::apply_sqlite_schema(&pool, SQLITE_SCHEMA)
        .await
        .expect("schema applies");

    let mut state = db::build_state(&config, Some(pool.clone()), None).expect("state builds");
    state.gateways = gateways;
    state.matching = Arc::new(
        MatchingClient::with_policy(matching_url, Duration::from_secs(2), RetryPolicy::none())
            .expect("matching client"),
    );

    db::ensure_default_admin(&config, &state).await.expect("admin seeded");
    db::ensure_annual_plan(&config, &state).await.expect("plan seeded");

    TestApp {
        router: handlers::router(state.clone()),
        state,
        pool,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn register(&self, email: &str, role: &str) -> String {
        let (status, _) = self
            .request(
                "POST",
                "/v1/users",
                None,
                Some(json!({"email": email, "password": PASSWORD, "role": role})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {email}");
        self.login(email, PASSWORD).await
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/v1/auth/login",
                None,
                Some(json!({"email": email, "password": password})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login {email}: {body}");
        body["token"].as_str().expect("token").to_string()
    }

    pub async fn candidate(&self, email: &str, name: &str) -> (String, i64) {
        let token = self.register(email, "candidate").await;
        let (status, body) = self
            .request(
                "POST",
                "/v1/candidates/me",
                Some(&token),
                Some(json!({"full_name": name, "skills": ["rust", "sql"]})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (token, body["id"].as_i64().expect("candidate id"))
    }

    pub async fn company(&self, email: &str, name: &str) -> (String, i64) {
        let token = self.register(email, "company").await;
        let (status, body) = self
            .request("POST", "/v1/companies/me", Some(&token), Some(json!({"name": name})))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (token, body["id"].as_i64().expect("company id"))
    }

    pub async fn vacancy(&self, company_token: &str, title: &str) -> i64 {
        let (status, body) = self
            .request(
                "POST",
                "/v1/vacancies",
                Some(company_token),
                Some(json!({"title": title, "description": "Build things", "modality": "remote"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().expect("vacancy id")
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .expect("count query")
    }
}

pub fn provider_payment(id: &str, status: &str, detail: Option<&str>) -> ProviderPayment {
    ProviderPayment {
        id: id.to_string(),
        status: PaymentStatus::parse(status),
        status_detail: detail.map(str::to_string),
        amount_cents: Some(99900),
        currency: Some("MXN".to_string()),
    }
}

/// Scripted gateway: `create_payment` pops queued replies, `fetch_payment`
/// reads the current remote view by provider id.
pub struct FakeGateway {
    provider: Provider,
    replies: Mutex<VecDeque<Result<ProviderPayment, GatewayError>>>,
    remote: Mutex<HashMap<String, ProviderPayment>>,
    charges: Mutex<Vec<ChargeRequest>>,
}

impl FakeGateway {
    pub fn new(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            replies: Mutex::new(VecDeque::new()),
            remote: Mutex::new(HashMap::new()),
            charges: Mutex::new(Vec::new()),
        })
    }

    pub fn reply(&self, payment: ProviderPayment) {
        self.remote
            .lock()
            .expect("lock")
            .insert(payment.id.clone(), payment.clone());
        self.replies.lock().expect("lock").push_back(Ok(payment));
    }

    pub fn fail(&self, err: GatewayError) {
        self.replies.lock().expect("lock").push_back(Err(err));
    }

    pub fn set_remote(&self, payment: ProviderPayment) {
        self.remote
            .lock()
            .expect("lock")
            .insert(payment.id.clone(), payment);
    }

    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.charges.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn create_payment(&self, charge: &ChargeRequest) -> Result<ProviderPayment, GatewayError> {
        self.charges.lock().expect("lock").push(charge.clone());
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Transport("no scripted reply".into())))
    }

    async fn fetch_payment(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError> {
        self.remote
            .lock()
            .expect("lock")
            .get(provider_payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                message: "payment not found".into(),
            })
    }
}
