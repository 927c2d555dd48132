use std::sync::Arc;

use axum::http::StatusCode;
use sqlx::{Pool, Postgres, Sqlite};

use crate::config::BillingConfig;
use crate::errors::ServerError;
use crate::matching::MatchingClient;
use crate::payments::Gateways;

#[derive(Clone)]
pub struct AppState {
    pub sqlite: Option<Pool<Sqlite>>,
    pub postgres: Option<Pool<Postgres>>,
    pub token_ttl_seconds: u64,
    pub min_password_len: usize,
    pub billing: Arc<BillingConfig>,
    pub gateways: Gateways,
    pub matching: Arc<MatchingClient>,
}

impl AppState {
    pub fn sqlite_pool(&self) -> Result<&Pool<Sqlite>, ServerError> {
        self.sqlite.as_ref().ok_or_else(|| {
            ServerError::new(StatusCode::INTERNAL_SERVER_ERROR, "database pool missing")
        })
    }
}
