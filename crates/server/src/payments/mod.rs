//! Payment provider port and its registry.
pub mod clip;
pub mod mercadopago;
pub mod status;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServerConfig;
pub use clip::ClipGateway;
pub use mercadopago::MercadoPagoGateway;
pub use status::{status_message, PaymentOutcome, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    MercadoPago,
    Clip,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::MercadoPago => "mercadopago",
            Provider::Clip => "clip",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mercadopago" | "mercado_pago" => Some(Provider::MercadoPago),
            "clip" => Some(Provider::Clip),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider {0} is not configured")]
    NotConfigured(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("provider returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// A card charge for one plan purchase.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub card_token: String,
    pub payment_method_id: Option<String>,
    pub installments: u32,
    pub payer_email: String,
    pub external_reference: String,
    pub idempotency_key: String,
}

/// A payment as the provider currently reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPayment {
    pub id: String,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> Provider;

    async fn create_payment(&self, charge: &ChargeRequest) -> Result<ProviderPayment, GatewayError>;

    async fn fetch_payment(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError>;
}

/// Configured gateways, keyed by provider.
#[derive(Clone, Default)]
pub struct Gateways {
    mercadopago: Option<Arc<dyn PaymentGateway>>,
    clip: Option<Arc<dyn PaymentGateway>>,
}

impl Gateways {
    pub fn from_config(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        let mut gateways = Self::default();

        if !config.mercadopago.access_token.trim().is_empty() {
            gateways = gateways.with(Arc::new(MercadoPagoGateway::new(
                &config.mercadopago.base_url,
                &config.mercadopago.access_token,
            )?));
        }

        if !config.clip.api_key.trim().is_empty() && !config.clip.api_secret.trim().is_empty() {
            gateways = gateways.with(Arc::new(ClipGateway::new(
                &config.clip.base_url,
                &config.clip.api_key,
                &config.clip.api_secret,
            )?));
        }

        Ok(gateways)
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        match gateway.provider() {
            Provider::MercadoPago => self.mercadopago = Some(gateway),
            Provider::Clip => self.clip = Some(gateway),
        }
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        let slot = match provider {
            Provider::MercadoPago => &self.mercadopago,
            Provider::Clip => &self.clip,
        };
        slot.clone()
            .ok_or(GatewayError::NotConfigured(provider.as_str()))
    }

    pub fn configured(&self) -> Vec<Provider> {
        let mut out = Vec::new();
        if self.mercadopago.is_some() {
            out.push(Provider::MercadoPago);
        }
        if self.clip.is_some() {
            out.push(Provider::Clip);
        }
        out
    }
}

pub(crate) fn cents_to_decimal(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub(crate) fn decimal_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Provider ids arrive as JSON numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawId {
    Num(i64),
    Str(String),
}

impl RawId {
    pub(crate) fn into_string(self) -> String {
        match self {
            RawId::Num(n) => n.to_string(),
            RawId::Str(s) => s,
        }
    }
}

pub(crate) async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let code = status.as_u16();
    if status.is_client_error() {
        return Err(GatewayError::Rejected {
            status: code,
            message: provider_message(&body).unwrap_or_else(|| format!("request rejected with status {code}")),
        });
    }
    Err(GatewayError::Upstream {
        status: code,
        body: body.chars().take(300).collect(),
    })
}

/// Pulls a human readable message out of a provider error body.
fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}
