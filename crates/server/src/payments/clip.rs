//! Clip card payments client.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    cents_to_decimal, decimal_to_cents, error_for_status, ChargeRequest, GatewayError,
    PaymentGateway, PaymentStatus, Provider, ProviderPayment, RawId,
};

pub struct ClipGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Serialize)]
struct PaymentBody<'a> {
    amount: f64,
    currency: &'a str,
    description: &'a str,
    external_reference: &'a str,
    payment_method: PaymentMethod<'a>,
    customer: Customer<'a>,
}

#[derive(Debug, Serialize)]
struct PaymentMethod<'a> {
    token: &'a str,
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    email: &'a str,
}

/// Clip reports the decline reason either as a bare code or as `{code, message}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusDetail {
    Code(String),
    Object {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl StatusDetail {
    fn into_code(self) -> Option<String> {
        match self {
            StatusDetail::Code(code) => Some(code),
            StatusDetail::Object { code, message } => code.or(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentReply {
    #[serde(alias = "payment_id")]
    id: RawId,
    status: String,
    #[serde(default)]
    status_detail: Option<StatusDetail>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

impl From<PaymentReply> for ProviderPayment {
    fn from(reply: PaymentReply) -> Self {
        ProviderPayment {
            id: reply.id.into_string(),
            status: PaymentStatus::parse(&reply.status),
            status_detail: reply.status_detail.and_then(StatusDetail::into_code),
            amount_cents: reply.amount.map(decimal_to_cents),
            currency: reply.currency,
        }
    }
}

impl ClipGateway {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            api_secret: api_secret.trim().to_string(),
        })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for ClipGateway {
    fn provider(&self) -> Provider {
        Provider::Clip
    }

    async fn create_payment(&self, charge: &ChargeRequest) -> Result<ProviderPayment, GatewayError> {
        let body = PaymentBody {
            amount: cents_to_decimal(charge.amount_cents),
            currency: &charge.currency,
            description: &charge.description,
            external_reference: &charge.external_reference,
            payment_method: PaymentMethod {
                token: &charge.card_token,
            },
            customer: Customer {
                email: &charge.payer_email,
            },
        };

        let resp = self
            .client
            .post(format!("{}/payments", self.base_url))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .header("Idempotency-Key", &charge.idempotency_key)
            .json(&body)
            .send()
            .await?;
        let reply: PaymentReply = error_for_status(resp).await?.json().await?;
        let payment = ProviderPayment::from(reply);
        info!(
            payment_id = %payment.id,
            status = payment.status.as_str(),
            "clip payment created"
        );
        Ok(payment)
    }

    async fn fetch_payment(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/payments/{provider_payment_id}", self.base_url))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;
        let reply: PaymentReply = error_for_status(resp).await?.json().await?;
        Ok(reply.into())
    }
}
