//! Mercado Pago `/v1/payments` client.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    cents_to_decimal, decimal_to_cents, error_for_status, ChargeRequest, GatewayError,
    PaymentGateway, PaymentStatus, Provider, ProviderPayment, RawId,
};

pub struct MercadoPagoGateway {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Serialize)]
struct PaymentBody<'a> {
    transaction_amount: f64,
    token: &'a str,
    description: &'a str,
    installments: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method_id: Option<&'a str>,
    payer: Payer<'a>,
    external_reference: &'a str,
}

#[derive(Debug, Serialize)]
struct Payer<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentReply {
    id: RawId,
    status: String,
    #[serde(default)]
    status_detail: Option<String>,
    #[serde(default)]
    transaction_amount: Option<f64>,
    #[serde(default)]
    currency_id: Option<String>,
}

impl From<PaymentReply> for ProviderPayment {
    fn from(reply: PaymentReply) -> Self {
        ProviderPayment {
            id: reply.id.into_string(),
            status: PaymentStatus::parse(&reply.status),
            status_detail: reply.status_detail,
            amount_cents: reply.transaction_amount.map(decimal_to_cents),
            currency: reply.currency_id,
        }
    }
}

impl MercadoPagoGateway {
    pub fn new(base_url: &str, access_token: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.trim().to_string(),
        })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MercadoPagoGateway {
    fn provider(&self) -> Provider {
        Provider::MercadoPago
    }

    async fn create_payment(&self, charge: &ChargeRequest) -> Result<ProviderPayment, GatewayError> {
        let body = PaymentBody {
            transaction_amount: cents_to_decimal(charge.amount_cents),
            token: &charge.card_token,
            description: &charge.description,
            installments: charge.installments.max(1),
            payment_method_id: charge.payment_method_id.as_deref(),
            payer: Payer {
                email: &charge.payer_email,
            },
            external_reference: &charge.external_reference,
        };

        debug!(reference = %charge.external_reference, "mercadopago create payment");
        let resp = self
            .client
            .post(format!("{}/v1/payments", self.base_url))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &charge.idempotency_key)
            .json(&body)
            .send()
            .await?;
        let reply: PaymentReply = error_for_status(resp).await?.json().await?;
        let payment = ProviderPayment::from(reply);
        info!(
            payment_id = %payment.id,
            status = payment.status.as_str(),
            detail = payment.status_detail.as_deref().unwrap_or(""),
            "mercadopago payment created"
        );
        Ok(payment)
    }

    async fn fetch_payment(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/v1/payments/{provider_payment_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let reply: PaymentReply = error_for_status(resp).await?.json().await?;
        Ok(reply.into())
    }
}
