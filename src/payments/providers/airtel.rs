//! Airtel Money payment provider implementation
//!
//! Collection requests push a USSD prompt to the subscriber's handset. The
//! outcome arrives later as a callback carrying a TS/TF transaction code.

use crate::error::AppResult;
use crate::payments::providers::{env_opt, send_json, verify_and_decode};
use crate::payments::status;
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{
    PaymentMethod, PaymentResponse, ProviderName, ValidatedPayment, WebhookVerification,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

const SUPPORTED: &[PaymentMethod] = &[PaymentMethod::Airtel];

/// Airtel Money provider configuration
#[derive(Debug, Clone)]
pub struct AirtelConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub webhook_secret: Option<String>,
    /// ISO 3166 country the merchant wallet lives in
    pub country: String,
}

impl Default for AirtelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openapiuat.airtel.africa".to_string(),
            client_id: None,
            client_secret: None,
            webhook_secret: None,
            country: "KE".to_string(),
        }
    }
}

impl AirtelConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_opt("AIRTEL_BASE_URL").unwrap_or(defaults.base_url),
            client_id: env_opt("AIRTEL_CLIENT_ID"),
            client_secret: env_opt("AIRTEL_CLIENT_SECRET"),
            webhook_secret: env_opt("AIRTEL_WEBHOOK_SECRET"),
            country: env_opt("AIRTEL_COUNTRY").unwrap_or(defaults.country),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirtelPaymentRequest {
    pub reference: String,
    pub subscriber: AirtelSubscriber,
    pub transaction: AirtelTransaction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirtelSubscriber {
    pub country: String,
    pub currency: String,
    pub msisdn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirtelTransaction {
    pub amount: f64,
    pub country: String,
    pub currency: String,
    pub id: String,
}

/// Map a validated payment onto Airtel's collection request
pub fn build_payment_request(config: &AirtelConfig, payment: &ValidatedPayment) -> AirtelPaymentRequest {
    let msisdn = payment
        .phone_number
        .as_deref()
        .unwrap_or_default()
        .trim_start_matches('+')
        .to_string();

    AirtelPaymentRequest {
        reference: payment.description_or_default(),
        subscriber: AirtelSubscriber {
            country: config.country.clone(),
            currency: payment.currency.clone(),
            msisdn,
        },
        transaction: AirtelTransaction {
            amount: payment.amount,
            country: config.country.clone(),
            currency: payment.currency.clone(),
            id: payment.transaction_id.clone(),
        },
    }
}

/// Airtel Money payment provider
pub struct AirtelProvider {
    config: AirtelConfig,
    client: Client,
}

impl AirtelProvider {
    pub fn new(config: AirtelConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn fetch_token(&self, client_id: &str, client_secret: &str) -> AppResult<String> {
        let url = format!("{}/auth/oauth2/token", self.config.base_url);
        let body = json!({
            "client_id": client_id,
            "client_secret": client_secret,
            "grant_type": "client_credentials",
        });

        let token: AirtelTokenResponse =
            send_json(ProviderName::Airtel, self.client.post(&url).json(&body)).await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentProvider for AirtelProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Airtel
    }

    fn supported_methods(&self) -> &[PaymentMethod] {
        SUPPORTED
    }

    fn is_live(&self) -> bool {
        self.config.credentials().is_some()
    }

    fn has_webhook_secret(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    async fn initiate_payment(&self, payment: &ValidatedPayment) -> AppResult<PaymentResponse> {
        info!(
            "Initiating Airtel payment: {} {} {}",
            payment.amount, payment.currency, payment.transaction_id
        );

        let request = build_payment_request(&self.config, payment);
        let mut response = PaymentResponse::pending(ProviderName::Airtel, payment);

        let Some((client_id, client_secret)) = self.config.credentials() else {
            response.set_metadata("mode", json!("stub"));
            return Ok(response);
        };

        let token = self.fetch_token(client_id, client_secret).await?;
        let url = format!("{}/merchant/v1/payments/", self.config.base_url);
        let result: AirtelPaymentResponse = send_json(
            ProviderName::Airtel,
            self.client
                .post(&url)
                .bearer_auth(token)
                .header("X-Country", &request.subscriber.country)
                .header("X-Currency", &request.subscriber.currency)
                .json(&request),
        )
        .await?;

        info!(
            "Airtel payment initiated: transaction_id={}, status={:?}",
            payment.transaction_id, result.status.as_ref().and_then(|s| s.code.as_deref())
        );

        response.reference_id = result
            .data
            .and_then(|d| d.transaction)
            .and_then(|t| t.id);
        response.set_metadata("mode", json!("live"));
        if let Some(message) = result.status.and_then(|s| s.message) {
            response.set_metadata("provider_message", json!(message));
        }
        Ok(response)
    }

    fn verify_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<Option<WebhookVerification>> {
        let Some(callback) = verify_and_decode::<AirtelCallback>(
            ProviderName::Airtel,
            self.config.webhook_secret.as_deref(),
            body,
            signature,
        )?
        else {
            return Ok(None);
        };

        let transaction = callback.transaction.unwrap_or_default();
        let raw_status = transaction
            .status_code
            .or(callback.status)
            .unwrap_or_default();

        Ok(Some(WebhookVerification {
            status: status::AIRTEL.map(&raw_status),
            reference_id: transaction.airtel_money_id,
            transaction_id: transaction.id,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AirtelTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AirtelPaymentResponse {
    #[serde(default)]
    data: Option<AirtelPaymentData>,
    #[serde(default)]
    status: Option<AirtelStatus>,
}

#[derive(Debug, Deserialize)]
struct AirtelPaymentData {
    #[serde(default)]
    transaction: Option<AirtelPaymentTransaction>,
}

#[derive(Debug, Deserialize)]
struct AirtelPaymentTransaction {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AirtelStatus {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AirtelCallback {
    #[serde(default)]
    transaction: Option<AirtelCallbackTransaction>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AirtelCallbackTransaction {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status_code: Option<String>,
    #[serde(default)]
    airtel_money_id: Option<String>,
}
