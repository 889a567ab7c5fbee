//! Pesapal payment provider implementation
//!
//! Pesapal runs a single hosted checkout covering cards, bank and mobile money,
//! so every order is submitted as `card_bank` whatever the caller asked for.

use crate::error::{AppError, AppResult};
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
use tracing::{error, info};

const SUPPORTED: &[PaymentMethod] = &[PaymentMethod::CardBank];

/// Pesapal provider configuration
#[derive(Debug, Clone)]
pub struct PesapalConfig {
    pub base_url: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    /// Registered IPN id that Pesapal notifies on status changes
    pub notification_id: Option<String>,
    pub callback_url: String,
    pub webhook_secret: Option<String>,
}

impl Default for PesapalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cybqa.pesapal.com/pesapalv3".to_string(),
            consumer_key: None,
            consumer_secret: None,
            notification_id: None,
            callback_url: "http://localhost:8080/checkout/complete".to_string(),
            webhook_secret: None,
        }
    }
}

impl PesapalConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_opt("PESAPAL_BASE_URL").unwrap_or(defaults.base_url),
            consumer_key: env_opt("PESAPAL_CONSUMER_KEY"),
            consumer_secret: env_opt("PESAPAL_CONSUMER_SECRET"),
            notification_id: env_opt("PESAPAL_NOTIFICATION_ID"),
            callback_url: env_opt("PESAPAL_CALLBACK_URL").unwrap_or(defaults.callback_url),
            webhook_secret: env_opt("PESAPAL_WEBHOOK_SECRET"),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.consumer_key, &self.consumer_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PesapalOrderRequest {
    pub id: String,
    pub currency: String,
    pub amount: f64,
    pub description: String,
    pub callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    pub method: PaymentMethod,
    pub billing_address: PesapalBillingAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PesapalBillingAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
}

/// Map a validated payment onto Pesapal's SubmitOrderRequest body
pub fn build_order_request(config: &PesapalConfig, payment: &ValidatedPayment) -> PesapalOrderRequest {
    PesapalOrderRequest {
        id: payment.transaction_id.clone(),
        currency: payment.currency.clone(),
        amount: payment.amount,
        description: payment.description_or_default(),
        callback_url: config.callback_url.clone(),
        notification_id: config.notification_id.clone(),
        method: PaymentMethod::CardBank,
        billing_address: PesapalBillingAddress {
            phone_number: payment.phone_number.clone(),
            first_name: payment
                .bank_details
                .as_ref()
                .and_then(|b| b.account_name.clone())
                .or_else(|| payment.card_details.as_ref().and_then(|c| c.holder_name.clone())),
        },
    }
}

/// Pesapal payment provider
pub struct PesapalProvider {
    config: PesapalConfig,
    client: Client,
}

impl PesapalProvider {
    pub fn new(config: PesapalConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn fetch_token(&self, consumer_key: &str, consumer_secret: &str) -> AppResult<String> {
        let url = format!("{}/api/Auth/RequestToken", self.config.base_url);
        let body = json!({
            "consumer_key": consumer_key,
            "consumer_secret": consumer_secret,
        });

        let token: PesapalTokenResponse =
            send_json(ProviderName::Pesapal, self.client.post(&url).json(&body)).await?;

        match token.token {
            Some(token) => Ok(token),
            None => Err(AppError::provider_transport(
                ProviderName::Pesapal.as_str(),
                format!("token request rejected: {}", describe_error(token.error.as_ref())),
                None,
            )),
        }
    }
}

#[async_trait]
impl PaymentProvider for PesapalProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Pesapal
    }

    fn supported_methods(&self) -> &[PaymentMethod] {
        SUPPORTED
    }

    fn remap_method(&self, _method: PaymentMethod) -> PaymentMethod {
        PaymentMethod::CardBank
    }

    fn is_live(&self) -> bool {
        self.config.credentials().is_some()
    }

    fn has_webhook_secret(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    async fn initiate_payment(&self, payment: &ValidatedPayment) -> AppResult<PaymentResponse> {
        info!(
            "Initiating Pesapal payment: {} {} {}",
            payment.amount, payment.currency, payment.transaction_id
        );

        let request = build_order_request(&self.config, payment);
        let mut response = PaymentResponse::pending(ProviderName::Pesapal, payment);

        let Some((consumer_key, consumer_secret)) = self.config.credentials() else {
            response.redirect_url = Some(format!(
                "{}/iframe/PesapalIframe3/Index?OrderTrackingId=stub-{}",
                self.config.base_url, payment.transaction_id
            ));
            response.set_metadata("mode", json!("stub"));
            return Ok(response);
        };

        let token = self.fetch_token(consumer_key, consumer_secret).await?;
        let url = format!("{}/api/Transactions/SubmitOrderRequest", self.config.base_url);
        let result: PesapalOrderResponse = send_json(
            ProviderName::Pesapal,
            self.client.post(&url).bearer_auth(token).json(&request),
        )
        .await?;

        if result.error.is_some() || result.order_tracking_id.is_none() {
            let reason = describe_error(result.error.as_ref());
            error!(
                "Pesapal rejected order {}: {}",
                payment.transaction_id, reason
            );
            return Err(AppError::provider_transport(
                ProviderName::Pesapal.as_str(),
                format!("order rejected: {}", reason),
                None,
            ));
        }

        info!(
            "Pesapal order submitted: transaction_id={}, tracking_id={:?}",
            payment.transaction_id, result.order_tracking_id
        );

        response.redirect_url = result.redirect_url;
        response.reference_id = result.order_tracking_id;
        response.set_metadata("mode", json!("live"));
        Ok(response)
    }

    fn verify_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<Option<WebhookVerification>> {
        let Some(callback) = verify_and_decode::<PesapalCallback>(
            ProviderName::Pesapal,
            self.config.webhook_secret.as_deref(),
            body,
            signature,
        )?
        else {
            return Ok(None);
        };

        let raw_status = callback
            .payment_status_description
            .or(callback.status)
            .unwrap_or_default();

        Ok(Some(WebhookVerification {
            status: status::PESAPAL.map(&raw_status),
            reference_id: callback.order_tracking_id,
            transaction_id: callback.order_merchant_reference,
        }))
    }
}

fn describe_error(error: Option<&serde_json::Value>) -> String {
    match error {
        Some(serde_json::Value::Object(map)) => map
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string(),
        Some(other) => other.to_string(),
        None => "no tracking id returned".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct PesapalTokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PesapalOrderResponse {
    #[serde(default)]
    order_tracking_id: Option<String>,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PesapalCallback {
    #[serde(default, rename = "OrderTrackingId")]
    order_tracking_id: Option<String>,
    #[serde(default, rename = "OrderMerchantReference")]
    order_merchant_reference: Option<String>,
    #[serde(default)]
    payment_status_description: Option<String>,
    #[serde(default)]
    status: Option<String>,
}
