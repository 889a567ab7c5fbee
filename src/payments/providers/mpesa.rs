//! M-Pesa (Daraja STK push) payment provider implementation
//!
//! An STK push prompts the payer for their PIN on the handset. Safaricom reports
//! the outcome on the configured callback URL, keyed by `CheckoutRequestID`.

use crate::error::{AppError, AppResult};
use crate::payments::providers::{env_opt, json_to_string, send_json, verify_and_decode};
use crate::payments::status;
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{
    PaymentMethod, PaymentResponse, ProviderName, ValidatedPayment, WebhookVerification,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

const SUPPORTED: &[PaymentMethod] = &[PaymentMethod::Mpesa];

/// Daraja collects in Kenyan shillings only
const CURRENCIES: &[&str] = &["KES"];

/// STK result code for a completed payment
const RESULT_SUCCESS: i64 = 0;
/// STK result code when the payer dismisses the prompt
const RESULT_CANCELLED_BY_USER: i64 = 1032;

/// M-Pesa provider configuration
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub shortcode: String,
    pub passkey: Option<String>,
    pub callback_url: String,
    pub webhook_secret: Option<String>,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sandbox.safaricom.co.ke".to_string(),
            consumer_key: None,
            consumer_secret: None,
            shortcode: "174379".to_string(),
            passkey: None,
            callback_url: "http://localhost:8080/webhook/mpesa".to_string(),
            webhook_secret: None,
        }
    }
}

impl MpesaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_opt("MPESA_BASE_URL").unwrap_or(defaults.base_url),
            consumer_key: env_opt("MPESA_CONSUMER_KEY"),
            consumer_secret: env_opt("MPESA_CONSUMER_SECRET"),
            shortcode: env_opt("MPESA_SHORTCODE").unwrap_or(defaults.shortcode),
            passkey: env_opt("MPESA_PASSKEY"),
            callback_url: env_opt("MPESA_CALLBACK_URL").unwrap_or(defaults.callback_url),
            webhook_secret: env_opt("MPESA_WEBHOOK_SECRET"),
        }
    }

    fn credentials(&self) -> Option<(&str, &str, &str)> {
        match (&self.consumer_key, &self.consumer_secret, &self.passkey) {
            (Some(key), Some(secret), Some(passkey)) => {
                Some((key.as_str(), secret.as_str(), passkey.as_str()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: u64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// Daraja timestamp format, e.g. `20260304050607`
pub fn stk_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// `base64(shortcode + passkey + timestamp)`
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// Map a validated payment onto an STK push request
pub fn build_stk_push_request(
    config: &MpesaConfig,
    payment: &ValidatedPayment,
    passkey: &str,
    timestamp: &str,
) -> StkPushRequest {
    let phone = payment
        .phone_number
        .as_deref()
        .unwrap_or_default()
        .trim_start_matches('+')
        .to_string();

    StkPushRequest {
        business_short_code: config.shortcode.clone(),
        password: stk_password(&config.shortcode, passkey, timestamp),
        timestamp: timestamp.to_string(),
        transaction_type: "CustomerPayBillOnline".to_string(),
        // Daraja only accepts whole shillings
        amount: payment.amount.ceil() as u64,
        party_a: phone.clone(),
        party_b: config.shortcode.clone(),
        phone_number: phone,
        callback_url: config.callback_url.clone(),
        account_reference: payment.transaction_id.clone(),
        transaction_desc: payment.description_or_default(),
    }
}

/// M-Pesa payment provider
pub struct MpesaProvider {
    config: MpesaConfig,
    client: Client,
}

impl MpesaProvider {
    pub fn new(config: MpesaConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn fetch_token(&self, consumer_key: &str, consumer_secret: &str) -> AppResult<String> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let token: MpesaTokenResponse = send_json(
            ProviderName::Mpesa,
            self.client.get(&url).basic_auth(consumer_key, Some(consumer_secret)),
        )
        .await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentProvider for MpesaProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Mpesa
    }

    fn supported_methods(&self) -> &[PaymentMethod] {
        SUPPORTED
    }

    fn supported_currencies(&self) -> Option<&[&'static str]> {
        Some(CURRENCIES)
    }

    fn is_live(&self) -> bool {
        self.config.credentials().is_some()
    }

    fn has_webhook_secret(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    async fn initiate_payment(&self, payment: &ValidatedPayment) -> AppResult<PaymentResponse> {
        info!(
            "Initiating M-Pesa STK push: {} {} {}",
            payment.amount, payment.currency, payment.transaction_id
        );

        let mut response = PaymentResponse::pending(ProviderName::Mpesa, payment);

        let Some((consumer_key, consumer_secret, passkey)) = self.config.credentials() else {
            response.set_metadata("mode", json!("stub"));
            return Ok(response);
        };

        let timestamp = stk_timestamp(Utc::now());
        let request = build_stk_push_request(&self.config, payment, passkey, &timestamp);

        let token = self.fetch_token(consumer_key, consumer_secret).await?;
        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url);
        let result: StkPushResponse = send_json(
            ProviderName::Mpesa,
            self.client.post(&url).bearer_auth(token).json(&request),
        )
        .await?;

        if result.response_code != "0" {
            let description = result.response_description.unwrap_or_default();
            error!(
                "M-Pesa rejected STK push for {}: {} {}",
                payment.transaction_id, result.response_code, description
            );
            return Err(AppError::provider_transport(
                ProviderName::Mpesa.as_str(),
                format!("STK push response {}: {}", result.response_code, description),
                None,
            ));
        }

        info!(
            "M-Pesa STK push accepted: transaction_id={}, checkout_request_id={}",
            payment.transaction_id, result.checkout_request_id
        );

        response.reference_id = Some(result.checkout_request_id);
        response.set_metadata("mode", json!("live"));
        response.set_metadata("merchant_request_id", json!(result.merchant_request_id));
        if let Some(message) = result.customer_message {
            response.set_metadata("customer_message", json!(message));
        }
        Ok(response)
    }

    fn verify_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<Option<WebhookVerification>> {
        let Some(callback) = verify_and_decode::<MpesaCallback>(
            ProviderName::Mpesa,
            self.config.webhook_secret.as_deref(),
            body,
            signature,
        )?
        else {
            return Ok(None);
        };

        let stk = callback.body.and_then(|b| b.stk_callback);
        let raw_status = match stk.as_ref().and_then(|s| s.result_code.as_ref()) {
            Some(code) => result_code_word(code).to_string(),
            None => callback.status.unwrap_or_default(),
        };

        Ok(Some(WebhookVerification {
            status: status::MPESA.map(&raw_status),
            reference_id: stk.and_then(|s| s.checkout_request_id),
            transaction_id: callback.transaction_id,
        }))
    }
}

/// Translate an STK `ResultCode` into the shared status vocabulary
fn result_code_word(code: &serde_json::Value) -> &'static str {
    let parsed = json_to_string(code).and_then(|s| s.trim().parse::<i64>().ok());
    match parsed {
        Some(RESULT_SUCCESS) => "completed",
        Some(RESULT_CANCELLED_BY_USER) => "cancelled",
        Some(_) => "failed",
        None => "pending",
    }
}

#[derive(Debug, Deserialize)]
struct MpesaTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    #[serde(default)]
    response_description: Option<String>,
    #[serde(default)]
    customer_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MpesaCallback {
    #[serde(default, rename = "Body")]
    body: Option<MpesaCallbackBody>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MpesaCallbackBody {
    #[serde(default, rename = "stkCallback")]
    stk_callback: Option<StkCallback>,
}

#[derive(Debug, Deserialize)]
struct StkCallback {
    #[serde(default, rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(default, rename = "ResultCode")]
    result_code: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::PaymentStatus;
    use chrono::TimeZone;

    fn payment() -> ValidatedPayment {
        ValidatedPayment {
            transaction_id: "txn_mp".to_string(),
            user_id: "user-3".to_string(),
            amount: 99.2,
            currency: "KES".to_string(),
            method: PaymentMethod::Mpesa,
            order_id: None,
            description: Some("Groceries".to_string()),
            phone_number: Some("+254712345678".to_string()),
            card_details: None,
            bank_details: None,
        }
    }

    #[test]
    fn test_password_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let timestamp = stk_timestamp(now);
        assert_eq!(timestamp, "20260304050607");
        assert_eq!(
            stk_password("174379", "pk", &timestamp),
            BASE64.encode("174379pk20260304050607")
        );
    }

    #[test]
    fn test_build_stk_push_request() {
        let request = build_stk_push_request(&MpesaConfig::default(), &payment(), "pk", "20260304050607");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["BusinessShortCode"], "174379");
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
        assert_eq!(value["Amount"], 100);
        assert_eq!(value["PartyA"], "254712345678");
        assert_eq!(value["PartyB"], "174379");
        assert_eq!(value["PhoneNumber"], "254712345678");
        assert_eq!(value["CallBackURL"], "http://localhost:8080/webhook/mpesa");
        assert_eq!(value["AccountReference"], "txn_mp");
        assert_eq!(value["TransactionDesc"], "Groceries");
    }

    #[tokio::test]
    async fn test_stub_without_passkey() {
        let config = MpesaConfig {
            consumer_key: Some("key".to_string()),
            consumer_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let provider = MpesaProvider::new(config, Client::new());
        assert!(!provider.is_live());

        let response = provider.initiate_payment(&payment()).await.unwrap();
        assert_eq!(response.status, PaymentStatus::Pending);
        assert_eq!(response.metadata["mode"], "stub");
    }

    #[test]
    fn test_stk_callback_result_codes() {
        let provider = MpesaProvider::new(MpesaConfig::default(), Client::new());

        let body = br#"{"Body":{"stkCallback":{"MerchantRequestID":"m-1","CheckoutRequestID":"ws_CO_1","ResultCode":0,"ResultDesc":"The service request is processed successfully."}}}"#;
        let result = provider.verify_webhook(body, None).unwrap().unwrap();
        assert_eq!(result.status, PaymentStatus::Success);
        assert_eq!(result.reference_id.as_deref(), Some("ws_CO_1"));
        assert_eq!(result.transaction_id, None);

        let body = br#"{"Body":{"stkCallback":{"CheckoutRequestID":"ws_CO_1","ResultCode":1032}}}"#;
        let result = provider.verify_webhook(body, None).unwrap().unwrap();
        assert_eq!(result.status, PaymentStatus::Failed);

        let body = br#"{"Body":{"stkCallback":{"CheckoutRequestID":"ws_CO_1","ResultCode":"2001"}}}"#;
        let result = provider.verify_webhook(body, None).unwrap().unwrap();
        assert_eq!(result.status, PaymentStatus::Failed);
    }

    #[test]
    fn test_top_level_status_callback() {
        let provider = MpesaProvider::new(MpesaConfig::default(), Client::new());
        let body = br#"{"status":"Success","transaction_id":"txn_mp"}"#;
        let result = provider.verify_webhook(body, None).unwrap().unwrap();
        assert_eq!(result.status, PaymentStatus::Success);
        assert_eq!(result.transaction_id.as_deref(), Some("txn_mp"));
    }
}
