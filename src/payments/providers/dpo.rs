//! DPO payment provider implementation
//!
//! DPO issues a transaction token for a hosted payment page. Cards and the
//! mobile money wallets DPO aggregates are both settled on that page.

use crate::error::{AppError, AppResult};
use crate::payments::providers::{env_opt, json_to_string, send_json, verify_and_decode};
use crate::payments::status;
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{
    CardDetails, PaymentMethod, PaymentResponse, ProviderName, ValidatedPayment,
    WebhookVerification,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

const SUPPORTED: &[PaymentMethod] = &[PaymentMethod::Card, PaymentMethod::Mpesa, PaymentMethod::Airtel];

const RESULT_OK: &str = "000";

/// DPO provider configuration
#[derive(Debug, Clone)]
pub struct DpoConfig {
    pub base_url: String,
    /// Company token issued by DPO; doubles as the API key
    pub company_token: Option<String>,
    pub service_type: String,
    pub webhook_secret: Option<String>,
}

impl Default for DpoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://secure.3gdirectpay.com".to_string(),
            company_token: None,
            service_type: "3854".to_string(),
            webhook_secret: None,
        }
    }
}

impl DpoConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_opt("DPO_BASE_URL").unwrap_or(defaults.base_url),
            company_token: env_opt("DPO_COMPANY_TOKEN"),
            service_type: env_opt("DPO_SERVICE_TYPE").unwrap_or(defaults.service_type),
            webhook_secret: env_opt("DPO_WEBHOOK_SECRET"),
        }
    }

    fn payment_url(&self, token: &str) -> String {
        format!("{}/payv2.php?ID={}", self.base_url, token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DpoCreateTokenRequest {
    pub company_token: String,
    pub request: String,
    pub transaction: DpoTransaction,
    pub services: Vec<DpoService>,
    #[serde(rename = "card_details", skip_serializing_if = "Option::is_none")]
    pub card_details: Option<CardDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DpoTransaction {
    pub payment_amount: String,
    pub payment_currency: String,
    pub company_ref: String,
    pub company_ref_unique: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DpoService {
    pub service_type: String,
    pub service_description: String,
    pub service_date: String,
}

/// Map a validated payment onto DPO's createToken request
pub fn build_create_token_request(
    config: &DpoConfig,
    payment: &ValidatedPayment,
    now: DateTime<Utc>,
) -> DpoCreateTokenRequest {
    DpoCreateTokenRequest {
        company_token: config.company_token.clone().unwrap_or_default(),
        request: "createToken".to_string(),
        transaction: DpoTransaction {
            payment_amount: format!("{:.2}", payment.amount),
            payment_currency: payment.currency.clone(),
            company_ref: payment.transaction_id.clone(),
            company_ref_unique: 1,
            customer_phone: payment
                .phone_number
                .as_deref()
                .map(|p| p.trim_start_matches('+').to_string()),
        },
        services: vec![DpoService {
            service_type: config.service_type.clone(),
            service_description: payment.description_or_default(),
            service_date: now.format("%Y/%m/%d %H:%M").to_string(),
        }],
        card_details: match payment.method {
            PaymentMethod::Card => payment.card_details.clone(),
            _ => None,
        },
    }
}

/// DPO payment provider
pub struct DpoProvider {
    config: DpoConfig,
    client: Client,
}

impl DpoProvider {
    pub fn new(config: DpoConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl PaymentProvider for DpoProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Dpo
    }

    fn supported_methods(&self) -> &[PaymentMethod] {
        SUPPORTED
    }

    fn is_live(&self) -> bool {
        self.config.company_token.is_some()
    }

    fn has_webhook_secret(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    async fn initiate_payment(&self, payment: &ValidatedPayment) -> AppResult<PaymentResponse> {
        info!(
            "Initiating DPO payment: {} {} {} via {}",
            payment.amount, payment.currency, payment.transaction_id, payment.method
        );

        let request = build_create_token_request(&self.config, payment, Utc::now());
        let mut response = PaymentResponse::pending(ProviderName::Dpo, payment);

        if !self.is_live() {
            let stub_token = format!("stub-{}", payment.transaction_id);
            response.redirect_url = Some(self.config.payment_url(&stub_token));
            response.set_metadata("mode", json!("stub"));
            return Ok(response);
        }

        let url = format!("{}/API/v6/createToken", self.config.base_url);
        let result: DpoCreateTokenResponse =
            send_json(ProviderName::Dpo, self.client.post(&url).json(&request)).await?;

        if result.result != RESULT_OK {
            let explanation = result.result_explanation.unwrap_or_default();
            error!(
                "DPO rejected createToken for {}: {} {}",
                payment.transaction_id, result.result, explanation
            );
            return Err(AppError::provider_transport(
                ProviderName::Dpo.as_str(),
                format!("createToken result {}: {}", result.result, explanation),
                None,
            ));
        }

        let Some(token) = result.trans_token.filter(|t| !t.trim().is_empty()) else {
            error!(
                "DPO accepted createToken for {} without a TransToken",
                payment.transaction_id
            );
            return Err(AppError::provider_transport(
                ProviderName::Dpo.as_str(),
                "createToken succeeded without a TransToken",
                None,
            ));
        };
        info!(
            "DPO payment initiated: transaction_id={}, token={}",
            payment.transaction_id, token
        );

        response.redirect_url = Some(self.config.payment_url(&token));
        response.reference_id = result
            .trans_ref
            .filter(|r| !r.trim().is_empty())
            .or(Some(token));
        response.set_metadata("mode", json!("live"));
        Ok(response)
    }

    fn verify_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<Option<WebhookVerification>> {
        let Some(callback) = verify_and_decode::<DpoCallback>(
            ProviderName::Dpo,
            self.config.webhook_secret.as_deref(),
            body,
            signature,
        )?
        else {
            return Ok(None);
        };

        let raw_status = callback
            .transaction_status
            .or(callback.status)
            .or_else(|| callback.result.as_ref().and_then(json_to_string))
            .unwrap_or_default();

        Ok(Some(WebhookVerification {
            status: status::DPO.map(&raw_status),
            reference_id: callback.transaction_ref.or(callback.transaction_token),
            transaction_id: callback.company_ref,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DpoCreateTokenResponse {
    result: String,
    #[serde(default)]
    result_explanation: Option<String>,
    #[serde(default)]
    trans_token: Option<String>,
    #[serde(default)]
    trans_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DpoCallback {
    #[serde(default)]
    transaction_token: Option<String>,
    #[serde(default)]
    transaction_ref: Option<String>,
    #[serde(default)]
    company_ref: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    transaction_status: Option<String>,
    #[serde(default, rename = "status")]
    status: Option<String>,
}
