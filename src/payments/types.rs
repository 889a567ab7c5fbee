//! Payment gateway types and data structures
//!
//! The normalized contract shared by every provider adapter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payment method requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    Airtel,
    Card,
    Bank,
    CardBank,
    Paypal,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Mpesa,
        PaymentMethod::Airtel,
        PaymentMethod::Card,
        PaymentMethod::Bank,
        PaymentMethod::CardBank,
        PaymentMethod::Paypal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::Airtel => "airtel",
            PaymentMethod::Card => "card",
            PaymentMethod::Bank => "bank",
            PaymentMethod::CardBank => "card_bank",
            PaymentMethod::Paypal => "paypal",
        }
    }

    /// Mobile money methods push a prompt to the payer's phone
    pub fn requires_phone(&self) -> bool {
        matches!(self, PaymentMethod::Mpesa | PaymentMethod::Airtel)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unsupported payment method '{}'", s))
    }
}

/// External payment networks the gateway can dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Airtel,
    Dpo,
    Pesapal,
    Mpesa,
}

impl ProviderName {
    pub const ALL: [ProviderName; 4] = [
        ProviderName::Airtel,
        ProviderName::Dpo,
        ProviderName::Pesapal,
        ProviderName::Mpesa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Airtel => "airtel",
            ProviderName::Dpo => "dpo",
            ProviderName::Pesapal => "pesapal",
            ProviderName::Mpesa => "mpesa",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        ProviderName::ALL
            .into_iter()
            .find(|p| p.as_str() == lowered)
            .ok_or_else(|| format!("unknown provider '{}'", s))
    }
}

/// Normalized payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Card data forwarded to card-capable providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cvv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_name: Option<String>,
}

/// Bank account data for bank transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub account_number: String,
    pub bank_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
}

/// Payment request for initiating a transaction
///
/// `method` stays a plain string on the wire so the gateway can reject unknown
/// values with a field-level validation error instead of a deserialization failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub user_id: String,
    /// Amount in major currency units
    pub amount: f64,
    /// ISO 4217 currency code
    pub currency: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_details: Option<CardDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_details: Option<BankDetails>,
}

/// Optional body of `POST /retry/:transaction_id`.
///
/// Stored requests carry no card data, so a card payment is retried with
/// fresh `card_details`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_details: Option<CardDetails>,
}

impl PaymentRequest {
    /// Copy safe to persist: card data never leaves the request that carried it
    pub fn redacted(&self) -> Self {
        Self {
            card_details: None,
            ..self.clone()
        }
    }
}

/// A request that passed gateway validation, ready for exactly one adapter call
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayment {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub method: PaymentMethod,
    pub order_id: Option<String>,
    pub description: Option<String>,
    pub phone_number: Option<String>,
    pub card_details: Option<CardDetails>,
    pub bank_details: Option<BankDetails>,
}

impl ValidatedPayment {
    /// Description sent to providers that require one
    pub fn description_or_default(&self) -> String {
        self.description.clone().unwrap_or_else(|| match &self.order_id {
            Some(order_id) => format!("Payment for order {}", order_id),
            None => format!("Payment {}", self.transaction_id),
        })
    }
}

/// Normalized payment response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Locally generated correlation key
    pub transaction_id: String,
    pub provider: ProviderName,
    pub status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Provider-side reference, when the provider returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

impl PaymentResponse {
    /// A fresh `pending` response for a validated payment
    pub fn pending(provider: ProviderName, payment: &ValidatedPayment) -> Self {
        Self {
            transaction_id: payment.transaction_id.clone(),
            provider,
            status: PaymentStatus::Pending,
            amount: payment.amount,
            currency: payment.currency.clone(),
            redirect_url: None,
            reference_id: None,
            metadata: empty_metadata(),
        }
    }

    /// Insert a metadata entry, turning non-object metadata into an object first
    pub fn set_metadata(&mut self, key: &str, value: serde_json::Value) {
        if !self.metadata.is_object() {
            self.metadata = empty_metadata();
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}

/// Result of checking and decoding a provider webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookVerification {
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Generate a fresh local transaction id
pub fn new_transaction_id() -> String {
    format!("txn_{}", Uuid::new_v4().simple())
}
