//! Payment provider trait definitions
//!
//! Defines the common interface that all payment providers must implement.

use crate::error::AppResult;
use crate::payments::types::{
    PaymentMethod, PaymentResponse, ProviderName, ValidatedPayment, WebhookVerification,
};
use async_trait::async_trait;

/// Trait for payment provider implementations
///
/// All payment providers (Airtel, DPO, Pesapal, M-Pesa) implement this trait so
/// the gateway can dispatch to them interchangeably.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Methods this provider accepts after [`remap_method`](Self::remap_method)
    fn supported_methods(&self) -> &[PaymentMethod];

    /// Rewrite the caller's method before dispatch
    ///
    /// Most providers take the method as-is. Aggregators with a single hosted
    /// checkout collapse every method into one.
    fn remap_method(&self, method: PaymentMethod) -> PaymentMethod {
        method
    }

    /// Currencies this provider settles in. `None` accepts any currency.
    fn supported_currencies(&self) -> Option<&[&'static str]> {
        None
    }

    /// Whether outbound calls reach the real API or are synthesized locally
    fn is_live(&self) -> bool;

    /// Whether webhook callbacks are checked against a shared secret
    fn has_webhook_secret(&self) -> bool;

    /// Initialize a payment transaction
    ///
    /// Always yields a `pending` response keyed by the payment's local
    /// transaction id. Transport and non-2xx failures come back as
    /// `ExternalError::ProviderTransport`.
    async fn initiate_payment(&self, payment: &ValidatedPayment) -> AppResult<PaymentResponse>;

    /// Verify and decode a webhook callback
    ///
    /// # Arguments
    /// * `body` - Raw callback body, exactly as received
    /// * `signature` - Value of the signature header, if any
    ///
    /// # Returns
    /// * `Ok(None)` - Signature check failed; the event must be discarded
    /// * `Ok(Some(_))` - Normalized status plus correlation ids
    fn verify_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<Option<WebhookVerification>>;
}
