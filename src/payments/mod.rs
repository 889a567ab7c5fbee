//! Payment provider integration module
//!
//! One request shape routed to M-Pesa, Airtel Money, DPO or Pesapal, one
//! response shape back, and webhook verification for all four.

pub mod gateway;
pub mod providers;
pub mod service;
pub mod signature;
pub mod status;
pub mod traits;
pub mod types;

pub use gateway::{PaymentGateway, ProvidersConfig, RouteTable};
pub use service::{PaymentService, Settlement, SettlementOutcome};
pub use traits::PaymentProvider;
pub use types::{
    CardDetails, PaymentMethod, PaymentRequest, PaymentResponse, PaymentStatus, ProviderName,
    RetryRequest, WebhookVerification,
};
