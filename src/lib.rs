//! Isapay payment aggregator gateway
//!
//! Routes generic payment requests to M-Pesa, Airtel Money, DPO or Pesapal,
//! normalizes their answers and verifies their webhooks.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod payments;
pub mod store;
