//! Payment aggregator gateway
//!
//! Validates a generic payment request, picks the adapter routed for its method
//! and hands the request over. The adapter's response is returned untouched.

use crate::error::{AppError, AppResult};
use crate::payments::providers::{
    build_http_client, AirtelConfig, AirtelProvider, DpoConfig, DpoProvider, MpesaConfig,
    MpesaProvider, PesapalConfig, PesapalProvider,
};
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{
    new_transaction_id, PaymentMethod, PaymentRequest, PaymentResponse, ProviderName,
    ValidatedPayment,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

fn currency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z]{3}$").expect("currency pattern is valid"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9]{9,15}$").expect("phone pattern is valid"))
}

/// Which provider handles each payment method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: HashMap<PaymentMethod, ProviderName>,
}

impl Default for RouteTable {
    fn default() -> Self {
        let routes = HashMap::from([
            (PaymentMethod::Mpesa, ProviderName::Mpesa),
            (PaymentMethod::Airtel, ProviderName::Airtel),
            (PaymentMethod::Card, ProviderName::Dpo),
            (PaymentMethod::Bank, ProviderName::Pesapal),
            (PaymentMethod::CardBank, ProviderName::Pesapal),
        ]);
        Self { routes }
    }
}

impl RouteTable {
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn with_route(mut self, method: PaymentMethod, provider: ProviderName) -> Self {
        self.routes.insert(method, provider);
        self
    }

    /// Parse `method=provider` pairs separated by commas, e.g. `card=pesapal,mpesa=dpo`
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut table = Self::empty();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (method, provider) = entry
                .split_once('=')
                .ok_or_else(|| format!("route '{}' must look like method=provider", entry))?;
            let method: PaymentMethod = method.trim().parse()?;
            let provider: ProviderName = provider.parse()?;
            table.routes.insert(method, provider);
        }

        if table.routes.is_empty() {
            return Err("route table must contain at least one route".to_string());
        }
        Ok(table)
    }

    pub fn resolve(&self, method: PaymentMethod) -> Option<ProviderName> {
        self.routes.get(&method).copied()
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderName> + '_ {
        self.routes.values().copied()
    }
}

/// Configuration for every provider the gateway can reach
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub airtel: AirtelConfig,
    pub dpo: DpoConfig,
    pub pesapal: PesapalConfig,
    pub mpesa: MpesaConfig,
}

impl ProvidersConfig {
    pub fn from_env() -> Self {
        Self {
            airtel: AirtelConfig::from_env(),
            dpo: DpoConfig::from_env(),
            pesapal: PesapalConfig::from_env(),
            mpesa: MpesaConfig::from_env(),
        }
    }
}

/// Payment aggregator gateway
pub struct PaymentGateway {
    providers: HashMap<ProviderName, Arc<dyn PaymentProvider>>,
    routes: RouteTable,
}

impl PaymentGateway {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            providers: HashMap::new(),
            routes,
        }
    }

    /// Register an adapter, replacing any previous adapter with the same name
    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    /// Build a gateway with all four adapters sharing one HTTP client
    pub fn from_config(
        config: ProvidersConfig,
        routes: RouteTable,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = build_http_client(timeout)?;

        let gateway = Self::new(routes)
            .with_provider(Arc::new(AirtelProvider::new(config.airtel, client.clone())))
            .with_provider(Arc::new(DpoProvider::new(config.dpo, client.clone())))
            .with_provider(Arc::new(PesapalProvider::new(config.pesapal, client.clone())))
            .with_provider(Arc::new(MpesaProvider::new(config.mpesa, client)));

        for provider in gateway.providers.values() {
            if !provider.has_webhook_secret() {
                warn!(
                    "No webhook secret configured for {}: callbacks will not be signature-checked",
                    provider.name()
                );
            }
            if !provider.is_live() {
                info!("{} has no credentials: responses will be synthesized", provider.name());
            }
        }

        Ok(gateway)
    }

    pub fn provider(&self, name: ProviderName) -> Option<&Arc<dyn PaymentProvider>> {
        self.providers.get(&name)
    }

    /// Registered adapters, in a stable order
    pub fn providers(&self) -> Vec<&Arc<dyn PaymentProvider>> {
        ProviderName::ALL
            .iter()
            .filter_map(|name| self.providers.get(name))
            .collect()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Validate a request and pick the adapter that will serve it
    pub fn prepare(
        &self,
        request: &PaymentRequest,
    ) -> AppResult<(Arc<dyn PaymentProvider>, ValidatedPayment)> {
        let mut payment = validate_request(request)?;

        let provider_name = self.routes.resolve(payment.method).ok_or_else(|| {
            AppError::validation(
                "method",
                format!("payment method '{}' is not available", payment.method),
            )
        })?;
        let provider = self.providers.get(&provider_name).ok_or_else(|| {
            AppError::validation(
                "method",
                format!("payment method '{}' is not available", payment.method),
            )
        })?;

        let method = provider.remap_method(payment.method);
        if !provider.supported_methods().contains(&method) {
            return Err(AppError::validation(
                "method",
                format!("{} does not accept method '{}'", provider_name, method),
            ));
        }
        if let Some(currencies) = provider.supported_currencies() {
            if !currencies.contains(&payment.currency.as_str()) {
                return Err(AppError::validation(
                    "currency",
                    format!(
                        "{} only accepts {}, got {}",
                        provider_name,
                        currencies.join(", "),
                        payment.currency
                    ),
                ));
            }
        }
        if method != payment.method {
            debug!(
                "Remapped method {} to {} for {}",
                payment.method, method, provider_name
            );
            payment.method = method;
        }

        Ok((Arc::clone(provider), payment))
    }

    /// Validate, dispatch to exactly one adapter and return its response
    pub async fn initiate(&self, request: &PaymentRequest) -> AppResult<PaymentResponse> {
        let (provider, payment) = self.prepare(request)?;

        info!(
            "Dispatching {} payment {} to {}",
            payment.method,
            payment.transaction_id,
            provider.name()
        );
        provider.initiate_payment(&payment).await
    }
}

/// Check a raw request against the payment contract
pub fn validate_request(request: &PaymentRequest) -> AppResult<ValidatedPayment> {
    let method: PaymentMethod = request
        .method
        .trim()
        .parse()
        .map_err(|e: String| AppError::validation("method", e))?;

    if request.user_id.trim().is_empty() {
        return Err(AppError::validation("user_id", "must not be empty"));
    }

    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(AppError::validation("amount", "must be greater than zero"));
    }

    if !currency_pattern().is_match(&request.currency) {
        return Err(AppError::validation(
            "currency",
            format!("'{}' is not a 3-letter currency code", request.currency),
        ));
    }

    let phone_number = request
        .phone_number
        .as_deref()
        .map(|p| p.trim().replace(' ', ""))
        .filter(|p| !p.is_empty());

    if method.requires_phone() && phone_number.is_none() {
        return Err(AppError::validation(
            "phone_number",
            format!("required for {} payments", method),
        ));
    }
    if let Some(phone) = &phone_number {
        if !phone_pattern().is_match(phone) {
            return Err(AppError::validation(
                "phone_number",
                format!("'{}' is not a valid phone number", phone),
            ));
        }
    }

    match (method, &request.card_details) {
        (PaymentMethod::Card, None) => {
            return Err(AppError::validation("card_details", "required for card payments"))
        }
        (PaymentMethod::Card, Some(_)) | (_, None) => {}
        (other, Some(_)) => {
            return Err(AppError::validation(
                "card_details",
                format!("not accepted for {} payments", other),
            ))
        }
    }

    match (method, &request.bank_details) {
        (PaymentMethod::Bank, None) => {
            return Err(AppError::validation("bank_details", "required for bank payments"))
        }
        (PaymentMethod::Bank, Some(_)) | (_, None) => {}
        (other, Some(_)) => {
            return Err(AppError::validation(
                "bank_details",
                format!("not accepted for {} payments", other),
            ))
        }
    }

    Ok(ValidatedPayment {
        transaction_id: new_transaction_id(),
        user_id: request.user_id.trim().to_string(),
        amount: request.amount,
        currency: request.currency.to_uppercase(),
        method,
        order_id: request.order_id.clone(),
        description: request.description.clone(),
        phone_number,
        card_details: request.card_details.clone(),
        bank_details: request.bank_details.clone(),
    })
}
