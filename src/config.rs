use crate::payments::{ProvidersConfig, RouteTable};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: Option<RedisConfig>,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub providers: ProvidersConfig,
    pub routes: RouteTable,
    pub provider_timeout: Duration,
}

/// Bearer tokens accepted on the payment endpoints. Empty disables the guard.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub api_tokens: Vec<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_tokens.is_empty()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            routes: RouteTable::default(),
            provider_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let redis = env::var("REDIS_URL").ok().map(|url| RedisConfig { url });

        let routes = match env::var("GATEWAY_ROUTES") {
            Ok(raw) if !raw.trim().is_empty() => {
                RouteTable::parse(&raw).map_err(|e| anyhow!("GATEWAY_ROUTES is invalid: {}", e))?
            }
            _ => RouteTable::default(),
        };

        let timeout_secs: u64 = env::var("PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("PROVIDER_TIMEOUT_SECS must be a valid number")?;

        let gateway = GatewayConfig {
            providers: ProvidersConfig::from_env(),
            routes,
            provider_timeout: Duration::from_secs(timeout_secs),
        };

        let auth = AuthConfig {
            api_tokens: parse_token_list(&env::var("GATEWAY_API_TOKENS").unwrap_or_default()),
        };

        let config = Config {
            server,
            redis,
            gateway,
            auth,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if let Some(redis) = &self.redis {
            if redis.url.trim().is_empty() {
                return Err(anyhow!("REDIS_URL cannot be empty when set"));
            }
        }

        if self.gateway.provider_timeout.is_zero() {
            return Err(anyhow!("PROVIDER_TIMEOUT_SECS must be greater than 0"));
        }

        // Production must not accept unsigned callbacks or unauthenticated callers
        if self.server.environment == "production" {
            let providers = &self.gateway.providers;
            let unsigned: Vec<&str> = [
                ("airtel", providers.airtel.webhook_secret.is_some()),
                ("dpo", providers.dpo.webhook_secret.is_some()),
                ("pesapal", providers.pesapal.webhook_secret.is_some()),
                ("mpesa", providers.mpesa.webhook_secret.is_some()),
            ]
            .into_iter()
            .filter(|(_, signed)| !signed)
            .map(|(name, _)| name)
            .collect();

            if !unsigned.is_empty() {
                return Err(anyhow!(
                    "Webhook secrets are required in production, missing for: {}",
                    unsigned.join(", ")
                ));
            }

            if !self.auth.is_enabled() {
                return Err(anyhow!("GATEWAY_API_TOKENS must be set in production"));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_token_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::{PaymentMethod, ProviderName};

    fn config() -> Config {
        Config {
            server: ServerConfig::default(),
            redis: None,
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
        assert_eq!(config().socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_rejects_privileged_port() {
        let mut config = config();
        config.server.port = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_environment() {
        let mut config = config();
        config.server.environment = "qa".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("qa"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = config();
        config.gateway.provider_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_requires_webhook_secrets_and_tokens() {
        let mut config = config();
        config.server.environment = "production".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("airtel"));

        let providers = &mut config.gateway.providers;
        providers.airtel.webhook_secret = Some("a".to_string());
        providers.dpo.webhook_secret = Some("d".to_string());
        providers.pesapal.webhook_secret = Some("p".to_string());
        providers.mpesa.webhook_secret = Some("m".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GATEWAY_API_TOKENS"));

        config.auth.api_tokens = vec!["token-1".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_token_list() {
        assert_eq!(
            parse_token_list(" one, ,two ,"),
            vec!["one".to_string(), "two".to_string()]
        );
        assert!(parse_token_list("").is_empty());
    }

    #[test]
    fn test_route_override_parses() {
        let routes = RouteTable::parse("card=pesapal").unwrap();
        assert_eq!(routes.resolve(PaymentMethod::Card), Some(ProviderName::Pesapal));
        assert_eq!(routes.resolve(PaymentMethod::Mpesa), None);
    }
}
