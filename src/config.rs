use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use url::Url;

use crate::errors::ConfigError;
use crate::logger::{log, LogTag};
use crate::scheduler;

/// Prefix for environment variable overrides
const ENV_PREFIX: &str = "BALANCEBOT_";

/// Lowest port the health server may bind to
const MIN_HTTP_PORT: u16 = 1024;

/// One tracked token contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub label: String,
    #[serde(default)]
    pub address: String,
    /// Used when the on-chain decimals() call keeps failing
    #[serde(default)]
    pub fallback_decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    /// Legacy single-endpoint option, normalized into `rpc_urls` at load
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub wallets: Vec<String>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    /// Duration ("5m") or cron expression ("*/5 * * * *"); empty = one-shot
    #[serde(default)]
    pub interval: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_run_immediately")]
    pub run_immediately: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_run_immediately() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_urls: vec![],
            rpc_url: String::new(),
            wallets: vec![],
            tokens: vec![],
            interval: String::new(),
            timezone: default_timezone(),
            run_immediately: default_run_immediately(),
            log_level: default_log_level(),
            http_port: default_http_port(),
        }
    }
}

impl Config {
    /// Load the config file, fold in legacy options and environment
    /// overrides. Validation is a separate step so `--validate` can report
    /// all problems against the fully resolved configuration.
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path}"))?;

        config.normalize();
        config.apply_env_overrides();

        Ok(config)
    }

    /// Fold the legacy `rpc_url` scalar into `rpc_urls`.
    fn normalize(&mut self) {
        if self.rpc_urls.is_empty() && !self.rpc_url.is_empty() {
            self.rpc_urls = vec![self.rpc_url.clone()];
        }
        self.rpc_url.clear();
    }

    /// Environment variables override file values. List-valued keys take
    /// comma-separated strings with whitespace trimming.
    fn apply_env_overrides(&mut self) {
        if let Some(raw) = env_override("RPC_URLS") {
            self.rpc_urls = parse_list(&raw);
        }
        if let Some(raw) = env_override("WALLETS") {
            self.wallets = parse_list(&raw);
        }
        if let Some(raw) = env_override("INTERVAL") {
            self.interval = raw.trim().to_string();
        }
        if let Some(raw) = env_override("TIMEZONE") {
            self.timezone = raw.trim().to_string();
        }
        if let Some(raw) = env_override("RUN_IMMEDIATELY") {
            match parse_bool(&raw) {
                Some(value) => self.run_immediately = value,
                None => log(
                    LogTag::Config,
                    "WARN",
                    &format!("Ignoring non-boolean {}RUN_IMMEDIATELY={}", ENV_PREFIX, raw),
                ),
            }
        }
        if let Some(raw) = env_override("LOG_LEVEL") {
            self.log_level = raw.trim().to_lowercase();
        }
        if let Some(raw) = env_override("HTTP_PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.http_port = port,
                Err(_) => log(
                    LogTag::Config,
                    "WARN",
                    &format!("Ignoring non-numeric {}HTTP_PORT={}", ENV_PREFIX, raw),
                ),
            }
        }
    }

    /// Reject anything the rest of the system would choke on. Fatal at
    /// startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_urls.is_empty() {
            return Err(ConfigError::MissingRpcUrls);
        }
        for raw in &self.rpc_urls {
            let parsed = Url::parse(raw).map_err(|e| ConfigError::InvalidRpcUrl {
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidRpcUrl {
                    value: raw.clone(),
                    reason: format!("unsupported scheme {:?}", parsed.scheme()),
                });
            }
        }

        if self.wallets.is_empty() {
            return Err(ConfigError::NoWallets);
        }
        for wallet in &self.wallets {
            if !is_hex_address(wallet) {
                return Err(ConfigError::InvalidAddress {
                    field: "wallets".to_string(),
                    value: wallet.clone(),
                });
            }
        }

        // Tokens without an address are tolerated (skipped at tick time),
        // but a present address must be well-formed.
        for token in &self.tokens {
            if !token.address.is_empty() && !is_hex_address(&token.address) {
                return Err(ConfigError::InvalidAddress {
                    field: format!("tokens[{}]", token.label),
                    value: token.address.clone(),
                });
            }
        }

        scheduler::validate_interval(&self.interval)?;

        self.parsed_timezone()?;

        if self.http_port < MIN_HTTP_PORT {
            return Err(ConfigError::PortOutOfRange(self.http_port));
        }

        match self.log_level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }

        Ok(())
    }

    /// The configured IANA timezone.
    pub fn parsed_timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }
}

fn env_override(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}")).ok()
}

/// Comma-separated list with whitespace trimming; empty entries dropped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// 0x-prefixed, 40 hex digits.
pub fn is_hex_address(value: &str) -> bool {
    value.len() == 42
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            rpc_urls: vec!["https://rpc.gnosischain.com".to_string()],
            wallets: vec!["0x1234567890AbcdEF1234567890aBcdef12345678".to_string()],
            tokens: vec![TokenConfig {
                label: "USDC".to_string(),
                address: "0xDDAfbb505ad214D7b80b1f830fcCc89B60fb7A83".to_string(),
                fallback_decimals: 6,
            }],
            interval: "5m".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_legacy_rpc_url_normalized() {
        let mut config = Config {
            rpc_url: "https://rpc.gnosischain.com".to_string(),
            ..Config::default()
        };
        config.normalize();
        assert_eq!(config.rpc_urls, vec!["https://rpc.gnosischain.com"]);
        assert!(config.rpc_url.is_empty());
    }

    #[test]
    fn test_rpc_urls_win_over_legacy() {
        let mut config = Config {
            rpc_url: "https://legacy.example".to_string(),
            rpc_urls: vec!["https://primary.example".to_string()],
            ..Config::default()
        };
        config.normalize();
        assert_eq!(config.rpc_urls, vec!["https://primary.example"]);
    }

    #[test]
    fn test_parse_list_trims_whitespace() {
        assert_eq!(
            parse_list(" https://a.example , https://b.example ,, "),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_rejects_missing_rpc_urls() {
        let mut config = valid_config();
        config.rpc_urls.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRpcUrls)
        ));
    }

    #[test]
    fn test_rejects_bad_wallet_address() {
        let mut config = valid_config();
        config.wallets = vec!["0xnothex".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_tolerates_token_without_address() {
        let mut config = valid_config();
        config.tokens.push(TokenConfig {
            label: "placeholder".to_string(),
            address: String::new(),
            fallback_decimals: 18,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_interval() {
        let mut config = valid_config();
        config.interval = "7m".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let mut config = valid_config();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_rejects_privileged_port() {
        let mut config = valid_config();
        config.http_port = 80;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PortOutOfRange(80))
        ));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = valid_config();
        config.log_level = "trace".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_is_hex_address() {
        assert!(is_hex_address("0x1234567890abcdef1234567890abcdef12345678"));
        assert!(!is_hex_address("1234567890abcdef1234567890abcdef12345678"));
        assert!(!is_hex_address("0x1234"));
        assert!(!is_hex_address("0x1234567890abcdef1234567890abcdef1234567g"));
    }

    #[test]
    fn test_empty_interval_means_one_shot() {
        let mut config = valid_config();
        config.interval = String::new();
        assert!(config.validate().is_ok());
    }

    /// One test for all env interactions: parallel tests mutating the same
    /// process environment would race.
    #[test]
    fn test_env_overrides() {
        env::set_var(
            "BALANCEBOT_RPC_URLS",
            " https://a.example , https://b.example ",
        );
        env::set_var("BALANCEBOT_HTTP_PORT", "9090");
        env::set_var("BALANCEBOT_RUN_IMMEDIATELY", "false");

        let mut config = valid_config();
        config.apply_env_overrides();

        assert_eq!(
            config.rpc_urls,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.http_port, 9090);
        assert!(!config.run_immediately);

        // Unparseable values leave the previous setting in place.
        env::set_var("BALANCEBOT_HTTP_PORT", "not-a-port");
        env::set_var("BALANCEBOT_RUN_IMMEDIATELY", "perhaps");
        config.apply_env_overrides();
        assert_eq!(config.http_port, 9090);
        assert!(!config.run_immediately);

        env::remove_var("BALANCEBOT_RPC_URLS");
        env::remove_var("BALANCEBOT_HTTP_PORT");
        env::remove_var("BALANCEBOT_RUN_IMMEDIATELY");
    }
}
