// =============================================================================
// Credentials — broker app key/secret, account number, server selection
// =============================================================================
//
// Loaded once from the environment (spec.md §6) and immutable afterwards.
// `Debug` and `safe_repr()` both redact `app_key`/`app_secret` to a fixed
// `***` marker so a stray `{:?}` in a log line can never leak a secret —
// grounded on the teacher's `impl Debug for BinanceClient` in
// `binance/client.rs` and the original `APIConfig.get_headers()` masking.
// =============================================================================

use std::env;

use crate::error::CoreError;

const REDACTED: &str = "***";

/// Which broker environment requests are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Server {
    Paper,
    Live,
}

impl Server {
    pub fn rest_base_url(self) -> &'static str {
        match self {
            Server::Paper => "https://openapivts.koreainvestment.com:29443",
            Server::Live => "https://openapi.koreainvestment.com:9443",
        }
    }

    pub fn ws_url(self) -> &'static str {
        match self {
            Server::Paper => "ws://ops.koreainvestment.com:31000",
            Server::Live => "ws://ops.koreainvestment.com:21000",
        }
    }

    /// TR-ID prefix used to validate endpoint descriptors for this server:
    /// paper TR-IDs start with `V`, live with `T`.
    pub fn tr_id_prefix(self) -> char {
        match self {
            Server::Paper => 'V',
            Server::Live => 'T',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Server::Paper => "paper",
            Server::Live => "live",
        }
    }
}

impl std::str::FromStr for Server {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paper" => Ok(Server::Paper),
            "live" => Ok(Server::Live),
            other => Err(CoreError::Credential(format!(
                "SERVER must be 'paper' or 'live', got {other:?}"
            ))),
        }
    }
}

/// Immutable broker credentials, loaded once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub app_key: String,
    pub app_secret: String,
    pub account_number: String,
    pub account_product_code: String,
    pub server: Server,
}

impl Credentials {
    /// Load from the environment variables listed in spec.md §6.
    /// `ACCOUNT_PROD_CODE` defaults to `"01"` when unset.
    pub fn from_env() -> Result<Self, CoreError> {
        let app_key = require_env("APP_KEY")?;
        let app_secret = require_env("APP_SECRET")?;
        let account_number = require_env("ACCOUNT_NUMBER")?;
        let account_product_code =
            env::var("ACCOUNT_PROD_CODE").unwrap_or_else(|_| "01".to_string());
        let server: Server = env::var("SERVER")
            .unwrap_or_else(|_| "paper".to_string())
            .parse()?;

        Ok(Self {
            app_key,
            app_secret,
            account_number,
            account_product_code,
            server,
        })
    }

    /// A copy of `self` with all secret fields replaced by `***`, safe to
    /// log or include in a diagnostics dump.
    pub fn safe_repr(&self) -> String {
        format!(
            "Credentials {{ app_key: {REDACTED}, app_secret: {REDACTED}, account_number: {}-{}, server: {} }}",
            mask_account(&self.account_number),
            self.account_product_code,
            self.server.as_str(),
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.safe_repr())
    }
}

fn mask_account(account_number: &str) -> String {
    if account_number.len() <= 4 {
        REDACTED.to_string()
    } else {
        format!("{}{}", &account_number[..2], REDACTED)
    }
}

fn require_env(key: &str) -> Result<String, CoreError> {
    env::var(key).map_err(|_| CoreError::Credential(format!("missing required env var {key}")))
}
