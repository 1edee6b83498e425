// =============================================================================
// Error Taxonomy — typed errors propagated across the core's public surface
// =============================================================================
//
// Every public method on the broker client, cache, selector and sell engine
// returns `Result<T, CoreError>` rather than panicking or bubbling a raw
// `anyhow::Error` — callers match on `CoreError` to decide whether to retry,
// degrade, or surface the failure to a human. `anyhow` is still used inside
// `main.rs` and other startup/bootstrap code, the same split the teacher
// draws between `binance::client` (typed-ish via `anyhow::Result`, but never
// panics) and its own orchestration loop.
//
// Propagation policy (kept in sync with spec.md §7):
//   - CredentialError is fatal at startup only; nothing below main() should
//     construct one once the process is running.
//   - TokenRefreshError, RateLimitError and TransientNetworkError are
//     retryable; the REST client exhausts its retry budget internally and
//     only returns them once retries are spent.
//   - ValidationError is immediate and non-retryable.
//   - BrokerLogicError carries the broker's own error code/message.
//   - CacheBackendError never reaches a caller: the cache demotes to the LRU
//     fallback and continues.
// =============================================================================

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Crate-wide error type returned by public, non-startup APIs.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("credential error: {0}")]
    Credential(String),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("rate limited by broker (code {code}), retry after {retry_after:?}")]
    RateLimit {
        code: String,
        retry_after: Duration,
    },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("broker rejected request: [{error_code}] {message}")]
    BrokerLogic { error_code: String, message: String },

    #[error("cache backend error: {0}")]
    CacheBackend(String),

    #[error("operation misused: {0}")]
    Misuse(String),
}

impl CoreError {
    /// `true` when a caller-level retry loop should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::TokenRefresh(_)
                | CoreError::RateLimit { .. }
                | CoreError::TransientNetwork(_)
        )
    }

    /// Machine-readable error code, mirroring spec.md §7's
    /// `{success: false, error_code, message}` shape for business callers.
    pub fn error_code(&self) -> &str {
        match self {
            CoreError::Credential(_) => "CREDENTIAL_ERROR",
            CoreError::TokenRefresh(_) => "TOKEN_REFRESH_ERROR",
            CoreError::RateLimit { code, .. } => code,
            CoreError::TransientNetwork(_) => "TRANSIENT_NETWORK_ERROR",
            CoreError::Validation { .. } => "VALIDATION_ERROR",
            CoreError::BrokerLogic { error_code, .. } => error_code,
            CoreError::CacheBackend(_) => "CACHE_BACKEND_ERROR",
            CoreError::Misuse(_) => "MISUSE_ERROR",
        }
    }
}

/// Structured context attached to every logged error, per spec.md §7.
///
/// `trace_id` is generated once per outermost business operation (a
/// selection run, a sell-engine evaluation pass, an order placement) and
/// carried through `tracing` spans rather than threaded explicitly through
/// every function signature.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub operation: String,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub elapsed_ms: u64,
    pub trace_id: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            component: component.into(),
            code: None,
            elapsed_ms: 0,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(CoreError::TokenRefresh("x".into()).is_retryable());
        assert!(CoreError::RateLimit {
            code: "EGW00201".into(),
            retry_after: Duration::from_secs(10)
        }
        .is_retryable());
        assert!(CoreError::TransientNetwork("timeout".into()).is_retryable());
        assert!(!CoreError::Validation {
            message: "bad code".into()
        }
        .is_retryable());
        assert!(!CoreError::Credential("missing".into()).is_retryable());
    }

    #[test]
    fn error_code_surfaces_broker_code() {
        let e = CoreError::BrokerLogic {
            error_code: "APBK0919".into(),
            message: "insufficient balance".into(),
        };
        assert_eq!(e.error_code(), "APBK0919");
    }

    #[test]
    fn context_carries_trace_id() {
        let ctx = ErrorContext::new("place_order", "rest_client").with_code("VALIDATION_ERROR");
        assert!(!ctx.trace_id.is_empty());
        assert_eq!(ctx.code.as_deref(), Some("VALIDATION_ERROR"));
    }
}
