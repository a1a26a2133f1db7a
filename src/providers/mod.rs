pub mod anthropic;
pub mod local;
pub mod mock;
pub mod openai;
pub mod parse;
pub mod patterns;
pub mod prompt;
pub mod risk;
pub mod types;

pub use anthropic::*;
pub use local::*;
pub use mock::*;
pub use openai::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one backend operation, before it is folded into the
/// result envelope. Never crosses the contract boundary as `Err` —
/// the provided wrapper methods on [`types::AiProvider`] convert it
/// into `success=false` plus this value.
///
/// `Display` output is `category: detail`; `category()` gives the
/// stable string callers key retry decisions on.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderError {
    #[error("auth: {0}")]
    Auth(String),

    #[error("quota_exceeded: {0}")]
    QuotaExceeded(String),

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("timeout: no reply within {0}s")]
    Timeout(u64),

    #[error("connection: {0}")]
    Connection(String),

    #[error("malformed_response: {0}")]
    MalformedResponse(String),

    #[error("insufficient_data: grounding context inadequate to answer")]
    InsufficientContext,

    #[error("internal: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Stable error category, safe to log and match on.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::Overloaded(_) => "overloaded",
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::MalformedResponse(_) => "malformed_response",
            Self::InsufficientContext => "insufficient_data",
            Self::Internal(_) => "internal",
        }
    }

    /// Worth retrying against the same backend after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Overloaded(_) | Self::Timeout(_) | Self::Connection(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_stable_category_prefix() {
        let err = ProviderError::QuotaExceeded("monthly token budget spent".into());
        assert!(err.to_string().starts_with("quota_exceeded:"));
        assert_eq!(err.category(), "quota_exceeded");
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Overloaded("503".into()).is_transient());
        assert!(ProviderError::Timeout(30).is_transient());
        assert!(ProviderError::Connection("refused".into()).is_transient());
        assert!(!ProviderError::Auth("bad key".into()).is_transient());
        assert!(!ProviderError::InsufficientContext.is_transient());
        assert!(!ProviderError::MalformedResponse("not json".into()).is_transient());
    }
}
