use std::env;

/// Application-level constants
pub const APP_NAME: &str = "clinscribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "info,clinscribe=debug".to_string()
}

/// Per-call HTTP timeout applied by the remote adapters.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Credentials and overrides for one remote backend. `base_url` and
/// `model` fall back to the adapter's own defaults when unset.
#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Which remote adapters can register, read once at startup. The local
/// provider needs no configuration and is always registered.
#[derive(Debug, Clone, Default)]
pub struct AiConfig {
    pub openai: Option<RemoteCredentials>,
    pub anthropic: Option<RemoteCredentials>,
    pub request_timeout_secs: Option<u64>,
}

impl AiConfig {
    /// Read provider credentials from the environment. A remote adapter
    /// registers iff its API key variable is present and non-empty.
    pub fn from_env() -> Self {
        Self {
            openai: remote_from_env("OPENAI_API_KEY", "OPENAI_BASE_URL", "OPENAI_MODEL"),
            anthropic: remote_from_env(
                "ANTHROPIC_API_KEY",
                "ANTHROPIC_BASE_URL",
                "ANTHROPIC_MODEL",
            ),
            request_timeout_secs: env::var("CLINSCRIBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

fn remote_from_env(key_var: &str, url_var: &str, model_var: &str) -> Option<RemoteCredentials> {
    let api_key = env::var(key_var).ok().filter(|k| !k.trim().is_empty())?;
    Some(RemoteCredentials {
        api_key,
        base_url: env::var(url_var).ok().filter(|v| !v.trim().is_empty()),
        model: env::var(model_var).ok().filter(|v| !v.trim().is_empty()),
    })
}
