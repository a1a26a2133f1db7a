//! Clinscribe: AI provider orchestration and versioned output storage
//! for clinical documentation.
//!
//! The crate is layered bottom-up: `models` define the shared clinical
//! types, `providers` implement the uniform AI contract (local rules,
//! OpenAI, Anthropic), `orchestrator` routes requests and runs the
//! fallback chain, and `db` persists every successful output as an
//! append-only versioned record.

pub mod config;
pub mod db;
pub mod models;
pub mod orchestrator;
pub mod providers;

use tracing_subscriber::EnvFilter;

/// Initialize structured logging. `RUST_LOG` wins when set, otherwise
/// the built-in default filter applies. Call once at startup; embedders
/// with their own subscriber should skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
