//! Caller-level retry and fallback.
//!
//! The fallback policy is a first-class sequence: an ordered list of
//! provider names walked by one loop that attempts a call, classifies
//! the failure, and either backs off and retries, moves to the next
//! provider, or stops. The orchestrator below this layer never retries.
//!
//! Classification rules:
//! - transient (overloaded / timeout / connection): exponential backoff
//!   with jitter, up to `max_attempts` per provider, then next provider
//! - insufficient_data: stop immediately — more retries cannot add
//!   grounding context, and neither can another provider
//! - anything else (auth, quota, malformed): next provider at once

use std::time::Duration;

use rand::Rng;

use super::{Orchestrator, OrchestratorError};
use crate::models::AiTask;
use crate::providers::{ProcessingResult, ProviderError, RequestOptions};

/// Backoff schedule for transient failures against one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based attempt that just failed):
    /// base * 2^(attempt-1), with up to 25% jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms.saturating_mul(1 << (attempt - 1).min(8));
        let jitter = if base == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base / 4)
        };
        Duration::from_millis(base + jitter)
    }
}

/// Walk `chain` in order until one provider yields a usable envelope.
///
/// Returns the first successful envelope, or the insufficiency envelope
/// the moment it appears, or the last failure envelope once the chain is
/// exhausted. Each attempt is independent; nothing is carried between
/// them. A chain entry naming an unregistered provider raises as a
/// configuration error.
pub async fn process_with_fallback(
    orchestrator: &Orchestrator,
    chain: &[&str],
    policy: &RetryPolicy,
    task: AiTask,
    prompt: &str,
    context: &str,
    options: &RequestOptions,
) -> Result<ProcessingResult, OrchestratorError> {
    if chain.is_empty() {
        return Err(OrchestratorError::NoProviderAvailable);
    }

    let mut last_result = None;

    for provider_name in chain {
        let mut provider_options = options.clone();
        provider_options.provider = Some(provider_name.to_string());

        for attempt in 1..=policy.max_attempts {
            let result = orchestrator
                .process(task, prompt, context, &provider_options)
                .await?;

            if result.success {
                return Ok(result);
            }

            match &result.error {
                Some(ProviderError::InsufficientContext) => {
                    tracing::info!(
                        task = task.as_str(),
                        provider = *provider_name,
                        "Provider reported insufficient grounding context"
                    );
                    return Ok(result);
                }
                Some(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        task = task.as_str(),
                        provider = *provider_name,
                        category = e.category(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, backing off"
                    );
                    last_result = Some(result);
                    tokio::time::sleep(delay).await;
                }
                Some(e) => {
                    tracing::warn!(
                        task = task.as_str(),
                        provider = *provider_name,
                        category = e.category(),
                        "Provider failed, moving to next in chain"
                    );
                    last_result = Some(result);
                    break;
                }
                None => {
                    // success=false without an error value does not occur for
                    // contract-conforming providers; treat as non-retryable.
                    last_result = Some(result);
                    break;
                }
            }
        }
    }

    // Chain exhausted: surface the last failure envelope.
    last_result.ok_or(OrchestratorError::NoProviderAvailable)
}
