//! Scriptable provider for tests: replays a queue of canned outcomes,
//! then repeats its default reply. Lives in non-test code so orchestration
//! and fallback tests across modules can share it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{
    AiProvider, EntityReply, ProcessingRequest, PromptReply, RequestOptions, RiskAssessment,
    RiskReply,
};
use super::ProviderError;
use crate::models::PatientData;

pub struct MockProvider {
    name: &'static str,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_reply: Result<String, ProviderError>,
    calls: AtomicU32,
}

impl MockProvider {
    /// Always succeeds with the given reply text.
    pub fn succeeding(name: &'static str, reply: &str) -> Self {
        Self {
            name,
            script: Mutex::new(VecDeque::new()),
            default_reply: Ok(reply.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    /// Always fails with the given error.
    pub fn failing(name: &'static str, error: ProviderError) -> Self {
        Self {
            name,
            script: Mutex::new(VecDeque::new()),
            default_reply: Err(error),
            calls: AtomicU32::new(0),
        }
    }

    /// Replays `outcomes` in order, then falls back to the default reply.
    pub fn scripted(
        name: &'static str,
        outcomes: Vec<Result<String, ProviderError>>,
        default_reply: &str,
    ) -> Self {
        Self {
            name,
            script: Mutex::new(outcomes.into()),
            default_reply: Ok(default_reply.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of inner operations attempted against this provider.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("mock script lock");
        script.pop_front().unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_model(&self) -> String {
        format!("{}-mock", self.name)
    }

    async fn process_prompt_inner(
        &self,
        _request: &ProcessingRequest,
    ) -> Result<PromptReply, ProviderError> {
        let text = self.next_outcome()?;
        Ok(PromptReply {
            text,
            json: None,
            tokens_used: 7,
            model: self.default_model(),
        })
    }

    async fn extract_entities_inner(
        &self,
        _text: &str,
        _options: &RequestOptions,
    ) -> Result<EntityReply, ProviderError> {
        self.next_outcome()?;
        Ok(EntityReply {
            entities: vec![],
            tokens_used: 7,
            model: self.default_model(),
        })
    }

    async fn analyze_risk_inner(
        &self,
        _patient: &PatientData,
        _options: &RequestOptions,
    ) -> Result<RiskReply, ProviderError> {
        self.next_outcome()?;
        Ok(RiskReply {
            assessment: RiskAssessment::default(),
            tokens_used: 7,
            model: self.default_model(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_replay_in_order() {
        let provider = MockProvider::scripted(
            "remote-a",
            vec![
                Err(ProviderError::Overloaded("busy".into())),
                Ok("second try".to_string()),
            ],
            "default",
        );
        let options = RequestOptions::default();

        let first = provider.process_prompt("p", "c", &options).await;
        assert!(!first.success);
        assert_eq!(first.error_category(), Some("overloaded"));

        let second = provider.process_prompt("p", "c", &options).await;
        assert!(second.success);
        assert_eq!(second.text, "second try");

        let third = provider.process_prompt("p", "c", &options).await;
        assert_eq!(third.text, "default");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn failing_mock_yields_failure_envelope_not_panic() {
        let provider = MockProvider::failing("broken", ProviderError::Auth("no key".into()));
        let result = provider
            .extract_entities("text", &RequestOptions::default())
            .await;
        assert!(!result.success);
        assert!(result.entities.is_empty());
        assert_eq!(result.metadata.provider, "broken");
    }
}
