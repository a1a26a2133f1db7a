//! Provider registry and orchestration manager.
//!
//! The registry is built once at startup from configuration and is
//! immutable afterwards; the orchestrator resolves a provider per call
//! (explicit request beats configured default) and exposes the three
//! contract operations plus the context builder. It never retries —
//! retry and fallback policy live a layer above, in [`fallback`].

pub mod context;
pub mod fallback;
pub mod workflow;

pub use context::build_patient_context;
pub use fallback::{process_with_fallback, RetryPolicy};
pub use workflow::{run_and_record, TaskError, TaskRun};

use std::sync::Arc;

use thiserror::Error;

use crate::config::AiConfig;
use crate::models::{AiTask, PatientData};
use crate::providers::{
    AiProvider, AnthropicProvider, EntityExtractionResult, LocalRuleProvider, OpenAiProvider,
    ProcessingResult, ProviderError, RequestOptions, RiskAnalysisResult, LOCAL_PROVIDER_NAME,
};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("provider '{requested}' is not registered (registered: {})", known.join(", "))]
    ProviderNotFound {
        requested: String,
        known: Vec<String>,
    },

    #[error("no provider is registered")]
    NoProviderAvailable,

    #[error("provider initialization failed: {0}")]
    ProviderInit(#[from] ProviderError),
}

/// Immutable set of registered providers, in registration order.
/// The default provider is the first remote, falling back to local.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AiProvider>>,
    default_name: String,
}

impl ProviderRegistry {
    /// Register providers from configuration. The local provider is
    /// always present; each remote registers iff credentials exist.
    pub fn from_config(config: &AiConfig) -> Result<Self, OrchestratorError> {
        let timeout = config.request_timeout_secs();
        let mut providers: Vec<Arc<dyn AiProvider>> = Vec::new();

        if let Some(credentials) = &config.openai {
            providers.push(Arc::new(OpenAiProvider::new(credentials, timeout)?));
        }
        if let Some(credentials) = &config.anthropic {
            providers.push(Arc::new(AnthropicProvider::new(credentials, timeout)?));
        }
        providers.push(Arc::new(LocalRuleProvider::new()));

        Self::new(providers)
    }

    /// Build from an explicit provider list (first non-local provider
    /// becomes the default, else local). Mainly for tests and embedders.
    pub fn new(providers: Vec<Arc<dyn AiProvider>>) -> Result<Self, OrchestratorError> {
        if providers.is_empty() {
            return Err(OrchestratorError::NoProviderAvailable);
        }
        let default_name = providers
            .iter()
            .find(|p| p.name() != LOCAL_PROVIDER_NAME)
            .unwrap_or(&providers[0])
            .name()
            .to_string();

        tracing::info!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            default = %default_name,
            "Provider registry initialized"
        );

        Ok(Self {
            providers,
            default_name,
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AiProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }
}

/// Orchestration manager: per-call provider resolution over an
/// immutable registry.
pub struct Orchestrator {
    registry: ProviderRegistry,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Explicit request wins; an unknown explicit name is a
    /// configuration error, never silently substituted.
    fn resolve(&self, options: &RequestOptions) -> Result<Arc<dyn AiProvider>, OrchestratorError> {
        let name = options
            .provider
            .as_deref()
            .unwrap_or_else(|| self.registry.default_name());

        self.registry
            .get(name)
            .ok_or_else(|| OrchestratorError::ProviderNotFound {
                requested: name.to_string(),
                known: self.registry.names(),
            })
    }

    /// Route a prompt to the resolved provider. The task tag is carried
    /// for logging and for the caller's persistence step.
    pub async fn process(
        &self,
        task: AiTask,
        prompt: &str,
        context: &str,
        options: &RequestOptions,
    ) -> Result<ProcessingResult, OrchestratorError> {
        let provider = self.resolve(options)?;
        tracing::debug!(task = task.as_str(), provider = provider.name(), "Dispatching prompt");
        Ok(provider.process_prompt(prompt, context, options).await)
    }

    pub async fn extract_entities(
        &self,
        text: &str,
        options: &RequestOptions,
    ) -> Result<EntityExtractionResult, OrchestratorError> {
        let provider = self.resolve(options)?;
        Ok(provider.extract_entities(text, options).await)
    }

    pub async fn analyze_risk(
        &self,
        patient: &PatientData,
        options: &RequestOptions,
    ) -> Result<RiskAnalysisResult, OrchestratorError> {
        let provider = self.resolve(options)?;
        Ok(provider.analyze_risk(patient, options).await)
    }

    /// Deterministic grounding context; see [`context::build_patient_context`].
    pub fn build_context(&self, patient: &PatientData, document_texts: &[String]) -> String {
        build_patient_context(patient, document_texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;

    fn registry_with(providers: Vec<Arc<dyn AiProvider>>) -> ProviderRegistry {
        ProviderRegistry::new(providers).unwrap()
    }

    fn local_only() -> Orchestrator {
        Orchestrator::new(registry_with(vec![Arc::new(LocalRuleProvider::new())]))
    }

    #[test]
    fn default_is_first_remote_when_present() {
        let registry = registry_with(vec![
            Arc::new(LocalRuleProvider::new()),
            Arc::new(MockProvider::succeeding("remote-a", "ok")),
            Arc::new(MockProvider::succeeding("remote-b", "ok")),
        ]);
        assert_eq!(registry.default_name(), "remote-a");
    }

    #[test]
    fn default_is_local_when_no_remote() {
        let registry = registry_with(vec![Arc::new(LocalRuleProvider::new())]);
        assert_eq!(registry.default_name(), LOCAL_PROVIDER_NAME);
    }

    #[test]
    fn empty_registry_is_rejected() {
        let result = ProviderRegistry::new(vec![]);
        assert!(matches!(result, Err(OrchestratorError::NoProviderAvailable)));
    }

    #[test]
    fn from_config_without_credentials_registers_local_only() {
        let registry = ProviderRegistry::from_config(&AiConfig::default()).unwrap();
        assert_eq!(registry.names(), vec![LOCAL_PROVIDER_NAME.to_string()]);
    }

    #[test]
    fn from_config_with_credentials_registers_remotes_first() {
        let credentials = crate::config::RemoteCredentials {
            api_key: "key".to_string(),
            base_url: None,
            model: None,
        };
        let config = AiConfig {
            openai: Some(credentials.clone()),
            anthropic: Some(credentials),
            request_timeout_secs: None,
        };
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "openai".to_string(),
                "anthropic".to_string(),
                LOCAL_PROVIDER_NAME.to_string()
            ]
        );
        assert_eq!(registry.default_name(), "openai");
    }

    #[tokio::test]
    async fn unknown_provider_fails_fast_naming_known_set() {
        let orchestrator = local_only();
        let options = RequestOptions::for_provider("medgemma");

        let err = orchestrator
            .process(AiTask::Summarization, "Summarize", "ctx", &options)
            .await
            .unwrap_err();

        match err {
            OrchestratorError::ProviderNotFound { requested, known } => {
                assert_eq!(requested, "medgemma");
                assert_eq!(known, vec![LOCAL_PROVIDER_NAME.to_string()]);
            }
            other => panic!("expected ProviderNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_provider_is_honored() {
        let orchestrator = Orchestrator::new(registry_with(vec![
            Arc::new(MockProvider::succeeding("remote-a", "from remote")),
            Arc::new(LocalRuleProvider::new()),
        ]));

        let result = orchestrator
            .process(
                AiTask::Summarization,
                "Summarize",
                "ctx",
                &RequestOptions::for_provider(LOCAL_PROVIDER_NAME),
            )
            .await
            .unwrap();

        assert_eq!(result.metadata.provider, LOCAL_PROVIDER_NAME);
    }

    #[tokio::test]
    async fn default_provider_used_when_unspecified() {
        let orchestrator = Orchestrator::new(registry_with(vec![
            Arc::new(LocalRuleProvider::new()),
            Arc::new(MockProvider::succeeding("remote-a", "from remote")),
        ]));

        let result = orchestrator
            .process(
                AiTask::Summarization,
                "Summarize",
                "ctx",
                &RequestOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.metadata.provider, "remote-a");
        assert_eq!(result.text, "from remote");
    }

    #[tokio::test]
    async fn provider_failure_stays_in_envelope() {
        let orchestrator = Orchestrator::new(registry_with(vec![Arc::new(
            MockProvider::failing("remote-a", ProviderError::QuotaExceeded("spent".into())),
        )]));

        let result = orchestrator
            .process(
                AiTask::SoapNote,
                "Draft a SOAP note",
                "ctx",
                &RequestOptions::default(),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_category(), Some("quota_exceeded"));
    }
}
