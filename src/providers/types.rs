//! Provider contract: the three operations every backend exposes, the
//! result envelopes they return, and the shared wrapper that stamps
//! timing/provenance metadata and folds faults into `success=false`.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderError;
use crate::models::{EntityType, PatientData};

/// Per-call tuning knobs. `provider: None` means "orchestration default".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 1024,
        }
    }
}

impl RequestOptions {
    pub fn for_provider(name: &str) -> Self {
        Self {
            provider: Some(name.to_string()),
            ..Default::default()
        }
    }
}

/// Ephemeral request handed to `process_prompt_inner`. Not persisted.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub prompt: String,
    pub context: String,
    pub options: RequestOptions,
}

/// Provenance and timing stamped on every envelope, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub provider: String,
    pub model: String,
    pub tokens_used: u32,
    pub processing_time_ms: u64,
    pub temperature: f32,
    pub top_p: f32,
}

/// Uniform envelope for `process_prompt`. Always returned, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub text: String,
    pub json: Option<serde_json::Value>,
    pub metadata: ResultMetadata,
    pub error: Option<ProviderError>,
}

impl ProcessingResult {
    pub fn error_category(&self) -> Option<&'static str> {
        self.error.as_ref().map(|e| e.category())
    }
}

/// One recognized entity with exact character offsets into the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    pub entity_type: EntityType,
    pub confidence: f32,
    pub start: usize,
    pub end: usize,
}

/// Envelope for `extract_entities`. `entities` is empty, never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityExtractionResult {
    pub success: bool,
    pub entities: Vec<ExtractedEntity>,
    pub metadata: ResultMetadata,
    pub error: Option<ProviderError>,
}

/// One scored contributor to the overall risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    /// 0–10 contribution of this factor.
    pub score: f32,
    pub confidence: f32,
    pub evidence: Vec<String>,
}

/// Provider-agnostic risk assessment payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_factors: Vec<RiskFactor>,
    /// Sum of factor scores, clamped to [0, 10].
    pub overall_risk: f32,
    pub recommendations: Vec<String>,
}

/// Envelope for `analyze_risk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysisResult {
    pub success: bool,
    pub risk_factors: Vec<RiskFactor>,
    pub overall_risk: f32,
    pub recommendations: Vec<String>,
    pub metadata: ResultMetadata,
    pub error: Option<ProviderError>,
}

/// Successful inner reply for `process_prompt`.
#[derive(Debug, Clone)]
pub struct PromptReply {
    pub text: String,
    pub json: Option<serde_json::Value>,
    pub tokens_used: u32,
    pub model: String,
}

/// Successful inner reply for `extract_entities`.
#[derive(Debug, Clone)]
pub struct EntityReply {
    pub entities: Vec<ExtractedEntity>,
    pub tokens_used: u32,
    pub model: String,
}

/// Successful inner reply for `analyze_risk`.
#[derive(Debug, Clone)]
pub struct RiskReply {
    pub assessment: RiskAssessment,
    pub tokens_used: u32,
    pub model: String,
}

/// Capability interface every backend implements.
///
/// Implementers supply only the `*_inner` operations; the provided
/// methods wrap them with wall-clock timing, uniform provenance
/// stamping, and fault-to-envelope conversion. Callers go through the
/// provided methods and always get a well-formed envelope back.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Registry name, e.g. "local", "openai", "anthropic".
    fn name(&self) -> &'static str;

    /// Model used when the request does not override one.
    fn default_model(&self) -> String;

    async fn process_prompt_inner(
        &self,
        request: &ProcessingRequest,
    ) -> Result<PromptReply, ProviderError>;

    async fn extract_entities_inner(
        &self,
        text: &str,
        options: &RequestOptions,
    ) -> Result<EntityReply, ProviderError>;

    async fn analyze_risk_inner(
        &self,
        patient: &PatientData,
        options: &RequestOptions,
    ) -> Result<RiskReply, ProviderError>;

    async fn process_prompt(
        &self,
        prompt: &str,
        context: &str,
        options: &RequestOptions,
    ) -> ProcessingResult {
        let started = Instant::now();
        let request = ProcessingRequest {
            prompt: prompt.to_string(),
            context: context.to_string(),
            options: options.clone(),
        };

        match self.process_prompt_inner(&request).await {
            Ok(reply) => ProcessingResult {
                success: true,
                text: reply.text,
                json: reply.json,
                metadata: self.stamp(reply.model, reply.tokens_used, started, options),
                error: None,
            },
            Err(e) => {
                tracing::warn!(provider = self.name(), category = e.category(), "process_prompt failed");
                ProcessingResult {
                    success: false,
                    text: String::new(),
                    json: None,
                    metadata: self.stamp(self.requested_model(options), 0, started, options),
                    error: Some(e),
                }
            }
        }
    }

    async fn extract_entities(
        &self,
        text: &str,
        options: &RequestOptions,
    ) -> EntityExtractionResult {
        let started = Instant::now();

        match self.extract_entities_inner(text, options).await {
            Ok(reply) => EntityExtractionResult {
                success: true,
                entities: reply.entities,
                metadata: self.stamp(reply.model, reply.tokens_used, started, options),
                error: None,
            },
            Err(e) => {
                tracing::warn!(provider = self.name(), category = e.category(), "extract_entities failed");
                EntityExtractionResult {
                    success: false,
                    entities: vec![],
                    metadata: self.stamp(self.requested_model(options), 0, started, options),
                    error: Some(e),
                }
            }
        }
    }

    async fn analyze_risk(
        &self,
        patient: &PatientData,
        options: &RequestOptions,
    ) -> RiskAnalysisResult {
        let started = Instant::now();

        match self.analyze_risk_inner(patient, options).await {
            Ok(reply) => RiskAnalysisResult {
                success: true,
                risk_factors: reply.assessment.risk_factors,
                overall_risk: reply.assessment.overall_risk,
                recommendations: reply.assessment.recommendations,
                metadata: self.stamp(reply.model, reply.tokens_used, started, options),
                error: None,
            },
            Err(e) => {
                tracing::warn!(provider = self.name(), category = e.category(), "analyze_risk failed");
                RiskAnalysisResult {
                    success: false,
                    risk_factors: vec![],
                    overall_risk: 0.0,
                    recommendations: vec![],
                    metadata: self.stamp(self.requested_model(options), 0, started, options),
                    error: Some(e),
                }
            }
        }
    }

    /// Model to report when an operation failed before one was chosen.
    fn requested_model(&self, options: &RequestOptions) -> String {
        options.model.clone().unwrap_or_else(|| self.default_model())
    }

    /// Uniform metadata stamp: provider, model, usage, elapsed wall clock.
    fn stamp(
        &self,
        model: String,
        tokens_used: u32,
        started: Instant,
        options: &RequestOptions,
    ) -> ResultMetadata {
        ResultMetadata {
            provider: self.name().to_string(),
            model,
            tokens_used,
            processing_time_ms: started.elapsed().as_millis() as u64,
            temperature: options.temperature,
            top_p: options.top_p,
        }
    }
}
