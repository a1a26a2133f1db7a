//! Local rule-based provider.
//!
//! Network-independent terminal fallback. Prompt handling is a keyword
//! classifier over four clinical categories with canned, context-grounded
//! response text; entity extraction and risk scoring delegate to the
//! shared rule tables. Same input always produces the same output.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;

use super::patterns::{extract_with_rules, RULE_CONFIDENCE};
use super::risk::assess_risk;
use super::types::{
    AiProvider, EntityReply, ProcessingRequest, PromptReply, RequestOptions, RiskReply,
};
use super::ProviderError;
use crate::models::{EntityType, PatientData};

pub const LOCAL_PROVIDER_NAME: &str = "local";
pub const LOCAL_MODEL_NAME: &str = "rules-v1";

const NO_CATEGORY_DISCLAIMER: &str =
    "This request does not match a supported analysis category. The rule-based \
     engine answers diagnosis, treatment, medication, and risk questions from \
     documented data only; it does not generate free-form clinical text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptCategory {
    Diagnosis,
    Treatment,
    Medication,
    Risk,
}

/// Classify a prompt by keyword. First category whose keyword list
/// matches wins, checked in a fixed order so classification is
/// deterministic.
fn classify_prompt(prompt: &str) -> Option<PromptCategory> {
    let lower = prompt.to_lowercase();

    const DIAGNOSIS_KEYWORDS: &[&str] = &["diagnos", "differential", "etiology", "what condition"];
    const TREATMENT_KEYWORDS: &[&str] = &["treat", "therapy", "management plan", "intervention"];
    const MEDICATION_KEYWORDS: &[&str] = &["medicat", "drug", "prescri", "dose", "interaction"];
    const RISK_KEYWORDS: &[&str] = &["risk", "safety", "adverse", "contraindic"];

    let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if matches(DIAGNOSIS_KEYWORDS) {
        Some(PromptCategory::Diagnosis)
    } else if matches(TREATMENT_KEYWORDS) {
        Some(PromptCategory::Treatment)
    } else if matches(MEDICATION_KEYWORDS) {
        Some(PromptCategory::Medication)
    } else if matches(RISK_KEYWORDS) {
        Some(PromptCategory::Risk)
    } else {
        None
    }
}

/// List the context entities of the given types, in first-mention order
/// with repeats dropped, or a fixed placeholder when nothing matched.
fn documented(context: &str, types: &[EntityType]) -> String {
    let mut seen = HashSet::new();
    let found: Vec<String> = extract_with_rules(context, RULE_CONFIDENCE)
        .into_iter()
        .filter(|e| types.contains(&e.entity_type))
        .map(|e| e.text.to_lowercase())
        .filter(|term| seen.insert(term.clone()))
        .collect();

    if found.is_empty() {
        "none documented in the supplied context".to_string()
    } else {
        found.join(", ")
    }
}

fn canned_response(category: PromptCategory, context: &str) -> String {
    match category {
        PromptCategory::Diagnosis => format!(
            "Documented findings: {symptoms}. Documented diagnoses: {diagnoses}. \
             Any differential must be weighed against these documented items by a \
             clinician; this engine does not infer undocumented conditions.",
            symptoms = documented(context, &[EntityType::Symptom, EntityType::VitalSign]),
            diagnoses = documented(context, &[EntityType::Diagnosis]),
        ),
        PromptCategory::Treatment => format!(
            "Documented diagnoses: {diagnoses}. Documented procedures: {procedures}. \
             Treatment selection should follow the relevant clinical guideline for \
             the documented conditions; no regimen is generated beyond documented data.",
            diagnoses = documented(context, &[EntityType::Diagnosis]),
            procedures = documented(context, &[EntityType::Procedure]),
        ),
        PromptCategory::Medication => format!(
            "Documented medications: {medications}. Review each agent for indication, \
             dose appropriateness, and interactions against the documented list.",
            medications = documented(context, &[EntityType::Medication]),
        ),
        PromptCategory::Risk => format!(
            "Documented medications: {medications}. Documented findings: {symptoms}. \
             Use the structured risk analysis operation for a scored assessment of \
             this patient.",
            medications = documented(context, &[EntityType::Medication]),
            symptoms = documented(context, &[EntityType::Symptom]),
        ),
    }
}

/// Deterministic rule-based backend. Always registered; performs no I/O.
#[derive(Debug, Default)]
pub struct LocalRuleProvider;

impl LocalRuleProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AiProvider for LocalRuleProvider {
    fn name(&self) -> &'static str {
        LOCAL_PROVIDER_NAME
    }

    fn default_model(&self) -> String {
        LOCAL_MODEL_NAME.to_string()
    }

    async fn process_prompt_inner(
        &self,
        request: &ProcessingRequest,
    ) -> Result<PromptReply, ProviderError> {
        let text = match classify_prompt(&request.prompt) {
            Some(category) => canned_response(category, &request.context),
            None => NO_CATEGORY_DISCLAIMER.to_string(),
        };

        Ok(PromptReply {
            text,
            json: None,
            tokens_used: 0,
            model: LOCAL_MODEL_NAME.to_string(),
        })
    }

    async fn extract_entities_inner(
        &self,
        text: &str,
        _options: &RequestOptions,
    ) -> Result<EntityReply, ProviderError> {
        Ok(EntityReply {
            entities: extract_with_rules(text, RULE_CONFIDENCE),
            tokens_used: 0,
            model: LOCAL_MODEL_NAME.to_string(),
        })
    }

    async fn analyze_risk_inner(
        &self,
        patient: &PatientData,
        _options: &RequestOptions,
    ) -> Result<RiskReply, ProviderError> {
        let today = Utc::now().date_naive();
        Ok(RiskReply {
            assessment: assess_risk(patient, today, RULE_CONFIDENCE),
            tokens_used: 0,
            model: LOCAL_MODEL_NAME.to_string(),
        })
    }
}
