use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AiTask;

/// Provenance of the model that produced an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub name: String,
    pub temperature: f32,
}

/// A span of generated text flagged as potentially ungrounded.
/// Computed by the (external) safety layer and stored for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationFlag {
    pub reason: String,
    pub span: String,
}

/// One immutable AI analysis record, scoped to `(patient_id, task)`.
///
/// Versions within a scope form a gap-free increasing sequence starting
/// at 1. Records are never updated or deleted; corrections are appended
/// as new versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalAiOutput {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub document_ids: Vec<Uuid>,
    pub task: AiTask,
    /// Exact context given to the provider, kept for audit/replay.
    pub input_context: String,
    pub output_text: String,
    pub output_json: Option<serde_json::Value>,
    pub model: ModelInfo,
    pub version: i64,
    pub hallucination_flags: Vec<HallucinationFlag>,
    pub tokens_used: u32,
    pub latency_ms: u64,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Insert payload for the versioned store. `version: None` means
/// "assign the next version for the scope at insert time".
#[derive(Debug, Clone)]
pub struct NewAiOutput {
    pub patient_id: Uuid,
    pub document_ids: Vec<Uuid>,
    pub task: AiTask,
    pub input_context: String,
    pub output_text: String,
    pub output_json: Option<serde_json::Value>,
    pub model: ModelInfo,
    pub version: Option<i64>,
    pub hallucination_flags: Vec<HallucinationFlag>,
    pub tokens_used: u32,
    pub latency_ms: u64,
    pub created_by: Uuid,
}
