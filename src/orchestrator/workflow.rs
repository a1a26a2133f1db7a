//! End-to-end task execution: build context, run the fallback chain,
//! persist one versioned record on success.
//!
//! Persistence only happens after a `success=true` envelope, so a
//! timeout or sentinel reply never leaves a partial record behind.
//! Callers that need a `Send` future (the run borrows a SQLite
//! connection across the await) can use [`process_with_fallback`]
//! plus [`record_success`] as separate steps instead.

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use super::fallback::{process_with_fallback, RetryPolicy};
use super::{Orchestrator, OrchestratorError};
use crate::db::{repository, DatabaseError};
use crate::models::{
    AiTask, ClinicalAiOutput, HallucinationFlag, ModelInfo, NewAiOutput, PatientData,
};
use crate::providers::{ProcessingResult, ProviderError, RequestOptions};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("insufficient grounding context for {0}")]
    InsufficientContext(AiTask),

    #[error("all providers failed: {0}")]
    ProvidersExhausted(ProviderError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// One clinical AI task to execute and record.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub patient_id: Uuid,
    pub document_ids: Vec<Uuid>,
    pub task: AiTask,
    pub prompt: String,
    /// Tuning for the provider call. `provider` is overridden per chain
    /// entry; model and sampling settings flow into the persisted record.
    pub options: RequestOptions,
    pub created_by: Uuid,
    /// Flags computed by the (external) safety layer over the draft
    /// output; stored verbatim on the record.
    pub hallucination_flags: Vec<HallucinationFlag>,
}

/// Convert a successful envelope into one appended versioned record.
pub fn record_success(
    conn: &Connection,
    run: &TaskRun,
    input_context: &str,
    result: &ProcessingResult,
) -> Result<ClinicalAiOutput, DatabaseError> {
    let new = NewAiOutput {
        patient_id: run.patient_id,
        document_ids: run.document_ids.clone(),
        task: run.task,
        input_context: input_context.to_string(),
        output_text: result.text.clone(),
        output_json: result.json.clone(),
        model: ModelInfo {
            provider: result.metadata.provider.clone(),
            name: result.metadata.model.clone(),
            temperature: result.metadata.temperature,
        },
        version: None,
        hallucination_flags: run.hallucination_flags.clone(),
        tokens_used: result.metadata.tokens_used,
        latency_ms: result.metadata.processing_time_ms,
        created_by: run.created_by,
    };
    repository::append(conn, &new)
}

/// Build the grounding context, run the provider chain, and append one
/// versioned record iff the chain produced a success. Failure envelopes
/// become typed errors and write nothing.
pub async fn run_and_record(
    orchestrator: &Orchestrator,
    conn: &Connection,
    chain: &[&str],
    policy: &RetryPolicy,
    run: &TaskRun,
    patient: &PatientData,
    document_texts: &[String],
) -> Result<ClinicalAiOutput, TaskError> {
    let context = orchestrator.build_context(patient, document_texts);

    let result = process_with_fallback(
        orchestrator,
        chain,
        policy,
        run.task,
        &run.prompt,
        &context,
        &run.options,
    )
    .await?;

    if result.success {
        return Ok(record_success(conn, run, &context, &result)?);
    }

    match result.error {
        Some(ProviderError::InsufficientContext) => {
            Err(TaskError::InsufficientContext(run.task))
        }
        Some(e) => Err(TaskError::ProvidersExhausted(e)),
        None => Err(TaskError::ProvidersExhausted(ProviderError::Internal(
            "failure envelope without error detail".to_string(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::sqlite::open_memory_database;
    use crate::orchestrator::ProviderRegistry;
    use crate::providers::{AiProvider, LocalRuleProvider, MockProvider};

    fn no_delay() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 0,
        }
    }

    fn soap_note_run(patient_id: Uuid) -> TaskRun {
        TaskRun {
            patient_id,
            document_ids: vec![Uuid::new_v4()],
            task: AiTask::SoapNote,
            prompt: "Draft a SOAP note from the documented encounter.".to_string(),
            options: RequestOptions::default(),
            created_by: Uuid::new_v4(),
            hallucination_flags: vec![],
        }
    }

    fn orchestrator_with(providers: Vec<Arc<dyn AiProvider>>) -> Orchestrator {
        Orchestrator::new(ProviderRegistry::new(providers).unwrap())
    }

    #[tokio::test]
    async fn success_appends_versioned_record() {
        let conn = open_memory_database().unwrap();
        let orchestrator = orchestrator_with(vec![Arc::new(MockProvider::succeeding(
            "remote-a",
            "S: ... O: ... A: ... P: ...",
        ))]);
        let patient_id = Uuid::new_v4();
        let patient = PatientData {
            patient_id,
            ..Default::default()
        };

        for expected_version in 1..=3 {
            let record = run_and_record(
                &orchestrator,
                &conn,
                &["remote-a"],
                &no_delay(),
                &soap_note_run(patient_id),
                &patient,
                &["Encounter note text.".to_string()],
            )
            .await
            .unwrap();

            assert_eq!(record.version, expected_version);
            assert_eq!(record.model.provider, "remote-a");
            assert!(record.input_context.contains("== DOCUMENTS =="));
        }

        let latest = repository::latest(&conn, &patient_id, AiTask::SoapNote)
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 3);
    }

    #[tokio::test]
    async fn sentinel_writes_nothing() {
        let conn = open_memory_database().unwrap();
        let orchestrator = orchestrator_with(vec![Arc::new(MockProvider::failing(
            "remote-a",
            ProviderError::InsufficientContext,
        ))]);
        let patient_id = Uuid::new_v4();
        let patient = PatientData {
            patient_id,
            ..Default::default()
        };

        let err = run_and_record(
            &orchestrator,
            &conn,
            &["remote-a"],
            &no_delay(),
            &soap_note_run(patient_id),
            &patient,
            &[],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TaskError::InsufficientContext(AiTask::SoapNote)));
        assert!(repository::latest(&conn, &patient_id, AiTask::SoapNote)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn exhausted_chain_writes_nothing() {
        let conn = open_memory_database().unwrap();
        let orchestrator = orchestrator_with(vec![Arc::new(MockProvider::failing(
            "remote-a",
            ProviderError::QuotaExceeded("spent".into()),
        ))]);
        let patient_id = Uuid::new_v4();
        let patient = PatientData {
            patient_id,
            ..Default::default()
        };

        let err = run_and_record(
            &orchestrator,
            &conn,
            &["remote-a"],
            &no_delay(),
            &soap_note_run(patient_id),
            &patient,
            &[],
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            TaskError::ProvidersExhausted(ProviderError::QuotaExceeded(_))
        ));
        assert!(repository::history(&conn, &patient_id, AiTask::SoapNote)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn fallback_to_local_still_records() {
        let conn = open_memory_database().unwrap();
        let orchestrator = orchestrator_with(vec![
            Arc::new(MockProvider::failing(
                "remote-a",
                ProviderError::Connection("refused".into()),
            )),
            Arc::new(LocalRuleProvider::new()),
        ]);
        let patient_id = Uuid::new_v4();
        let patient = PatientData {
            patient_id,
            ..Default::default()
        };

        let mut run = soap_note_run(patient_id);
        run.task = AiTask::MedicationSafety;
        run.prompt = "Review the medication list for safety issues.".to_string();

        let record = run_and_record(
            &orchestrator,
            &conn,
            &["remote-a", "local"],
            &no_delay(),
            &run,
            &patient,
            &["Takes warfarin 5mg daily.".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(record.model.provider, "local");
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn request_options_flow_into_the_record() {
        let conn = open_memory_database().unwrap();
        let orchestrator =
            orchestrator_with(vec![Arc::new(MockProvider::succeeding("remote-a", "ok"))]);
        let patient_id = Uuid::new_v4();
        let patient = PatientData {
            patient_id,
            ..Default::default()
        };

        let mut run = soap_note_run(patient_id);
        run.options.temperature = 0.7;

        let record = run_and_record(
            &orchestrator,
            &conn,
            &["remote-a"],
            &no_delay(),
            &run,
            &patient,
            &[],
        )
        .await
        .unwrap();

        assert!((record.model.temperature - 0.7).abs() < f32::EPSILON);
        let read = repository::latest(&conn, &patient_id, AiTask::SoapNote)
            .unwrap()
            .unwrap();
        assert!((read.model.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn hallucination_flags_are_persisted() {
        let conn = open_memory_database().unwrap();
        let orchestrator =
            orchestrator_with(vec![Arc::new(MockProvider::succeeding("remote-a", "ok"))]);
        let patient_id = Uuid::new_v4();
        let patient = PatientData {
            patient_id,
            ..Default::default()
        };

        let mut run = soap_note_run(patient_id);
        run.hallucination_flags = vec![HallucinationFlag {
            reason: "value not present in context".to_string(),
            span: "BP 180/110".to_string(),
        }];

        let record = run_and_record(
            &orchestrator,
            &conn,
            &["remote-a"],
            &no_delay(),
            &run,
            &patient,
            &[],
        )
        .await
        .unwrap();

        assert_eq!(record.hallucination_flags.len(), 1);
        let read = repository::latest(&conn, &patient_id, AiTask::SoapNote)
            .unwrap()
            .unwrap();
        assert_eq!(read.hallucination_flags, record.hallucination_flags);
    }
}
