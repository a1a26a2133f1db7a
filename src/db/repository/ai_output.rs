//! Versioned AI output store.
//!
//! Append-only: every completed AI operation becomes one immutable row,
//! numbered per `(patient_id, task)` scope. Version assignment is
//! read-then-insert guarded by a `UNIQUE (patient_id, task, version)`
//! constraint; on conflict the insert re-reads the scope maximum and
//! tries again, bounded by `VERSION_INSERT_ATTEMPTS`.

use std::str::FromStr;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{AiTask, ClinicalAiOutput, HallucinationFlag, ModelInfo, NewAiOutput};

/// How many times `append` re-derives the version after a unique-constraint
/// conflict before giving up.
const VERSION_INSERT_ATTEMPTS: u32 = 3;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Next version for the `(patient_id, task)` scope: current max + 1,
/// starting at 1 when the scope is empty.
pub fn next_version(
    conn: &Connection,
    patient_id: &Uuid,
    task: AiTask,
) -> Result<i64, DatabaseError> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM ai_outputs
         WHERE patient_id = ?1 AND task = ?2",
        params![patient_id.to_string(), task.as_str()],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Append one immutable output record.
///
/// With `version: None` the next version for the scope is derived at
/// insert time and re-derived on conflict. With an explicit version a
/// conflict is surfaced directly as `VersionConflict` — the caller asked
/// for a specific slot and it is taken.
pub fn append(conn: &Connection, new: &NewAiOutput) -> Result<ClinicalAiOutput, DatabaseError> {
    if let Some(version) = new.version {
        return insert_at_version(conn, new, version);
    }

    let mut attempt = 1;
    loop {
        let version = next_version(conn, &new.patient_id, new.task)?;
        match insert_at_version(conn, new, version) {
            Ok(record) => return Ok(record),
            Err(DatabaseError::VersionConflict { .. }) if attempt < VERSION_INSERT_ATTEMPTS => {
                tracing::warn!(
                    patient_id = %new.patient_id,
                    task = new.task.as_str(),
                    version,
                    attempt,
                    "Version conflict on append, re-deriving"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Latest record for a `(patient_id, task)` scope, if any.
pub fn latest(
    conn: &Connection,
    patient_id: &Uuid,
    task: AiTask,
) -> Result<Option<ClinicalAiOutput>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ai_outputs
         WHERE patient_id = ?1 AND task = ?2
         ORDER BY version DESC LIMIT 1"
    ))?;
    let mut rows = stmt.query_map(params![patient_id.to_string(), task.as_str()], map_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row_to_output(row?)?)),
        None => Ok(None),
    }
}

/// All versions for a `(patient_id, task)` scope, newest first.
pub fn history(
    conn: &Connection,
    patient_id: &Uuid,
    task: AiTask,
) -> Result<Vec<ClinicalAiOutput>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ai_outputs
         WHERE patient_id = ?1 AND task = ?2
         ORDER BY version DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string(), task.as_str()], map_row)?;
    collect_outputs(rows)
}

/// Latest version of every task that has output for the patient,
/// ordered by task name for a stable listing.
pub fn latest_per_task(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<ClinicalAiOutput>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ai_outputs o
         WHERE patient_id = ?1
           AND version = (SELECT MAX(version) FROM ai_outputs
                          WHERE patient_id = o.patient_id AND task = o.task)
         ORDER BY task ASC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], map_row)?;
    collect_outputs(rows)
}

// ──────────────────────────────────────────────
// Internal
// ──────────────────────────────────────────────

const COLUMNS: &str = "id, patient_id, document_ids, task, input_context, output_text, \
                       output_json, provider, model, temperature, version, \
                       hallucination_flags, tokens_used, latency_ms, created_by, \
                       created_at, updated_at";

fn insert_at_version(
    conn: &Connection,
    new: &NewAiOutput,
    version: i64,
) -> Result<ClinicalAiOutput, DatabaseError> {
    // Truncate to the precision TIMESTAMP_FORMAT persists, so the record
    // returned to the caller equals the one re-read from the store.
    let now = Utc::now().naive_utc().trunc_subsecs(3);
    let record = ClinicalAiOutput {
        id: Uuid::new_v4(),
        patient_id: new.patient_id,
        document_ids: new.document_ids.clone(),
        task: new.task,
        input_context: new.input_context.clone(),
        output_text: new.output_text.clone(),
        output_json: new.output_json.clone(),
        model: new.model.clone(),
        version,
        hallucination_flags: new.hallucination_flags.clone(),
        tokens_used: new.tokens_used,
        latency_ms: new.latency_ms,
        created_by: new.created_by,
        created_at: now,
        updated_at: now,
    };

    let document_ids_json = serde_json::to_string(
        &record
            .document_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>(),
    )?;
    let flags_json = serde_json::to_string(&record.hallucination_flags)?;
    let output_json = record
        .output_json
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let result = conn.execute(
        "INSERT INTO ai_outputs (id, patient_id, document_ids, task, input_context, \
         output_text, output_json, provider, model, temperature, version, \
         hallucination_flags, tokens_used, latency_ms, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            record.id.to_string(),
            record.patient_id.to_string(),
            document_ids_json,
            record.task.as_str(),
            record.input_context,
            record.output_text,
            output_json,
            record.model.provider,
            record.model.name,
            record.model.temperature as f64,
            record.version,
            flags_json,
            record.tokens_used,
            record.latency_ms as i64,
            record.created_by.to_string(),
            record.created_at.format(TIMESTAMP_FORMAT).to_string(),
            record.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    );

    match result {
        Ok(_) => {
            tracing::info!(
                patient_id = %record.patient_id,
                task = record.task.as_str(),
                version = record.version,
                provider = %record.model.provider,
                "Appended AI output"
            );
            Ok(record)
        }
        Err(e) if is_unique_violation(&e) => Err(DatabaseError::VersionConflict {
            patient_id: record.patient_id.to_string(),
            task: record.task.as_str().to_string(),
            version,
        }),
        Err(e) => Err(e.into()),
    }
}

// Only a UNIQUE violation means the version slot is taken; other
// constraint failures (CHECK, NOT NULL) must not be retried as conflicts.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

type OutputRow = (
    String,         // id
    String,         // patient_id
    String,         // document_ids json
    String,         // task
    String,         // input_context
    String,         // output_text
    Option<String>, // output_json
    String,         // provider
    String,         // model
    f64,            // temperature
    i64,            // version
    String,         // hallucination_flags json
    u32,            // tokens_used
    i64,            // latency_ms
    String,         // created_by
    String,         // created_at
    String,         // updated_at
);

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutputRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
        row.get(16)?,
    ))
}

fn collect_outputs(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<OutputRow>>,
) -> Result<Vec<ClinicalAiOutput>, DatabaseError> {
    let mut outputs = Vec::new();
    for row in rows {
        outputs.push(row_to_output(row?)?);
    }
    Ok(outputs)
}

fn row_to_output(row: OutputRow) -> Result<ClinicalAiOutput, DatabaseError> {
    let (
        id,
        patient_id,
        document_ids,
        task,
        input_context,
        output_text,
        output_json,
        provider,
        model,
        temperature,
        version,
        flags,
        tokens_used,
        latency_ms,
        created_by,
        created_at,
        updated_at,
    ) = row;

    let document_id_strings: Vec<String> = serde_json::from_str(&document_ids)?;
    let document_ids = document_id_strings
        .iter()
        .map(|s| parse_uuid(s))
        .collect::<Result<Vec<_>, _>>()?;
    let hallucination_flags: Vec<HallucinationFlag> = serde_json::from_str(&flags)?;
    let output_json = output_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(ClinicalAiOutput {
        id: parse_uuid(&id)?,
        patient_id: parse_uuid(&patient_id)?,
        document_ids,
        task: AiTask::from_str(&task)?,
        input_context,
        output_text,
        output_json,
        model: ModelInfo {
            provider,
            name: model,
            temperature: temperature as f32,
        },
        version,
        hallucination_flags,
        tokens_used,
        latency_ms: latency_ms as u64,
        created_by: parse_uuid(&created_by)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
