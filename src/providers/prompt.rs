//! Prompts sent to remote backends.
//!
//! Every remote call carries the grounding system prompt: answer only
//! from the supplied context, emit the insufficiency sentinel instead
//! of guessing. The task prompts ask for a JSON payload the adapters
//! parse leniently.

use crate::models::PatientData;

pub const GROUNDING_SYSTEM_PROMPT: &str = r#"
You are a clinical documentation assistant. You answer ONLY from the context
supplied with each request.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Use ONLY information explicitly present in the supplied context.
2. NEVER invent patients, findings, medications, values, or history.
3. NEVER add clinical opinion beyond what the context states.
4. If the context is inadequate to answer, reply with exactly:
   insufficient_data
5. When asked for JSON, wrap it in a ```json fenced block.
"#;

/// User message for `process_prompt`: context block, then the question.
pub fn build_prompt_message(prompt: &str, context: &str) -> String {
    format!(
        "<context>\n{context}\n</context>\n\n{prompt}",
        context = context,
        prompt = prompt
    )
}

/// User message for `extract_entities`.
pub fn build_entity_prompt(text: &str) -> String {
    format!(
        r#"<context>
{text}
</context>

List every clinical entity in the context. Respond with a ```json fenced block:

```json
{{
  "entities": [
    {{
      "text": "exact substring from the context",
      "type": "symptom | vital_sign | lab_value | medication | diagnosis | procedure | body_part",
      "confidence": 0.0,
      "start": 0,
      "end": 0
    }}
  ]
}}
```

Offsets are byte positions of the substring in the context. Include every
occurrence, even overlapping ones."#
    )
}

/// User message for `analyze_risk`, built from the structured patient
/// snapshot so the model sees exactly what the rules would see.
pub fn build_risk_prompt(patient: &PatientData) -> String {
    let medications = if patient.medications.is_empty() {
        "none recorded".to_string()
    } else {
        patient
            .medications
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let allergies = if patient.allergies.is_empty() {
        "none recorded".to_string()
    } else {
        patient
            .allergies
            .iter()
            .map(|a| match a.severity {
                Some(s) => format!("{} ({})", a.allergen, s.as_str()),
                None => a.allergen.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    let dob = patient
        .demographics
        .date_of_birth
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        r#"<context>
Date of birth: {dob}
Medications: {medications}
Allergies: {allergies}
</context>

Assess this patient's clinical risk from the context only. Respond with a
```json fenced block:

```json
{{
  "risk_factors": [
    {{"factor": "label", "score": 0.0, "confidence": 0.0, "evidence": ["..."]}}
  ],
  "overall_risk": 0.0,
  "recommendations": ["..."]
}}
```

Scores are 0-10; overall_risk is the combined score, 0-10."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllergyEntry, AllergySeverity, MedicationEntry};

    #[test]
    fn system_prompt_names_the_sentinel() {
        assert!(GROUNDING_SYSTEM_PROMPT.contains("insufficient_data"));
        assert!(GROUNDING_SYSTEM_PROMPT.contains("NEVER invent"));
    }

    #[test]
    fn prompt_message_wraps_context() {
        let msg = build_prompt_message("Summarize.", "Visit note text.");
        assert!(msg.starts_with("<context>\nVisit note text.\n</context>"));
        assert!(msg.ends_with("Summarize."));
    }

    #[test]
    fn risk_prompt_is_deterministic_and_complete() {
        let patient = PatientData {
            medications: vec![MedicationEntry::named("warfarin")],
            allergies: vec![AllergyEntry {
                allergen: "penicillin".to_string(),
                severity: Some(AllergySeverity::Severe),
                reaction: None,
            }],
            ..Default::default()
        };
        let a = build_risk_prompt(&patient);
        let b = build_risk_prompt(&patient);
        assert_eq!(a, b);
        assert!(a.contains("warfarin"));
        assert!(a.contains("penicillin (severe)"));
    }
}
