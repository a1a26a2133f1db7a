//! Grounding-context serialization.
//!
//! The context block is part of the audit record, so it must be
//! byte-identical for identical input: fixed section order, fixed
//! formatting, iteration in the order the caller supplied the data.

use crate::models::PatientData;

/// Serialize patient data and document texts into one grounding block.
/// Section order is fixed: demographics, medications, allergies, documents.
pub fn build_patient_context(patient: &PatientData, document_texts: &[String]) -> String {
    let mut out = String::new();

    out.push_str("== PATIENT DEMOGRAPHICS ==\n");
    out.push_str(&format!(
        "Name: {}\n",
        patient.demographics.name.as_deref().unwrap_or("unknown")
    ));
    out.push_str(&format!(
        "Date of birth: {}\n",
        patient
            .demographics
            .date_of_birth
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    ));
    out.push_str(&format!(
        "Sex: {}\n",
        patient.demographics.sex.as_deref().unwrap_or("unknown")
    ));

    out.push_str("\n== ACTIVE MEDICATIONS ==\n");
    if patient.medications.is_empty() {
        out.push_str("None recorded\n");
    } else {
        for med in &patient.medications {
            out.push_str(&format!(
                "- {} {} {}\n",
                med.name,
                med.dose.as_deref().unwrap_or("(no dose)"),
                med.frequency.as_deref().unwrap_or("(no frequency)")
            ));
        }
    }

    out.push_str("\n== ALLERGIES ==\n");
    if patient.allergies.is_empty() {
        out.push_str("None recorded\n");
    } else {
        for allergy in &patient.allergies {
            out.push_str(&format!(
                "- {} (severity: {}): {}\n",
                allergy.allergen,
                allergy
                    .severity
                    .map(|s| s.as_str())
                    .unwrap_or("unspecified"),
                allergy.reaction.as_deref().unwrap_or("reaction not recorded")
            ));
        }
    }

    out.push_str("\n== DOCUMENTS ==\n");
    if document_texts.is_empty() {
        out.push_str("None supplied\n");
    } else {
        for (index, text) in document_texts.iter().enumerate() {
            out.push_str(&format!("--- Document {} ---\n{}\n", index + 1, text));
        }
    }

    out
}
