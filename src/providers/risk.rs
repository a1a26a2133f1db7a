//! Rule-based risk scoring.
//!
//! Deterministic and explainable: each rule that fires contributes a
//! fixed score and names its evidence, and the overall risk is the
//! clamped sum. Used directly by the local provider and as the remote
//! adapters' fallback when a structured reply cannot be parsed.

use chrono::NaiveDate;

use super::types::{RiskAssessment, RiskFactor};
use crate::models::PatientData;

/// More than this many active medications fires the polypharmacy rule.
pub const POLYPHARMACY_THRESHOLD: usize = 5;

pub const POLYPHARMACY_SCORE: f32 = 4.0;
pub const HIGH_RISK_MEDICATION_SCORE: f32 = 3.0;
pub const SEVERE_ALLERGY_SCORE: f32 = 3.0;
pub const ADVANCED_AGE_SCORE: f32 = 2.0;

/// Age above which the advanced-age rule fires.
pub const ADVANCED_AGE_THRESHOLD: u32 = 65;

/// Narrow-therapeutic-index and otherwise high-alert medications.
const HIGH_RISK_MEDICATIONS: &[&str] = &[
    "warfarin",
    "heparin",
    "insulin",
    "digoxin",
    "methotrexate",
    "lithium",
    "amiodarone",
    "oxycodone",
    "fentanyl",
    "clozapine",
];

/// Run every rule against the patient snapshot as of `today`.
///
/// Pure with respect to its arguments: identical input always yields
/// identical factors, score, and recommendations.
pub fn assess_risk(patient: &PatientData, today: NaiveDate, confidence: f32) -> RiskAssessment {
    let mut risk_factors = Vec::new();

    if patient.medications.len() > POLYPHARMACY_THRESHOLD {
        risk_factors.push(RiskFactor {
            factor: "polypharmacy".to_string(),
            score: POLYPHARMACY_SCORE,
            confidence,
            evidence: vec![format!("{} active medications", patient.medications.len())],
        });
    }

    let high_risk_meds: Vec<String> = patient
        .medications
        .iter()
        .filter(|m| {
            let name = m.name.to_lowercase();
            HIGH_RISK_MEDICATIONS.iter().any(|hr| name.contains(hr))
        })
        .map(|m| m.name.clone())
        .collect();
    if !high_risk_meds.is_empty() {
        risk_factors.push(RiskFactor {
            factor: "high_risk_medication".to_string(),
            score: HIGH_RISK_MEDICATION_SCORE,
            confidence,
            evidence: high_risk_meds,
        });
    }

    let severe_allergens: Vec<String> = patient
        .allergies
        .iter()
        .filter(|a| a.severity.map(|s| s.is_high_severity()).unwrap_or(false))
        .map(|a| a.allergen.clone())
        .collect();
    if !severe_allergens.is_empty() {
        risk_factors.push(RiskFactor {
            factor: "severe_allergy".to_string(),
            score: SEVERE_ALLERGY_SCORE,
            confidence,
            evidence: severe_allergens,
        });
    }

    if let Some(age) = patient.age_on(today) {
        if age > ADVANCED_AGE_THRESHOLD {
            risk_factors.push(RiskFactor {
                factor: "advanced_age".to_string(),
                score: ADVANCED_AGE_SCORE,
                confidence,
                evidence: vec![format!("age {age}")],
            });
        }
    }

    let overall_risk = risk_factors
        .iter()
        .map(|f| f.score)
        .sum::<f32>()
        .clamp(0.0, 10.0);

    RiskAssessment {
        recommendations: recommendations_for(&risk_factors),
        risk_factors,
        overall_risk,
    }
}

fn recommendations_for(factors: &[RiskFactor]) -> Vec<String> {
    let mut recs = Vec::new();

    for factor in factors {
        match factor.factor.as_str() {
            "polypharmacy" => recs.push(
                "Review the medication list for deprescribing opportunities and interactions."
                    .to_string(),
            ),
            "high_risk_medication" => recs.push(
                "Monitor narrow-therapeutic-index medications with appropriate lab follow-up."
                    .to_string(),
            ),
            "severe_allergy" => recs.push(
                "Verify allergy documentation before prescribing any new agent.".to_string(),
            ),
            "advanced_age" => recs.push(
                "Apply geriatric dosing considerations and fall-risk screening.".to_string(),
            ),
            _ => {}
        }
    }

    if recs.is_empty() {
        recs.push("No elevated risk factors identified from structured data.".to_string());
        recs.push("Continue routine monitoring and reassess at the next encounter.".to_string());
    }

    recs
}
