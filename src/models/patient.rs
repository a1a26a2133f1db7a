use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AllergySeverity;

/// Patient demographics as supplied by the (external) patient record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
}

/// One active medication on the patient's list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationEntry {
    pub name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
}

impl MedicationEntry {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dose: None,
            frequency: None,
        }
    }
}

/// One documented allergy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllergyEntry {
    pub allergen: String,
    pub severity: Option<AllergySeverity>,
    pub reaction: Option<String>,
}

/// The slice of the patient record the AI core consumes.
///
/// Owned and populated by the excluded CRUD layer; the core only reads it,
/// for context building and rule-based risk scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientData {
    pub patient_id: Uuid,
    pub demographics: Demographics,
    pub medications: Vec<MedicationEntry>,
    pub allergies: Vec<AllergyEntry>,
}

impl PatientData {
    /// Whole years elapsed between date of birth and `today`.
    /// None when no date of birth is recorded or the date is in the future.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.demographics.date_of_birth?;
        today.years_since(dob)
    }
}
