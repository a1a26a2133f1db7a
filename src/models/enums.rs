use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(AiTask {
    EntityExtraction => "entity_extraction",
    Summarization => "summarization",
    DifferentialDiagnosis => "differential_diagnosis",
    TreatmentPlanning => "treatment_planning",
    MedicationSafety => "medication_safety",
    SoapNote => "soap_note",
});

str_enum!(EntityType {
    Symptom => "symptom",
    VitalSign => "vital_sign",
    LabValue => "lab_value",
    Medication => "medication",
    Diagnosis => "diagnosis",
    Procedure => "procedure",
    BodyPart => "body_part",
});

str_enum!(AllergySeverity {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
    LifeThreatening => "life_threatening",
});

impl AllergySeverity {
    /// Severities that contribute to the rule-based risk score.
    pub fn is_high_severity(&self) -> bool {
        matches!(self, Self::Severe | Self::LifeThreatening)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn task_round_trips_through_str() {
        for task in [
            AiTask::EntityExtraction,
            AiTask::Summarization,
            AiTask::DifferentialDiagnosis,
            AiTask::TreatmentPlanning,
            AiTask::MedicationSafety,
            AiTask::SoapNote,
        ] {
            assert_eq!(AiTask::from_str(task.as_str()).unwrap(), task);
        }
    }

    #[test]
    fn unknown_task_is_invalid_enum() {
        let err = AiTask::from_str("chart_review").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn entity_type_round_trips() {
        assert_eq!(
            EntityType::from_str("vital_sign").unwrap(),
            EntityType::VitalSign
        );
        assert_eq!(EntityType::BodyPart.as_str(), "body_part");
    }

    #[test]
    fn severity_high_flag() {
        assert!(AllergySeverity::LifeThreatening.is_high_severity());
        assert!(AllergySeverity::Severe.is_high_severity());
        assert!(!AllergySeverity::Moderate.is_high_severity());
        assert!(!AllergySeverity::Mild.is_high_severity());
    }
}
