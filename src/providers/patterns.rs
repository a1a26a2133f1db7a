//! Rule-based entity recognition.
//!
//! Fixed regex tables per entity type, shared by the local provider and
//! by the remote adapters' structured-reply fallback. Every match is
//! emitted with its exact character offsets; overlapping matches are all
//! retained (the caller sees the raw evidence, not a deduplicated view).

use std::sync::LazyLock;

use regex::Regex;

use super::types::ExtractedEntity;
use crate::models::EntityType;

/// Confidence assigned to every rule match by the local provider.
pub const RULE_CONFIDENCE: f32 = 0.8;

/// Reduced confidence used when a remote adapter falls back to rules
/// after failing to parse a structured reply.
pub const FALLBACK_CONFIDENCE: f32 = 0.6;

struct EntityPattern {
    regex: Regex,
    entity_type: EntityType,
}

fn pattern(re: &str, entity_type: EntityType) -> EntityPattern {
    EntityPattern {
        regex: Regex::new(re).expect("static entity pattern must compile"),
        entity_type,
    }
}

static ENTITY_PATTERNS: LazyLock<Vec<EntityPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            r"(?i)\b(fever|cough|headache|nausea|vomiting|fatigue|dizziness|chest pain|shortness of breath|dyspnea|palpitations|rash|chills|night sweats|diarrhea|constipation|wheezing|syncope|edema|confusion)\b",
            EntityType::Symptom,
        ),
        pattern(
            r"(?i)\b(?:bp|blood pressure)[:\s]+\d{2,3}\s*/\s*\d{2,3}\b",
            EntityType::VitalSign,
        ),
        pattern(
            r"(?i)\b(?:hr|heart rate|pulse)[:\s]+\d{2,3}\b",
            EntityType::VitalSign,
        ),
        pattern(
            r"(?i)\b(?:temp|temperature)[:\s]+\d{2,3}(?:\.\d)?\s*(?:°?[cf])?\b",
            EntityType::VitalSign,
        ),
        pattern(
            r"(?i)\b(?:spo2|o2 sat(?:uration)?)[:\s]+\d{2,3}\s*%?",
            EntityType::VitalSign,
        ),
        pattern(
            r"(?i)\b(?:hba1c|hemoglobin|glucose|creatinine|potassium|sodium|wbc|platelets|inr|troponin|cholesterol|ldl|hdl|tsh|bun)\b(?:[:\s]+\d+(?:\.\d+)?)?",
            EntityType::LabValue,
        ),
        pattern(
            r"(?i)\b(warfarin|heparin|insulin|digoxin|methotrexate|lithium|amiodarone|lisinopril|metformin|atorvastatin|amlodipine|metoprolol|aspirin|clopidogrel|furosemide|omeprazole|levothyroxine|amoxicillin|prednisone|gabapentin|oxycodone|fentanyl|apixaban|rivaroxaban)\b",
            EntityType::Medication,
        ),
        pattern(
            r"(?i)\b(hypertension|diabetes|asthma|copd|pneumonia|heart failure|atrial fibrillation|anemia|hyperlipidemia|chronic kidney disease|stroke|depression|anxiety|sepsis|cellulitis|hypothyroidism)\b",
            EntityType::Diagnosis,
        ),
        pattern(
            r"(?i)\b(x-ray|mri|ct scan|echocardiogram|ecg|ekg|colonoscopy|endoscopy|biopsy|dialysis|catheterization|ultrasound|angiography|intubation)\b",
            EntityType::Procedure,
        ),
        pattern(
            r"(?i)\b(head|chest|abdomen|heart|lungs?|liver|kidneys?|arm|leg|knee|shoulder|back|throat|skin|ankle|wrist)\b",
            EntityType::BodyPart,
        ),
    ]
});

/// Scan `text` against every table and emit all matches at the given
/// confidence, ordered by start offset (ties broken by end offset).
pub fn extract_with_rules(text: &str, confidence: f32) -> Vec<ExtractedEntity> {
    let mut entities = Vec::new();

    for pattern in ENTITY_PATTERNS.iter() {
        for mat in pattern.regex.find_iter(text) {
            entities.push(ExtractedEntity {
                text: mat.as_str().to_string(),
                entity_type: pattern.entity_type,
                confidence,
                start: mat.start(),
                end: mat.end(),
            });
        }
    }

    entities.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(
        entities: &'a [ExtractedEntity],
        text: &str,
        entity_type: EntityType,
    ) -> Option<&'a ExtractedEntity> {
        entities
            .iter()
            .find(|e| e.text.eq_ignore_ascii_case(text) && e.entity_type == entity_type)
    }

    #[test]
    fn recognizes_symptoms_and_medications() {
        let text = "Patient reports fever and cough, takes warfarin and lisinopril";
        let entities = extract_with_rules(text, RULE_CONFIDENCE);

        assert!(find(&entities, "fever", EntityType::Symptom).is_some());
        assert!(find(&entities, "cough", EntityType::Symptom).is_some());
        assert!(find(&entities, "warfarin", EntityType::Medication).is_some());
        assert!(find(&entities, "lisinopril", EntityType::Medication).is_some());
    }

    #[test]
    fn offsets_index_into_source_text() {
        let text = "Started warfarin yesterday.";
        let entities = extract_with_rules(text, RULE_CONFIDENCE);
        let med = find(&entities, "warfarin", EntityType::Medication).unwrap();
        assert_eq!(&text[med.start..med.end], "warfarin");
        assert!((med.confidence - RULE_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn vital_sign_with_reading() {
        let entities = extract_with_rules("BP: 142/88, HR: 96", RULE_CONFIDENCE);
        let vitals: Vec<_> = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::VitalSign)
            .collect();
        assert_eq!(vitals.len(), 2);
    }

    #[test]
    fn overlapping_matches_are_retained() {
        // "heart failure" (diagnosis) overlaps "heart" (body part)
        let entities = extract_with_rules("History of heart failure.", RULE_CONFIDENCE);
        assert!(find(&entities, "heart failure", EntityType::Diagnosis).is_some());
        assert!(find(&entities, "heart", EntityType::BodyPart).is_some());
    }

    #[test]
    fn output_is_ordered_by_offset() {
        let entities = extract_with_rules(
            "cough after starting metformin, then fever",
            RULE_CONFIDENCE,
        );
        let starts: Vec<usize> = entities.iter().map(|e| e.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn empty_and_unremarkable_text_yield_no_entities() {
        assert!(extract_with_rules("", RULE_CONFIDENCE).is_empty());
        assert!(extract_with_rules("follow up in two weeks", RULE_CONFIDENCE).is_empty());
    }

    #[test]
    fn same_input_same_output() {
        let text = "fever, warfarin, BP: 120/80";
        let a = extract_with_rules(text, RULE_CONFIDENCE);
        let b = extract_with_rules(text, RULE_CONFIDENCE);
        assert_eq!(a, b);
    }
}
