//! Best-effort parsing of free-text LLM replies.
//!
//! Remote models are asked to embed a JSON object in their answer but
//! are not trusted to. `extract_embedded_json` looks for a json-fenced
//! code block first, then for the first balanced top-level object;
//! finding nothing is not an error, the reply simply has no structured
//! payload.

use std::str::FromStr;

use serde_json::Value;

use super::types::{ExtractedEntity, RiskAssessment, RiskFactor};
use crate::models::EntityType;

/// Sentinel a grounded model emits instead of fabricating an answer.
pub const INSUFFICIENT_DATA_SENTINEL: &str = "insufficient_data";

/// True when the reply is the insufficiency sentinel rather than an
/// answer. Tolerates surrounding whitespace, quotes, and punctuation,
/// but not a sentinel buried inside a longer substantive answer.
pub fn is_insufficient_data(reply: &str) -> bool {
    let trimmed = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == ':');
    if trimmed.eq_ignore_ascii_case(INSUFFICIENT_DATA_SENTINEL) {
        return true;
    }
    // Short replies that lead with the sentinel ("insufficient_data — no
    // relevant documents") still count as a refusal.
    trimmed.len() < 120
        && trimmed
            .to_ascii_lowercase()
            .starts_with(INSUFFICIENT_DATA_SENTINEL)
}

/// Pull an embedded JSON object out of a free-text reply, if present.
pub fn extract_embedded_json(reply: &str) -> Option<Value> {
    if let Some(fenced) = extract_fenced_json(reply) {
        if let Ok(value) = serde_json::from_str(&fenced) {
            return Some(value);
        }
    }
    extract_balanced_object(reply)
}

/// Contents of the first json-fenced code block.
fn extract_fenced_json(reply: &str) -> Option<String> {
    let start = reply.find("```json")?;
    let content_start = start + 7;
    let end = reply[content_start..].find("```")?;
    Some(reply[content_start..content_start + end].trim().to_string())
}

/// First balanced `{...}` region that parses as JSON. Brace counting
/// skips over string literals so embedded braces do not unbalance it.
fn extract_balanced_object(reply: &str) -> Option<Value> {
    let open = reply.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in reply[open..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &reply[open..open + i + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a remote reply into entities, leniently: items that are
/// malformed, have an unknown type, or name text absent from the
/// source are skipped rather than failing the whole reply. `None`
/// means the reply carried no parsable entity payload at all, which
/// is the adapters' cue to fall back to the rule tables.
pub fn parse_entity_reply(reply: &str, source: &str) -> Option<Vec<ExtractedEntity>> {
    let value = extract_embedded_json(reply)?;
    let items = value.get("entities")?.as_array()?;

    let mut entities = Vec::new();
    for item in items {
        let Some(text) = item.get("text").and_then(Value::as_str) else {
            continue;
        };
        let Some(entity_type) = item
            .get("type")
            .and_then(Value::as_str)
            .and_then(|s| EntityType::from_str(s).ok())
        else {
            continue;
        };
        let confidence = item
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.7) as f32;

        // Trust the model's offsets only if they actually index the text;
        // otherwise locate the first occurrence. Entities not present in
        // the source at all are treated as fabrications and dropped.
        let claimed = item
            .get("start")
            .and_then(Value::as_u64)
            .zip(item.get("end").and_then(Value::as_u64))
            .map(|(s, e)| (s as usize, e as usize))
            .filter(|(s, e)| source.get(*s..*e) == Some(text));
        let Some((start, end)) = claimed.or_else(|| {
            source.find(text).map(|s| (s, s + text.len()))
        }) else {
            continue;
        };

        entities.push(ExtractedEntity {
            text: text.to_string(),
            entity_type,
            confidence: confidence.clamp(0.0, 1.0),
            start,
            end,
        });
    }

    entities.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    Some(entities)
}

/// Parse a remote reply into a risk assessment, leniently. `None` when
/// no structured risk payload can be recovered.
pub fn parse_risk_reply(reply: &str) -> Option<RiskAssessment> {
    let value = extract_embedded_json(reply)?;
    let items = value.get("risk_factors")?.as_array()?;

    let mut risk_factors = Vec::new();
    for item in items {
        let Some(factor) = item.get("factor").and_then(Value::as_str) else {
            continue;
        };
        let score = item.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let confidence = item
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.7) as f32;
        let evidence = item
            .get("evidence")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        risk_factors.push(RiskFactor {
            factor: factor.to_string(),
            score: score.clamp(0.0, 10.0),
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
        });
    }

    let overall_risk = value
        .get("overall_risk")
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or_else(|| risk_factors.iter().map(|f| f.score).sum())
        .clamp(0.0, 10.0);

    let recommendations = value
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(RiskAssessment {
        risk_factors,
        overall_risk,
        recommendations,
    })
}
