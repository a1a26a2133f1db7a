//! Anthropic messages adapter.
//!
//! Same grounded-call discipline as the OpenAI adapter: sentinel reply
//! becomes `InsufficientContext`, unparsable structured replies degrade
//! to the rule tables. Only the wire format differs.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::parse::{
    extract_embedded_json, is_insufficient_data, parse_entity_reply, parse_risk_reply,
};
use super::patterns::{extract_with_rules, FALLBACK_CONFIDENCE};
use super::prompt::{
    build_entity_prompt, build_prompt_message, build_risk_prompt, GROUNDING_SYSTEM_PROMPT,
};
use super::risk::assess_risk;
use super::types::{
    AiProvider, EntityReply, ProcessingRequest, PromptReply, RequestOptions, RiskReply,
};
use super::ProviderError;
use crate::config::RemoteCredentials;
use crate::models::PatientData;

pub const ANTHROPIC_PROVIDER_NAME: &str = "anthropic";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl AnthropicProvider {
    pub fn new(credentials: &RemoteCredentials, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Internal(e.to_string()))?;

        Ok(Self {
            api_key: credentials.api_key.clone(),
            base_url: credentials
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: credentials
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
            timeout_secs,
        })
    }

    /// One grounded message exchange. Returns (reply text, tokens, model).
    async fn complete(
        &self,
        user_message: &str,
        options: &RequestOptions,
    ) -> Result<(String, u32, String), ProviderError> {
        let model = options.model.clone().unwrap_or_else(|| self.model.clone());
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &model,
            max_tokens: options.max_tokens,
            system: GROUNDING_SYSTEM_PROMPT,
            messages: vec![UserMessage {
                role: "user",
                content: user_message,
            }],
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, self.timeout_secs))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "reply carried no text blocks".to_string(),
            ));
        }
        let tokens_used = parsed
            .usage
            .map(|u| u.input_tokens + u.output_tokens)
            .unwrap_or(0);

        if is_insufficient_data(&text) {
            return Err(ProviderError::InsufficientContext);
        }

        Ok((text, tokens_used, model))
    }
}

fn map_transport_error(e: &reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else if e.is_connect() {
        ProviderError::Connection(e.to_string())
    } else {
        ProviderError::Internal(e.to_string())
    }
}

fn map_status_error(status: u16, body: &str) -> ProviderError {
    let detail = format!("status {status}: {}", truncate(body, 200));
    match status {
        401 | 403 => ProviderError::Auth(detail),
        429 => ProviderError::QuotaExceeded(detail),
        // 529 is Anthropic's dedicated overloaded status
        500..=599 => ProviderError::Overloaded(detail),
        _ => ProviderError::Internal(detail),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<UserMessage<'a>>,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        ANTHROPIC_PROVIDER_NAME
    }

    fn default_model(&self) -> String {
        self.model.clone()
    }

    async fn process_prompt_inner(
        &self,
        request: &ProcessingRequest,
    ) -> Result<PromptReply, ProviderError> {
        let message = build_prompt_message(&request.prompt, &request.context);
        let (text, tokens_used, model) = self.complete(&message, &request.options).await?;
        let json = extract_embedded_json(&text);

        Ok(PromptReply {
            text,
            json,
            tokens_used,
            model,
        })
    }

    async fn extract_entities_inner(
        &self,
        text: &str,
        options: &RequestOptions,
    ) -> Result<EntityReply, ProviderError> {
        let message = build_entity_prompt(text);
        let (reply, tokens_used, model) = self.complete(&message, options).await?;

        match parse_entity_reply(&reply, text) {
            Some(entities) => Ok(EntityReply {
                entities,
                tokens_used,
                model,
            }),
            None => {
                tracing::warn!(
                    provider = ANTHROPIC_PROVIDER_NAME,
                    "entity reply not parsable, falling back to rule extraction"
                );
                Ok(EntityReply {
                    entities: extract_with_rules(text, FALLBACK_CONFIDENCE),
                    tokens_used,
                    model,
                })
            }
        }
    }

    async fn analyze_risk_inner(
        &self,
        patient: &PatientData,
        options: &RequestOptions,
    ) -> Result<RiskReply, ProviderError> {
        let message = build_risk_prompt(patient);
        let (reply, tokens_used, model) = self.complete(&message, options).await?;

        let assessment = match parse_risk_reply(&reply) {
            Some(assessment) => assessment,
            None => {
                tracing::warn!(
                    provider = ANTHROPIC_PROVIDER_NAME,
                    "risk reply not parsable, falling back to rule scoring"
                );
                assess_risk(patient, Utc::now().date_naive(), FALLBACK_CONFIDENCE)
            }
        };

        Ok(RiskReply {
            assessment,
            tokens_used,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_applies_defaults() {
        let credentials = RemoteCredentials {
            api_key: "key".to_string(),
            base_url: None,
            model: Some("claude-3-7-sonnet-latest".to_string()),
        };
        let provider = AnthropicProvider::new(&credentials, 45).unwrap();
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model, "claude-3-7-sonnet-latest");
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn overloaded_status_is_transient() {
        let err = map_status_error(529, "overloaded_error");
        assert!(matches!(err, ProviderError::Overloaded(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn auth_status_is_not_transient() {
        let err = map_status_error(401, "invalid x-api-key");
        assert!(matches!(err, ProviderError::Auth(_)));
        assert!(!err.is_transient());
    }
}
