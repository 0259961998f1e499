//! Gemini API client: the opaque understanding/responder service
//!
//! One pooled client backs both intent labeling and chat responses.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::classifier::UnderstandingService;
use crate::error::AssistantError;
use crate::handlers::Responder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You classify a personal assistant utterance.
Reply with exactly one of these labels and nothing else:
chat - conversational question or small talk
file_analysis - the user wants a file or document analyzed
system_action - the user wants a local action (current time, clear history, logout)"#;

const CHAT_SYSTEM_PROMPT: &str = r#"You are a helpful personal desktop assistant.

Guidelines:
- Be concise and friendly
- Answer questions directly
- When the user references earlier conversation, use the provided history
- Admit when you do not know something"#;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        })
    }

    /// Generate a response for a prompt under the given system instruction.
    pub async fn generate(&self, query: &str, system_prompt: &str) -> crate::Result<(String, f32)> {
        if self.api_key.is_empty() {
            return Err(AssistantError::Understanding(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: query.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AssistantError::Understanding(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AssistantError::Understanding(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("failed to parse Gemini response: {}", e);
            AssistantError::Understanding(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                AssistantError::Understanding("empty response from Gemini".to_string())
            })?;

        let confidence = calculate_confidence(&gemini_response);

        info!("Gemini response received (confidence: {})", confidence);

        Ok((answer, confidence))
    }
}

/// Understanding service backed by Gemini: asks for a single label.
pub struct GeminiUnderstanding {
    client: GeminiClient,
}

impl GeminiUnderstanding {
    pub fn new(api_key: String) -> crate::Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key)?,
        })
    }
}

#[async_trait::async_trait]
impl UnderstandingService for GeminiUnderstanding {
    async fn infer(&self, text: &str) -> crate::Result<(String, f32)> {
        let (answer, confidence) = self.client.generate(text, CLASSIFY_SYSTEM_PROMPT).await?;

        // The model is told to reply with the bare label; take the first
        // word defensively in case it decorates the answer anyway.
        let label = answer
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .to_lowercase();

        Ok((label, confidence))
    }
}

/// Chat responder backed by Gemini.
pub struct GeminiResponder {
    client: GeminiClient,
}

impl GeminiResponder {
    pub fn new(api_key: String) -> crate::Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key)?,
        })
    }
}

#[async_trait::async_trait]
impl Responder for GeminiResponder {
    async fn respond(&self, prompt: &str) -> crate::Result<(String, f32)> {
        self.client.generate(prompt, CHAT_SYSTEM_PROMPT).await
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

/// Calculate response confidence
fn calculate_confidence(response: &GeminiResponse) -> f32 {
    let base_confidence: f32 = 0.85;

    let finish_confidence = match response
        .candidates
        .first()
        .and_then(|c| c.finish_reason.as_deref())
    {
        Some("STOP") => 1.0,
        Some("LENGTH") => 0.8,
        Some("SAFETY") => 0.6,
        _ => 0.7,
    };

    let response_length = response
        .candidates
        .first()
        .and_then(|c| c.content.parts.first())
        .map(|p| p.text.len())
        .unwrap_or(0);

    let length_confidence = if response_length < 50 {
        0.6
    } else if response_length > 2000 {
        0.8
    } else {
        1.0
    };

    (base_confidence * finish_confidence * length_confidence).clamp(0.5, 0.98)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "what time is it?".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: CLASSIFY_SYSTEM_PROMPT.to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request);
        assert!(json.is_ok());
        assert!(json.unwrap().contains("what time is it?"));
    }

    #[test]
    fn test_confidence_short_answer_discounted() {
        let response = GeminiResponse {
            candidates: vec![Candidate {
                content: Content {
                    parts: vec![Part {
                        text: "chat".to_string(),
                    }],
                },
                finish_reason: Some("STOP".to_string()),
            }],
        };
        let confidence = calculate_confidence(&response);
        assert!(confidence >= 0.5 && confidence < 0.85);
    }
}
