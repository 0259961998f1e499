//! Transcription gateway
//!
//! HTTP-backed speech-to-text and text-to-speech behind a trait so voice
//! input can be swapped for a mock in tests and offline runs.

use crate::error::TranscriptionError;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "http://localhost:5005";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[async_trait::async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Turn captured audio into text. Silence is an error, not an
    /// empty string.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError>;

    /// Turn text into playable audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TranscriptionError>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    transcript: String,
}

/// Client for an external speech service.
pub struct HttpTranscriptionGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTranscriptionGateway {
    pub fn new(base_url: String) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Reads `SPEECH_API_BASE_URL`, falling back to a local default.
    pub fn from_env() -> crate::Result<Self> {
        let base_url =
            env::var("SPEECH_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }
}

#[async_trait::async_trait]
impl TranscriptionService for HttpTranscriptionGateway {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        let url = format!("{}/transcribe", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| TranscriptionError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "speech service rejected transcription request");
            return Err(TranscriptionError::ServiceUnavailable(format!(
                "speech service returned {}",
                response.status()
            )));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::ServiceUnavailable(e.to_string()))?;

        let transcript = parsed.transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(TranscriptionError::NoSpeechDetected);
        }

        debug!(chars = transcript.len(), "transcription complete");
        Ok(transcript)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TranscriptionError> {
        let url = format!("{}/synthesize", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| TranscriptionError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscriptionError::ServiceUnavailable(format!(
                "speech service returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TranscriptionError::ServiceUnavailable(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// Fixed-transcript service for demos and tests.
pub struct MockTranscription {
    transcript: String,
}

impl MockTranscription {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionService for MockTranscription {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        if audio.is_empty() || self.transcript.trim().is_empty() {
            return Err(TranscriptionError::NoSpeechDetected);
        }
        Ok(self.transcript.clone())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TranscriptionError> {
        Ok(text.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_transcript() {
        let service = MockTranscription::new("what time is it");
        let transcript = service.transcribe(&[1, 2, 3]).await.unwrap();
        assert_eq!(transcript, "what time is it");
    }

    #[tokio::test]
    async fn test_empty_audio_is_no_speech() {
        let service = MockTranscription::new("ignored");
        let err = service.transcribe(&[]).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::NoSpeechDetected));
    }

    #[tokio::test]
    async fn test_silent_transcript_is_no_speech() {
        let service = MockTranscription::new("   ");
        let err = service.transcribe(&[1]).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::NoSpeechDetected));
    }

    #[tokio::test]
    async fn test_synthesize_round_trip() {
        let service = MockTranscription::new("unused");
        let audio = service.synthesize("hello").await.unwrap();
        assert_eq!(audio, b"hello");
    }
}
