//! Intent classifier
//!
//! Turns a raw utterance/transcript into an Intent. Owns normalization
//! and confidence thresholding; the label itself comes from an opaque
//! understanding service. Adds no randomness of its own.

use crate::models::{Intent, IntentKind};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Non-semantic tokens stripped before classification.
const FILLER_WORDS: &[&str] = &["um", "umm", "uh", "uhh", "erm", "hmm", "mhm"];
const FILLER_MARKERS: &[&str] = &["[silence]", "[noise]", "<silence>", "<noise>"];

/// Trait for the opaque language-understanding service
#[async_trait::async_trait]
pub trait UnderstandingService: Send + Sync {
    /// Map normalized text to a raw (label, confidence) pair.
    async fn infer(&self, text: &str) -> crate::Result<(String, f32)>;
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Raw labels below this confidence are forced to Unknown.
    pub confidence_threshold: f32,
    /// Bounded round-trip to the understanding service.
    pub inference_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            inference_timeout: Duration::from_secs(10),
        }
    }
}

pub struct IntentClassifier {
    service: Arc<dyn UnderstandingService>,
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(service: Arc<dyn UnderstandingService>) -> Self {
        Self::with_config(service, ClassifierConfig::default())
    }

    pub fn with_config(service: Arc<dyn UnderstandingService>, config: ClassifierConfig) -> Self {
        Self { service, config }
    }

    /// Classify an utterance. Never errors: anything the service cannot
    /// label confidently comes back as Unknown.
    pub async fn classify(&self, raw_text: &str) -> Intent {
        let normalized = normalize(raw_text);
        if normalized.is_empty() {
            return Intent::unknown(raw_text.to_string(), 0.0);
        }

        let inferred = timeout(
            self.config.inference_timeout,
            self.service.infer(&normalized),
        )
        .await;

        let (label, confidence) = match inferred {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                // Service unavailable maps to Unknown with confidence 0.
                warn!(error = %e, "understanding service failed");
                return Intent::unknown(raw_text.to_string(), 0.0);
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.inference_timeout.as_secs(),
                    "understanding service timed out"
                );
                return Intent::unknown(raw_text.to_string(), 0.0);
            }
        };

        let kind = parse_label(&label);
        debug!(%label, confidence, ?kind, "classification received");

        if confidence < self.config.confidence_threshold || kind == IntentKind::Unknown {
            // Below threshold the raw label is not trusted at all.
            return Intent::unknown(raw_text.to_string(), confidence);
        }

        let parameters = extract_parameters(kind, raw_text, &normalized);
        Intent::new(kind, parameters, confidence, raw_text.to_string())
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}

/// Strip filler words and silence markers, collapse whitespace.
fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|token| {
            let lowered = token.to_lowercase();
            if FILLER_MARKERS.contains(&lowered.as_str()) {
                return false;
            }
            let word = lowered.trim_matches(|c: char| c.is_ascii_punctuation());
            !word.is_empty() && !FILLER_WORDS.contains(&word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_label(label: &str) -> IntentKind {
    match label.trim().to_lowercase().as_str() {
        "chat" | "conversation" | "conversational" => IntentKind::Chat,
        "file_analysis" | "file-analysis" | "analysis" => IntentKind::FileAnalysis,
        "system_action" | "system-action" | "action" => IntentKind::SystemAction,
        _ => IntentKind::Unknown,
    }
}

/// Lightweight parameter extraction per kind. Handlers validate their
/// own inputs; this only pulls out what is cheap to spot in the text.
fn extract_parameters(kind: IntentKind, raw_text: &str, normalized: &str) -> Value {
    match kind {
        IntentKind::Chat => json!({ "message": raw_text }),
        IntentKind::FileAnalysis => match find_path_token(normalized) {
            Some(path) => json!({ "path": path }),
            None => json!({}),
        },
        IntentKind::SystemAction => json!({ "action": infer_action(normalized) }),
        IntentKind::Unknown => json!({}),
    }
}

/// Pick out the first token that looks like a file path.
fn find_path_token(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | '?' | '!')))
        .find(|token| {
            token.contains('/')
                || token
                    .rsplit_once('.')
                    .map(|(stem, ext)| {
                        !stem.is_empty()
                            && (1..=5).contains(&ext.len())
                            && ext.chars().all(|c| c.is_ascii_alphanumeric())
                    })
                    .unwrap_or(false)
        })
        .map(|token| token.to_string())
}

fn infer_action(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    if lowered.contains("time") || lowered.contains("date") {
        "current_time"
    } else if lowered.contains("clear") {
        "clear_history"
    } else if lowered.contains("logout") || lowered.contains("log out") || lowered.contains("sign out") {
        "logout"
    } else {
        "unknown"
    }
}

//
// ================= Keyword mock =================
//

const FILE_KEYWORDS: &[&str] = &[
    "analyze", "analyse", "file", "document", "upload", "uploaded", "attached",
    "attachment", "summarize", "pdf", "csv", "spreadsheet", "image",
];

const ACTION_KEYWORDS: &[&str] = &[
    "time", "date", "clear", "history", "logout", "sign",
];

const CHAT_KEYWORDS: &[&str] = &[
    "what", "how", "why", "who", "explain", "tell", "hello", "hi", "hey",
    "thanks", "thank", "goodbye", "bye", "help",
];

/// Deterministic keyword-scoring understanding service. Keeps the system
/// functional (and testable) without an LLM dependency.
pub struct KeywordUnderstanding;

impl KeywordUnderstanding {
    fn score(text: &str, keywords: &[&str]) -> usize {
        keywords.iter().filter(|kw| text.contains(**kw)).count()
    }

    fn confidence(score: usize) -> f32 {
        (0.55 + 0.15 * (score.saturating_sub(1)) as f32).min(0.95)
    }
}

#[async_trait::async_trait]
impl UnderstandingService for KeywordUnderstanding {
    async fn infer(&self, text: &str) -> crate::Result<(String, f32)> {
        let lowered = text.to_lowercase();

        let file_score = Self::score(&lowered, FILE_KEYWORDS);
        let action_score = Self::score(&lowered, ACTION_KEYWORDS);
        let chat_score = Self::score(&lowered, CHAT_KEYWORDS);

        let (label, score) = if file_score >= 1 && file_score >= action_score && file_score >= chat_score
        {
            ("file_analysis", file_score)
        } else if action_score >= 1 && action_score >= chat_score {
            ("system_action", action_score)
        } else if chat_score >= 1 {
            ("chat", chat_score)
        } else {
            // Nothing recognizable: low confidence chat guess, which the
            // classifier's threshold turns into Unknown.
            return Ok(("chat".to_string(), 0.4));
        };

        Ok((label.to_string(), Self::confidence(score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub that returns a fixed (label, confidence) and counts calls.
    struct FixedService {
        label: String,
        confidence: f32,
        calls: AtomicUsize,
    }

    impl FixedService {
        fn new(label: &str, confidence: f32) -> Self {
            Self {
                label: label.to_string(),
                confidence,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl UnderstandingService for FixedService {
        async fn infer(&self, _text: &str) -> crate::Result<(String, f32)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.label.clone(), self.confidence))
        }
    }

    struct FailingService;

    #[async_trait::async_trait]
    impl UnderstandingService for FailingService {
        async fn infer(&self, _text: &str) -> crate::Result<(String, f32)> {
            Err(crate::error::AssistantError::Understanding(
                "service offline".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_below_threshold_forces_unknown() {
        // Raw label says system_action, but 0.4 < 0.5 threshold.
        let service = Arc::new(FixedService::new("system_action", 0.4));
        let classifier = IntentClassifier::new(service);

        let intent = classifier.classify("clear my history").await;
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert!((intent.confidence - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_above_threshold_keeps_label() {
        let service = Arc::new(FixedService::new("system_action", 0.8));
        let classifier = IntentClassifier::new(service);

        let intent = classifier.classify("clear my history").await;
        assert_eq!(intent.kind, IntentKind::SystemAction);
        assert_eq!(intent.parameters["action"], "clear_history");
    }

    #[tokio::test]
    async fn test_service_failure_maps_to_unknown_zero() {
        let classifier = IntentClassifier::new(Arc::new(FailingService));
        let intent = classifier.classify("hello there").await;
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert_eq!(intent.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_filler_only_input_skips_service() {
        let service = Arc::new(FixedService::new("chat", 0.9));
        let classifier = IntentClassifier::new(service.clone());

        let intent = classifier.classify("um uh [silence] hmm").await;
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert_eq!(intent.confidence, 0.0);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_normalization_strips_filler_but_keeps_content() {
        assert_eq!(normalize("um, what time is it uh?"), "what time is it");
        assert_eq!(normalize("  hello   world  "), "hello world");
    }

    #[tokio::test]
    async fn test_keyword_mock_file_analysis_with_path() {
        let classifier = IntentClassifier::new(Arc::new(KeywordUnderstanding));

        let intent = classifier.classify("please analyze report.pdf").await;
        assert_eq!(intent.kind, IntentKind::FileAnalysis);
        assert_eq!(intent.parameters["path"], "report.pdf");
    }

    #[tokio::test]
    async fn test_keyword_mock_system_action() {
        let classifier = IntentClassifier::new(Arc::new(KeywordUnderstanding));

        let intent = classifier.classify("what time is it").await;
        assert_eq!(intent.kind, IntentKind::SystemAction);
        assert_eq!(intent.parameters["action"], "current_time");
    }

    #[tokio::test]
    async fn test_keyword_mock_gibberish_becomes_unknown() {
        let classifier = IntentClassifier::new(Arc::new(KeywordUnderstanding));

        let intent = classifier.classify("xyzzy plugh frobnicate").await;
        assert_eq!(intent.kind, IntentKind::Unknown);
    }

    #[tokio::test]
    async fn test_deterministic_for_identical_input() {
        let classifier = IntentClassifier::new(Arc::new(KeywordUnderstanding));

        let first = classifier.classify("hello, how are you?").await;
        let second = classifier.classify("hello, how are you?").await;
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.confidence, second.confidence);
    }
}
