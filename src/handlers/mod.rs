//! Handler capability trait and registry
//!
//! Handlers are polymorphic over {is_synchronous, execute}. The registry
//! is populated once at startup and read-only thereafter, so concurrent
//! dispatch needs no locking around lookups.

use crate::error::AssistantError;
use crate::models::{IntentKind, ResultKind, TaskResult};
use crate::session::Session;
use crate::Result;
use chrono::Local;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub mod analysis;
pub use analysis::FileAnalysisHandler;

/// Recent context entries folded into a chat prompt.
const CHAT_CONTEXT_WINDOW: usize = 10;

/// Marks where the current user message starts in an assembled prompt.
const PROMPT_MESSAGE_MARKER: &str = "Answer this message: ";

/// Trait for a task handler: performs the action for one intent kind.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    fn kind(&self) -> IntentKind;

    /// Synchronous handlers run inline on the interactive path;
    /// asynchronous ones go through the job supervisor.
    fn is_synchronous(&self) -> bool;

    async fn execute(&self, parameters: &Value, session: &Session) -> Result<TaskResult>;
}

/// Handler registry for looking up handlers by intent kind
pub struct HandlerRegistry {
    handlers: HashMap<IntentKind, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn resolve(&self, kind: IntentKind) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<IntentKind> {
        self.handlers.keys().copied().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for the opaque chat responder service
#[async_trait::async_trait]
pub trait Responder: Send + Sync {
    /// Answer a prompt, returning (answer, confidence).
    async fn respond(&self, prompt: &str) -> Result<(String, f32)>;
}

//
// ================= Chat =================
//

/// Conversational handler: folds recent session context into the prompt
/// and delegates to the responder service.
pub struct ChatHandler {
    responder: Arc<dyn Responder>,
}

impl ChatHandler {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self { responder }
    }

    fn build_prompt(message: &str, session: &Session) -> String {
        let recent: Vec<_> = session.recent(CHAT_CONTEXT_WINDOW).collect();

        let mut prompt = String::new();
        if !recent.is_empty() {
            prompt.push_str("Based on our conversation history:\n\n");
            for entry in recent.iter().rev() {
                prompt.push_str(&format!("- User: {}\n", entry.intent.raw_text));
                if entry.result.kind == ResultKind::Chat {
                    prompt.push_str(&format!("- Assistant: {}\n", entry.result.detail));
                }
            }
            prompt.push_str("\n---\n\n");
        }
        prompt.push_str(PROMPT_MESSAGE_MARKER);
        prompt.push_str(message);
        prompt
    }
}

#[async_trait::async_trait]
impl Handler for ChatHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::Chat
    }

    fn is_synchronous(&self) -> bool {
        true
    }

    async fn execute(&self, parameters: &Value, session: &Session) -> Result<TaskResult> {
        let message = parameters
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                AssistantError::Handler("chat handler requires a 'message' parameter".to_string())
            })?;

        let prompt = Self::build_prompt(message, session);
        let context_entries = session.context_len().min(CHAT_CONTEXT_WINDOW);

        let (answer, confidence) = self.responder.respond(&prompt).await?;

        Ok(TaskResult::chat(
            json!({
                "answer": answer,
                "confidence": confidence,
                "context_entries": context_entries,
            }),
            answer,
        ))
    }
}

/// Canned responder used when no language model is configured. Keyed on
/// the current user message, never the assembled history, so prior
/// context cannot shadow the keyword lookup.
pub struct OfflineResponder;

impl OfflineResponder {
    /// The current message is everything after the final prompt marker;
    /// a bare message (no context folded in) passes through unchanged.
    fn current_message(prompt: &str) -> &str {
        match prompt.rfind(PROMPT_MESSAGE_MARKER) {
            Some(at) => &prompt[at + PROMPT_MESSAGE_MARKER.len()..],
            None => prompt,
        }
    }
}

#[async_trait::async_trait]
impl Responder for OfflineResponder {
    async fn respond(&self, prompt: &str) -> Result<(String, f32)> {
        let message = Self::current_message(prompt).to_lowercase();
        // Whole-word matching: "hi" must not fire on "history".
        let words: Vec<&str> = message
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
            .collect();
        let has_word = |w: &str| words.contains(&w);

        let answer = if ["hello", "hi", "hey", "greetings"]
            .iter()
            .copied()
            .any(|w| has_word(w))
        {
            "Hello! I'm your assistant. How can I help you today?"
        } else if has_word("help") || message.contains("what can you do") {
            "I can answer questions, analyze files you point me at, and run \
             simple local actions like telling the time or clearing history."
        } else if message.contains("who are you") || message.contains("what are you") {
            "I'm a local desktop assistant. I classify what you ask for and \
             route it to the right handler."
        } else if words.iter().any(|w| w.starts_with("thank")) {
            "You're welcome! Anything else you'd like to know?"
        } else if has_word("bye") || has_word("goodbye") {
            "Goodbye! Come back anytime you need assistance."
        } else {
            "I'm running without a language model right now, so I can only \
             give basic answers. File analysis and system actions still work."
        };

        Ok((answer.to_string(), 0.6))
    }
}

//
// ================= System actions =================
//

/// Closed set of local actions. Directives that must touch session state
/// (clear history, logout) are returned as payloads for the interactive
/// layer to apply; the handler itself never mutates the session.
pub struct SystemActionHandler;

#[async_trait::async_trait]
impl Handler for SystemActionHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::SystemAction
    }

    fn is_synchronous(&self) -> bool {
        true
    }

    async fn execute(&self, parameters: &Value, _session: &Session) -> Result<TaskResult> {
        let action = parameters
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        match action {
            "current_time" => {
                let now = Local::now();
                let formatted = now.format("%A, %B %d, %Y at %H:%M:%S").to_string();
                Ok(TaskResult::action(
                    json!({ "action": "current_time", "time": formatted }),
                    format!("Current date and time: {}", formatted),
                ))
            }
            "clear_history" => Ok(TaskResult::action(
                json!({ "action": "clear_history", "directive": "clear_context" }),
                "Conversation history cleared.".to_string(),
            )),
            "logout" => Ok(TaskResult::action(
                json!({ "action": "logout", "directive": "logout" }),
                "Logging you out.".to_string(),
            )),
            other => Err(AssistantError::Handler(format!(
                "unsupported system action: {}",
                other
            ))),
        }
    }
}

/// Create the default registry with all three built-in handlers.
pub fn create_default_registry(responder: Arc<dyn Responder>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(ChatHandler::new(responder)));
    registry.register(Arc::new(FileAnalysisHandler::new()));
    registry.register(Arc::new(SystemActionHandler));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Intent, UserProfile};
    use crate::session::ContextEntry;
    use chrono::Utc;

    fn test_session() -> Session {
        Session::new(&UserProfile {
            user_id: "alice".to_string(),
            display_name: "Alice".to_string(),
            credential_hash: "irrelevant".to_string(),
            created_at: Utc::now(),
        })
    }

    /// Responder that echoes the prompt so tests can inspect it.
    struct EchoResponder;

    #[async_trait::async_trait]
    impl Responder for EchoResponder {
        async fn respond(&self, prompt: &str) -> Result<(String, f32)> {
            Ok((prompt.to_string(), 0.9))
        }
    }

    #[test]
    fn test_registry_resolves_registered_kinds() {
        let registry = create_default_registry(Arc::new(OfflineResponder));

        for kind in IntentKind::DISPATCHABLE {
            assert!(registry.resolve(*kind).is_some(), "missing {}", kind);
        }
        assert!(registry.resolve(IntentKind::Unknown).is_none());
    }

    #[tokio::test]
    async fn test_chat_handler_folds_context() {
        let handler = ChatHandler::new(Arc::new(EchoResponder));
        let mut session = test_session();

        session.append(
            ContextEntry {
                intent: Intent::new(
                    IntentKind::Chat,
                    json!({}),
                    0.9,
                    "what is rust?".to_string(),
                ),
                result: TaskResult::chat(json!({}), "A systems language.".to_string()),
                recorded_at: Utc::now(),
            },
            50,
        );

        let result = handler
            .execute(&json!({ "message": "tell me more" }), &session)
            .await
            .unwrap();

        assert_eq!(result.kind, ResultKind::Chat);
        let answer = result.payload["answer"].as_str().unwrap();
        assert!(answer.contains("what is rust?"));
        assert!(answer.contains("A systems language."));
        assert!(answer.contains("tell me more"));
    }

    #[tokio::test]
    async fn test_chat_handler_requires_message() {
        let handler = ChatHandler::new(Arc::new(EchoResponder));
        let session = test_session();

        let err = handler.execute(&json!({}), &session).await.unwrap_err();
        assert!(matches!(err, AssistantError::Handler(_)));
    }

    #[tokio::test]
    async fn test_system_action_current_time() {
        let handler = SystemActionHandler;
        let session = test_session();

        let result = handler
            .execute(&json!({ "action": "current_time" }), &session)
            .await
            .unwrap();

        assert_eq!(result.kind, ResultKind::Action);
        assert!(result.detail.starts_with("Current date and time:"));
    }

    #[tokio::test]
    async fn test_system_action_unknown_is_handler_error() {
        let handler = SystemActionHandler;
        let session = test_session();

        let err = handler
            .execute(&json!({ "action": "self_destruct" }), &session)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("self_destruct"));
    }

    #[tokio::test]
    async fn test_offline_responder_greeting() {
        let (answer, _) = OfflineResponder.respond("hello there").await.unwrap();
        assert!(answer.contains("Hello"));
    }

    #[tokio::test]
    async fn test_offline_responder_keys_on_message_not_history() {
        let handler = ChatHandler::new(Arc::new(OfflineResponder));
        let mut session = test_session();

        // Prior context means the prompt opens with the history preamble.
        session.append(
            ContextEntry {
                intent: Intent::new(IntentKind::Chat, json!({}), 0.9, "hello".to_string()),
                result: TaskResult::chat(json!({}), "Hello!".to_string()),
                recorded_at: Utc::now(),
            },
            50,
        );

        let result = handler
            .execute(&json!({ "message": "what can you do" }), &session)
            .await
            .unwrap();

        let answer = result.payload["answer"].as_str().unwrap();
        assert!(answer.contains("analyze files"), "got: {}", answer);

        let result = handler
            .execute(&json!({ "message": "thanks a lot" }), &session)
            .await
            .unwrap();
        assert!(result.detail.contains("You're welcome"));
    }

    #[tokio::test]
    async fn test_offline_responder_short_keywords_need_word_boundaries() {
        // "history" must not trigger the "hi" greeting.
        let (answer, _) = OfflineResponder
            .respond("tell me about roman history")
            .await
            .unwrap();
        assert!(!answer.contains("Hello!"), "got: {}", answer);
    }
}
