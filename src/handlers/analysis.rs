//! File analysis handler
//!
//! Asynchronous: runs under the job supervisor, never on the interactive
//! path. Accepts a file path and returns a structured summary; content is
//! only read for text-like files, and only up to a fixed cap.

use crate::error::{AnalysisError, AssistantError};
use crate::handlers::Handler;
use crate::models::{IntentKind, TaskResult};
use crate::session::Session;
use crate::Result;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

/// Most characters read from a text-like file.
const READ_CAP_CHARS: usize = 10_000;
/// Preview characters included in the summary payload.
const PREVIEW_CHARS: usize = 200;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "ts", "rs", "html", "css", "cpp", "c", "h", "java",
    "json", "toml", "yaml", "yml", "log",
];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileCategory {
    Text,
    Document,
    Spreadsheet,
    Image,
}

impl FileCategory {
    fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Text => "text",
            FileCategory::Document => "document",
            FileCategory::Spreadsheet => "spreadsheet",
            FileCategory::Image => "image",
        }
    }
}

fn category_for(extension: &str) -> Option<FileCategory> {
    let ext = extension.to_lowercase();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileCategory::Text)
    } else if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileCategory::Document)
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileCategory::Spreadsheet)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileCategory::Image)
    } else {
        None
    }
}

pub struct FileAnalysisHandler {
    read_cap: usize,
}

impl FileAnalysisHandler {
    pub fn new() -> Self {
        Self {
            read_cap: READ_CAP_CHARS,
        }
    }
}

impl Default for FileAnalysisHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Handler for FileAnalysisHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::FileAnalysis
    }

    fn is_synchronous(&self) -> bool {
        false
    }

    async fn execute(&self, parameters: &Value, _session: &Session) -> Result<TaskResult> {
        let path_str = parameters
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                AssistantError::Handler(
                    "file analysis requires a 'path' parameter".to_string(),
                )
            })?;

        let path = Path::new(path_str);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.to_string());

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();

        let Some(category) = category_for(&extension) else {
            return Err(AnalysisError::UnsupportedFormat(if extension.is_empty() {
                file_name
            } else {
                extension
            })
            .into());
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AnalysisError::ReadFailure(format!("{}: {}", path_str, e)))?;
        let size_bytes = metadata.len();

        debug!(path = %path_str, category = category.as_str(), size_bytes, "analyzing file");

        let mut payload = json!({
            "file_name": file_name,
            "path": path_str,
            "category": category.as_str(),
            "size_bytes": size_bytes,
        });

        let detail = match category {
            FileCategory::Text => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| AnalysisError::ReadFailure(format!("{}: {}", path_str, e)))?;

                let truncated = content.chars().count() > self.read_cap;
                let capped: String = content.chars().take(self.read_cap).collect();
                let line_count = capped.lines().count();
                let preview: String = capped.chars().take(PREVIEW_CHARS).collect();

                payload["line_count"] = json!(line_count);
                payload["content_truncated"] = json!(truncated);
                payload["preview"] = json!(preview);

                format!(
                    "Analyzed {}: text file, {} bytes, {} lines",
                    payload["file_name"].as_str().unwrap_or(path_str),
                    size_bytes,
                    line_count
                )
            }
            // No content parsers for these; summarize what is known so
            // the user gets an answer instead of a format error.
            FileCategory::Document | FileCategory::Spreadsheet | FileCategory::Image => format!(
                "Received {}: {} file, {} bytes. Content extraction for this \
                 format is not available; metadata summary only.",
                payload["file_name"].as_str().unwrap_or(path_str),
                category.as_str(),
                size_bytes
            ),
        };

        Ok(TaskResult::analysis(payload, detail))
    }
}
