//! Reasoning collaborator interface
//!
//! The agent loop talks to the language model only through [`ReasoningClient`],
//! and the model answers in a fixed JSON protocol: either a tool call request
//! or a final-answer declaration. Anything else is a protocol error the loop
//! surfaces as an observation so the planner can self-correct.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

pub use gemini::GeminiClient;

/// Speaker of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The human question.
    User,
    /// Planner output (directives, reasoning).
    Assistant,
    /// A tool result fed back for the next planning step.
    Observation,
}

/// One entry of the rolling turn transcript.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self {
            role: Role::Observation,
            content: content.into(),
        }
    }
}

/// Tool surface advertised to the planner: name, purpose, and a JSON Schema
/// for the arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Planner interface: one prompt in, one raw text reply out.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Invoke the model with the system prompt and transcript so far.
    async fn plan(&self, system_prompt: &str, history: &[HistoryEntry])
        -> Result<String, LlmError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// What the planner asked for this round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Dispatch exactly one tool call.
    ToolCall { name: String, arguments: Value },
    /// Enough evidence gathered; this is the answer.
    Final { content: String },
}

impl Directive {
    /// Parse a raw model reply into a directive.
    ///
    /// Accepted shapes:
    /// `{"tool_call": {"name": "...", "arguments": {...}}}` and
    /// `{"final": true, "content": "..."}`, optionally wrapped in markdown
    /// code fences. Everything else is a protocol violation.
    pub fn parse(raw: &str) -> Result<Self, LlmError> {
        let cleaned = strip_code_fences(raw);
        let value: Value = serde_json::from_str(cleaned)
            .map_err(|e| LlmError::Protocol(format!("reply is not JSON: {e}")))?;

        if let Some(call) = value.get("tool_call") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| LlmError::Protocol("tool_call missing string `name`".into()))?
                .to_string();
            let arguments = call
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            if !arguments.is_object() {
                return Err(LlmError::Protocol(
                    "tool_call `arguments` must be an object".into(),
                ));
            }
            return Ok(Self::ToolCall { name, arguments });
        }

        if value.get("final").and_then(Value::as_bool) == Some(true) {
            let content = value
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| LlmError::Protocol("final reply missing string `content`".into()))?
                .to_string();
            return Ok(Self::Final { content });
        }

        Err(LlmError::Protocol(
            "reply is neither a tool_call nor a final declaration".into(),
        ))
    }
}

/// Strip a surrounding markdown code fence, with or without a language tag.
/// Models wrap JSON in ``` blocks no matter how firmly told not to.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_call() {
        let raw = r#"{"tool_call": {"name": "run_sql", "arguments": {"sql": "SELECT 1"}}}"#;
        let directive = Directive::parse(raw).unwrap();
        assert_eq!(
            directive,
            Directive::ToolCall {
                name: "run_sql".into(),
                arguments: json!({"sql": "SELECT 1"}),
            }
        );
    }

    #[test]
    fn parses_tool_call_without_arguments() {
        let raw = r#"{"tool_call": {"name": "inspect_schema"}}"#;
        match Directive::parse(raw).unwrap() {
            Directive::ToolCall { name, arguments } => {
                assert_eq!(name, "inspect_schema");
                assert!(arguments.as_object().unwrap().is_empty());
            }
            other => panic!("unexpected directive: {other:?}"),
        }
    }

    #[test]
    fn parses_final_declaration() {
        let raw = r#"{"final": true, "content": "Revenue grew 4% month over month."}"#;
        assert_eq!(
            Directive::parse(raw).unwrap(),
            Directive::Final {
                content: "Revenue grew 4% month over month.".into()
            }
        );
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"final\": true, \"content\": \"done\"}\n```";
        assert!(matches!(
            Directive::parse(raw).unwrap(),
            Directive::Final { .. }
        ));
    }

    #[test]
    fn rejects_prose_reply() {
        let err = Directive::parse("Sure! Let me look into that.").unwrap_err();
        assert!(matches!(err, LlmError::Protocol(_)));
    }

    #[test]
    fn rejects_unknown_shape() {
        let err = Directive::parse(r#"{"action": "query"}"#).unwrap_err();
        assert!(matches!(err, LlmError::Protocol(_)));
    }

    #[test]
    fn rejects_non_object_arguments() {
        let err =
            Directive::parse(r#"{"tool_call": {"name": "run_sql", "arguments": "SELECT 1"}}"#)
                .unwrap_err();
        assert!(matches!(err, LlmError::Protocol(_)));
    }

    #[test]
    fn rejects_final_without_content() {
        let err = Directive::parse(r#"{"final": true}"#).unwrap_err();
        assert!(matches!(err, LlmError::Protocol(_)));
    }
}
