use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParleyError;

/// Title given to a conversation before its first user message.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Appended to a derived title when the source text was cut.
pub const TITLE_TRUNCATION_MARKER: &str = "...";

// =============================================================================
// Enums
// =============================================================================

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ParleyError::Validation(format!(
                "Invalid role '{}'. Must be one of: user, assistant",
                other
            ))),
        }
    }
}

/// Reasoning effort hint carried by a model selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl FromStr for Effort {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Effort::Low),
            "medium" => Ok(Effort::Medium),
            "high" => Ok(Effort::High),
            other => Err(ParleyError::Config(format!(
                "Invalid effort '{}'. Must be one of: low, medium, high",
                other
            ))),
        }
    }
}

// =============================================================================
// Message content
// =============================================================================

/// One titled block of a structured analysis reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub heading: String,
    pub body: String,
}

/// Body of a message.
///
/// Plain text covers user input and most replies. `Analysis` carries the
/// structured payload an orchestrator may return instead of free text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Analysis {
        summary: String,
        #[serde(default)]
        sections: Vec<AnalysisSection>,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    /// Short tag stored alongside the rendered text.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::Analysis { .. } => "analysis",
        }
    }

    /// Render the content as markdown text.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text { text } => text.clone(),
            MessageContent::Analysis { summary, sections } => {
                let mut out = summary.clone();
                for section in sections {
                    out.push_str("\n\n## ");
                    out.push_str(&section.heading);
                    out.push('\n');
                    out.push_str(&section.body);
                }
                out
            }
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A conversation owned by one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single entry in a conversation's append-only log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// 1-based position within the conversation.
    pub seq: i64,
    pub role: Role,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
    pub is_error: bool,
}

/// Authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserIdentity(pub String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Model selector
// =============================================================================

/// Parsed `<provider>.<model>.<effort?>` selector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelector {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<Effort>,
}

impl FromStr for ModelSelector {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let invalid = || {
            ParleyError::Config(format!(
                "Invalid model selector '{}'. Expected <provider>.<model>.<effort?>",
                s
            ))
        };

        let (provider, model, effort) = match parts.as_slice() {
            [provider, model] => (*provider, *model, None),
            [provider, model, effort] => (*provider, *model, Some(effort.parse::<Effort>()?)),
            _ => return Err(invalid()),
        };

        if provider.is_empty() || model.is_empty() {
            return Err(invalid());
        }

        Ok(ModelSelector {
            provider: provider.to_string(),
            model: model.to_string(),
            effort,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Derive a conversation title from the first user message.
///
/// Keeps the first `max_chars` characters of the trimmed text and appends
/// [`TITLE_TRUNCATION_MARKER`] only when something was cut.
pub fn derive_title(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(max_chars).collect();
    title.push_str(TITLE_TRUNCATION_MARKER);
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
        assert!("User".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let parsed: Result<Role, _> = serde_json::from_str("\"tool\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_content_tagged_json() {
        let content = MessageContent::text("hi");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "hi");

        let analysis: MessageContent = serde_json::from_value(serde_json::json!({
            "kind": "analysis",
            "summary": "Two options",
            "sections": [{ "heading": "A", "body": "first" }]
        }))
        .unwrap();
        assert_eq!(analysis.kind(), "analysis");
        assert_eq!(analysis.as_text(), "Two options\n\n## A\nfirst");
    }

    #[test]
    fn test_analysis_without_sections() {
        let content: MessageContent =
            serde_json::from_str(r#"{"kind":"analysis","summary":"only"}"#).unwrap();
        assert_eq!(content.as_text(), "only");
    }

    #[test]
    fn test_model_selector() {
        let sel: ModelSelector = "anthropic.sonnet".parse().unwrap();
        assert_eq!(sel.provider, "anthropic");
        assert_eq!(sel.model, "sonnet");
        assert_eq!(sel.effort, None);

        let sel: ModelSelector = "openai.o3.high".parse().unwrap();
        assert_eq!(sel.effort, Some(Effort::High));
    }

    #[test]
    fn test_model_selector_rejects_malformed() {
        assert!("sonnet".parse::<ModelSelector>().is_err());
        assert!(".sonnet".parse::<ModelSelector>().is_err());
        assert!("a.b.extreme".parse::<ModelSelector>().is_err());
        assert!("a.b.c.d".parse::<ModelSelector>().is_err());
    }

    #[test]
    fn test_derive_title_short() {
        assert_eq!(derive_title("  hello there  ", 60), "hello there");
    }

    #[test]
    fn test_derive_title_exactly_max() {
        let text = "x".repeat(60);
        assert_eq!(derive_title(&text, 60), text);
    }

    #[test]
    fn test_derive_title_truncated() {
        let text = "y".repeat(61);
        let title = derive_title(&text, 60);
        assert_eq!(title, format!("{}...", "y".repeat(60)));
    }

    #[test]
    fn test_derive_title_counts_chars_not_bytes() {
        let text = "é".repeat(61);
        let title = derive_title(&text, 60);
        assert_eq!(title.chars().count(), 63);
        assert!(title.starts_with(&"é".repeat(60)));
    }
}
