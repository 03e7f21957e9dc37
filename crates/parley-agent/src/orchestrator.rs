//! Agent orchestrator: the external runtime that turns a conversation
//! history into an assistant reply, calling tools along the way.
//!
//! Parley only specifies the contract. `HttpAgentOrchestrator` speaks a small
//! JSON step protocol: each request carries the history and any tool results
//! so far; the runtime answers with either a final reply or one tool call,
//! which is executed through the [`ToolGateway`] before the next round.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use parley_core::config::AgentConfig;
use parley_core::types::{Message, MessageContent, ModelSelector, Role};

use crate::error::AgentError;
use crate::gateway::{ToolCapability, ToolGateway};

/// Produces the assistant reply for a conversation.
#[async_trait]
pub trait AgentOrchestrator: Send + Sync {
    /// Run one orchestration over the full ordered history. The last message
    /// is the user's new input.
    async fn run(&self, history: &[Message]) -> Result<MessageContent, AgentError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepRequest<'a> {
    model: &'a ModelSelector,
    instruction: &'a str,
    messages: &'a [WireMessage],
    tools: &'a [ToolCapability],
    tool_results: &'a [ToolResult],
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

/// Outcome of one tool call, sent back on the next round.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResult {
    id: String,
    tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Step {
    Final {
        content: ReplyContent,
    },
    ToolCall {
        id: String,
        tool: String,
        #[serde(default)]
        arguments: Value,
    },
}

/// Runtimes may answer with a bare string or a tagged content object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplyContent {
    Plain(String),
    Structured(MessageContent),
}

impl From<ReplyContent> for MessageContent {
    fn from(reply: ReplyContent) -> Self {
        match reply {
            ReplyContent::Plain(text) => MessageContent::Text { text },
            ReplyContent::Structured(content) => content,
        }
    }
}

// =============================================================================
// HTTP orchestrator
// =============================================================================

/// Orchestrator backed by an external agent runtime over HTTP.
pub struct HttpAgentOrchestrator {
    client: reqwest::Client,
    endpoint: String,
    model: ModelSelector,
    instruction: String,
    max_tool_rounds: u32,
    gateway: Arc<dyn ToolGateway>,
}

impl HttpAgentOrchestrator {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        model: ModelSelector,
        config: &AgentConfig,
        gateway: Arc<dyn ToolGateway>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model,
            instruction: config.instruction.clone(),
            max_tool_rounds: config.max_tool_rounds,
            gateway,
        }
    }

    async fn step(
        &self,
        messages: &[WireMessage],
        tools: &[ToolCapability],
        tool_results: &[ToolResult],
    ) -> Result<Step, AgentError> {
        let request = StepRequest {
            model: &self.model,
            instruction: &self.instruction,
            messages,
            tools,
            tool_results,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AgentOrchestrator for HttpAgentOrchestrator {
    async fn run(&self, history: &[Message]) -> Result<MessageContent, AgentError> {
        let messages: Vec<WireMessage> = history
            .iter()
            .map(|m| WireMessage {
                role: m.role,
                content: m.content.as_text(),
            })
            .collect();
        let tools = self.gateway.capabilities();
        let mut tool_results: Vec<ToolResult> = Vec::new();

        for round in 0..=self.max_tool_rounds {
            match self.step(&messages, &tools, &tool_results).await? {
                Step::Final { content } => {
                    info!(rounds = round, "Agent produced final reply");
                    return Ok(content.into());
                }
                Step::ToolCall { .. } if round == self.max_tool_rounds => break,
                Step::ToolCall {
                    id,
                    tool,
                    arguments,
                } => {
                    debug!(round, tool = %tool, "Agent requested tool call");
                    let result = match self.gateway.invoke(&tool, arguments).await {
                        Ok(output) => ToolResult {
                            id,
                            tool,
                            output: Some(output),
                            error: None,
                        },
                        Err(e) => {
                            // Reported back to the runtime, which decides how to continue.
                            warn!(tool = %tool, error = %e, "Tool call failed");
                            ToolResult {
                                id,
                                tool,
                                output: None,
                                error: Some(e.to_string()),
                            }
                        }
                    };
                    tool_results.push(result);
                }
            }
        }

        Err(AgentError::TooManyToolRounds(self.max_tool_rounds))
    }
}

/// Stand-in used when no agent runtime endpoint is configured.
///
/// Every turn fails, so conversations record the error reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredOrchestrator;

#[async_trait]
impl AgentOrchestrator for UnconfiguredOrchestrator {
    async fn run(&self, _history: &[Message]) -> Result<MessageContent, AgentError> {
        Err(AgentError::NotConfigured)
    }
}
