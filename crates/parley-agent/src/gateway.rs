//! Tool gateway: the external capability servers an orchestrator may call.
//!
//! Each tool server is an opaque endpoint. The gateway exposes the list of
//! configured capabilities and a uniform invoke operation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use parley_core::config::ToolEndpointConfig;

use crate::error::AgentError;

/// A capability advertised to the agent runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCapability {
    pub name: String,
    pub description: String,
}

/// Uniform access to external tool servers.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Capabilities available to the orchestrator.
    fn capabilities(&self) -> Vec<ToolCapability>;

    /// Invoke a tool by name and return its output.
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value, AgentError>;
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    arguments: &'a Value,
}

#[derive(Deserialize)]
struct InvokeResponse {
    output: Value,
}

#[derive(Clone, Debug)]
struct Endpoint {
    url: String,
    description: String,
    timeout: Duration,
}

/// Tool gateway over HTTP: one JSON endpoint per tool server.
///
/// Each call carries the endpoint's own timeout.
#[derive(Clone, Debug)]
pub struct HttpToolGateway {
    client: reqwest::Client,
    endpoints: HashMap<String, Endpoint>,
    order: Vec<String>,
}

impl HttpToolGateway {
    pub fn new(client: reqwest::Client, tools: &[ToolEndpointConfig]) -> Self {
        let mut endpoints = HashMap::new();
        let mut order = Vec::new();
        for tool in tools {
            if endpoints.contains_key(&tool.name) {
                warn!(tool = %tool.name, "Duplicate tool endpoint ignored");
                continue;
            }
            order.push(tool.name.clone());
            endpoints.insert(
                tool.name.clone(),
                Endpoint {
                    url: tool.url.clone(),
                    description: tool.description.clone(),
                    timeout: Duration::from_secs(tool.timeout_secs),
                },
            );
        }
        Self {
            client,
            endpoints,
            order,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[async_trait]
impl ToolGateway for HttpToolGateway {
    fn capabilities(&self) -> Vec<ToolCapability> {
        self.order
            .iter()
            .filter_map(|name| {
                self.endpoints.get(name).map(|e| ToolCapability {
                    name: name.clone(),
                    description: e.description.clone(),
                })
            })
            .collect()
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value, AgentError> {
        let endpoint = self
            .endpoints
            .get(tool)
            .ok_or_else(|| AgentError::UnknownTool(tool.to_string()))?;

        debug!(tool, url = %endpoint.url, "Invoking tool");

        let tool_err = |message: String| AgentError::Tool {
            tool: tool.to_string(),
            message,
        };

        let response = self
            .client
            .post(&endpoint.url)
            .timeout(endpoint.timeout)
            .json(&InvokeRequest {
                arguments: &arguments,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tool_err(format!("timed out after {:?}", endpoint.timeout))
                } else {
                    tool_err(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(tool_err(format!("HTTP {}", response.status())));
        }

        let body: InvokeResponse = response
            .json()
            .await
            .map_err(|e| tool_err(format!("invalid response: {}", e)))?;
        Ok(body.output)
    }
}
