//! Tools
//!
//! Functions the model may call during a turn. A [`Tool`] describes itself
//! with a JSON-schema parameter object (sent to the backend in the `tools`
//! array) and executes with the arguments the model produced.
//!
//! The [`ToolRegistry`] resolves names to tools and validates nothing on its
//! own: each tool deserializes its arguments into a typed struct, so argument
//! errors surface as [`ToolError::InvalidArguments`].

mod calculator;
mod invocation;
mod weather;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ToolSettings;

pub use calculator::Calculator;
pub use invocation::{ToolInvocation, ToolState, TransitionError};
pub use weather::Weather;

/// Per-request timeout for tools that call external services
const TOOL_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Tool execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model named a tool that is not registered
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's parameters
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments {
        /// Tool name
        tool: String,
        /// What was wrong
        reason: String,
    },

    /// The tool ran and failed
    #[error("{0:#}")]
    Execution(#[from] anyhow::Error),
}

/// A callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool
    fn name(&self) -> &str;

    /// One-line description shown to the model
    fn description(&self) -> &str;

    /// JSON-schema object describing the arguments
    fn parameters(&self) -> Value;

    /// Execute with the given arguments
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Deserialize tool arguments into their typed form
pub fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Tool declaration in the backend request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Always `function`
    #[serde(rename = "type")]
    pub kind: String,
    /// The function signature
    pub function: FunctionDefinition,
}

/// Name, description and parameter schema of a tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Tool name
    pub name: String,
    /// Description
    pub description: String,
    /// JSON-schema parameters
    pub parameters: Value,
}

impl ToolDefinition {
    fn of(tool: &dyn Tool) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            },
        }
    }
}

/// Registered tools, in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|tool| tool.name()))
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `weather` and `calculator` tools
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client for the weather tool cannot be built.
    pub fn builtin(settings: &ToolSettings) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(TOOL_HTTP_TIMEOUT)
            .build()?;

        let mut registry = Self::new();
        registry.register(Weather::new(
            http_client,
            &settings.geocoding_base_url,
            &settings.weather_base_url,
        ));
        registry.register(Calculator);
        Ok(registry)
    }

    /// Add a tool; a tool with the same name is replaced
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Look up a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Whether no tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations for the backend request
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| ToolDefinition::of(t.as_ref())).collect()
    }

    /// Run a tool by name
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, "Model called an unknown tool");
            return Err(ToolError::UnknownTool(name.to_string()));
        };

        debug!(tool = %name, "Executing tool");
        let result = tool.call(arguments).await;
        if let Err(e) = &result {
            warn!(tool = %name, error = %e, "Tool failed");
        }
        result
    }
}
