// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry.
//!
//! The [`Tool`] trait is the interface every callable tool implements. The
//! [`ToolRegistry`] indexes tools by name, advertises their definitions to the
//! model, and validates arguments against each tool's JSON Schema before
//! dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::Validator;
use parley_core::{ParleyError, ToolDefinition};
use serde_json::{Value, json};
use tracing::{info, warn};

/// A function the model may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, as advertised to the model.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Runs the tool on validated arguments.
    ///
    /// Recoverable failures the model should see (no results, page not
    /// found) are returned as `Ok({"error": ...})`.
    async fn invoke(&self, input: Value) -> Result<Value, ParleyError>;
}

struct Entry {
    tool: Arc<dyn Tool>,
    validator: Validator,
}

/// Registry of available tools, indexed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, compiling its schema.
    ///
    /// Fails on a duplicate name or a schema that does not compile.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ParleyError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ParleyError::Tool {
                message: format!("tool '{name}' is already registered"),
                source: None,
            });
        }

        let validator =
            jsonschema::validator_for(&tool.parameters_schema()).map_err(|e| ParleyError::Tool {
                message: format!("invalid parameter schema for '{name}': {e}"),
                source: None,
            })?;

        info!(tool = name.as_str(), "registered tool");
        self.tools.insert(name, Entry { tool, validator });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.tool.clone())
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Definitions for every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|entry| ToolDefinition {
                name: entry.tool.name().to_string(),
                description: entry.tool.description().to_string(),
                parameters: entry.tool.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatches a call by name.
    ///
    /// Never fails: unknown tools, invalid arguments, and tool errors all
    /// become an `{"error": ...}` object that is handed back to the model.
    pub async fn execute(&self, name: &str, arguments: Value) -> Value {
        let Some(entry) = self.tools.get(name) else {
            warn!(tool = name, "model called an unknown tool");
            return json!({ "error": format!("Unknown function {name}") });
        };

        let problems: Vec<String> = entry
            .validator
            .iter_errors(&arguments)
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            warn!(tool = name, errors = ?problems, "tool arguments failed validation");
            return json!({
                "error": format!("Invalid arguments for {name}: {}", problems.join("; "))
            });
        }

        info!(tool = name, arguments = %arguments, "executing tool");
        match entry.tool.invoke(arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                json!({ "error": format!("Error executing {name}: {e}") })
            }
        }
    }
}
