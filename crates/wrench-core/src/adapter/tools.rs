//! Tools the executor model may call, and the registry that holds them.

use std::collections::HashMap;
use std::fmt::Write;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::gateway::strip_code_fence;
use crate::model::run_with_input;

/// Something the executor model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    async fn invoke(&self, args: &Value) -> Result<String>;
}

/// A tool request parsed from a model reply: `{"tool": name, "args": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    /// Parse a reply as a tool request. `None` means the reply is final.
    pub fn parse(reply: &str) -> Option<Self> {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(strip_code_fence(reply)) else {
            return None;
        };
        let name = map.get("tool")?.as_str()?.to_owned();
        let args = map
            .get("args")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Some(Self { name, args })
    }
}

/// Runs an external command with the JSON arguments on stdin and returns
/// its stdout. Non-zero exit and deadline expiry are errors.
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    description: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, args: &Value) -> Result<String> {
        let input = args.to_string();
        let output = tokio::time::timeout(
            self.timeout,
            run_with_input(&self.program, &self.args, &input),
        )
        .await
        .map_err(|_| anyhow!("tool {} timed out after {:?}", self.name, self.timeout))??;

        if !output.success() {
            bail!(
                "tool {} exited with {:?}: {}",
                self.name,
                output.exit_code,
                output.stderr_tail()
            );
        }
        Ok(output.stdout)
    }
}

/// Named collection of [`Tool`]s.
#[derive(Default)]
pub struct ToolBox {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous tool of
    /// that name.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Option<Box<dyn Tool>> {
        let name = tool.name().to_owned();
        self.tools.insert(name, Box::new(tool))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|b| b.as_ref())
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Listing shown to the model.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for name in self.names() {
            if let Some(tool) = self.get(name) {
                let _ = writeln!(out, "- {name}: {}", tool.description());
            }
        }
        out
    }
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sh_tool(name: &str, script: &str) -> CommandTool {
        CommandTool::new(
            name,
            format!("{name} tool"),
            "sh",
            vec!["-c".to_owned(), script.to_owned()],
            Duration::from_secs(10),
        )
    }

    #[test]
    fn parse_tool_call() {
        let call = ToolCall::parse(r#"{"tool": "ping", "args": {"host": "10.0.0.4"}}"#).unwrap();
        assert_eq!(call.name, "ping");
        assert_eq!(call.args, json!({"host": "10.0.0.4"}));

        let call = ToolCall::parse("```json\n{\"tool\": \"uptime\"}\n```").unwrap();
        assert_eq!(call.args, json!({}));

        assert!(ToolCall::parse("Rebooted the switch.").is_none());
        assert!(ToolCall::parse(r#"{"executor": "technician", "reason": "x"}"#).is_none());
        assert!(ToolCall::parse(r#"{"tool": 7}"#).is_none());
    }

    #[tokio::test]
    async fn command_tool_receives_args_on_stdin() {
        let tool = sh_tool("echo", "cat");
        let out = tool.invoke(&json!({"host": "r18"})).await.unwrap();
        assert_eq!(out, r#"{"host":"r18"}"#);
    }

    #[tokio::test]
    async fn command_tool_failure_is_error() {
        let tool = sh_tool("broken", "echo nope >&2; exit 2");
        let err = tool.invoke(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn toolbox_register_and_describe() {
        let mut tools = ToolBox::new();
        assert!(tools.is_empty());
        tools.register(sh_tool("ping", "true"));
        tools.register(sh_tool("ipmi", "true"));
        assert!(tools.register(sh_tool("ping", "false")).is_some());

        assert_eq!(tools.len(), 2);
        assert_eq!(tools.names(), vec!["ipmi", "ping"]);
        assert_eq!(tools.describe(), "- ipmi: ipmi tool\n- ping: ping tool\n");
        assert!(tools.get("ssh").is_none());
    }
}
