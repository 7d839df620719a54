//! [`ExecutorGateway`] that lets a model call tools before answering.
//!
//! Each round the model either requests a tool (`{"tool": .., "args": ..}`)
//! or gives its final reply. The loop is a small state machine:
//!
//! ```text
//! AwaitModel ──tool request──► ToolInvoked ──► LogEmitted ──► AwaitModel
//!      │
//!      └──final reply / round limit──► Done
//! ```
//!
//! Every tool use produces a log line that becomes part of the step's
//! report, or the `trace` of a deferral. Running out of rounds defers the
//! step to a technician.

use std::fmt::Write;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::tools::{ToolBox, ToolCall};
use crate::gateway::{ExecutionRequest, ExecutorGateway, ExecutorOutcome};
use crate::model::ModelClient;

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

const INSTRUCTIONS: &str = "\
You execute one step of a data-center maintenance plan. To run a tool, \
reply with only {\"tool\": \"<name>\", \"args\": {...}}. When the step is \
done, reply with a short report of what you did. If the step needs a \
person on site, reply with only \
{\"executor\": \"technician\", \"reason\": \"<why>\"}.
";

enum LoopState {
    AwaitModel,
    ToolInvoked { call: ToolCall, output: String },
    LogEmitted,
    Done(String),
}

pub struct ModelExecutor {
    model: Arc<dyn ModelClient>,
    tools: ToolBox,
    max_rounds: u32,
}

impl ModelExecutor {
    pub fn new(model: Arc<dyn ModelClient>, tools: ToolBox) -> Self {
        Self {
            model,
            tools,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    fn initial_prompt(&self, request: &ExecutionRequest) -> String {
        let mut prompt = String::from(INSTRUCTIONS);
        if self.tools.is_empty() {
            prompt.push_str("\nNo tools are available.\n");
        } else {
            let _ = write!(prompt, "\nAvailable tools:\n{}", self.tools.describe());
        }
        let _ = write!(prompt, "\n{}", request.render());
        prompt
    }

    async fn invoke(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.get(&call.name) else {
            return format!(
                "error: unknown tool {:?}; available: {}",
                call.name,
                self.tools.names().join(", ")
            );
        };
        match tool.invoke(&call.args).await {
            Ok(output) => output.trim().to_owned(),
            Err(e) => format!("error: {e:#}"),
        }
    }
}

#[async_trait]
impl ExecutorGateway for ModelExecutor {
    fn name(&self) -> &str {
        self.model.name()
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        let mut transcript = self.initial_prompt(request);
        let mut tool_log: Vec<String> = Vec::new();
        let mut rounds = 0;
        let mut state = LoopState::AwaitModel;

        loop {
            state = match state {
                LoopState::AwaitModel => {
                    if rounds == self.max_rounds {
                        tracing::warn!(
                            work_order_id = %request.work_order_id,
                            step_number = request.step_number,
                            rounds,
                            "tool round limit reached"
                        );
                        LoopState::Done(ExecutorOutcome::deferral(&format!(
                            "agent did not finish step {} within {} tool rounds",
                            request.step_number, self.max_rounds
                        )))
                    } else {
                        rounds += 1;
                        let reply = self.model.complete(&transcript).await?;
                        match ToolCall::parse(&reply) {
                            Some(call) => {
                                let output = self.invoke(&call).await;
                                LoopState::ToolInvoked { call, output }
                            }
                            None => LoopState::Done(reply),
                        }
                    }
                }
                LoopState::ToolInvoked { call, output } => {
                    let line = format!("[{}] {} -> {}", call.name, compact(&call.args), output);
                    tracing::info!(
                        work_order_id = %request.work_order_id,
                        step_number = request.step_number,
                        tool = %call.name,
                        "tool invoked"
                    );
                    let _ = write!(
                        transcript,
                        "\nTool call: {}\nTool result:\n{}\n",
                        serde_json::json!({ "tool": call.name, "args": call.args }),
                        output
                    );
                    tool_log.push(line);
                    LoopState::LogEmitted
                }
                LoopState::LogEmitted => LoopState::AwaitModel,
                LoopState::Done(reply) => {
                    if tool_log.is_empty() {
                        return Ok(reply);
                    }
                    let trace = tool_log.join("\n");
                    if let ExecutorOutcome::Deferred { reason, .. } = ExecutorOutcome::classify(&reply) {
                        return Ok(ExecutorOutcome::deferral_with_trace(&reason, &trace));
                    }
                    return Ok(format!("{trace}\n{}", reply.trim()));
                }
            };
        }
    }
}

fn compact(args: &Value) -> String {
    match args {
        Value::Object(map) if map.is_empty() => "{}".to_owned(),
        other => other.to_string(),
    }
}
