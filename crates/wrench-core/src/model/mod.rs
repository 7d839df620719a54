//! Language-model transport used by the gateway adapters.
//!
//! A [`ModelClient`] turns a prompt into a completion. The only shipped
//! implementation, [`CommandModel`], pipes the prompt into an external
//! program and reads the completion from its stdout, so any CLI that
//! speaks stdin/stdout can back the planner or executor.

pub mod command;

use anyhow::Result;
use async_trait::async_trait;

pub use command::{CommandModel, CommandOutput, run_with_input};

/// Prompt in, completion out.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ModelClient) {}
};
