//! Gateway implementations backed by a [`crate::model::ModelClient`].

pub mod executor;
pub mod inventory;
pub mod planner;
pub mod tools;

pub use executor::ModelExecutor;
pub use inventory::CheckInventoryTool;
pub use planner::ModelPlanner;
pub use tools::{CommandTool, Tool, ToolBox, ToolCall};
