//! Work order planning and plan execution.
//!
//! The [`orchestrator::Orchestrator`] turns a ticket into a classified work
//! order with a numbered plan, walks the plan one step at a time through an
//! [`gateway::ExecutorGateway`], stops at the first step a technician must
//! perform, and can replace the unexecuted tail of a plan when a technician
//! reports an issue.
//!
//! ```text
//! ticket ──► PlannerGateway ──► PlanStore (work order + steps)
//!                                   │
//!            Orchestrator::run ◄────┘
//!                 │ one step at a time
//!                 ▼
//!           ExecutorGateway ──► Completed ──► next step
//!                           └─► Deferred  ──► escalation, halt
//! ```

pub mod adapter;
pub mod error;
pub mod escalation;
pub mod gateway;
pub mod model;
pub mod orchestrator;
pub mod recovery;
pub mod store;

pub use error::{PlannerFormatError, WrenchError};
pub use orchestrator::{Orchestrator, Resume, RunOutcome, RunReport};
