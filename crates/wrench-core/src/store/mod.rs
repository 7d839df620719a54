//! Plan Store: durable per-work-order step collections.
//!
//! Every mutation is an explicit command that returns the updated row, or
//! `None` when the row does not exist or its current state did not match
//! the command's guard. Callers turn `None` into the appropriate
//! [`crate::WrenchError`].
//!
//! Two implementations ship with the crate:
//!
//! - [`PgPlanStore`] wraps the `wrench-db` query functions.
//! - [`MemoryPlanStore`] keeps everything behind a `tokio::sync::Mutex`
//!   and applies the same guards; it backs the orchestrator tests.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use wrench_db::models::{
    AgentLog, EscalationMessage, EscalationStatus, ExpertiseLevel, InventoryItem, PlanStep,
    Technician, WorkOrder, WorkOrderStatus,
};
use wrench_db::queries::agent_logs::NewAgentLog;
use wrench_db::queries::escalations::NewEscalation;
use wrench_db::queries::inventory::NewInventoryItem;
use wrench_db::queries::work_orders::NewWorkOrder;

use crate::gateway::PlannedStep;

pub use memory::MemoryPlanStore;
pub use postgres::PgPlanStore;

/// Storage operations used by the orchestrator, issue recovery and the
/// escalation desk.
#[async_trait]
pub trait PlanStore: Send + Sync {
    // -- work orders --------------------------------------------------------

    /// Insert a `pending` work order together with its `pending` steps,
    /// atomically.
    async fn create_work_order(
        &self,
        order: &NewWorkOrder,
        steps: &[PlannedStep],
    ) -> Result<(WorkOrder, Vec<PlanStep>)>;

    async fn get_work_order(&self, id: Uuid) -> Result<Option<WorkOrder>>;

    /// All work orders, newest first.
    async fn list_work_orders(&self) -> Result<Vec<WorkOrder>>;

    /// Move a work order to `to` if its status is one of `from`.
    async fn transition_work_order(
        &self,
        id: Uuid,
        from: &[WorkOrderStatus],
        to: WorkOrderStatus,
    ) -> Result<Option<WorkOrder>>;

    async fn assign_technician(&self, id: Uuid, technician_id: Uuid) -> Result<Option<WorkOrder>>;

    // -- steps --------------------------------------------------------------

    /// Steps of a work order in ascending step_number order.
    async fn list_steps(&self, work_order_id: Uuid) -> Result<Vec<PlanStep>>;

    async fn get_step(&self, id: Uuid) -> Result<Option<PlanStep>>;

    /// `pending -> in_progress`, only if no other step of the work order is
    /// in progress and every lower-numbered step is terminal.
    async fn start_step(&self, id: Uuid) -> Result<Option<PlanStep>>;

    /// `in_progress -> success` with executor `agent`.
    async fn complete_step(&self, id: Uuid, result: &str) -> Result<Option<PlanStep>>;

    /// Hand an in-progress step to a technician. The step stays
    /// `in_progress`.
    async fn defer_step(&self, id: Uuid, reason: &str) -> Result<Option<PlanStep>>;

    /// `in_progress -> failure`.
    async fn fail_step(&self, id: Uuid, error: &str) -> Result<Option<PlanStep>>;

    /// Technician-deferred or failed step -> `success` with executor
    /// `technician`.
    async fn resume_step(&self, id: Uuid, note: Option<&str>) -> Result<Option<PlanStep>>;

    /// Atomically delete every step numbered `>= from`, insert
    /// `replacement`, reopen a `completed` work order and bump its
    /// `updated_at`. Returns `None` if the work order does not exist.
    async fn replace_tail(
        &self,
        work_order_id: Uuid,
        from: i32,
        replacement: &[PlannedStep],
    ) -> Result<Option<(WorkOrder, Vec<PlanStep>)>>;

    // -- logs ---------------------------------------------------------------

    async fn append_log(&self, log: &NewAgentLog) -> Result<AgentLog>;

    /// Logs of a work order, newest first.
    async fn list_logs(&self, work_order_id: Uuid) -> Result<Vec<AgentLog>>;

    // -- escalations --------------------------------------------------------

    async fn create_escalation(&self, escalation: &NewEscalation) -> Result<EscalationMessage>;

    async fn get_escalation(&self, id: Uuid) -> Result<Option<EscalationMessage>>;

    async fn list_escalations(&self, work_order_id: Uuid) -> Result<Vec<EscalationMessage>>;

    /// Escalations not yet resolved, across all work orders.
    async fn list_open_escalations(&self) -> Result<Vec<EscalationMessage>>;

    async fn transition_escalation(
        &self,
        id: Uuid,
        from: EscalationStatus,
        to: EscalationStatus,
    ) -> Result<Option<EscalationMessage>>;

    // -- technicians --------------------------------------------------------

    async fn create_technician(&self, name: &str, skill_level: ExpertiseLevel)
    -> Result<Technician>;

    async fn get_technician(&self, id: Uuid) -> Result<Option<Technician>>;

    async fn list_technicians(&self) -> Result<Vec<Technician>>;
}

/// Spare-part stock. Kept apart from [`PlanStore`] so the inventory tool
/// only sees what it needs.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn add_item(&self, item: &NewInventoryItem) -> Result<InventoryItem>;

    async fn list_items(&self) -> Result<Vec<InventoryItem>>;

    /// Case-insensitive substring match on name and location; `None` or an
    /// empty filter matches everything.
    async fn search_items(
        &self,
        name: Option<&str>,
        location: Option<&str>,
    ) -> Result<Vec<InventoryItem>>;

    /// Add `delta` to the quantity, never going below zero.
    async fn adjust_quantity(&self, id: Uuid, delta: i32) -> Result<Option<InventoryItem>>;

    async fn set_reserved(&self, id: Uuid, reserved: bool) -> Result<Option<InventoryItem>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanStore) {}
    fn _assert_inventory_object_safe(_: &dyn InventoryStore) {}
};
