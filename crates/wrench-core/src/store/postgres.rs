//! [`PlanStore`] backed by PostgreSQL through the `wrench-db` queries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use wrench_db::models::{
    AgentLog, EscalationMessage, EscalationStatus, ExpertiseLevel, InventoryItem, PlanStep,
    Technician, WorkOrder, WorkOrderStatus,
};
use wrench_db::queries::agent_logs::{self, NewAgentLog};
use wrench_db::queries::escalations::{self, NewEscalation};
use wrench_db::queries::inventory::{self, NewInventoryItem};
use wrench_db::queries::steps;
use wrench_db::queries::technicians;
use wrench_db::queries::work_orders::{self, NewWorkOrder};

use super::{InventoryStore, PlanStore};
use crate::gateway::PlannedStep;

/// PostgreSQL-backed plan store.
#[derive(Debug, Clone)]
pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn create_work_order(
        &self,
        order: &NewWorkOrder,
        planned: &[PlannedStep],
    ) -> Result<(WorkOrder, Vec<PlanStep>)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let work_order = work_orders::insert_work_order(&mut *tx, order).await?;
        let mut created = Vec::with_capacity(planned.len());
        for step in planned {
            created.push(
                steps::insert_step(&mut *tx, work_order.id, step.step_number, &step.description)
                    .await?,
            );
        }

        tx.commit()
            .await
            .context("failed to commit work order creation")?;
        Ok((work_order, created))
    }

    async fn get_work_order(&self, id: Uuid) -> Result<Option<WorkOrder>> {
        work_orders::get_work_order(&self.pool, id).await
    }

    async fn list_work_orders(&self) -> Result<Vec<WorkOrder>> {
        work_orders::list_work_orders(&self.pool).await
    }

    async fn transition_work_order(
        &self,
        id: Uuid,
        from: &[WorkOrderStatus],
        to: WorkOrderStatus,
    ) -> Result<Option<WorkOrder>> {
        work_orders::transition_work_order_status(&self.pool, id, from, to).await
    }

    async fn assign_technician(&self, id: Uuid, technician_id: Uuid) -> Result<Option<WorkOrder>> {
        work_orders::assign_technician(&self.pool, id, technician_id).await
    }

    async fn list_steps(&self, work_order_id: Uuid) -> Result<Vec<PlanStep>> {
        steps::list_steps_for_work_order(&self.pool, work_order_id).await
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<PlanStep>> {
        steps::get_step(&self.pool, id).await
    }

    async fn start_step(&self, id: Uuid) -> Result<Option<PlanStep>> {
        steps::start_step(&self.pool, id).await
    }

    async fn complete_step(&self, id: Uuid, result: &str) -> Result<Option<PlanStep>> {
        steps::complete_step(&self.pool, id, result).await
    }

    async fn defer_step(&self, id: Uuid, reason: &str) -> Result<Option<PlanStep>> {
        steps::defer_step(&self.pool, id, reason).await
    }

    async fn fail_step(&self, id: Uuid, error: &str) -> Result<Option<PlanStep>> {
        steps::fail_step(&self.pool, id, error).await
    }

    async fn resume_step(&self, id: Uuid, note: Option<&str>) -> Result<Option<PlanStep>> {
        steps::resume_step(&self.pool, id, note).await
    }

    async fn replace_tail(
        &self,
        work_order_id: Uuid,
        from: i32,
        replacement: &[PlannedStep],
    ) -> Result<Option<(WorkOrder, Vec<PlanStep>)>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let removed = steps::delete_steps_from(&mut *tx, work_order_id, from).await?;
        let mut inserted = Vec::with_capacity(replacement.len());
        for step in replacement {
            inserted.push(
                steps::insert_step(&mut *tx, work_order_id, step.step_number, &step.description)
                    .await?,
            );
        }

        let reopened = work_orders::transition_work_order_status(
            &mut *tx,
            work_order_id,
            &[WorkOrderStatus::Completed],
            WorkOrderStatus::InProgress,
        )
        .await?;
        let work_order = match reopened {
            Some(wo) => Some(wo),
            None => work_orders::touch_work_order(&mut *tx, work_order_id).await?,
        };

        let Some(work_order) = work_order else {
            // Dropping the transaction rolls back the delete.
            return Ok(None);
        };

        tx.commit()
            .await
            .context("failed to commit plan regeneration")?;

        tracing::debug!(
            work_order_id = %work_order_id,
            removed,
            inserted = inserted.len(),
            "replaced plan tail"
        );
        Ok(Some((work_order, inserted)))
    }

    async fn append_log(&self, log: &NewAgentLog) -> Result<AgentLog> {
        agent_logs::insert_agent_log(&self.pool, log).await
    }

    async fn list_logs(&self, work_order_id: Uuid) -> Result<Vec<AgentLog>> {
        agent_logs::list_logs_for_work_order(&self.pool, work_order_id).await
    }

    async fn create_escalation(&self, escalation: &NewEscalation) -> Result<EscalationMessage> {
        escalations::insert_escalation(&self.pool, escalation).await
    }

    async fn get_escalation(&self, id: Uuid) -> Result<Option<EscalationMessage>> {
        escalations::get_escalation(&self.pool, id).await
    }

    async fn list_escalations(&self, work_order_id: Uuid) -> Result<Vec<EscalationMessage>> {
        escalations::list_escalations_for_work_order(&self.pool, work_order_id).await
    }

    async fn list_open_escalations(&self) -> Result<Vec<EscalationMessage>> {
        escalations::list_open_escalations(&self.pool).await
    }

    async fn transition_escalation(
        &self,
        id: Uuid,
        from: EscalationStatus,
        to: EscalationStatus,
    ) -> Result<Option<EscalationMessage>> {
        escalations::transition_escalation_status(&self.pool, id, from, to).await
    }

    async fn create_technician(
        &self,
        name: &str,
        skill_level: ExpertiseLevel,
    ) -> Result<Technician> {
        technicians::insert_technician(&self.pool, name, skill_level).await
    }

    async fn get_technician(&self, id: Uuid) -> Result<Option<Technician>> {
        technicians::get_technician(&self.pool, id).await
    }

    async fn list_technicians(&self) -> Result<Vec<Technician>> {
        technicians::list_technicians(&self.pool).await
    }
}

#[async_trait]
impl InventoryStore for PgPlanStore {
    async fn add_item(&self, item: &NewInventoryItem) -> Result<InventoryItem> {
        inventory::insert_inventory_item(&self.pool, item).await
    }

    async fn list_items(&self) -> Result<Vec<InventoryItem>> {
        inventory::list_inventory_items(&self.pool).await
    }

    async fn search_items(
        &self,
        name: Option<&str>,
        location: Option<&str>,
    ) -> Result<Vec<InventoryItem>> {
        inventory::search_inventory_items(&self.pool, name, location).await
    }

    async fn adjust_quantity(&self, id: Uuid, delta: i32) -> Result<Option<InventoryItem>> {
        inventory::adjust_inventory_quantity(&self.pool, id, delta).await
    }

    async fn set_reserved(&self, id: Uuid, reserved: bool) -> Result<Option<InventoryItem>> {
        inventory::set_inventory_reserved(&self.pool, id, reserved).await
    }
}
