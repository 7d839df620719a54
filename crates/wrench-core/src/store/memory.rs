//! In-process [`PlanStore`].
//!
//! Applies the same guards as the SQL queries so orchestrator behaviour can
//! be exercised without a database. Nothing survives the process.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use wrench_db::models::{
    AgentLog, EscalationMessage, EscalationStatus, ExpertiseLevel, InventoryItem, PlanStep,
    StepExecutor, StepStatus, Technician, TechnicianStatus, WorkOrder, WorkOrderStatus,
};
use wrench_db::queries::agent_logs::NewAgentLog;
use wrench_db::queries::escalations::NewEscalation;
use wrench_db::queries::inventory::NewInventoryItem;
use wrench_db::queries::work_orders::NewWorkOrder;

use super::{InventoryStore, PlanStore};
use crate::gateway::PlannedStep;

#[derive(Default)]
struct Tables {
    work_orders: Vec<WorkOrder>,
    steps: Vec<PlanStep>,
    logs: Vec<AgentLog>,
    escalations: Vec<EscalationMessage>,
    technicians: Vec<Technician>,
    inventory: Vec<InventoryItem>,
}

impl Tables {
    fn work_order_mut(&mut self, id: Uuid) -> Option<&mut WorkOrder> {
        self.work_orders.iter_mut().find(|wo| wo.id == id)
    }

    fn step_mut(&mut self, id: Uuid) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    fn new_step(work_order_id: Uuid, planned: &PlannedStep) -> PlanStep {
        PlanStep {
            id: Uuid::new_v4(),
            work_order_id,
            step_number: planned.step_number,
            description: planned.description.clone(),
            executor: StepExecutor::Undecided,
            status: StepStatus::Pending,
            result: None,
            executed_at: None,
            created_at: Utc::now(),
        }
    }

    fn check_unique_numbers(&self, work_order_id: Uuid, planned: &[PlannedStep]) -> Result<()> {
        for (i, step) in planned.iter().enumerate() {
            if step.step_number < 1 {
                bail!("step_number must be positive, got {}", step.step_number);
            }
            let clash_existing = self
                .steps
                .iter()
                .any(|s| s.work_order_id == work_order_id && s.step_number == step.step_number);
            let clash_batch = planned[..i]
                .iter()
                .any(|p| p.step_number == step.step_number);
            if clash_existing || clash_batch {
                bail!(
                    "duplicate step_number {} for work order {work_order_id}",
                    step.step_number
                );
            }
        }
        Ok(())
    }

    /// Apply `f` to the step if `guard` holds, returning the updated copy.
    fn update_step(
        &mut self,
        id: Uuid,
        guard: impl FnOnce(&PlanStep) -> bool,
        f: impl FnOnce(&mut PlanStep),
    ) -> Option<PlanStep> {
        let step = self.step_mut(id)?;
        if !guard(step) {
            return None;
        }
        f(step);
        Some(step.clone())
    }
}

/// Plan store kept entirely in memory.
#[derive(Default)]
pub struct MemoryPlanStore {
    tables: Mutex<Tables>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn create_work_order(
        &self,
        order: &NewWorkOrder,
        planned: &[PlannedStep],
    ) -> Result<(WorkOrder, Vec<PlanStep>)> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let work_order = WorkOrder {
            id: Uuid::new_v4(),
            title: order.title.clone(),
            description: order.description.clone(),
            priority: order.priority,
            category: order.category,
            estimated_expertise_level: order.estimated_expertise_level,
            status: WorkOrderStatus::Pending,
            assigned_technician: None,
            created_at: now,
            updated_at: now,
        };
        t.check_unique_numbers(work_order.id, planned)?;

        let steps: Vec<PlanStep> = planned
            .iter()
            .map(|p| Tables::new_step(work_order.id, p))
            .collect();
        t.work_orders.push(work_order.clone());
        t.steps.extend(steps.iter().cloned());
        Ok((work_order, steps))
    }

    async fn get_work_order(&self, id: Uuid) -> Result<Option<WorkOrder>> {
        let t = self.tables.lock().await;
        Ok(t.work_orders.iter().find(|wo| wo.id == id).cloned())
    }

    async fn list_work_orders(&self) -> Result<Vec<WorkOrder>> {
        let t = self.tables.lock().await;
        Ok(t.work_orders.iter().rev().cloned().collect())
    }

    async fn transition_work_order(
        &self,
        id: Uuid,
        from: &[WorkOrderStatus],
        to: WorkOrderStatus,
    ) -> Result<Option<WorkOrder>> {
        let mut t = self.tables.lock().await;
        let Some(wo) = t.work_order_mut(id) else {
            return Ok(None);
        };
        if !from.contains(&wo.status) {
            return Ok(None);
        }
        wo.status = to;
        wo.updated_at = Utc::now();
        Ok(Some(wo.clone()))
    }

    async fn assign_technician(&self, id: Uuid, technician_id: Uuid) -> Result<Option<WorkOrder>> {
        let mut t = self.tables.lock().await;
        if !t.technicians.iter().any(|tech| tech.id == technician_id) {
            bail!("technician {technician_id} does not exist");
        }
        Ok(t.work_order_mut(id).map(|wo| {
            wo.assigned_technician = Some(technician_id);
            wo.updated_at = Utc::now();
            wo.clone()
        }))
    }

    async fn list_steps(&self, work_order_id: Uuid) -> Result<Vec<PlanStep>> {
        let t = self.tables.lock().await;
        let mut steps: Vec<PlanStep> = t
            .steps
            .iter()
            .filter(|s| s.work_order_id == work_order_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<PlanStep>> {
        let t = self.tables.lock().await;
        Ok(t.steps.iter().find(|s| s.id == id).cloned())
    }

    async fn start_step(&self, id: Uuid) -> Result<Option<PlanStep>> {
        let mut t = self.tables.lock().await;
        let Some(target) = t.steps.iter().find(|s| s.id == id).cloned() else {
            return Ok(None);
        };
        let blocked = t.steps.iter().any(|o| {
            o.work_order_id == target.work_order_id
                && o.id != target.id
                && (o.status == StepStatus::InProgress
                    || (o.step_number < target.step_number && o.status == StepStatus::Pending))
        });
        if blocked {
            return Ok(None);
        }
        Ok(t.update_step(
            id,
            |s| s.status == StepStatus::Pending,
            |s| s.status = StepStatus::InProgress,
        ))
    }

    async fn complete_step(&self, id: Uuid, result: &str) -> Result<Option<PlanStep>> {
        let mut t = self.tables.lock().await;
        Ok(t.update_step(
            id,
            |s| s.status == StepStatus::InProgress,
            |s| {
                s.status = StepStatus::Success;
                s.executor = StepExecutor::Agent;
                s.result = Some(result.to_owned());
                s.executed_at = Some(Utc::now());
            },
        ))
    }

    async fn defer_step(&self, id: Uuid, reason: &str) -> Result<Option<PlanStep>> {
        let mut t = self.tables.lock().await;
        Ok(t.update_step(
            id,
            |s| s.status == StepStatus::InProgress,
            |s| {
                s.executor = StepExecutor::Technician;
                s.result = Some(reason.to_owned());
            },
        ))
    }

    async fn fail_step(&self, id: Uuid, error: &str) -> Result<Option<PlanStep>> {
        let mut t = self.tables.lock().await;
        Ok(t.update_step(
            id,
            |s| s.status == StepStatus::InProgress,
            |s| {
                s.status = StepStatus::Failure;
                s.result = Some(error.to_owned());
                s.executed_at = Some(Utc::now());
            },
        ))
    }

    async fn resume_step(&self, id: Uuid, note: Option<&str>) -> Result<Option<PlanStep>> {
        let mut t = self.tables.lock().await;
        Ok(t.update_step(
            id,
            |s| {
                (s.status == StepStatus::InProgress && s.executor == StepExecutor::Technician)
                    || s.status == StepStatus::Failure
            },
            |s| {
                s.status = StepStatus::Success;
                s.executor = StepExecutor::Technician;
                if let Some(note) = note {
                    s.result = Some(note.to_owned());
                }
                s.executed_at = Some(Utc::now());
            },
        ))
    }

    async fn replace_tail(
        &self,
        work_order_id: Uuid,
        from: i32,
        replacement: &[PlannedStep],
    ) -> Result<Option<(WorkOrder, Vec<PlanStep>)>> {
        let mut t = self.tables.lock().await;
        if t.work_order_mut(work_order_id).is_none() {
            return Ok(None);
        }

        // Validate against the surviving prefix before touching anything.
        let survivors = t
            .steps
            .iter()
            .filter(|s| s.work_order_id == work_order_id && s.step_number < from);
        for (i, step) in replacement.iter().enumerate() {
            let clash = survivors.clone().any(|s| s.step_number == step.step_number)
                || replacement[..i]
                    .iter()
                    .any(|p| p.step_number == step.step_number);
            if clash || step.step_number < 1 {
                bail!(
                    "invalid replacement step_number {} for work order {work_order_id}",
                    step.step_number
                );
            }
        }

        let removed: Vec<Uuid> = t
            .steps
            .iter()
            .filter(|s| s.work_order_id == work_order_id && s.step_number >= from)
            .map(|s| s.id)
            .collect();
        t.steps.retain(|s| !removed.contains(&s.id));
        for log in t.logs.iter_mut() {
            if log.related_step.is_some_and(|id| removed.contains(&id)) {
                log.related_step = None;
            }
        }
        for esc in t.escalations.iter_mut() {
            if esc.related_step.is_some_and(|id| removed.contains(&id)) {
                esc.related_step = None;
            }
        }

        let inserted: Vec<PlanStep> = replacement
            .iter()
            .map(|p| Tables::new_step(work_order_id, p))
            .collect();
        t.steps.extend(inserted.iter().cloned());

        let Some(wo) = t.work_order_mut(work_order_id) else {
            return Ok(None);
        };
        if wo.status == WorkOrderStatus::Completed {
            wo.status = WorkOrderStatus::InProgress;
        }
        wo.updated_at = Utc::now();
        Ok(Some((wo.clone(), inserted)))
    }

    async fn append_log(&self, log: &NewAgentLog) -> Result<AgentLog> {
        let mut t = self.tables.lock().await;
        if !t.work_orders.iter().any(|wo| wo.id == log.work_order_id) {
            bail!("work order {} does not exist", log.work_order_id);
        }
        let row = AgentLog {
            id: Uuid::new_v4(),
            work_order_id: log.work_order_id,
            related_step: log.related_step,
            agent_action: log.agent_action.clone(),
            result: log.result.clone(),
            source: log.source,
            log_type: log.log_type,
            recorded_at: Utc::now(),
        };
        t.logs.push(row.clone());
        Ok(row)
    }

    async fn list_logs(&self, work_order_id: Uuid) -> Result<Vec<AgentLog>> {
        let t = self.tables.lock().await;
        Ok(t.logs
            .iter()
            .rev()
            .filter(|l| l.work_order_id == work_order_id)
            .cloned()
            .collect())
    }

    async fn create_escalation(&self, escalation: &NewEscalation) -> Result<EscalationMessage> {
        let mut t = self.tables.lock().await;
        if !t.work_orders.iter().any(|wo| wo.id == escalation.work_order_id) {
            bail!("work order {} does not exist", escalation.work_order_id);
        }
        let row = EscalationMessage {
            id: Uuid::new_v4(),
            work_order_id: escalation.work_order_id,
            related_step: escalation.related_step,
            technician_id: escalation.technician_id,
            message: escalation.message.clone(),
            source: escalation.source,
            status: EscalationStatus::Sent,
            created_at: Utc::now(),
        };
        t.escalations.push(row.clone());
        Ok(row)
    }

    async fn get_escalation(&self, id: Uuid) -> Result<Option<EscalationMessage>> {
        let t = self.tables.lock().await;
        Ok(t.escalations.iter().find(|e| e.id == id).cloned())
    }

    async fn list_escalations(&self, work_order_id: Uuid) -> Result<Vec<EscalationMessage>> {
        let t = self.tables.lock().await;
        Ok(t.escalations
            .iter()
            .filter(|e| e.work_order_id == work_order_id)
            .cloned()
            .collect())
    }

    async fn list_open_escalations(&self) -> Result<Vec<EscalationMessage>> {
        let t = self.tables.lock().await;
        Ok(t.escalations
            .iter()
            .filter(|e| e.status != EscalationStatus::Resolved)
            .cloned()
            .collect())
    }

    async fn transition_escalation(
        &self,
        id: Uuid,
        from: EscalationStatus,
        to: EscalationStatus,
    ) -> Result<Option<EscalationMessage>> {
        let mut t = self.tables.lock().await;
        Ok(t.escalations
            .iter_mut()
            .find(|e| e.id == id && e.status == from)
            .map(|e| {
                e.status = to;
                e.clone()
            }))
    }

    async fn create_technician(
        &self,
        name: &str,
        skill_level: ExpertiseLevel,
    ) -> Result<Technician> {
        let mut t = self.tables.lock().await;
        let row = Technician {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            skill_level,
            current_status: TechnicianStatus::Available,
            created_at: Utc::now(),
        };
        t.technicians.push(row.clone());
        Ok(row)
    }

    async fn get_technician(&self, id: Uuid) -> Result<Option<Technician>> {
        let t = self.tables.lock().await;
        Ok(t.technicians.iter().find(|tech| tech.id == id).cloned())
    }

    async fn list_technicians(&self) -> Result<Vec<Technician>> {
        let t = self.tables.lock().await;
        Ok(t.technicians.clone())
    }
}

fn contains_ignore_case(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        None | Some("") => true,
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
    }
}

fn by_name(items: &mut [InventoryItem]) {
    items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.location.cmp(&b.location)));
}

#[async_trait]
impl InventoryStore for MemoryPlanStore {
    async fn add_item(&self, item: &NewInventoryItem) -> Result<InventoryItem> {
        if item.quantity < 0 {
            bail!("quantity must not be negative, got {}", item.quantity);
        }
        let now = Utc::now();
        let row = InventoryItem {
            id: Uuid::new_v4(),
            name: item.name.clone(),
            quantity: item.quantity,
            location: item.location.clone(),
            unit_cost_cents: item.unit_cost_cents,
            reserved: false,
            created_at: now,
            updated_at: now,
        };
        let mut t = self.tables.lock().await;
        t.inventory.push(row.clone());
        Ok(row)
    }

    async fn list_items(&self) -> Result<Vec<InventoryItem>> {
        let t = self.tables.lock().await;
        let mut items = t.inventory.clone();
        by_name(&mut items);
        Ok(items)
    }

    async fn search_items(
        &self,
        name: Option<&str>,
        location: Option<&str>,
    ) -> Result<Vec<InventoryItem>> {
        let t = self.tables.lock().await;
        let mut items: Vec<InventoryItem> = t
            .inventory
            .iter()
            .filter(|i| contains_ignore_case(&i.name, name))
            .filter(|i| contains_ignore_case(&i.location, location))
            .cloned()
            .collect();
        by_name(&mut items);
        Ok(items)
    }

    async fn adjust_quantity(&self, id: Uuid, delta: i32) -> Result<Option<InventoryItem>> {
        let mut t = self.tables.lock().await;
        Ok(t.inventory.iter_mut().find(|i| i.id == id).map(|item| {
            item.quantity = item.quantity.saturating_add(delta).max(0);
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn set_reserved(&self, id: Uuid, reserved: bool) -> Result<Option<InventoryItem>> {
        let mut t = self.tables.lock().await;
        Ok(t.inventory.iter_mut().find(|i| i.id == id).map(|item| {
            item.reserved = reserved;
            item.updated_at = Utc::now();
            item.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use wrench_db::models::{Category, Priority};

    use super::*;

    fn order() -> NewWorkOrder {
        NewWorkOrder {
            title: "Reboot switch".to_owned(),
            description: String::new(),
            priority: Priority::Low,
            category: Category::Reboot,
            estimated_expertise_level: ExpertiseLevel::Junior,
        }
    }

    fn planned(numbers: &[i32]) -> Vec<PlannedStep> {
        numbers
            .iter()
            .map(|n| PlannedStep {
                step_number: *n,
                description: format!("step {n}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn start_step_guard_matches_sql() {
        let store = MemoryPlanStore::new();
        let (_, steps) = store
            .create_work_order(&order(), &planned(&[1, 2]))
            .await
            .unwrap();

        assert!(store.start_step(steps[1].id).await.unwrap().is_none());
        assert!(store.start_step(steps[0].id).await.unwrap().is_some());
        assert!(store.start_step(steps[0].id).await.unwrap().is_none());
        store.fail_step(steps[0].id, "boom").await.unwrap().unwrap();
        // A failed predecessor is terminal, so the next step may start.
        assert!(store.start_step(steps[1].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_step_numbers_rejected() {
        let store = MemoryPlanStore::new();
        let err = store
            .create_work_order(&order(), &planned(&[1, 1]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate step_number 1"));
        assert!(store.list_work_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_tail_clears_references_and_reopens() {
        let store = MemoryPlanStore::new();
        let (wo, steps) = store
            .create_work_order(&order(), &planned(&[1, 2, 3]))
            .await
            .unwrap();
        store
            .append_log(&NewAgentLog {
                work_order_id: wo.id,
                related_step: Some(steps[2].id),
                agent_action: "note".to_owned(),
                result: String::new(),
                source: wrench_db::models::LogSource::Agent,
                log_type: wrench_db::models::LogType::Info,
            })
            .await
            .unwrap();
        store
            .transition_work_order(wo.id, &[WorkOrderStatus::Pending], WorkOrderStatus::Completed)
            .await
            .unwrap()
            .unwrap();

        let (reopened, inserted) = store
            .replace_tail(wo.id, 2, &planned(&[2]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reopened.status, WorkOrderStatus::InProgress);
        assert_eq!(inserted.len(), 1);

        let numbers: Vec<i32> = store
            .list_steps(wo.id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.step_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);

        let logs = store.list_logs(wo.id).await.unwrap();
        assert!(logs[0].related_step.is_none());
    }

    #[tokio::test]
    async fn replace_tail_rejects_clash_without_mutation() {
        let store = MemoryPlanStore::new();
        let (wo, _) = store
            .create_work_order(&order(), &planned(&[1, 2, 3]))
            .await
            .unwrap();

        assert!(store.replace_tail(wo.id, 2, &planned(&[1])).await.is_err());
        assert_eq!(store.list_steps(wo.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn inventory_search_and_clamped_adjustments() {
        let store = MemoryPlanStore::new();
        let gpu = store
            .add_item(&NewInventoryItem {
                name: "NVIDIA A100 GPU".to_owned(),
                quantity: 2,
                location: "Storage Room A".to_owned(),
                unit_cost_cents: None,
            })
            .await
            .unwrap();
        store
            .add_item(&NewInventoryItem {
                name: "PSU 1200W".to_owned(),
                quantity: 5,
                location: "Storage Room B".to_owned(),
                unit_cost_cents: Some(25_000),
            })
            .await
            .unwrap();

        let hits = store.search_items(Some("gpu"), Some("room a")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, gpu.id);
        assert!(store.search_items(Some("gpu"), Some("room b")).await.unwrap().is_empty());
        assert_eq!(store.search_items(None, Some("")).await.unwrap().len(), 2);

        let emptied = store.adjust_quantity(gpu.id, -10).await.unwrap().unwrap();
        assert_eq!(emptied.quantity, 0);
        assert!(store.adjust_quantity(Uuid::new_v4(), 1).await.unwrap().is_none());
    }
}
