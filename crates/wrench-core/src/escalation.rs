//! Escalation desk and technician roster.
//!
//! Escalation status only moves forward (`sent -> acknowledged ->
//! resolved`). Asking for the current status again is a no-op; asking for
//! an earlier one is an [`WrenchError::InvalidTransition`].

use std::sync::Arc;

use uuid::Uuid;

use wrench_db::models::{
    EscalationMessage, EscalationSource, EscalationStatus, ExpertiseLevel, LogSource, LogType,
    Technician, WorkOrder, WorkOrderStatus,
};
use wrench_db::queries::agent_logs::NewAgentLog;
use wrench_db::queries::escalations::NewEscalation;

use crate::error::WrenchError;
use crate::store::PlanStore;

/// A manual escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRequest {
    pub work_order_id: Uuid,
    pub message: String,
    pub source: EscalationSource,
    pub technician_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
}

/// Human-intervention operations on work orders.
pub struct EscalationDesk {
    store: Arc<dyn PlanStore>,
}

impl EscalationDesk {
    pub fn new(store: Arc<dyn PlanStore>) -> Self {
        Self { store }
    }

    /// Record an escalation and move the work order to `escalated`.
    pub async fn escalate(
        &self,
        request: &EscalationRequest,
    ) -> Result<EscalationMessage, WrenchError> {
        let order = self.work_order(request.work_order_id).await?;
        if let Some(technician_id) = request.technician_id {
            self.technician(technician_id).await?;
        }
        if let Some(step_id) = request.step_id {
            let step = self
                .store
                .get_step(step_id)
                .await?
                .ok_or_else(|| WrenchError::not_found("step", step_id))?;
            if step.work_order_id != order.id {
                return Err(WrenchError::invalid(format!(
                    "step {step_id} does not belong to work order {}",
                    order.id
                )));
            }
        }

        let escalation = self
            .store
            .create_escalation(&NewEscalation {
                work_order_id: order.id,
                related_step: request.step_id,
                technician_id: request.technician_id.or(order.assigned_technician),
                message: request.message.clone(),
                source: request.source,
            })
            .await?;

        self.store
            .transition_work_order(
                order.id,
                &[
                    WorkOrderStatus::Pending,
                    WorkOrderStatus::InProgress,
                    WorkOrderStatus::Completed,
                ],
                WorkOrderStatus::Escalated,
            )
            .await?;

        let source = match request.source {
            EscalationSource::Technician => LogSource::Technician,
            EscalationSource::AiAgent => LogSource::Agent,
        };
        self.store
            .append_log(&NewAgentLog {
                work_order_id: order.id,
                related_step: request.step_id,
                agent_action: "Escalation raised".to_owned(),
                result: request.message.clone(),
                source,
                log_type: LogType::Warning,
            })
            .await?;

        tracing::warn!(
            work_order_id = %order.id,
            escalation_id = %escalation.id,
            source = %request.source,
            "escalation raised"
        );
        Ok(escalation)
    }

    pub async fn acknowledge(&self, escalation_id: Uuid) -> Result<EscalationMessage, WrenchError> {
        self.advance(escalation_id, EscalationStatus::Acknowledged)
            .await
    }

    pub async fn resolve(&self, escalation_id: Uuid) -> Result<EscalationMessage, WrenchError> {
        self.advance(escalation_id, EscalationStatus::Resolved).await
    }

    async fn advance(
        &self,
        escalation_id: Uuid,
        target: EscalationStatus,
    ) -> Result<EscalationMessage, WrenchError> {
        let current = self
            .store
            .get_escalation(escalation_id)
            .await?
            .ok_or_else(|| WrenchError::not_found("escalation", escalation_id))?;

        if current.status == target {
            return Ok(current);
        }
        if target.rank() < current.status.rank() {
            return Err(WrenchError::invalid(format!(
                "escalation {escalation_id} is {}; cannot move back to {target}",
                current.status
            )));
        }

        let updated = self
            .store
            .transition_escalation(escalation_id, current.status, target)
            .await?
            .ok_or_else(|| {
                WrenchError::invalid(format!(
                    "escalation {escalation_id} changed status concurrently"
                ))
            })?;
        tracing::info!(
            escalation_id = %escalation_id,
            from = %current.status,
            to = %target,
            "escalation status advanced"
        );
        Ok(updated)
    }

    pub async fn escalations(
        &self,
        work_order_id: Uuid,
    ) -> Result<Vec<EscalationMessage>, WrenchError> {
        self.work_order(work_order_id).await?;
        Ok(self.store.list_escalations(work_order_id).await?)
    }

    pub async fn open_escalations(&self) -> Result<Vec<EscalationMessage>, WrenchError> {
        Ok(self.store.list_open_escalations().await?)
    }

    // -- technicians --------------------------------------------------------

    pub async fn register_technician(
        &self,
        name: &str,
        skill_level: ExpertiseLevel,
    ) -> Result<Technician, WrenchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WrenchError::invalid("technician name must not be empty"));
        }
        Ok(self.store.create_technician(name, skill_level).await?)
    }

    pub async fn technicians(&self) -> Result<Vec<Technician>, WrenchError> {
        Ok(self.store.list_technicians().await?)
    }

    pub async fn assign_technician(
        &self,
        work_order_id: Uuid,
        technician_id: Uuid,
    ) -> Result<WorkOrder, WrenchError> {
        self.work_order(work_order_id).await?;
        let technician = self.technician(technician_id).await?;
        let order = self
            .store
            .assign_technician(work_order_id, technician_id)
            .await?
            .ok_or_else(|| WrenchError::not_found("work order", work_order_id))?;
        tracing::info!(
            work_order_id = %work_order_id,
            technician = %technician.name,
            "technician assigned"
        );
        Ok(order)
    }

    async fn work_order(&self, id: Uuid) -> Result<WorkOrder, WrenchError> {
        self.store
            .get_work_order(id)
            .await?
            .ok_or_else(|| WrenchError::not_found("work order", id))
    }

    async fn technician(&self, id: Uuid) -> Result<Technician, WrenchError> {
        self.store
            .get_technician(id)
            .await?
            .ok_or_else(|| WrenchError::not_found("technician", id))
    }
}
