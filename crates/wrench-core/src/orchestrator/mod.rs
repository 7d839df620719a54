//! Execution orchestrator: plan creation and the step state machine.
//!
//! Steps move `pending -> in_progress -> {success | failure}` and are
//! visited strictly in ascending step_number order. A run stops at the
//! first step a technician must perform, at the first failed step, or when
//! every step has succeeded.

use std::sync::Arc;

use uuid::Uuid;

use wrench_db::models::{
    AgentLog, EscalationSource, LogSource, LogType, PlanStep, StepExecutor, StepStatus,
    WorkOrder, WorkOrderStatus,
};
use wrench_db::queries::agent_logs::NewAgentLog;
use wrench_db::queries::escalations::NewEscalation;
use wrench_db::queries::steps::StepProgress;
use wrench_db::queries::work_orders::NewWorkOrder;

use crate::error::WrenchError;
use crate::gateway::{
    ExecutionRequest, ExecutorGateway, ExecutorOutcome, PlanRequest, PlannerGateway,
    parse_initial_plan,
};
use crate::store::PlanStore;

/// Step result recorded when a technician resumes without a note.
pub const DEFAULT_RESUME_NOTE: &str = "Completed by technician";

/// A technician's report that a step was finished out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    pub step_number: i32,
    /// Recorded as the step result; [`DEFAULT_RESUME_NOTE`] when absent.
    pub note: Option<String>,
}

impl Resume {
    pub fn at(step_number: i32) -> Self {
        Self {
            step_number,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Where a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step succeeded; the work order is `completed`.
    Completed,
    /// The step is waiting on a technician; the work order is `escalated`.
    AwaitingTechnician { step_number: i32, reason: String },
    /// The step is in `failure` and needs a resume or a regenerated plan.
    Failed { step_number: i32 },
}

/// Result of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Steps the executor completed during this call.
    pub steps_completed: usize,
}

/// Drives work orders through planning and execution.
///
/// Gateways and store are injected; the orchestrator holds no other state,
/// so one instance can serve many work orders concurrently.
pub struct Orchestrator {
    pub(crate) store: Arc<dyn PlanStore>,
    pub(crate) planner: Arc<dyn PlannerGateway>,
    pub(crate) executor: Arc<dyn ExecutorGateway>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn PlanStore>,
        planner: Arc<dyn PlannerGateway>,
        executor: Arc<dyn ExecutorGateway>,
    ) -> Self {
        Self {
            store,
            planner,
            executor,
        }
    }

    pub fn store(&self) -> &Arc<dyn PlanStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    /// Classify and plan a ticket, storing a `pending` work order with
    /// `pending` steps numbered from 1. Nothing is executed.
    pub async fn create_plan(&self, title: &str, description: &str) -> Result<Uuid, WrenchError> {
        let request = PlanRequest::Initial {
            title: title.to_owned(),
            description: description.to_owned(),
        };
        let raw = self
            .planner
            .plan(&request)
            .await
            .map_err(WrenchError::PlannerTransport)?;
        let plan = parse_initial_plan(&raw)?;

        let new = NewWorkOrder {
            title: title.to_owned(),
            description: description.to_owned(),
            priority: plan.classification.priority,
            category: plan.classification.category,
            estimated_expertise_level: plan.classification.estimated_expertise_level,
        };
        let (order, steps) = self.store.create_work_order(&new, &plan.steps).await?;

        tracing::info!(
            work_order_id = %order.id,
            planner = self.planner.name(),
            priority = %order.priority,
            category = %order.category,
            steps = steps.len(),
            "work order planned"
        );
        self.log(
            &order,
            None,
            LogSource::Agent,
            LogType::Info,
            "Plan generated".to_owned(),
            format!(
                "{} steps; priority={} category={} expertise={}",
                steps.len(),
                order.priority,
                order.category,
                order.estimated_expertise_level
            ),
        )
        .await?;

        Ok(order.id)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute the plan of a work order from its first unfinished step.
    ///
    /// With `resume`, the named step (which must be technician-deferred or
    /// failed) is first marked `success` on the technician's behalf and
    /// every step up to and including it is skipped.
    pub async fn run(
        &self,
        work_order_id: Uuid,
        resume: Option<Resume>,
    ) -> Result<RunReport, WrenchError> {
        let mut order = self.load_work_order(work_order_id).await?;
        let mut steps = self.store.list_steps(work_order_id).await?;
        if steps.is_empty() {
            return Err(WrenchError::invalid(format!(
                "work order {work_order_id} has no plan steps"
            )));
        }

        let floor = match resume {
            Some(resume) => {
                order = self.resume_step(&order, &mut steps, &resume).await?;
                resume.step_number
            }
            None => 0,
        };

        let mut steps_completed = 0;
        for index in 0..steps.len() {
            let step = steps[index].clone();
            if step.step_number <= floor {
                continue;
            }

            match step.status {
                StepStatus::Success => continue,
                StepStatus::Failure => {
                    tracing::info!(
                        work_order_id = %order.id,
                        step_number = step.step_number,
                        "run halted at failed step"
                    );
                    return Ok(RunReport {
                        outcome: RunOutcome::Failed {
                            step_number: step.step_number,
                        },
                        steps_completed,
                    });
                }
                StepStatus::InProgress if step.executor == StepExecutor::Technician => {
                    return Ok(RunReport {
                        outcome: RunOutcome::AwaitingTechnician {
                            step_number: step.step_number,
                            reason: step.result.unwrap_or_default(),
                        },
                        steps_completed,
                    });
                }
                StepStatus::InProgress => {
                    return Err(WrenchError::invalid(format!(
                        "step {} of work order {} is already being executed",
                        step.step_number, order.id
                    )));
                }
                StepStatus::Pending => {
                    order = self.mark_in_progress(order).await?;
                    let (updated, halt) = self.execute_step(&order, &mut steps, index).await?;
                    steps[index] = updated;
                    match halt {
                        Some(outcome) => {
                            return Ok(RunReport {
                                outcome,
                                steps_completed,
                            });
                        }
                        None => steps_completed += 1,
                    }
                }
            }
        }

        if let Some(failed) = steps.iter().find(|s| s.status != StepStatus::Success) {
            return Ok(RunReport {
                outcome: RunOutcome::Failed {
                    step_number: failed.step_number,
                },
                steps_completed,
            });
        }

        if order.status != WorkOrderStatus::Completed {
            self.store
                .transition_work_order(
                    order.id,
                    &[
                        WorkOrderStatus::Pending,
                        WorkOrderStatus::InProgress,
                        WorkOrderStatus::Escalated,
                    ],
                    WorkOrderStatus::Completed,
                )
                .await?
                .ok_or_else(|| WrenchError::not_found("work order", order.id))?;
            tracing::info!(work_order_id = %order.id, steps_completed, "work order completed");
        }

        Ok(RunReport {
            outcome: RunOutcome::Completed,
            steps_completed,
        })
    }

    /// Start, execute and record one pending step. Returns the updated
    /// step and, if the run must stop, why.
    async fn execute_step(
        &self,
        order: &WorkOrder,
        steps: &mut [PlanStep],
        index: usize,
    ) -> Result<(PlanStep, Option<RunOutcome>), WrenchError> {
        let step = &steps[index];
        let started = self.store.start_step(step.id).await?.ok_or_else(|| {
            WrenchError::invalid(format!(
                "step {} of work order {} could not be started",
                step.step_number, order.id
            ))
        })?;

        tracing::info!(
            work_order_id = %order.id,
            step_number = started.step_number,
            executor = self.executor.name(),
            "executing step"
        );

        steps[index] = started.clone();
        let request = ExecutionRequest::new(order, &started, steps);
        let raw = match self.executor.execute(&request).await {
            Ok(raw) => raw,
            Err(cause) => {
                let message = format!("{cause:#}");
                tracing::error!(
                    work_order_id = %order.id,
                    step_number = started.step_number,
                    error = %message,
                    "executor call failed"
                );
                self.store.fail_step(started.id, &message).await?;
                self.log(
                    order,
                    Some(&started),
                    LogSource::Agent,
                    LogType::Error,
                    format!("Step {} failed", started.step_number),
                    message,
                )
                .await?;
                return Err(WrenchError::ExecutorTransport {
                    step_number: started.step_number,
                    cause,
                });
            }
        };

        match ExecutorOutcome::classify(&raw) {
            ExecutorOutcome::Deferred { reason, trace } => {
                let deferred = self
                    .store
                    .defer_step(started.id, &reason)
                    .await?
                    .ok_or_else(|| lost_step(order, &started))?;
                self.store
                    .create_escalation(&NewEscalation {
                        work_order_id: order.id,
                        related_step: Some(deferred.id),
                        technician_id: order.assigned_technician,
                        message: format!(
                            "Step {} requires a technician: {reason}",
                            deferred.step_number
                        ),
                        source: EscalationSource::AiAgent,
                    })
                    .await?;
                self.log(
                    order,
                    Some(&deferred),
                    LogSource::Agent,
                    LogType::Warning,
                    format!("Step {} handed to technician", deferred.step_number),
                    match &trace {
                        Some(trace) => format!("{reason}\n{trace}"),
                        None => reason.clone(),
                    },
                )
                .await?;
                self.store
                    .transition_work_order(
                        order.id,
                        &[WorkOrderStatus::Pending, WorkOrderStatus::InProgress],
                        WorkOrderStatus::Escalated,
                    )
                    .await?;

                tracing::warn!(
                    work_order_id = %order.id,
                    step_number = deferred.step_number,
                    reason = %reason,
                    "step deferred to technician"
                );
                let outcome = RunOutcome::AwaitingTechnician {
                    step_number: deferred.step_number,
                    reason,
                };
                Ok((deferred, Some(outcome)))
            }
            ExecutorOutcome::Completed { log_text } => {
                let completed = self
                    .store
                    .complete_step(started.id, &log_text)
                    .await?
                    .ok_or_else(|| lost_step(order, &started))?;
                self.log(
                    order,
                    Some(&completed),
                    LogSource::Agent,
                    LogType::Success,
                    format!("Step {}: {}", completed.step_number, completed.description),
                    log_text,
                )
                .await?;
                tracing::info!(
                    work_order_id = %order.id,
                    step_number = completed.step_number,
                    "step completed"
                );
                Ok((completed, None))
            }
        }
    }

    /// Apply a technician's resume report to `steps` in place.
    async fn resume_step(
        &self,
        order: &WorkOrder,
        steps: &mut [PlanStep],
        resume: &Resume,
    ) -> Result<WorkOrder, WrenchError> {
        let Some(slot) = steps
            .iter_mut()
            .find(|s| s.step_number == resume.step_number)
        else {
            return Err(WrenchError::invalid(format!(
                "work order {} has no step {}",
                order.id, resume.step_number
            )));
        };

        let resumable = (slot.status == StepStatus::InProgress
            && slot.executor == StepExecutor::Technician)
            || slot.status == StepStatus::Failure;
        if !resumable {
            return Err(WrenchError::invalid(format!(
                "step {} is {} (executor {}); only technician-deferred or failed steps can be resumed",
                slot.step_number, slot.status, slot.executor
            )));
        }

        let note = resume.note.as_deref().unwrap_or(DEFAULT_RESUME_NOTE);
        let resumed = self
            .store
            .resume_step(slot.id, Some(note))
            .await?
            .ok_or_else(|| lost_step(order, slot))?;
        *slot = resumed.clone();

        self.log(
            order,
            Some(&resumed),
            LogSource::Technician,
            LogType::Success,
            format!("Technician completed step {}", resumed.step_number),
            note.to_owned(),
        )
        .await?;
        tracing::info!(
            work_order_id = %order.id,
            step_number = resumed.step_number,
            "step resumed by technician"
        );

        let reopened = self
            .store
            .transition_work_order(
                order.id,
                &[WorkOrderStatus::Escalated, WorkOrderStatus::Pending],
                WorkOrderStatus::InProgress,
            )
            .await?;
        Ok(reopened.unwrap_or_else(|| order.clone()))
    }

    /// Move the work order to `in_progress` if it is not already.
    async fn mark_in_progress(&self, order: WorkOrder) -> Result<WorkOrder, WrenchError> {
        if order.status == WorkOrderStatus::InProgress {
            return Ok(order);
        }
        match self
            .store
            .transition_work_order(
                order.id,
                &[WorkOrderStatus::Pending, WorkOrderStatus::Escalated],
                WorkOrderStatus::InProgress,
            )
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                let current = self.load_work_order(order.id).await?;
                if current.status == WorkOrderStatus::InProgress {
                    Ok(current)
                } else {
                    Err(WrenchError::invalid(format!(
                        "work order {} is {}; cannot execute steps",
                        current.id, current.status
                    )))
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn work_order(&self, id: Uuid) -> Result<WorkOrder, WrenchError> {
        self.load_work_order(id).await
    }

    pub async fn work_orders(&self) -> Result<Vec<WorkOrder>, WrenchError> {
        Ok(self.store.list_work_orders().await?)
    }

    pub async fn steps(&self, work_order_id: Uuid) -> Result<Vec<PlanStep>, WrenchError> {
        self.load_work_order(work_order_id).await?;
        Ok(self.store.list_steps(work_order_id).await?)
    }

    pub async fn logs(&self, work_order_id: Uuid) -> Result<Vec<AgentLog>, WrenchError> {
        self.load_work_order(work_order_id).await?;
        Ok(self.store.list_logs(work_order_id).await?)
    }

    pub async fn progress(&self, work_order_id: Uuid) -> Result<StepProgress, WrenchError> {
        Ok(StepProgress::from_steps(&self.steps(work_order_id).await?))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    pub(crate) async fn load_work_order(&self, id: Uuid) -> Result<WorkOrder, WrenchError> {
        self.store
            .get_work_order(id)
            .await?
            .ok_or_else(|| WrenchError::not_found("work order", id))
    }

    pub(crate) async fn log(
        &self,
        order: &WorkOrder,
        step: Option<&PlanStep>,
        source: LogSource,
        log_type: LogType,
        agent_action: String,
        result: String,
    ) -> Result<AgentLog, WrenchError> {
        Ok(self
            .store
            .append_log(&NewAgentLog {
                work_order_id: order.id,
                related_step: step.map(|s| s.id),
                agent_action,
                result,
                source,
                log_type,
            })
            .await?)
    }
}

fn lost_step(order: &WorkOrder, step: &PlanStep) -> WrenchError {
    WrenchError::invalid(format!(
        "step {} of work order {} changed while it was being executed",
        step.step_number, order.id
    ))
}
