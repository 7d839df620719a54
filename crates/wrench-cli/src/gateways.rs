//! Wires the configured planner and executor commands into an
//! [`Orchestrator`] backed by PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use wrench_core::Orchestrator;
use wrench_core::adapter::{CheckInventoryTool, CommandTool, ModelExecutor, ModelPlanner, ToolBox};
use wrench_core::gateway::{
    DeadlineExecutor, ExecutionRequest, ExecutorGateway, PlanRequest, PlannerGateway,
};
use wrench_core::model::{CommandModel, ModelClient};
use wrench_core::store::{InventoryStore, PgPlanStore, PlanStore};

use crate::config::{GatewaySection, ModelCommand, ToolSection};

/// Build an orchestrator over `pool`.
///
/// A gateway that is not configured is replaced by one that fails on first
/// use, so commands that never reach it still work.
pub fn build_orchestrator(pool: &PgPool, gateway: &GatewaySection) -> Orchestrator {
    let pg = Arc::new(PgPlanStore::new(pool.clone()));
    let store: Arc<dyn PlanStore> = pg.clone();
    let inventory: Option<Arc<dyn InventoryStore>> = if gateway.check_inventory {
        Some(pg)
    } else {
        None
    };

    let planner: Arc<dyn PlannerGateway> = match gateway.require_planner() {
        Ok(cmd) => Arc::new(ModelPlanner::new(model_for("planner", cmd))),
        Err(e) => Arc::new(Unconfigured::new("planner", e)),
    };

    let executor: Arc<dyn ExecutorGateway> = match gateway.require_executor() {
        Ok(cmd) => {
            let inner: Arc<dyn ExecutorGateway> = Arc::new(
                ModelExecutor::new(model_for("executor", cmd), toolbox(&gateway.tools, inventory))
                    .with_max_rounds(gateway.max_tool_rounds),
            );
            match gateway.executor_deadline() {
                Some(deadline) => Arc::new(DeadlineExecutor::new(inner, deadline)),
                None => inner,
            }
        }
        Err(e) => Arc::new(Unconfigured::new("executor", e)),
    };

    Orchestrator::new(store, planner, executor)
}

fn model_for(role: &str, cmd: &ModelCommand) -> Arc<dyn ModelClient> {
    debug!(role, command = %cmd.command, "configured model command");
    Arc::new(CommandModel::new(cmd.command.clone(), cmd.args.clone()).with_name(role))
}

fn toolbox(tools: &[ToolSection], inventory: Option<Arc<dyn InventoryStore>>) -> ToolBox {
    let mut toolbox = ToolBox::new();
    if let Some(inventory) = inventory {
        toolbox.register(CheckInventoryTool::new(inventory));
    }
    for tool in tools {
        toolbox.register(CommandTool::new(
            tool.name.clone(),
            tool.description.clone(),
            tool.command.clone(),
            tool.args.clone(),
            Duration::from_secs(tool.timeout_secs),
        ));
    }
    toolbox
}

/// Stand-in for a gateway with no command configured.
struct Unconfigured {
    role: &'static str,
    reason: String,
}

impl Unconfigured {
    fn new(role: &'static str, reason: anyhow::Error) -> Self {
        Self {
            role,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl PlannerGateway for Unconfigured {
    fn name(&self) -> &str {
        self.role
    }

    async fn plan(&self, _request: &PlanRequest) -> Result<String> {
        anyhow::bail!("{}", self.reason)
    }
}

#[async_trait]
impl ExecutorGateway for Unconfigured {
    fn name(&self) -> &str {
        self.role
    }

    async fn execute(&self, _request: &ExecutionRequest) -> Result<String> {
        anyhow::bail!("{}", self.reason)
    }
}
