//! Deterministic gateway fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use wrench_core::Orchestrator;
use wrench_core::gateway::{ExecutionRequest, ExecutorGateway, PlanRequest, PlannerGateway};
use wrench_core::store::{MemoryPlanStore, PlanStore};

/// Canned planner reply: `Ok(text)` or a transport failure.
pub type Reply = std::result::Result<String, String>;

pub fn ok(text: &str) -> Reply {
    Ok(text.to_owned())
}

pub fn transport(message: &str) -> Reply {
    Err(message.to_owned())
}

pub const THREE_STEP_PLAN: &str = r#"{
    "priority": "high",
    "category": "hardware",
    "estimated_expertise_level": "mid",
    "steps": [
        {"step_number": 1, "description": "Check PSU status via IPMI"},
        {"step_number": 2, "description": "Fail over load to PSU A"},
        {"step_number": 3, "description": "Swap PSU B"}
    ]
}"#;

pub const DEFER_PHYSICAL: &str =
    r#"{"executor": "technician", "reason": "needs physical access"}"#;

#[derive(Default)]
pub struct FakePlanner {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<PlanRequest>>,
}

impl FakePlanner {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub async fn push(&self, reply: Reply) {
        self.replies.lock().await.push_back(reply);
    }
}

#[async_trait]
impl PlannerGateway for FakePlanner {
    fn name(&self) -> &str {
        "fake-planner"
    }

    async fn plan(&self, request: &PlanRequest) -> Result<String> {
        self.requests.lock().await.push(request.clone());
        match self.replies.lock().await.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("planner script exhausted")),
        }
    }
}

#[derive(Default)]
pub struct FakeExecutor {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<ExecutionRequest>>,
    /// When set, every call waits for `release` after signalling `entered`.
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeExecutor {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    pub fn gated(replies: Vec<Reply>, entered: Arc<Notify>, release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            gate: Some((entered, release)),
        })
    }

    pub async fn push(&self, reply: Reply) {
        self.replies.lock().await.push_back(reply);
    }

    pub async fn calls(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn executed_steps(&self) -> Vec<i32> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|r| r.step_number)
            .collect()
    }
}

#[async_trait]
impl ExecutorGateway for FakeExecutor {
    fn name(&self) -> &str {
        "fake-executor"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        self.requests.lock().await.push(request.clone());
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        match self.replies.lock().await.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("executor script exhausted")),
        }
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn PlanStore>,
    pub planner: Arc<FakePlanner>,
    pub executor: Arc<FakeExecutor>,
}

pub fn harness(planner: Arc<FakePlanner>, executor: Arc<FakeExecutor>) -> Harness {
    harness_with_store(Arc::new(MemoryPlanStore::new()), planner, executor)
}

pub fn harness_with_store(
    store: Arc<dyn PlanStore>,
    planner: Arc<FakePlanner>,
    executor: Arc<FakeExecutor>,
) -> Harness {
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        planner.clone(),
        executor.clone(),
    ));
    Harness {
        orchestrator,
        store,
        planner,
        executor,
    }
}

/// At most one step in progress, and every step below it terminal.
pub async fn assert_plan_invariant(store: &dyn PlanStore, work_order_id: uuid::Uuid) {
    use wrench_db::models::StepStatus;

    let steps = store.list_steps(work_order_id).await.unwrap();
    let in_progress: Vec<_> = steps
        .iter()
        .filter(|s| s.status == StepStatus::InProgress)
        .collect();
    assert!(in_progress.len() <= 1, "more than one step in progress");
    if let Some(current) = in_progress.first() {
        assert!(
            steps
                .iter()
                .filter(|s| s.step_number < current.step_number)
                .all(|s| s.status.is_terminal()),
            "step below the in-progress step is not terminal"
        );
    }
}
