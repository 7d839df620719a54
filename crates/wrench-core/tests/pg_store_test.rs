//! Orchestrator and recovery against the PostgreSQL plan store.

mod common;

use std::sync::Arc;

use serde_json::json;
use wrench_core::RunOutcome;
use wrench_core::Resume;
use wrench_core::adapter::{CheckInventoryTool, Tool};
use wrench_core::store::{InventoryStore, PgPlanStore, PlanStore};
use wrench_db::models::{StepExecutor, StepStatus, WorkOrderStatus};
use wrench_db::queries::inventory::NewInventoryItem;
use wrench_test_utils::{create_test_db, drop_test_db};

use common::*;

#[tokio::test]
async fn defer_resume_and_regenerate_on_postgres() {
    let (pool, db_name) = create_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(PgPlanStore::new(pool.clone()));
    let h = harness_with_store(
        store,
        FakePlanner::new(vec![ok(THREE_STEP_PLAN)]),
        FakeExecutor::new(vec![ok("ipmi ok"), ok("load on A"), ok(DEFER_PHYSICAL)]),
    );

    let id = h.orchestrator.create_plan("PSU B", "no input").await.unwrap();
    let report = h.orchestrator.run(id, None).await.unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::AwaitingTechnician {
            step_number: 3,
            reason: "needs physical access".into()
        }
    );
    assert_eq!(
        h.orchestrator.work_order(id).await.unwrap().status,
        WorkOrderStatus::Escalated
    );
    assert_plan_invariant(h.store.as_ref(), id).await;

    let done = h.orchestrator.run(id, Some(Resume::at(3))).await.unwrap();
    assert_eq!(done.outcome, RunOutcome::Completed);
    let steps = h.orchestrator.steps(id).await.unwrap();
    assert_eq!(steps[2].executor, StepExecutor::Technician);
    assert_eq!(h.executor.calls().await, 3);

    h.planner
        .push(ok(r#"{"steps":[{"description":"Replace PSU B again"},{"description":"Verify"}]}"#))
        .await;
    let new_steps = h.orchestrator.regenerate(id, "new PSU is DOA", 2).await.unwrap();
    assert_eq!(
        new_steps.iter().map(|s| s.step_number).collect::<Vec<_>>(),
        vec![2, 3]
    );

    let order = h.orchestrator.work_order(id).await.unwrap();
    assert_eq!(order.status, WorkOrderStatus::InProgress);
    let steps = h.orchestrator.steps(id).await.unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].status, StepStatus::Success);
    assert!(steps[1..].iter().all(|s| s.status == StepStatus::Pending));

    // The deferral escalation survives the regeneration without a step.
    let escalations = h.store.list_escalations(id).await.unwrap();
    assert_eq!(escalations.len(), 1);
    assert!(escalations[0].related_step.is_none());

    drop(h);
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_regeneration_rolls_back_on_postgres() {
    let (pool, db_name) = create_test_db().await;
    let store = Arc::new(PgPlanStore::new(pool.clone()));
    let h = harness_with_store(
        store.clone(),
        FakePlanner::new(vec![ok(THREE_STEP_PLAN)]),
        FakeExecutor::new(vec![]),
    );
    let id = h.orchestrator.create_plan("t", "d").await.unwrap();
    let before = h.orchestrator.steps(id).await.unwrap();

    // A clash with the surviving prefix violates the unique constraint and
    // the whole replacement is rolled back.
    let clash = vec![wrench_core::gateway::PlannedStep {
        step_number: 1,
        description: "dup".into(),
    }];
    assert!(store.replace_tail(id, 2, &clash).await.is_err());
    assert_eq!(h.orchestrator.steps(id).await.unwrap(), before);

    drop(h);
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn inventory_tool_reads_postgres_stock() {
    let (pool, db_name) = create_test_db().await;
    let store = Arc::new(PgPlanStore::new(pool.clone()));
    let gpu = store
        .add_item(&NewInventoryItem {
            name: "NVIDIA H100 GPU".into(),
            quantity: 1,
            location: "Storage Room A".into(),
            unit_cost_cents: Some(3_000_000),
        })
        .await
        .unwrap();
    let tool = CheckInventoryTool::new(store.clone());

    let reply: serde_json::Value =
        serde_json::from_str(&tool.invoke(&json!({"part": "h100"})).await.unwrap()).unwrap();
    assert_eq!(reply["available"], true);
    assert_eq!(reply["matches"][0]["location"], "Storage Room A");

    store.adjust_quantity(gpu.id, -1).await.unwrap();
    let reply: serde_json::Value =
        serde_json::from_str(&tool.invoke(&json!({"part": "h100"})).await.unwrap()).unwrap();
    assert_eq!(reply["available"], false);

    let missing = tool.invoke(&json!({"part": "fan tray"})).await.unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&missing).unwrap(),
        json!({"part": "fan tray", "available": false})
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}
