//! Integration tests for step, work order, log and escalation queries.
//!
//! Each test gets its own migrated database from `wrench-test-utils`.

use sqlx::PgPool;
use uuid::Uuid;

use wrench_db::models::{
    Category, EscalationSource, EscalationStatus, ExpertiseLevel, LogSource, LogType, Priority,
    StepExecutor, StepStatus, WorkOrder, WorkOrderStatus,
};
use wrench_db::queries::agent_logs::{self, NewAgentLog};
use wrench_db::queries::escalations::{self, NewEscalation};
use wrench_db::queries::steps;
use wrench_db::queries::technicians;
use wrench_db::queries::work_orders::{self, NewWorkOrder};
use wrench_test_utils::{create_test_db, drop_test_db};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_work_order(pool: &PgPool, step_count: i32) -> WorkOrder {
    let wo = work_orders::insert_work_order(
        pool,
        &NewWorkOrder {
            title: "Replace PSU in rack R18".to_owned(),
            description: "PSU B reports input loss".to_owned(),
            priority: Priority::High,
            category: Category::Hardware,
            estimated_expertise_level: ExpertiseLevel::Mid,
        },
    )
    .await
    .expect("insert work order");

    for n in 1..=step_count {
        steps::insert_step(pool, wo.id, n, &format!("step {n}"))
            .await
            .expect("insert step");
    }
    wo
}

async fn step_id(pool: &PgPool, wo: Uuid, number: i32) -> Uuid {
    steps::list_steps_for_work_order(pool, wo)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.step_number == number)
        .unwrap_or_else(|| panic!("step {number} missing"))
        .id
}

// ---------------------------------------------------------------------------
// Work orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_work_order_defaults_to_pending() {
    let (pool, db_name) = create_test_db().await;

    let wo = seed_work_order(&pool, 0).await;
    assert_eq!(wo.status, WorkOrderStatus::Pending);
    assert_eq!(wo.priority, Priority::High);
    assert_eq!(wo.category, Category::Hardware);
    assert!(wo.assigned_technician.is_none());

    let fetched = work_orders::get_work_order(&pool, wo.id).await.unwrap();
    assert_eq!(fetched, Some(wo));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn transition_work_order_status_respects_guard() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 0).await;

    let moved = work_orders::transition_work_order_status(
        &pool,
        wo.id,
        &[WorkOrderStatus::Pending, WorkOrderStatus::Escalated],
        WorkOrderStatus::InProgress,
    )
    .await
    .unwrap()
    .expect("pending -> in_progress should match");
    assert_eq!(moved.status, WorkOrderStatus::InProgress);
    assert!(moved.updated_at >= wo.updated_at);

    let rejected = work_orders::transition_work_order_status(
        &pool,
        wo.id,
        &[WorkOrderStatus::Completed],
        WorkOrderStatus::InProgress,
    )
    .await
    .unwrap();
    assert!(rejected.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn steps_listed_in_step_number_order() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 0).await;

    for n in [3, 1, 2] {
        steps::insert_step(&pool, wo.id, n, &format!("step {n}")).await.unwrap();
    }

    let listed = steps::list_steps_for_work_order(&pool, wo.id).await.unwrap();
    let numbers: Vec<i32> = listed.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(listed.iter().all(|s| s.status == StepStatus::Pending));
    assert!(listed.iter().all(|s| s.executor == StepExecutor::Undecided));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn duplicate_step_number_is_rejected() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 1).await;

    let dup = steps::insert_step(&pool, wo.id, 1, "again").await;
    assert!(dup.is_err());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn start_step_requires_lower_steps_terminal() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 3).await;
    let s1 = step_id(&pool, wo.id, 1).await;
    let s2 = step_id(&pool, wo.id, 2).await;

    // Step 2 cannot start while step 1 is pending.
    assert!(steps::start_step(&pool, s2).await.unwrap().is_none());

    let started = steps::start_step(&pool, s1).await.unwrap().expect("step 1 starts");
    assert_eq!(started.status, StepStatus::InProgress);

    // Step 2 cannot start while step 1 is in progress.
    assert!(steps::start_step(&pool, s2).await.unwrap().is_none());
    // Starting step 1 twice loses the check-and-set.
    assert!(steps::start_step(&pool, s1).await.unwrap().is_none());

    steps::complete_step(&pool, s1, "rebooted").await.unwrap().unwrap();
    assert!(steps::start_step(&pool, s2).await.unwrap().is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn complete_defer_fail_and_resume() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 3).await;
    let s1 = step_id(&pool, wo.id, 1).await;
    let s2 = step_id(&pool, wo.id, 2).await;
    let s3 = step_id(&pool, wo.id, 3).await;

    // complete_step only acts on in-progress steps.
    assert!(steps::complete_step(&pool, s1, "x").await.unwrap().is_none());

    steps::start_step(&pool, s1).await.unwrap().unwrap();
    let done = steps::complete_step(&pool, s1, "ping ok").await.unwrap().unwrap();
    assert_eq!(done.status, StepStatus::Success);
    assert_eq!(done.executor, StepExecutor::Agent);
    assert_eq!(done.result.as_deref(), Some("ping ok"));
    assert!(done.executed_at.is_some());

    steps::start_step(&pool, s2).await.unwrap().unwrap();
    let deferred = steps::defer_step(&pool, s2, "needs physical access")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deferred.status, StepStatus::InProgress);
    assert_eq!(deferred.executor, StepExecutor::Technician);
    assert!(deferred.executed_at.is_none());

    let resumed = steps::resume_step(&pool, s2, Some("swapped cable"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resumed.status, StepStatus::Success);
    assert_eq!(resumed.executor, StepExecutor::Technician);
    assert_eq!(resumed.result.as_deref(), Some("swapped cable"));

    steps::start_step(&pool, s3).await.unwrap().unwrap();
    let failed = steps::fail_step(&pool, s3, "executor unreachable").await.unwrap().unwrap();
    assert_eq!(failed.status, StepStatus::Failure);

    // A failure can be resumed by a technician; a success cannot.
    assert!(steps::resume_step(&pool, s3, None).await.unwrap().is_some());
    assert!(steps::resume_step(&pool, s1, None).await.unwrap().is_none());

    let progress = steps::get_step_progress(&pool, wo.id).await.unwrap();
    assert_eq!(progress.success, 3);
    assert_eq!(progress.total, 3);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_steps_from_keeps_prefix_and_logs() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 4).await;
    let s3 = step_id(&pool, wo.id, 3).await;

    let log = agent_logs::insert_agent_log(
        &pool,
        &NewAgentLog {
            work_order_id: wo.id,
            related_step: Some(s3),
            agent_action: "note".to_owned(),
            result: String::new(),
            source: LogSource::Agent,
            log_type: LogType::Info,
        },
    )
    .await
    .unwrap();

    let removed = steps::delete_steps_from(&pool, wo.id, 3).await.unwrap();
    assert_eq!(removed, 2);

    let numbers: Vec<i32> = steps::list_steps_for_work_order(&pool, wo.id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.step_number)
        .collect();
    assert_eq!(numbers, vec![1, 2]);

    // The log survives with its step reference cleared.
    let kept = agent_logs::get_agent_log(&pool, log.id).await.unwrap().unwrap();
    assert!(kept.related_step.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Logs, escalations, technicians
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logs_listed_newest_first() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 0).await;

    for action in ["first", "second"] {
        agent_logs::insert_agent_log(
            &pool,
            &NewAgentLog {
                work_order_id: wo.id,
                related_step: None,
                agent_action: action.to_owned(),
                result: String::new(),
                source: LogSource::Technician,
                log_type: LogType::Info,
            },
        )
        .await
        .unwrap();
    }

    let logs = agent_logs::list_logs_for_work_order(&pool, wo.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].recorded_at >= logs[1].recorded_at);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn escalation_status_uses_optimistic_guard() {
    let (pool, db_name) = create_test_db().await;
    let wo = seed_work_order(&pool, 0).await;
    let tech = technicians::insert_technician(&pool, "Ada", ExpertiseLevel::Senior)
        .await
        .unwrap();

    let esc = escalations::insert_escalation(
        &pool,
        &NewEscalation {
            work_order_id: wo.id,
            related_step: None,
            technician_id: Some(tech.id),
            message: "needs a ladder".to_owned(),
            source: EscalationSource::Technician,
        },
    )
    .await
    .unwrap();
    assert_eq!(esc.status, EscalationStatus::Sent);

    let acked = escalations::transition_escalation_status(
        &pool,
        esc.id,
        EscalationStatus::Sent,
        EscalationStatus::Acknowledged,
    )
    .await
    .unwrap()
    .expect("sent -> acknowledged");
    assert_eq!(acked.status, EscalationStatus::Acknowledged);

    let stale = escalations::transition_escalation_status(
        &pool,
        esc.id,
        EscalationStatus::Sent,
        EscalationStatus::Resolved,
    )
    .await
    .unwrap();
    assert!(stale.is_none());

    let open = escalations::list_open_escalations(&pool).await.unwrap();
    assert_eq!(open.len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}
