//! `wrench order`, `wrench run`, `wrench regenerate` and `wrench logs`.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use wrench_core::{Orchestrator, Resume, RunOutcome, RunReport};
use wrench_db::models::{EscalationStatus, LogType, StepExecutor, StepStatus, WorkOrderStatus};
use wrench_db::queries::agent_logs;
use wrench_db::queries::escalations;
use wrench_db::queries::steps as step_db;
use wrench_db::queries::work_orders as work_order_db;

use crate::OrderCommands;

/// Run an `order` subcommand. Only `create` consults the planner.
pub async fn run_order_command(
    command: OrderCommands,
    pool: &PgPool,
    orchestrator: &Orchestrator,
) -> Result<()> {
    match command {
        OrderCommands::Create { title, description } => {
            let id = orchestrator
                .create_plan(&title, description.as_deref().unwrap_or_default())
                .await?;
            let order = orchestrator.work_order(id).await?;
            let steps = orchestrator.steps(id).await?;
            println!("Created work order {id}");
            println!(
                "  priority={} category={} expertise={}",
                order.priority, order.category, order.estimated_expertise_level
            );
            println!("  {} steps planned", steps.len());
            Ok(())
        }
        OrderCommands::Show { id } => show_work_order(pool, &id).await,
        OrderCommands::List => list_work_orders(pool).await,
    }
}

/// Parse a UUID argument, naming the entity in the error.
pub fn parse_id(entity: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid {entity} ID: {raw}"))
}

async fn show_work_order(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = parse_id("work order", id_str)?;
    let order = work_order_db::get_work_order(pool, id)
        .await?
        .with_context(|| format!("work order {id} not found"))?;

    println!("Work order: {} ({})", order.title, order.id);
    println!("Status: {}", order.status);
    println!(
        "Priority: {}  Category: {}  Expertise: {}",
        order.priority, order.category, order.estimated_expertise_level
    );
    if let Some(technician) = order.assigned_technician {
        println!("Technician: {technician}");
    }
    println!("Created: {}", order.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if !order.description.is_empty() {
        println!();
        println!("{}", order.description);
    }
    println!();

    let progress = step_db::get_step_progress(pool, id).await?;
    println!("Progress: {}/{} succeeded", progress.success, progress.total);
    println!(
        "  pending={} in_progress={} success={} failure={}",
        progress.pending, progress.in_progress, progress.success, progress.failure,
    );
    println!();

    let steps = step_db::list_steps_for_work_order(pool, id).await?;
    println!("Steps:");
    for step in &steps {
        let who = match step.executor {
            StepExecutor::Undecided => String::new(),
            other => format!(" ({other})"),
        };
        println!(
            "  [{}] {}. {}{who}",
            step_icon(step.status),
            step.step_number,
            step.description
        );
        if let Some(result) = &step.result {
            println!("        -> {}", truncate(result, 100));
        }
    }

    let open = escalations::list_escalations_for_work_order(pool, id)
        .await?
        .into_iter()
        .filter(|e| e.status != EscalationStatus::Resolved)
        .count();
    if open > 0 {
        println!();
        println!("{open} open escalation(s); see `wrench escalation list --work-order {id}`");
    }

    Ok(())
}

async fn list_work_orders(pool: &PgPool) -> Result<()> {
    let orders = work_order_db::list_work_orders(pool).await?;

    if orders.is_empty() {
        println!("No work orders found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<30} {:<12} {:<8} {:>8}",
        "ID", "TITLE", "STATUS", "PRIORITY", "STEPS"
    );
    println!("{}", "-".repeat(100));

    for order in &orders {
        let progress = step_db::get_step_progress(pool, order.id).await?;
        println!(
            "{:<38} {:<30} {:<12} {:<8} {:>8}",
            order.id,
            truncate(&order.title, 28),
            order.status,
            order.priority,
            format!("{}/{}", progress.success, progress.total),
        );
    }

    Ok(())
}

/// `wrench run`: execute or resume a work order's plan.
pub async fn run_work_order(
    orchestrator: &Orchestrator,
    id_str: &str,
    resume_from: Option<i32>,
    note: Option<String>,
) -> Result<()> {
    let id = parse_id("work order", id_str)?;
    let resume = resume_from.map(|n| {
        let resume = Resume::at(n);
        match note {
            Some(note) => resume.with_note(note),
            None => resume,
        }
    });

    let report = orchestrator.run(id, resume).await?;
    println!("{}", describe_report(&report));
    if let RunOutcome::AwaitingTechnician { step_number, .. } = report.outcome {
        println!("Resume with: wrench run {id} --resume-from {step_number}");
    }
    Ok(())
}

/// `wrench regenerate`: replace a plan's tail after a reported issue.
pub async fn regenerate_plan(
    orchestrator: &Orchestrator,
    id_str: &str,
    from_step: i32,
    issue: &str,
) -> Result<()> {
    let id = parse_id("work order", id_str)?;
    let replacement = orchestrator.regenerate(id, issue, from_step).await?;

    println!(
        "Replaced steps from {from_step} with {} new step(s):",
        replacement.len()
    );
    for step in &replacement {
        println!("  {}. {}", step.step_number, step.description);
    }
    Ok(())
}

/// `wrench logs`: the work order's action trail, newest first.
pub async fn show_logs(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = parse_id("work order", id_str)?;
    let order = work_order_db::get_work_order(pool, id)
        .await?
        .with_context(|| format!("work order {id} not found"))?;

    println!("Work order: {} ({})", order.title, order.id);
    println!("Status: {}", order.status);
    println!();

    let logs = agent_logs::list_logs_for_work_order(pool, id).await?;
    if logs.is_empty() {
        println!("No log entries recorded.");
        return Ok(());
    }

    println!("Log ({}):", logs.len());
    for log in &logs {
        let time = log.recorded_at.format("%H:%M:%S");
        let result = if log.result.is_empty() {
            String::new()
        } else {
            format!(": {}", truncate(&log.result, 80))
        };
        println!(
            "  [{time}] {} {:<10} {}{result}",
            log_icon(log.log_type),
            log.source,
            log.agent_action
        );
    }

    Ok(())
}

fn describe_report(report: &RunReport) -> String {
    let done = match report.steps_completed {
        1 => "1 step completed".to_owned(),
        n => format!("{n} steps completed"),
    };
    match &report.outcome {
        RunOutcome::Completed => format!("Work order {}; {done}.", WorkOrderStatus::Completed),
        RunOutcome::AwaitingTechnician {
            step_number,
            reason,
        } => format!("Step {step_number} is waiting on a technician ({reason}); {done}."),
        RunOutcome::Failed { step_number } => format!("Step {step_number} failed; {done}."),
    }
}

fn step_icon(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => ".",
        StepStatus::InProgress => "*",
        StepStatus::Success => "+",
        StepStatus::Failure => "!",
    }
}

fn log_icon(log_type: LogType) -> &'static str {
    match log_type {
        LogType::Info => " ",
        LogType::Success => "+",
        LogType::Warning => "?",
        LogType::Error => "!",
    }
}

/// Cut `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let kept: String = single_line.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
