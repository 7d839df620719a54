//! `wrench escalation` and `wrench technician` commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use wrench_core::escalation::{EscalationDesk, EscalationRequest};
use wrench_core::store::PgPlanStore;
use wrench_db::models::{EscalationMessage, EscalationSource, EscalationStatus};
use wrench_db::queries::escalations;
use wrench_db::queries::steps as step_db;
use wrench_db::queries::technicians;

use crate::order_cmds::{parse_id, truncate};
use crate::{EscalationCommands, TechnicianCommands};

fn desk(pool: &PgPool) -> EscalationDesk {
    EscalationDesk::new(Arc::new(PgPlanStore::new(pool.clone())))
}

pub async fn run_escalation_command(command: EscalationCommands, pool: &PgPool) -> Result<()> {
    match command {
        EscalationCommands::List { work_order } => {
            let list = match work_order {
                Some(id_str) => {
                    let id = parse_id("work order", &id_str)?;
                    desk(pool).escalations(id).await?
                }
                None => desk(pool).open_escalations().await?,
            };
            print_escalations(&list);
            Ok(())
        }
        EscalationCommands::Raise {
            work_order,
            message,
            technician,
            step,
        } => {
            let work_order_id = parse_id("work order", &work_order)?;
            let technician_id = technician
                .as_deref()
                .map(|t| parse_id("technician", t))
                .transpose()?;
            let step_id = match step {
                Some(number) => Some(
                    step_db::list_steps_for_work_order(pool, work_order_id)
                        .await?
                        .into_iter()
                        .find(|s| s.step_number == number)
                        .map(|s| s.id)
                        .with_context(|| format!("work order {work_order_id} has no step {number}"))?,
                ),
                None => None,
            };

            let escalation = desk(pool)
                .escalate(&EscalationRequest {
                    work_order_id,
                    message,
                    source: EscalationSource::Technician,
                    technician_id,
                    step_id,
                })
                .await?;
            println!("Escalation {} raised; work order is escalated.", escalation.id);
            Ok(())
        }
        EscalationCommands::Ack { id } => {
            let id = parse_id("escalation", &id)?;
            let escalation = desk(pool).acknowledge(id).await?;
            println!("Escalation {} {}.", escalation.id, escalation.status);
            Ok(())
        }
        EscalationCommands::Resolve { id } => {
            let id = parse_id("escalation", &id)?;
            let escalation = desk(pool).resolve(id).await?;
            println!("Escalation {} {}.", escalation.id, escalation.status);
            let still_open = escalations::list_escalations_for_work_order(pool, escalation.work_order_id)
                .await?
                .iter()
                .filter(|e| e.status != EscalationStatus::Resolved)
                .count();
            if still_open == 0 {
                println!(
                    "No open escalations left; continue with `wrench run {}`.",
                    escalation.work_order_id
                );
            }
            Ok(())
        }
    }
}

fn print_escalations(list: &[EscalationMessage]) {
    if list.is_empty() {
        println!("No escalations found.");
        return;
    }

    println!(
        "{:<38} {:<38} {:<13} {:<11} MESSAGE",
        "ID", "WORK ORDER", "STATUS", "SOURCE"
    );
    println!("{}", "-".repeat(120));
    for escalation in list {
        println!(
            "{:<38} {:<38} {:<13} {:<11} {}",
            escalation.id,
            escalation.work_order_id,
            escalation.status,
            escalation.source,
            truncate(&escalation.message, 40)
        );
    }
}

pub async fn run_technician_command(command: TechnicianCommands, pool: &PgPool) -> Result<()> {
    match command {
        TechnicianCommands::Add { name, skill } => {
            let technician = desk(pool).register_technician(&name, skill).await?;
            println!(
                "Technician {} ({}) registered as {}.",
                technician.name, technician.skill_level, technician.id
            );
            Ok(())
        }
        TechnicianCommands::List => {
            let list = desk(pool).technicians().await?;
            if list.is_empty() {
                println!("No technicians registered.");
                return Ok(());
            }
            println!("{:<38} {:<24} {:<8} STATUS", "ID", "NAME", "SKILL");
            println!("{}", "-".repeat(82));
            for technician in &list {
                println!(
                    "{:<38} {:<24} {:<8} {}",
                    technician.id,
                    truncate(&technician.name, 22),
                    technician.skill_level,
                    technician.current_status
                );
            }
            Ok(())
        }
        TechnicianCommands::Assign {
            work_order,
            technician,
        } => {
            let work_order_id = parse_id("work order", &work_order)?;
            let technician_id = parse_id("technician", &technician)?;
            let order = desk(pool)
                .assign_technician(work_order_id, technician_id)
                .await?;
            println!("Technician {technician_id} assigned to work order {}.", order.id);
            Ok(())
        }
        TechnicianCommands::Status { id, status } => {
            let id = parse_id("technician", &id)?;
            let technician = technicians::update_technician_status(pool, id, status)
                .await?
                .with_context(|| format!("technician {id} not found"))?;
            println!("Technician {} is now {}.", technician.name, technician.current_status);
            Ok(())
        }
    }
}
