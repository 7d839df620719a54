use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Error returned when a string is not part of one of the text vocabularies
/// stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct VocabularyError {
    /// Which vocabulary was being parsed (e.g. "priority").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Declares a text-backed enum with `Display`, `FromStr`, serde and sqlx
/// mappings that all agree on the same snake_case spelling.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(type_name = "text", rename_all = "snake_case")]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The canonical database spelling.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = VocabularyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(VocabularyError {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Urgency assigned by the planner.
    Priority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

text_enum! {
    /// Broad class of maintenance work.
    Category, "category" {
        Reboot => "reboot",
        Hardware => "hardware",
        Network => "network",
        Other => "other",
    }
}

text_enum! {
    /// Skill level, used both for the planner's estimate and for technicians.
    ExpertiseLevel, "expertise level" {
        Junior => "junior",
        Mid => "mid",
        Senior => "senior",
    }
}

text_enum! {
    /// Lifecycle of a work order.
    WorkOrderStatus, "work order status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Escalated => "escalated",
    }
}

text_enum! {
    /// Who carries out a step. `Undecided` until the executor gateway has
    /// been consulted.
    StepExecutor, "step executor" {
        Undecided => "undecided",
        Agent => "agent",
        Technician => "technician",
    }
}

text_enum! {
    /// Status of a plan step.
    StepStatus, "step status" {
        Pending => "pending",
        InProgress => "in_progress",
        Success => "success",
        Failure => "failure",
    }
}

impl StepStatus {
    /// `success` and `failure` are terminal; nothing moves a step out of
    /// them except replacement by plan regeneration (or an explicit
    /// technician resume of a failed step).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

text_enum! {
    /// Who produced a log entry.
    LogSource, "log source" {
        Agent => "agent",
        Technician => "technician",
    }
}

text_enum! {
    /// Severity of a log entry.
    LogType, "log type" {
        Info => "info",
        Success => "success",
        Warning => "warning",
        Error => "error",
    }
}

text_enum! {
    /// Who raised an escalation.
    EscalationSource, "escalation source" {
        Technician => "technician",
        AiAgent => "ai_agent",
    }
}

text_enum! {
    /// Escalation lifecycle. Advances `sent -> acknowledged -> resolved`.
    EscalationStatus, "escalation status" {
        Sent => "sent",
        Acknowledged => "acknowledged",
        Resolved => "resolved",
    }
}

impl EscalationStatus {
    /// Position in the monotonic lifecycle.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Acknowledged => 1,
            Self::Resolved => 2,
        }
    }
}

text_enum! {
    /// Availability of a technician.
    TechnicianStatus, "technician status" {
        Available => "available",
        Busy => "busy",
        Offline => "offline",
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A maintenance ticket together with its planner classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WorkOrder {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub estimated_expertise_level: ExpertiseLevel,
    pub status: WorkOrderStatus,
    pub assigned_technician: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One step of a work order's remediation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlanStep {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub step_number: i32,
    pub description: String,
    pub executor: StepExecutor,
    pub status: StepStatus,
    pub result: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of an action taken by the agent or a technician.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AgentLog {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub related_step: Option<Uuid>,
    pub agent_action: String,
    pub result: String,
    pub source: LogSource,
    pub log_type: LogType,
    pub recorded_at: DateTime<Utc>,
}

/// A request for human intervention on a work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EscalationMessage {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub related_step: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub message: String,
    pub source: EscalationSource,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
}

/// A field technician.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Technician {
    pub id: Uuid,
    pub name: String,
    pub skill_level: ExpertiseLevel,
    pub current_status: TechnicianStatus,
    pub created_at: DateTime<Utc>,
}

/// A spare part held in stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub location: String,
    pub unit_cost_cents: Option<i64>,
    pub reserved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// In stock and not held back for another job.
    pub fn is_available(&self) -> bool {
        self.quantity > 0 && !self.reserved
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
