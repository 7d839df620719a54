//! Planner requests and response parsing.
//!
//! A planner response is a JSON object, optionally inside a fenced code
//! block:
//!
//! ```json
//! {
//!   "priority": "high",
//!   "category": "hardware",
//!   "estimated_expertise_level": "mid",
//!   "steps": [{"step_number": 1, "description": "Check PSU LEDs"}]
//! }
//! ```
//!
//! The classification keys are only read for the initial plan. Step
//! numbers in the response are ignored: steps are re-threaded in list
//! order so the stored plan is always contiguous from its first number.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wrench_db::models::{Category, ExpertiseLevel, Priority, VocabularyError, WorkOrder};

use super::strip_code_fence;
use crate::error::PlannerFormatError;

/// Planner classification of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub priority: Priority,
    pub category: Category,
    pub estimated_expertise_level: ExpertiseLevel,
}

impl Classification {
    pub fn of(order: &WorkOrder) -> Self {
        Self {
            priority: order.priority,
            category: order.category,
            estimated_expertise_level: order.estimated_expertise_level,
        }
    }
}

/// A step as planned, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step_number: i32,
    pub description: String,
}

/// A successfully executed step handed back to the planner as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedStep {
    pub step_number: i32,
    pub description: String,
    pub result: Option<String>,
}

/// What the planner is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanRequest {
    /// Classify a new ticket and plan it from scratch.
    Initial { title: String, description: String },
    /// Replace the tail of an existing plan after a reported issue.
    Regenerate {
        title: String,
        description: String,
        classification: Classification,
        completed: Vec<CompletedStep>,
        issue: String,
        /// First step number of the replacement plan.
        floor: i32,
    },
}

impl PlanRequest {
    /// Render the request as the text block handed to the planner.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Initial { title, description } => {
                let _ = writeln!(out, "Work order: {title}");
                let _ = writeln!(out, "Description: {description}");
            }
            Self::Regenerate {
                title,
                description,
                classification,
                completed,
                issue,
                floor,
            } => {
                let _ = writeln!(out, "Work order: {title}");
                let _ = writeln!(out, "Description: {description}");
                let _ = writeln!(
                    out,
                    "Classification: priority={} category={} expertise={}",
                    classification.priority,
                    classification.category,
                    classification.estimated_expertise_level
                );
                if !completed.is_empty() {
                    let _ = writeln!(out, "\nCompleted steps:");
                    for step in completed {
                        let _ = write!(out, "  {}. {}", step.step_number, step.description);
                        if let Some(result) = &step.result {
                            let _ = write!(out, " -> {result}");
                        }
                        out.push('\n');
                    }
                }
                let _ = writeln!(out, "\nReported issue: {issue}");
                let _ = writeln!(out, "Number the replacement steps starting at {floor}.");
            }
        }
        out
    }
}

/// Parsed initial plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPlan {
    pub classification: Classification,
    /// Numbered contiguously from 1.
    pub steps: Vec<PlannedStep>,
}

/// Parse the response to a [`PlanRequest::Initial`].
pub fn parse_initial_plan(raw: &str) -> Result<InitialPlan, PlannerFormatError> {
    let object = parse_object(raw)?;
    let classification = Classification {
        priority: vocabulary(&object, "priority")?,
        category: vocabulary(&object, "category")?,
        estimated_expertise_level: vocabulary(&object, "estimated_expertise_level")?,
    };
    let steps = parse_steps(&object, 1)?;
    Ok(InitialPlan {
        classification,
        steps,
    })
}

/// Parse the response to a [`PlanRequest::Regenerate`], numbering the
/// steps contiguously from `floor`.
pub fn parse_replacement_steps(
    raw: &str,
    floor: i32,
) -> Result<Vec<PlannedStep>, PlannerFormatError> {
    let object = parse_object(raw)?;
    parse_steps(&object, floor)
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, PlannerFormatError> {
    match serde_json::from_str::<Value>(strip_code_fence(raw))? {
        Value::Object(map) => Ok(map),
        _ => Err(PlannerFormatError::NotObject),
    }
}

fn vocabulary<T>(object: &Map<String, Value>, key: &'static str) -> Result<T, PlannerFormatError>
where
    T: std::str::FromStr<Err = VocabularyError>,
{
    match object.get(key) {
        None | Some(Value::Null) => Err(PlannerFormatError::MissingKey(key)),
        Some(Value::String(s)) => Ok(s.parse()?),
        Some(other) => Err(VocabularyError {
            kind: key,
            value: other.to_string(),
        }
        .into()),
    }
}

fn parse_steps(
    object: &Map<String, Value>,
    floor: i32,
) -> Result<Vec<PlannedStep>, PlannerFormatError> {
    let Some(Value::Array(items)) = object.get("steps") else {
        return Err(PlannerFormatError::MissingKey("steps"));
    };
    if items.is_empty() {
        return Err(PlannerFormatError::EmptyPlan);
    }

    let mut steps = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let description = item
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(PlannerFormatError::BlankStep(position + 1))?;
        steps.push(PlannedStep {
            step_number: floor + position as i32,
            description: description.to_owned(),
        });
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{
        "priority": "high",
        "category": "hardware",
        "estimated_expertise_level": "mid",
        "steps": [
            {"step_number": 1, "description": "Check PSU LEDs"},
            {"step_number": 2, "description": "Reseat PSU B"},
            {"step_number": 3, "description": "Verify redundancy restored"}
        ]
    }"#;

    #[test]
    fn parses_initial_plan() {
        let plan = parse_initial_plan(PLAN).unwrap();
        assert_eq!(plan.classification.priority, Priority::High);
        assert_eq!(plan.classification.category, Category::Hardware);
        assert_eq!(
            plan.classification.estimated_expertise_level,
            ExpertiseLevel::Mid
        );
        let numbers: Vec<i32> = plan.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(plan.steps[1].description, "Reseat PSU B");
    }

    #[test]
    fn fenced_response_accepted() {
        let fenced = format!("```json\n{PLAN}\n```");
        assert!(parse_initial_plan(&fenced).is_ok());
    }

    #[test]
    fn planner_numbering_is_ignored() {
        let raw = r#"{"priority":"low","category":"reboot","estimated_expertise_level":"junior",
            "steps":[{"step_number":7,"description":"a"},{"step_number":3,"description":"b"}]}"#;
        let plan = parse_initial_plan(raw).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                PlannedStep { step_number: 1, description: "a".into() },
                PlannedStep { step_number: 2, description: "b".into() },
            ]
        );
    }

    #[test]
    fn out_of_vocabulary_rejected() {
        let raw = PLAN.replace("\"high\"", "\"urgent\"");
        let err = parse_initial_plan(&raw).unwrap_err();
        assert!(matches!(err, PlannerFormatError::OutOfVocabulary(ref v) if v.kind == "priority"));

        let raw = PLAN.replace("\"hardware\"", "42");
        assert!(matches!(
            parse_initial_plan(&raw).unwrap_err(),
            PlannerFormatError::OutOfVocabulary(_)
        ));
    }

    #[test]
    fn missing_keys_rejected() {
        let raw = r#"{"category":"other","estimated_expertise_level":"mid","steps":[{"description":"x"}]}"#;
        assert!(matches!(
            parse_initial_plan(raw).unwrap_err(),
            PlannerFormatError::MissingKey("priority")
        ));

        assert!(matches!(
            parse_replacement_steps(r#"{"plan": []}"#, 2).unwrap_err(),
            PlannerFormatError::MissingKey("steps")
        ));
    }

    #[test]
    fn malformed_and_empty_rejected() {
        assert!(matches!(
            parse_replacement_steps("I could not produce a plan.", 1).unwrap_err(),
            PlannerFormatError::NotJson(_)
        ));
        assert!(matches!(
            parse_replacement_steps("[1, 2]", 1).unwrap_err(),
            PlannerFormatError::NotObject
        ));
        assert!(matches!(
            parse_replacement_steps(r#"{"steps": []}"#, 1).unwrap_err(),
            PlannerFormatError::EmptyPlan
        ));
        assert!(matches!(
            parse_replacement_steps(r#"{"steps": [{"description": "ok"}, {"description": "  "}]}"#, 1)
                .unwrap_err(),
            PlannerFormatError::BlankStep(2)
        ));
    }

    #[test]
    fn replacement_steps_start_at_floor() {
        let raw = r#"{"steps":[{"step_number":1,"description":"Replace disk"},
                                {"step_number":2,"description":"Rebuild array"}]}"#;
        let steps = parse_replacement_steps(raw, 2).unwrap();
        let numbers: Vec<i32> = steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }

    #[test]
    fn regenerate_render_omits_empty_completed_section() {
        let mut request = PlanRequest::Regenerate {
            title: "Disk alarm".into(),
            description: "sdb SMART errors".into(),
            classification: Classification {
                priority: Priority::Medium,
                category: Category::Hardware,
                estimated_expertise_level: ExpertiseLevel::Mid,
            },
            completed: vec![],
            issue: "disk failed".into(),
            floor: 1,
        };
        let text = request.render();
        assert!(!text.contains("Completed steps"));
        assert!(text.contains("Reported issue: disk failed"));
        assert!(text.contains("starting at 1"));

        if let PlanRequest::Regenerate { completed, .. } = &mut request {
            completed.push(CompletedStep {
                step_number: 1,
                description: "Check SMART".into(),
                result: Some("2 reallocated sectors".into()),
            });
        }
        let text = request.render();
        assert!(text.contains("Completed steps:\n  1. Check SMART -> 2 reallocated sectors"));
    }
}
