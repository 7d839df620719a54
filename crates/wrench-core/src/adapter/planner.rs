use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::gateway::{PlanRequest, PlannerGateway};
use crate::model::ModelClient;

const INITIAL_INSTRUCTIONS: &str = "\
You plan maintenance work orders for a data center. Classify the ticket \
below and break it into ordered, concrete steps. Reply with a single JSON \
object and nothing else:
{\"priority\": \"low|medium|high\", \"category\": \"reboot|hardware|network|other\", \
\"estimated_expertise_level\": \"junior|mid|senior\", \
\"steps\": [{\"step_number\": 1, \"description\": \"...\"}]}
";

const REGENERATE_INSTRUCTIONS: &str = "\
A technician reported an issue while this work order was being executed. \
Plan the remaining work from the given step number on, taking the completed \
steps into account. Reply with a single JSON object and nothing else:
{\"steps\": [{\"step_number\": N, \"description\": \"...\"}]}
";

/// [`PlannerGateway`] that prompts a model.
pub struct ModelPlanner {
    model: Arc<dyn ModelClient>,
}

impl ModelPlanner {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    fn prompt(request: &PlanRequest) -> String {
        let instructions = match request {
            PlanRequest::Initial { .. } => INITIAL_INSTRUCTIONS,
            PlanRequest::Regenerate { .. } => REGENERATE_INSTRUCTIONS,
        };
        format!("{instructions}\n{}", request.render())
    }
}

#[async_trait]
impl PlannerGateway for ModelPlanner {
    fn name(&self) -> &str {
        self.model.name()
    }

    async fn plan(&self, request: &PlanRequest) -> Result<String> {
        self.model.complete(&Self::prompt(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_selects_instructions_by_request() {
        let initial = ModelPlanner::prompt(&PlanRequest::Initial {
            title: "Fan alarm".into(),
            description: "chassis fan 3".into(),
        });
        assert!(initial.contains("estimated_expertise_level"));
        assert!(initial.ends_with("Description: chassis fan 3\n"));
    }
}
