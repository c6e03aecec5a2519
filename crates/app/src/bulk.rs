use futures::stream::{self, StreamExt};
use tracing::info;

use spend_goals_core::types::{GoalFields, SpendingGoal};

use crate::sync::{SyncError, SyncOrchestrator};

/// One entry of a bulk request. Entries without an id create a new goal.
#[derive(Debug, Clone)]
pub struct GoalMutation {
    pub goal_id: Option<String>,
    pub fields: GoalFields,
}

/// Applies a batch of goal mutations with bounded concurrency.
///
/// Items are independent: a failure never aborts the rest of the batch, and
/// results come back in input order.
#[derive(Clone)]
pub struct BulkReconciler {
    orchestrator: SyncOrchestrator,
    concurrency: usize,
}

impl BulkReconciler {
    pub fn new(orchestrator: SyncOrchestrator, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn reconcile(
        &self,
        tenant: &str,
        mutations: Vec<GoalMutation>,
    ) -> Vec<Result<SpendingGoal, SyncError>> {
        let total = mutations.len();
        let results: Vec<_> = stream::iter(mutations)
            .map(|mutation| self.apply(tenant, mutation))
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|result| result.is_err()).count();
        info!(stage = "bulk", tenant, total, failed, "bulk reconcile finished");
        results
    }

    async fn apply(
        &self,
        tenant: &str,
        mutation: GoalMutation,
    ) -> Result<SpendingGoal, SyncError> {
        match mutation.goal_id {
            Some(goal_id) => {
                self.orchestrator
                    .update(tenant, &goal_id, &mutation.fields)
                    .await
            }
            None => self.orchestrator.create(tenant, &mutation.fields).await,
        }
    }
}
