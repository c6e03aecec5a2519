use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use spend_goals_core::gateway::{DiscountGateway, DiscountSpec, GatewayError};
use spend_goals_core::policy::{PolicyError, TierPolicy};
use spend_goals_core::store::{GoalStore, StoreError};
use spend_goals_core::types::{ExternalDiscountRef, GoalFields, SpendingGoal};

/// Keeps stored goals and their automatic discounts consistent.
///
/// Every mutation talks to the promotion service first and only touches the
/// local store once the external call has been confirmed. The one window where
/// the two can diverge, a store failure after a successful external create, is
/// reported as [`SyncError::Persistence`] carrying the orphaned reference.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<dyn GoalStore>,
    gateway: Arc<dyn DiscountGateway>,
    policy: TierPolicy,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn GoalStore>, gateway: Arc<dyn DiscountGateway>) -> Self {
        Self {
            store,
            gateway,
            policy: TierPolicy::new(),
        }
    }

    /// Lists the tenant's goals. No external calls are made.
    pub async fn list(&self, tenant: &str) -> Result<Vec<SpendingGoal>, SyncError> {
        self.store
            .list_by_tenant(tenant)
            .await
            .map_err(SyncError::persistence)
    }

    pub async fn create(
        &self,
        tenant: &str,
        input: &GoalFields,
    ) -> Result<SpendingGoal, SyncError> {
        let result = self.create_inner(tenant, input).await;
        record("create", &result);
        result
    }

    pub async fn update(
        &self,
        tenant: &str,
        goal_id: &str,
        input: &GoalFields,
    ) -> Result<SpendingGoal, SyncError> {
        let result = self.update_inner(tenant, goal_id, input).await;
        record("update", &result);
        result
    }

    pub async fn delete(&self, tenant: &str, goal_id: &str) -> Result<(), SyncError> {
        let result = self.delete_inner(tenant, goal_id).await;
        record("delete", &result);
        result
    }

    /// Removes a discount left behind by a create whose local write failed.
    pub async fn discard_orphan(&self, external_ref: &str) -> Result<(), SyncError> {
        match self.gateway.delete_discount(external_ref).await {
            Ok(()) | Err(GatewayError::NotFound) => {
                info!(stage = "sync", external_ref, "orphaned discount removed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_inner(
        &self,
        tenant: &str,
        input: &GoalFields,
    ) -> Result<SpendingGoal, SyncError> {
        let existing = self.list(tenant).await?;
        let goal = self.policy.validate(input, None, &existing)?;
        let spec = DiscountSpec::from(&goal);

        let external_ref = self.gateway.create_discount(&spec).await?;

        match self.store.create(tenant, &goal, &external_ref).await {
            Ok(stored) => {
                info!(stage = "sync", tenant, goal_id = %stored.id, %external_ref, "goal created");
                Ok(stored)
            }
            Err(source) => {
                warn!(
                    stage = "sync",
                    tenant,
                    %external_ref,
                    error = %source,
                    "goal write failed after discount creation"
                );
                Err(SyncError::Persistence {
                    source,
                    orphaned_discount: Some(external_ref),
                })
            }
        }
    }

    async fn update_inner(
        &self,
        tenant: &str,
        goal_id: &str,
        input: &GoalFields,
    ) -> Result<SpendingGoal, SyncError> {
        let current = self.load(tenant, goal_id).await?;
        let existing = self.list(tenant).await?;
        let goal = self.policy.validate(input, Some(goal_id), &existing)?;
        let spec = DiscountSpec::from(&goal);

        let (external_ref, repaired) = match current.external_discount_ref {
            Some(external_ref) => {
                self.gateway.update_discount(&external_ref, &spec).await?;
                (external_ref, false)
            }
            None => {
                warn!(stage = "sync", tenant, goal_id, "goal has no discount, creating one");
                (self.gateway.create_discount(&spec).await?, true)
            }
        };

        match self.store.update(goal_id, &goal, &external_ref).await {
            Ok(stored) => {
                info!(stage = "sync", tenant, goal_id, repaired, "goal updated");
                Ok(stored)
            }
            Err(source) => Err(SyncError::Persistence {
                source,
                orphaned_discount: repaired.then_some(external_ref),
            }),
        }
    }

    async fn delete_inner(&self, tenant: &str, goal_id: &str) -> Result<(), SyncError> {
        let current = self.load(tenant, goal_id).await?;

        if let Some(external_ref) = current.external_discount_ref.as_deref() {
            match self.gateway.delete_discount(external_ref).await {
                Ok(()) => {}
                Err(GatewayError::NotFound) => {
                    info!(stage = "sync", tenant, goal_id, external_ref, "discount already absent");
                }
                Err(err) => return Err(err.into()),
            }
        }

        match self.store.delete(goal_id).await {
            Ok(()) => {
                info!(stage = "sync", tenant, goal_id, "goal deleted");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(SyncError::NotFound {
                goal_id: goal_id.to_string(),
            }),
            Err(source) => Err(SyncError::persistence(source)),
        }
    }

    /// Loads a goal, hiding goals that belong to another tenant.
    async fn load(&self, tenant: &str, goal_id: &str) -> Result<SpendingGoal, SyncError> {
        match self.store.find_by_id(goal_id).await {
            Ok(Some(goal)) if goal.tenant == tenant => Ok(goal),
            Ok(_) => Err(SyncError::NotFound {
                goal_id: goal_id.to_string(),
            }),
            Err(source) => Err(SyncError::persistence(source)),
        }
    }
}

fn record<T>(op: &'static str, result: &Result<T, SyncError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    counter!("goal_sync_total", "op" => op, "result" => label).increment(1);
}

/// Outcome of a failed orchestrator operation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid value for {field}")]
    Validation { field: &'static str },
    #[error("conflict: {reason}")]
    Conflict { reason: &'static str },
    #[error("goal {goal_id} not found")]
    NotFound { goal_id: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to persist goal: {source}")]
    Persistence {
        source: StoreError,
        orphaned_discount: Option<ExternalDiscountRef>,
    },
}

impl SyncError {
    fn persistence(source: StoreError) -> Self {
        Self::Persistence {
            source,
            orphaned_discount: None,
        }
    }

    /// Label used for metrics and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::Gateway(_) => "gateway",
            Self::Persistence { .. } => "persistence",
        }
    }
}

impl From<PolicyError> for SyncError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Validation { field } => Self::Validation { field },
            PolicyError::Conflict { reason } => Self::Conflict { reason },
        }
    }
}
