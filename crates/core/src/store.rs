use async_trait::async_trait;
use thiserror::Error;

use crate::types::{SpendingGoal, ValidatedGoal};

/// Capability to persist spending goals, scoped by tenant.
#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn create(
        &self,
        tenant: &str,
        goal: &ValidatedGoal,
        external_ref: &str,
    ) -> Result<SpendingGoal, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<SpendingGoal>, StoreError>;

    /// Overwrites the goal fields and its external reference.
    async fn update(
        &self,
        id: &str,
        goal: &ValidatedGoal,
        external_ref: &str,
    ) -> Result<SpendingGoal, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Lists the tenant's goals ordered by threshold.
    async fn list_by_tenant(&self, tenant: &str) -> Result<Vec<SpendingGoal>, StoreError>;
}

/// Failures reported by a [`GoalStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("goal not found")]
    NotFound,
    #[error("tenant already has a free-shipping goal")]
    FreeShippingConflict,
    #[error("stored goal is corrupt: {0}")]
    Corrupt(String),
    #[error("storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}
