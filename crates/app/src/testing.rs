//! In-memory stand-ins for the goal store and the promotion service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use spend_goals_core::gateway::{DiscountGateway, DiscountSpec, GatewayError};
use spend_goals_core::store::{GoalStore, StoreError};
use spend_goals_core::types::{
    ExternalDiscountRef, GoalFields, Reward, SpendingGoal, TierType, ValidatedGoal,
};

#[derive(Default)]
pub struct MemoryStore {
    goals: Mutex<Vec<SpendingGoal>>,
    next_id: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a goal directly, bypassing any validation.
    pub fn seed(
        &self,
        tenant: &str,
        goal: &ValidatedGoal,
        external_ref: Option<&str>,
    ) -> SpendingGoal {
        let stored = self.build(tenant, goal, external_ref.map(str::to_string));
        self.goals.lock().expect("store lock").push(stored.clone());
        stored
    }

    pub fn snapshot(&self, tenant: &str) -> Vec<SpendingGoal> {
        self.goals
            .lock()
            .expect("store lock")
            .iter()
            .filter(|goal| goal.tenant == tenant)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<SpendingGoal> {
        self.goals
            .lock()
            .expect("store lock")
            .iter()
            .find(|goal| goal.id == id)
            .cloned()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn build(
        &self,
        tenant: &str,
        goal: &ValidatedGoal,
        external_ref: Option<ExternalDiscountRef>,
    ) -> SpendingGoal {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        SpendingGoal {
            id: format!("goal-{id}"),
            tenant: tenant.to_string(),
            title: goal.title.clone(),
            threshold_amount: goal.threshold_amount,
            tier_type: goal.reward.tier_type(),
            tier_value: goal.reward.value(),
            announcement_template: goal.announcement_template.clone(),
            external_discount_ref: external_ref,
            created_at: now,
            updated_at: now,
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk I/O error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl GoalStore for MemoryStore {
    async fn create(
        &self,
        tenant: &str,
        goal: &ValidatedGoal,
        external_ref: &str,
    ) -> Result<SpendingGoal, StoreError> {
        self.check_writable()?;
        let stored = self.build(tenant, goal, Some(external_ref.to_string()));
        let mut goals = self.goals.lock().expect("store lock");
        let slot_taken = stored.tier_type == TierType::FreeShipping
            && goals.iter().any(|g| {
                g.tenant == tenant && g.tier_type == TierType::FreeShipping && g.is_active()
            });
        if slot_taken {
            return Err(StoreError::FreeShippingConflict);
        }
        goals.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<SpendingGoal>, StoreError> {
        Ok(self.get(id))
    }

    async fn update(
        &self,
        id: &str,
        goal: &ValidatedGoal,
        external_ref: &str,
    ) -> Result<SpendingGoal, StoreError> {
        self.check_writable()?;
        let mut goals = self.goals.lock().expect("store lock");
        let stored = goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(StoreError::NotFound)?;
        stored.title = goal.title.clone();
        stored.threshold_amount = goal.threshold_amount;
        stored.tier_type = goal.reward.tier_type();
        stored.tier_value = goal.reward.value();
        stored.announcement_template = goal.announcement_template.clone();
        stored.external_discount_ref = Some(external_ref.to_string());
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut goals = self.goals.lock().expect("store lock");
        let before = goals.len();
        goals.retain(|g| g.id != id);
        if goals.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_by_tenant(&self, tenant: &str) -> Result<Vec<SpendingGoal>, StoreError> {
        let mut goals = self.snapshot(tenant);
        goals.sort_by(|a, b| a.threshold_amount.cmp(&b.threshold_amount));
        Ok(goals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Create(DiscountSpec),
    Update(String, DiscountSpec),
    Delete(String),
}

/// Records every call and replays queued outcomes, succeeding once the queue is empty.
#[derive(Default)]
pub struct ScriptedGateway {
    calls: Mutex<Vec<GatewayCall>>,
    outcomes: Mutex<VecDeque<Option<GatewayError>>>,
    next_id: AtomicUsize,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay`, which lets tests observe overlapping calls.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, error: GatewayError) {
        self.outcomes.lock().expect("outcomes lock").push_back(Some(error));
    }

    pub fn succeed_next(&self) {
        self.outcomes.lock().expect("outcomes lock").push_back(None);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        self.calls.lock().expect("calls lock").push(call);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.outcomes.lock().expect("outcomes lock").pop_front() {
            Some(Some(error)) => Err(error),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DiscountGateway for ScriptedGateway {
    async fn create_discount(
        &self,
        spec: &DiscountSpec,
    ) -> Result<ExternalDiscountRef, GatewayError> {
        self.record(GatewayCall::Create(spec.clone())).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("gid://shopify/DiscountAutomaticNode/{id}"))
    }

    async fn update_discount(
        &self,
        external_ref: &str,
        spec: &DiscountSpec,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Update(external_ref.to_string(), spec.clone()))
            .await
    }

    async fn delete_discount(&self, external_ref: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::Delete(external_ref.to_string())).await
    }
}

pub fn fields(tier_type: TierType, threshold: &str, value: Option<&str>) -> GoalFields {
    GoalFields {
        title: String::new(),
        threshold_amount: Some(threshold.parse().expect("threshold")),
        tier_type,
        tier_value: value.map(|v| v.parse().expect("tier value")),
        announcement_template: "Add {{amount_left}} to unlock".to_string(),
    }
}

pub fn validated(threshold: &str, reward: Reward) -> ValidatedGoal {
    ValidatedGoal {
        title: "Seeded".to_string(),
        threshold_amount: threshold.parse().expect("threshold"),
        reward,
        announcement_template: "Add {{amount_left}}".to_string(),
    }
}
