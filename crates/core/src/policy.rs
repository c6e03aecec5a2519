use rust_decimal::Decimal;
use thiserror::Error;

use crate::gateway::discount_title;
use crate::types::{GoalFields, Reward, SpendingGoal, TierType, ValidatedGoal};

/// Conflict reason reported when a tenant already has an active free-shipping goal.
pub const FREE_SHIPPING_SLOT_TAKEN: &str = "free-shipping-slot-taken";

/// Business rules applied to a goal before any side effect is attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierPolicy;

impl TierPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Validates `candidate` against the tenant's existing goals.
    ///
    /// `candidate_id` identifies the goal being updated so that it does not
    /// conflict with its own free-shipping slot. Rules run in a fixed order
    /// and the first failure is returned.
    pub fn validate(
        &self,
        candidate: &GoalFields,
        candidate_id: Option<&str>,
        existing: &[SpendingGoal],
    ) -> Result<ValidatedGoal, PolicyError> {
        let threshold_amount = match candidate.threshold_amount {
            Some(value) if value >= Decimal::ZERO => value,
            _ => return Err(PolicyError::validation("threshold")),
        };

        let reward = match candidate.tier_type {
            TierType::Percentage => match candidate.tier_value {
                Some(value) if value > Decimal::ZERO && value <= Decimal::ONE_HUNDRED => {
                    Reward::Percentage(value)
                }
                _ => return Err(PolicyError::validation("percentageValue")),
            },
            TierType::FixedAmount => match candidate.tier_value {
                Some(value) if value > Decimal::ZERO => Reward::FixedAmount(value),
                _ => return Err(PolicyError::validation("fixedAmountValue")),
            },
            TierType::FreeShipping => {
                let slot_taken = existing.iter().any(|goal| {
                    goal.is_active()
                        && goal.tier_type == TierType::FreeShipping
                        && Some(goal.id.as_str()) != candidate_id
                });
                if slot_taken {
                    return Err(PolicyError::Conflict {
                        reason: FREE_SHIPPING_SLOT_TAKEN,
                    });
                }
                Reward::FreeShipping
            }
        };

        let title = match candidate.title.trim() {
            "" => discount_title(threshold_amount, reward),
            trimmed => trimmed.to_string(),
        };

        Ok(ValidatedGoal {
            title,
            threshold_amount,
            reward,
            announcement_template: candidate.announcement_template.clone(),
        })
    }
}

/// Rule violations detected by [`TierPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("invalid value for {field}")]
    Validation { field: &'static str },
    #[error("conflict: {reason}")]
    Conflict { reason: &'static str },
}

impl PolicyError {
    fn validation(field: &'static str) -> Self {
        Self::Validation { field }
    }
}
