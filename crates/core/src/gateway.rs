use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{ExternalDiscountRef, Reward, ValidatedGoal};

/// Builds the customer-facing discount title, e.g. `Spend 50 to get 10% off`.
pub fn discount_title(threshold_amount: Decimal, reward: Reward) -> String {
    format!("Spend {} to get {}", threshold_amount.normalize(), reward)
}

/// Declarative description of the automatic discount paired with a goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountSpec {
    pub title: String,
    pub threshold_amount: Decimal,
    pub reward: Reward,
}

impl DiscountSpec {
    pub fn new(threshold_amount: Decimal, reward: Reward) -> Self {
        Self {
            title: discount_title(threshold_amount, reward),
            threshold_amount,
            reward,
        }
    }
}

impl From<&ValidatedGoal> for DiscountSpec {
    fn from(goal: &ValidatedGoal) -> Self {
        Self::new(goal.threshold_amount, goal.reward)
    }
}

/// Capability to manage automatic discounts in the promotion service.
///
/// Implementations must not retry; callers own the retry policy.
#[async_trait]
pub trait DiscountGateway: Send + Sync {
    async fn create_discount(&self, spec: &DiscountSpec)
        -> Result<ExternalDiscountRef, GatewayError>;

    async fn update_discount(
        &self,
        external_ref: &str,
        spec: &DiscountSpec,
    ) -> Result<(), GatewayError>;

    async fn delete_discount(&self, external_ref: &str) -> Result<(), GatewayError>;
}

/// Failures reported by a [`DiscountGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("promotion service rejected the discount: {message}")]
    ValidationRejected {
        field: Option<String>,
        message: String,
    },
    #[error("promotion service temporarily unavailable: {0}")]
    Transient(String),
    #[error("promotion service request failed: {0}")]
    Permanent(String),
    #[error("discount does not exist")]
    NotFound,
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Label used for metrics and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationRejected { .. } => "validation_rejected",
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
            Self::NotFound => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn formats_titles_per_tier() {
        assert_eq!(
            DiscountSpec::new(dec!(50), Reward::Percentage(dec!(10))).title,
            "Spend 50 to get 10% off"
        );
        assert_eq!(
            DiscountSpec::new(dec!(20), Reward::FreeShipping).title,
            "Spend 20 to get free shipping"
        );
        assert_eq!(
            DiscountSpec::new(dec!(30), Reward::FixedAmount(dec!(5))).title,
            "Spend 30 to get $5 off"
        );
    }

    #[test]
    fn title_drops_trailing_zeros() {
        assert_eq!(
            discount_title(dec!(75.50), Reward::FixedAmount(dec!(7.25))),
            "Spend 75.5 to get $7.25 off"
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(GatewayError::Transient("timeout".into()).is_retryable());
        assert!(!GatewayError::Permanent("forbidden".into()).is_retryable());
        assert!(!GatewayError::NotFound.is_retryable());
        assert!(!GatewayError::ValidationRejected {
            field: None,
            message: "bad".into()
        }
        .is_retryable());
    }
}
