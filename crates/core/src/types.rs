use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque reference to a discount resource owned by the promotion service.
pub type ExternalDiscountRef = String;

/// Reward category offered once a cart reaches a goal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierType {
    FreeShipping,
    Percentage,
    FixedAmount,
}

impl TierType {
    /// Returns the canonical database representation for the tier type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FreeShipping => "free_shipping",
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
        }
    }

    /// Maps the storefront editor's tab index (0, 1, 2) onto a tier type.
    pub fn from_tab_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(Self::FreeShipping),
            1 => Some(Self::Percentage),
            2 => Some(Self::FixedAmount),
            _ => None,
        }
    }
}

impl FromStr for TierType {
    type Err = UnknownTierType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "free_shipping" => Ok(Self::FreeShipping),
            "percentage" => Ok(Self::Percentage),
            "fixed_amount" => Ok(Self::FixedAmount),
            other => Err(UnknownTierType(other.to_string())),
        }
    }
}

impl fmt::Display for TierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a tier type string does not name a known tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier type: {0}")]
pub struct UnknownTierType(pub String);

/// Reward carried by a validated goal. The value only exists for tiers that use one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reward {
    FreeShipping,
    Percentage(Decimal),
    FixedAmount(Decimal),
}

impl Reward {
    pub fn tier_type(self) -> TierType {
        match self {
            Self::FreeShipping => TierType::FreeShipping,
            Self::Percentage(_) => TierType::Percentage,
            Self::FixedAmount(_) => TierType::FixedAmount,
        }
    }

    pub fn value(self) -> Option<Decimal> {
        match self {
            Self::FreeShipping => None,
            Self::Percentage(value) | Self::FixedAmount(value) => Some(value),
        }
    }
}

impl fmt::Display for Reward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreeShipping => f.write_str("free shipping"),
            Self::Percentage(value) => write!(f, "{}% off", value.normalize()),
            Self::FixedAmount(value) => write!(f, "${} off", value.normalize()),
        }
    }
}

/// Goal fields as submitted by a caller, before any validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalFields {
    #[serde(default)]
    pub title: String,
    pub threshold_amount: Option<Decimal>,
    pub tier_type: TierType,
    #[serde(default)]
    pub tier_value: Option<Decimal>,
    #[serde(default)]
    pub announcement_template: String,
}

/// Goal fields that passed [`crate::policy::TierPolicy`] validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedGoal {
    pub title: String,
    pub threshold_amount: Decimal,
    pub reward: Reward,
    pub announcement_template: String,
}

/// Spending goal persisted for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingGoal {
    pub id: String,
    pub tenant: String,
    pub title: String,
    pub threshold_amount: Decimal,
    pub tier_type: TierType,
    pub tier_value: Option<Decimal>,
    pub announcement_template: String,
    pub external_discount_ref: Option<ExternalDiscountRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpendingGoal {
    /// A goal is active once its external discount has been confirmed.
    pub fn is_active(&self) -> bool {
        self.external_discount_ref.is_some()
    }

    /// Rebuilds the reward from the stored tier columns.
    pub fn reward(&self) -> Option<Reward> {
        match self.tier_type {
            TierType::FreeShipping => Some(Reward::FreeShipping),
            TierType::Percentage => self.tier_value.map(Reward::Percentage),
            TierType::FixedAmount => self.tier_value.map(Reward::FixedAmount),
        }
    }

    /// Returns the submitted-field view of the stored goal.
    pub fn fields(&self) -> GoalFields {
        GoalFields {
            title: self.title.clone(),
            threshold_amount: Some(self.threshold_amount),
            tier_type: self.tier_type,
            tier_value: self.tier_value,
            announcement_template: self.announcement_template.clone(),
        }
    }
}
