//! Domain types and rules for spending goals.
//!
//! Everything here is free of I/O: the goal model, the tier policy, cart
//! progress, and the capability traits that the storage and promotion-service
//! adapters implement.

pub mod gateway;
pub mod policy;
pub mod progress;
pub mod store;
pub mod types;

pub use gateway::{discount_title, DiscountGateway, DiscountSpec, GatewayError};
pub use policy::{PolicyError, TierPolicy, FREE_SHIPPING_SLOT_TAKEN};
pub use progress::{render_announcement, CartProgress, NextGoal, AMOUNT_LEFT_TOKEN};
pub use store::{GoalStore, StoreError};
pub use types::{ExternalDiscountRef, GoalFields, Reward, SpendingGoal, TierType, ValidatedGoal};
