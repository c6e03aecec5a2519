use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::types::SpendingGoal;

/// Placeholder replaced with the remaining amount in announcement templates.
pub const AMOUNT_LEFT_TOKEN: &str = "{{amount_left}}";

/// Replaces every [`AMOUNT_LEFT_TOKEN`] in `template` with a `$` amount rounded to cents.
pub fn render_announcement(template: &str, amount_left: Decimal) -> String {
    let amount = amount_left.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    template.replace(AMOUNT_LEFT_TOKEN, &format!("${amount:.2}"))
}

/// Shopper-facing progress towards a tenant's spending goals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProgress {
    pub subtotal: Decimal,
    pub unlocked: Vec<SpendingGoal>,
    pub next: Option<NextGoal>,
    pub percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextGoal {
    pub goal: SpendingGoal,
    pub amount_left: Decimal,
    pub announcement: String,
}

impl CartProgress {
    /// Computes progress for `subtotal`. Goals without a confirmed discount are ignored.
    ///
    /// A negative subtotal counts as an empty cart.
    pub fn evaluate(goals: &[SpendingGoal], subtotal: Decimal) -> Self {
        let subtotal = subtotal.max(Decimal::ZERO);
        let mut active: Vec<&SpendingGoal> = goals.iter().filter(|g| g.is_active()).collect();
        active.sort_by(|a, b| a.threshold_amount.cmp(&b.threshold_amount));

        let (unlocked, pending): (Vec<&SpendingGoal>, Vec<&SpendingGoal>) = active
            .iter()
            .copied()
            .partition(|goal| goal.threshold_amount <= subtotal);

        let next = pending.first().map(|goal| {
            let amount_left = goal.threshold_amount - subtotal;
            NextGoal {
                goal: (*goal).clone(),
                amount_left,
                announcement: render_announcement(&goal.announcement_template, amount_left),
            }
        });

        let percent = match &next {
            Some(next) if next.goal.threshold_amount > Decimal::ZERO => {
                let ratio = subtotal / next.goal.threshold_amount * Decimal::ONE_HUNDRED;
                ratio.round_dp(2)
            }
            Some(_) => Decimal::ZERO,
            None if active.is_empty() => Decimal::ZERO,
            None => Decimal::ONE_HUNDRED,
        };

        Self {
            subtotal,
            unlocked: unlocked.into_iter().cloned().collect(),
            next,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TierType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn goal(id: &str, threshold: Decimal, active: bool) -> SpendingGoal {
        SpendingGoal {
            id: id.to_string(),
            tenant: "shop-1".to_string(),
            title: id.to_string(),
            threshold_amount: threshold,
            tier_type: TierType::Percentage,
            tier_value: Some(dec!(10)),
            announcement_template: "Add {{amount_left}} to get 10% off!".to_string(),
            external_discount_ref: active.then(|| format!("gid://{id}")),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn renders_amount_with_cents() {
        assert_eq!(
            render_announcement("Add {{amount_left}} more, only {{amount_left}}!", dec!(7.5)),
            "Add $7.50 more, only $7.50!"
        );
        assert_eq!(render_announcement("No token", dec!(1)), "No token");
    }

    #[test]
    fn picks_lowest_pending_goal() {
        let goals = vec![
            goal("high", dec!(100), true),
            goal("low", dec!(25), true),
            goal("mid", dec!(50), true),
        ];
        let progress = CartProgress::evaluate(&goals, dec!(30));

        assert_eq!(progress.unlocked.len(), 1);
        assert_eq!(progress.unlocked[0].id, "low");
        let next = progress.next.expect("next goal");
        assert_eq!(next.goal.id, "mid");
        assert_eq!(next.amount_left, dec!(20));
        assert_eq!(next.announcement, "Add $20.00 to get 10% off!");
        assert_eq!(progress.percent, dec!(60));
    }

    #[test]
    fn ignores_inactive_goals() {
        let goals = vec![goal("pending", dec!(10), false)];
        let progress = CartProgress::evaluate(&goals, dec!(5));
        assert!(progress.next.is_none());
        assert!(progress.unlocked.is_empty());
        assert_eq!(progress.percent, Decimal::ZERO);
    }

    #[test]
    fn all_goals_unlocked_reports_full_progress() {
        let goals = vec![goal("a", dec!(10), true), goal("b", dec!(20), true)];
        let progress = CartProgress::evaluate(&goals, dec!(20));
        assert!(progress.next.is_none());
        assert_eq!(progress.unlocked.len(), 2);
        assert_eq!(progress.percent, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn extreme_negative_subtotal_counts_as_empty_cart() {
        let goals = vec![goal("one", dec!(1), true)];
        let progress = CartProgress::evaluate(&goals, Decimal::MIN);

        assert_eq!(progress.subtotal, Decimal::ZERO);
        let next = progress.next.expect("next goal");
        assert_eq!(next.amount_left, dec!(1));
        assert_eq!(progress.percent, Decimal::ZERO);
    }
}
