use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::super::domain::{PenaltyKind, PenaltyPolicy};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Late-payment breakdown for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accrual {
    pub elapsed_days: i64,
    pub periods_elapsed: i64,
    pub penalty_amount: Decimal,
    pub total: Decimal,
}

/// Penalty owed on `principal` filed at `filed_at` and settled at `now`.
///
/// Every started day counts as a full day; every completed grace period adds one penalty
/// unit. A zero-day grace period cannot define a period and accrues nothing.
pub fn accrue(
    principal: Decimal,
    filed_at: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &PenaltyPolicy,
) -> Accrual {
    let elapsed_days = elapsed_days(filed_at, now);
    let periods_elapsed = if policy.grace_period_days == 0 {
        0
    } else {
        elapsed_days
            .div_euclid(i64::from(policy.grace_period_days))
            .max(0)
    };

    let penalty_amount = if periods_elapsed <= 0 {
        Decimal::ZERO
    } else {
        let periods = Decimal::from(periods_elapsed);
        let raw = match policy.kind {
            PenaltyKind::Percentage => principal * (policy.value / Decimal::ONE_HUNDRED) * periods,
            PenaltyKind::Fixed => policy.value * periods,
        };
        round_money(raw)
    };

    Accrual {
        elapsed_days,
        periods_elapsed,
        penalty_amount,
        total: principal + penalty_amount,
    }
}

fn elapsed_days(filed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - filed_at).num_milliseconds();
    let whole = millis / MILLIS_PER_DAY;
    if millis % MILLIS_PER_DAY > 0 {
        whole + 1
    } else {
        whole
    }
}

pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn filed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
    }

    fn ten_percent_monthly() -> PenaltyPolicy {
        PenaltyPolicy {
            grace_period_days: 30,
            kind: PenaltyKind::Percentage,
            value: Decimal::new(10, 0),
        }
    }

    #[test]
    fn no_penalty_inside_the_grace_period() {
        let accrual = accrue(
            Decimal::new(1000, 0),
            filed(),
            filed() + Duration::days(29),
            &ten_percent_monthly(),
        );
        assert_eq!(accrual.elapsed_days, 29);
        assert_eq!(accrual.periods_elapsed, 0);
        assert_eq!(accrual.penalty_amount, Decimal::ZERO);
        assert_eq!(accrual.total, Decimal::new(1000, 0));
    }

    #[test]
    fn one_period_after_thirty_one_days() {
        let accrual = accrue(
            Decimal::new(1000, 0),
            filed(),
            filed() + Duration::days(31),
            &ten_percent_monthly(),
        );
        assert_eq!(accrual.periods_elapsed, 1);
        assert_eq!(accrual.penalty_amount, Decimal::new(100, 0));
        assert_eq!(accrual.total, Decimal::new(1100, 0));
    }

    #[test]
    fn two_periods_after_sixty_one_days() {
        let accrual = accrue(
            Decimal::new(1000, 0),
            filed(),
            filed() + Duration::days(61),
            &ten_percent_monthly(),
        );
        assert_eq!(accrual.periods_elapsed, 2);
        assert_eq!(accrual.penalty_amount, Decimal::new(200, 0));
        assert_eq!(accrual.total, Decimal::new(1200, 0));
    }

    #[test]
    fn a_started_day_counts_in_full() {
        let accrual = accrue(
            Decimal::new(1000, 0),
            filed(),
            filed() + Duration::days(29) + Duration::minutes(1),
            &ten_percent_monthly(),
        );
        assert_eq!(accrual.elapsed_days, 30);
        assert_eq!(accrual.periods_elapsed, 1);
    }

    #[test]
    fn fixed_penalty_scales_with_periods() {
        let policy = PenaltyPolicy {
            grace_period_days: 15,
            kind: PenaltyKind::Fixed,
            value: Decimal::new(2500, 0),
        };
        let accrual = accrue(
            Decimal::new(40000, 0),
            filed(),
            filed() + Duration::days(46),
            &policy,
        );
        assert_eq!(accrual.periods_elapsed, 3);
        assert_eq!(accrual.penalty_amount, Decimal::new(7500, 0));
        assert_eq!(accrual.total, Decimal::new(47500, 0));
    }

    #[test]
    fn clock_skew_and_zero_grace_accrue_nothing() {
        let skewed = accrue(
            Decimal::new(1000, 0),
            filed(),
            filed() - Duration::days(45),
            &ten_percent_monthly(),
        );
        assert_eq!(skewed.periods_elapsed, 0);
        assert_eq!(skewed.penalty_amount, Decimal::ZERO);

        let zero_grace = PenaltyPolicy {
            grace_period_days: 0,
            ..ten_percent_monthly()
        };
        let accrual = accrue(
            Decimal::new(1000, 0),
            filed(),
            filed() + Duration::days(400),
            &zero_grace,
        );
        assert_eq!(accrual.total, Decimal::new(1000, 0));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let now = filed() + Duration::days(95);
        let first = accrue(Decimal::new(123_457, 2), filed(), now, &ten_percent_monthly());
        for _ in 0..10 {
            assert_eq!(
                accrue(Decimal::new(123_457, 2), filed(), now, &ten_percent_monthly()),
                first
            );
        }
        assert_eq!(first.penalty_amount, Decimal::new(37037, 2));
    }
}
