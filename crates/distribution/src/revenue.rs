//! Proportional revenue allocation to the cent, plus the publisher cut.

use feedshare_core::{CampaignId, Cents};
use serde::{Deserialize, Serialize};

use crate::error::GroupError;
use crate::weights::Weight;

/// Share of allocated feed revenue credited to the publisher side.
pub const PUBLISHER_SHARE_PERCENT: u64 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueShare {
    pub campaign_id: CampaignId,
    pub feed_revenue: Cents,
    pub pub_revenue: Cents,
}

/// `num / den` rounded half up, for non-negative operands.
fn round_half_up(num: u128, den: u128) -> u128 {
    let quotient = num / den;
    let remainder = num % den;
    if remainder >= den - remainder {
        quotient + 1
    } else {
        quotient
    }
}

/// Publisher revenue for an already reconciled feed revenue share.
pub fn publisher_share(feed_revenue: Cents) -> Cents {
    let cents = feed_revenue.0.max(0) as u128;
    Cents(round_half_up(cents * PUBLISHER_SHARE_PERCENT as u128, 100) as i64)
}

/// Split `total` across `weights`, each share rounded to the cent.
///
/// Rounding drift is settled on the campaign with the largest weight (ties to
/// the lower campaign id). A negative drift larger than that share continues
/// down the same ranking, so the shares always sum to `total` and none goes
/// below zero.
pub fn allocate_revenue(total: Cents, weights: &[Weight]) -> Result<Vec<RevenueShare>, GroupError> {
    if total.is_negative() {
        return Err(GroupError::NegativeRevenue(total));
    }
    let group_clicks: u128 = weights.iter().map(|w| w.clicks as u128).sum();
    if weights.is_empty() || group_clicks == 0 {
        return Ok(weights
            .iter()
            .map(|w| RevenueShare {
                campaign_id: w.campaign_id,
                feed_revenue: Cents::ZERO,
                pub_revenue: Cents::ZERO,
            })
            .collect());
    }

    let total_cents = total.0 as u128;
    let mut shares: Vec<i128> = weights
        .iter()
        .map(|w| round_half_up(total_cents * w.clicks as u128, group_clicks) as i128)
        .collect();

    let drift = total.0 as i128 - shares.iter().sum::<i128>();
    if drift != 0 {
        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by(|&a, &b| Weight::rank(&weights[a], &weights[b]));

        if drift > 0 {
            shares[order[0]] += drift;
        } else {
            let mut owed = -drift;
            for idx in order {
                let taken = owed.min(shares[idx]);
                shares[idx] -= taken;
                owed -= taken;
                if owed == 0 {
                    break;
                }
            }
        }
    }

    weights
        .iter()
        .zip(shares)
        .map(|(w, share)| {
            let feed_revenue = Cents(i64::try_from(share).map_err(|_| {
                GroupError::ArithmeticOverflow {
                    metric: "feed_revenue",
                }
            })?);
            Ok(RevenueShare {
                campaign_id: w.campaign_id,
                feed_revenue,
                pub_revenue: publisher_share(feed_revenue),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightCalculator;

    fn weights(pairs: &[(i64, u64)]) -> Vec<Weight> {
        WeightCalculator::from_clicks(pairs).unwrap().unwrap()
    }

    fn sum(shares: &[RevenueShare]) -> Cents {
        shares.iter().map(|s| s.feed_revenue).sum()
    }

    // 1. Proportional split -------------------------------------------------

    #[test]
    fn test_125_45_split_626_374() {
        let shares = allocate_revenue(Cents(12545), &weights(&[(1, 626), (2, 374)])).unwrap();
        assert_eq!(shares[0].feed_revenue, Cents(7853));
        assert_eq!(shares[1].feed_revenue, Cents(4692));
        assert_eq!(sum(&shares), Cents(12545));
        assert_eq!(shares[0].pub_revenue, Cents(5890));
        assert_eq!(shares[1].pub_revenue, Cents(3519));
    }

    #[test]
    fn test_positive_drift_goes_to_largest_weight() {
        // 1.00 in thirds: 33 + 33 + 33 = 99, one cent short.
        let shares = allocate_revenue(Cents(100), &weights(&[(3, 1), (1, 1), (2, 1)])).unwrap();
        assert_eq!(sum(&shares), Cents(100));
        let by_id: Vec<(i64, i64)> = shares.iter().map(|s| (s.campaign_id, s.feed_revenue.0)).collect();
        assert_eq!(by_id, vec![(3, 33), (1, 34), (2, 33)]);
    }

    #[test]
    fn test_negative_drift_taken_from_largest_weight() {
        // 0.05 over clicks 1/1: 2.5 + 2.5 rounds to 3 + 3.
        let shares = allocate_revenue(Cents(5), &weights(&[(1, 1), (2, 1)])).unwrap();
        assert_eq!(shares[0].feed_revenue, Cents(2));
        assert_eq!(shares[1].feed_revenue, Cents(3));
    }

    #[test]
    fn test_negative_drift_never_goes_below_zero() {
        // 0.03 over six equal campaigns: every share rounds 0.5 up to 1.
        let w = weights(&[(1, 1), (2, 1), (3, 1), (4, 1), (5, 1), (6, 1)]);
        let shares = allocate_revenue(Cents(3), &w).unwrap();
        assert_eq!(sum(&shares), Cents(3));
        assert!(shares.iter().all(|s| s.feed_revenue.0 >= 0));
        let values: Vec<i64> = shares.iter().map(|s| s.feed_revenue.0).collect();
        assert_eq!(values, vec![0, 0, 0, 1, 1, 1]);
    }

    // 2. Edge cases ---------------------------------------------------------

    #[test]
    fn test_zero_revenue() {
        let shares = allocate_revenue(Cents::ZERO, &weights(&[(1, 5), (2, 5)])).unwrap();
        assert!(shares.iter().all(|s| s.feed_revenue == Cents::ZERO && s.pub_revenue == Cents::ZERO));
    }

    #[test]
    fn test_negative_revenue_is_an_error() {
        assert_eq!(
            allocate_revenue(Cents(-1), &weights(&[(1, 1)])),
            Err(GroupError::NegativeRevenue(Cents(-1)))
        );
    }

    #[test]
    fn test_single_campaign_gets_everything() {
        let shares = allocate_revenue(Cents(999_999), &weights(&[(4, 17)])).unwrap();
        assert_eq!(shares[0].feed_revenue, Cents(999_999));
    }

    // 3. Publisher cut ------------------------------------------------------

    #[test]
    fn test_publisher_share_rounds_half_up() {
        assert_eq!(publisher_share(Cents(100)), Cents(75));
        assert_eq!(publisher_share(Cents(2)), Cents(2)); // 1.5 -> 2
        assert_eq!(publisher_share(Cents(1)), Cents(1)); // 0.75 -> 1
        assert_eq!(publisher_share(Cents(0)), Cents(0));
    }

    #[test]
    fn test_reconciled_for_many_group_sizes() {
        for n in [1usize, 2, 3, 9, 250, 1000] {
            let pairs: Vec<(i64, u64)> = (0..n).map(|i| (i as i64, (i as u64 % 13) + 1)).collect();
            let w = weights(&pairs);
            for total in [0i64, 1, 3, 12545, 1_000_003] {
                let shares = allocate_revenue(Cents(total), &w).unwrap();
                assert_eq!(sum(&shares), Cents(total), "n={n} total={total}");
                assert!(shares.iter().all(|s| s.feed_revenue.0 >= 0 && s.pub_revenue.0 >= 0));
                assert!(shares
                    .iter()
                    .all(|s| s.pub_revenue == publisher_share(s.feed_revenue)));
            }
        }
    }
}
