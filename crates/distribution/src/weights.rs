//! Click-share weights within a (date, feed) group.
//!
//! A weight is kept as the exact rational `clicks / group_clicks`. Every
//! comparison downstream (floors, remainders, rounding, ranking) works on
//! those integers; [`Weight::share`] is only an estimate for display.

use std::cmp::Ordering;

use feedshare_core::CampaignId;
use serde::{Deserialize, Serialize};

use crate::error::GroupError;
use crate::grouper::CampaignGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weight {
    pub campaign_id: CampaignId,
    pub clicks: u64,
    pub group_clicks: u64,
}

impl Weight {
    pub fn share(&self) -> f64 {
        if self.group_clicks == 0 {
            return 0.0;
        }
        self.clicks as f64 / self.group_clicks as f64
    }

    /// Larger weight first, then lower campaign id.
    pub(crate) fn rank(a: &Weight, b: &Weight) -> Ordering {
        b.clicks
            .cmp(&a.clicks)
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
    }
}

pub struct WeightCalculator;

impl WeightCalculator {
    /// Weights for every campaign in the group, or `None` when the group has
    /// no clicks to share by.
    pub fn calculate(group: &CampaignGroup<'_>) -> Result<Option<Vec<Weight>>, GroupError> {
        let pairs: Vec<(CampaignId, u64)> = group
            .clicks
            .iter()
            .map(|c| (c.campaign_id, c.clicks))
            .collect();
        Self::from_clicks(&pairs)
    }

    pub fn from_clicks(pairs: &[(CampaignId, u64)]) -> Result<Option<Vec<Weight>>, GroupError> {
        let group_clicks = pairs
            .iter()
            .try_fold(0u64, |acc, (_, clicks)| acc.checked_add(*clicks))
            .ok_or(GroupError::ClickOverflow)?;

        if group_clicks == 0 {
            return Ok(None);
        }

        Ok(Some(
            pairs
                .iter()
                .map(|&(campaign_id, clicks)| Weight {
                    campaign_id,
                    clicks,
                    group_clicks,
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shares_sum_to_one() {
        let weights = WeightCalculator::from_clicks(&[(1, 626), (2, 374)])
            .unwrap()
            .unwrap();
        assert!((weights[0].share() - 0.626).abs() < 1e-12);
        assert!((weights[1].share() - 0.374).abs() < 1e-12);
        let total: u64 = weights.iter().map(|w| w.clicks).sum();
        assert_eq!(total, weights[0].group_clicks);
    }

    #[test]
    fn test_equal_clicks_equal_weight() {
        let weights = WeightCalculator::from_clicks(&[(5, 3), (9, 3), (2, 3)])
            .unwrap()
            .unwrap();
        assert!(weights.windows(2).all(|w| w[0].share() == w[1].share()));
    }

    #[test]
    fn test_zero_total_yields_no_weights() {
        assert_eq!(WeightCalculator::from_clicks(&[(1, 0), (2, 0)]).unwrap(), None);
        assert_eq!(WeightCalculator::from_clicks(&[]).unwrap(), None);
    }

    #[test]
    fn test_zero_click_campaign_gets_zero_weight() {
        let weights = WeightCalculator::from_clicks(&[(1, 0), (2, 4)]).unwrap().unwrap();
        assert_eq!(weights[0].share(), 0.0);
        assert_eq!(weights[1].share(), 1.0);
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert_eq!(
            WeightCalculator::from_clicks(&[(1, u64::MAX), (2, 1)]),
            Err(GroupError::ClickOverflow)
        );
    }

    #[test]
    fn test_rank_prefers_more_clicks_then_lower_id() {
        let mut weights = WeightCalculator::from_clicks(&[(7, 2), (3, 5), (4, 5)])
            .unwrap()
            .unwrap();
        weights.sort_by(Weight::rank);
        let ids: Vec<i64> = weights.iter().map(|w| w.campaign_id).collect();
        assert_eq!(ids, vec![3, 4, 7]);
    }
}
