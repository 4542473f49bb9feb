//! Groups normalized clicks by (date, feed) and pairs them with feed totals.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use feedshare_core::{ClickRecord, FeedAggregateRecord, FeedId};

use crate::error::GroupError;

/// A feed's totals for one day plus the campaigns that clicked through it,
/// ordered by campaign id.
#[derive(Debug, Clone)]
pub struct CampaignGroup<'a> {
    pub feed: &'a FeedAggregateRecord,
    pub clicks: Vec<&'a ClickRecord>,
}

impl CampaignGroup<'_> {
    pub fn is_empty(&self) -> bool {
        self.clicks.is_empty()
    }

    pub fn total_clicks(&self) -> Result<u64, GroupError> {
        self.clicks
            .iter()
            .try_fold(0u64, |acc, c| acc.checked_add(c.clicks))
            .ok_or(GroupError::ClickOverflow)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Grouping<'a> {
    /// One group per feed record, in (date, feed id) order.
    pub groups: Vec<CampaignGroup<'a>>,
    /// Clicks with no feed totals for their (date, feed).
    pub orphan_clicks: Vec<&'a ClickRecord>,
}

pub fn group_records<'a>(
    clicks: &'a [ClickRecord],
    feeds: &'a [FeedAggregateRecord],
) -> Grouping<'a> {
    let mut by_key: BTreeMap<(NaiveDate, &FeedId), Vec<&ClickRecord>> = BTreeMap::new();
    for click in clicks {
        by_key
            .entry((click.date, &click.feed_id))
            .or_default()
            .push(click);
    }

    let mut ordered_feeds: Vec<&FeedAggregateRecord> = feeds.iter().collect();
    ordered_feeds.sort_by(|a, b| (a.date, &a.feed_id).cmp(&(b.date, &b.feed_id)));

    let groups = ordered_feeds
        .into_iter()
        .map(|feed| {
            let mut clicks = by_key.remove(&(feed.date, &feed.feed_id)).unwrap_or_default();
            clicks.sort_by_key(|c| c.campaign_id);
            CampaignGroup { feed, clicks }
        })
        .collect();

    let orphan_clicks = by_key.into_values().flatten().collect();

    Grouping {
        groups,
        orphan_clicks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedshare_core::Cents;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn click(day: u32, campaign_id: i64, feed: &str, clicks: u64) -> ClickRecord {
        ClickRecord {
            date: date(day),
            campaign_id,
            campaign_name: format!("c{campaign_id}"),
            feed_id: FeedId::normalize(feed),
            traffic_source_id: 66,
            clicks,
        }
    }

    fn feed(day: u32, feed: &str) -> FeedAggregateRecord {
        FeedAggregateRecord {
            date: date(day),
            feed_id: FeedId::normalize(feed),
            total_searches: 10,
            monetized_searches: 5,
            paid_clicks: 1,
            feed_revenue: Cents(100),
        }
    }

    #[test]
    fn test_clicks_paired_with_matching_feed() {
        let clicks = vec![
            click(15, 3, "sb100", 1),
            click(15, 1, "SB100", 2),
            click(16, 1, "sb100", 4),
        ];
        let feeds = vec![feed(16, "sb100"), feed(15, "sb100")];
        let grouping = group_records(&clicks, &feeds);

        assert_eq!(grouping.groups.len(), 2);
        assert_eq!(grouping.groups[0].feed.date, date(15));
        let ids: Vec<i64> = grouping.groups[0].clicks.iter().map(|c| c.campaign_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(grouping.groups[1].clicks.len(), 1);
        assert!(grouping.orphan_clicks.is_empty());
    }

    #[test]
    fn test_feed_without_clicks_yields_empty_group() {
        let feeds = vec![feed(15, "sb200")];
        let grouping = group_records(&[], &feeds);
        assert_eq!(grouping.groups.len(), 1);
        assert!(grouping.groups[0].is_empty());
    }

    #[test]
    fn test_orphan_clicks_reported() {
        let clicks = vec![click(15, 1, "sb100", 2), click(15, 2, "sb999", 3)];
        let feeds = vec![feed(15, "sb100")];
        let grouping = group_records(&clicks, &feeds);
        assert_eq!(grouping.orphan_clicks.len(), 1);
        assert_eq!(grouping.orphan_clicks[0].feed_id.as_str(), "SB999");
    }

    #[test]
    fn test_total_clicks_overflow_detected() {
        let clicks = vec![click(15, 1, "sb100", u64::MAX), click(15, 2, "sb100", 1)];
        let feeds = vec![feed(15, "sb100")];
        let grouping = group_records(&clicks, &feeds);
        assert_eq!(grouping.groups[0].total_clicks(), Err(GroupError::ClickOverflow));
    }
}
