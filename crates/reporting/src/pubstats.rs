//! Publisher statistics: the per-traffic-source view of distributed rows.
//!
//! Only proportional rows with positive publisher revenue are served, newest
//! date first and campaigns ascending within a date. [`FeedSummaryQuery`]
//! lists the feeds a traffic source has rows for.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use feedshare_core::{
    CampaignId, DistributedStatRecord, DistributionError, DistributionResult, FeedId,
    TrafficSourceId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::StatsStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherStatsQuery {
    pub traffic_source_id: TrafficSourceId,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherStatRow {
    pub date: NaiveDate,
    pub campaign_id: CampaignId,
    pub campaign_name: String,
    pub total_searches: u64,
    pub monetized_searches: u64,
    pub paid_clicks: u64,
    /// Publisher revenue.
    pub revenue: Decimal,
    pub feed_id: FeedId,
}

impl From<&DistributedStatRecord> for PublisherStatRow {
    fn from(r: &DistributedStatRecord) -> Self {
        Self {
            date: r.date,
            campaign_id: r.campaign_id,
            campaign_name: r.campaign_name.clone(),
            total_searches: r.total_searches,
            monetized_searches: r.monetized_searches,
            paid_clicks: r.paid_clicks,
            revenue: r.pub_revenue,
            feed_id: r.feed_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherStatsSummary {
    pub total_revenue: Decimal,
    pub total_searches: u128,
    pub unique_campaigns: usize,
    pub unique_feeds: usize,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherStatsReport {
    pub traffic_source_id: TrafficSourceId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub rows: Vec<PublisherStatRow>,
    pub summary: PublisherStatsSummary,
}

impl PublisherStatsQuery {
    pub fn validate(&self, max_days: i64) -> DistributionResult<()> {
        if self.from > self.to {
            return Err(DistributionError::InvalidQuery(
                "start date must be before or equal to end date".to_string(),
            ));
        }
        let days = (self.to - self.from).num_days();
        if days > max_days {
            return Err(DistributionError::InvalidQuery(format!(
                "date range cannot exceed {max_days} days, got {days}"
            )));
        }
        Ok(())
    }

    fn matches(&self, r: &DistributedStatRecord) -> bool {
        r.traffic_source_id == self.traffic_source_id
            && r.date >= self.from
            && r.date <= self.to
            && r.is_feed_data
            && r.pub_revenue > Decimal::ZERO
    }

    /// Run the query against `store`.
    pub fn execute(&self, store: &StatsStore, max_days: i64) -> DistributionResult<PublisherStatsReport> {
        self.validate(max_days)?;

        let mut rows: Vec<PublisherStatRow> = store
            .select(|r| self.matches(r))
            .iter()
            .map(PublisherStatRow::from)
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.campaign_id.cmp(&b.campaign_id)));

        let summary = PublisherStatsSummary {
            total_revenue: rows.iter().map(|r| r.revenue).sum(),
            total_searches: rows.iter().map(|r| r.total_searches as u128).sum(),
            unique_campaigns: rows.iter().map(|r| r.campaign_id).collect::<BTreeSet<_>>().len(),
            unique_feeds: rows.iter().map(|r| &r.feed_id).collect::<BTreeSet<_>>().len(),
            record_count: rows.len(),
        };

        debug!(
            traffic_source_id = self.traffic_source_id,
            from = %self.from,
            to = %self.to,
            rows = rows.len(),
            "Publisher stats query executed"
        );

        Ok(PublisherStatsReport {
            traffic_source_id: self.traffic_source_id,
            from: self.from,
            to: self.to,
            rows,
            summary,
        })
    }
}

// ---------------------------------------------------------------------------
// Feed listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSummaryQuery {
    pub traffic_source_id: TrafficSourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSummary {
    pub feed_id: FeedId,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedListing {
    pub traffic_source_id: TrafficSourceId,
    /// Ordered by feed id.
    pub feeds: Vec<FeedSummary>,
}

impl FeedSummaryQuery {
    /// Every feed with stored rows for the traffic source, fallback rows
    /// included.
    pub fn execute(&self, store: &StatsStore) -> FeedListing {
        let mut by_feed: BTreeMap<FeedId, FeedSummary> = BTreeMap::new();
        for r in store.select(|r| r.traffic_source_id == self.traffic_source_id) {
            by_feed
                .entry(r.feed_id.clone())
                .and_modify(|s| {
                    s.first_date = s.first_date.min(r.date);
                    s.last_date = s.last_date.max(r.date);
                    s.record_count += 1;
                })
                .or_insert_with(|| FeedSummary {
                    feed_id: r.feed_id.clone(),
                    first_date: r.date,
                    last_date: r.date,
                    record_count: 1,
                });
        }

        debug!(
            traffic_source_id = self.traffic_source_id,
            feeds = by_feed.len(),
            "Feed listing built"
        );

        FeedListing {
            traffic_source_id: self.traffic_source_id,
            feeds: by_feed.into_values().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn record(day: u32, campaign_id: i64, feed: &str, ts: i64, pub_cents: i64) -> DistributedStatRecord {
        DistributedStatRecord {
            batch_id: Uuid::nil(),
            date: date(day),
            campaign_id,
            campaign_name: format!("c{campaign_id}"),
            feed_id: FeedId::normalize(feed),
            traffic_source_id: ts,
            total_searches: 100,
            monetized_searches: 40,
            paid_clicks: 4,
            feed_revenue: Decimal::new(pub_cents * 4 / 3, 2),
            pub_revenue: Decimal::new(pub_cents, 2),
            is_feed_data: true,
        }
    }

    fn query(from: u32, to: u32) -> PublisherStatsQuery {
        PublisherStatsQuery {
            traffic_source_id: 66,
            from: date(from),
            to: date(to),
        }
    }

    // 1. Validation ---------------------------------------------------------

    #[test]
    fn test_reversed_range_rejected() {
        assert!(matches!(
            query(20, 15).validate(365),
            Err(DistributionError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_range_limit() {
        let q = PublisherStatsQuery {
            traffic_source_id: 66,
            from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
        };
        assert!(q.validate(365).is_err());
        assert!(query(1, 31).validate(365).is_ok());
        assert!(query(15, 15).validate(0).is_ok());
    }

    // 2. Filtering and ordering ---------------------------------------------

    #[test]
    fn test_filters_and_sorts() {
        let store = StatsStore::new();
        let mut fallback = record(16, 9, "sb1", 66, 0);
        fallback.is_feed_data = false;
        store.upsert_batch(vec![
            record(15, 2, "sb1", 66, 300),
            record(15, 1, "sb2", 66, 100),
            record(17, 5, "sb1", 66, 50),
            record(16, 3, "sb1", 67, 999), // other traffic source
            record(16, 4, "sb1", 66, 0),   // no publisher revenue
            record(25, 1, "sb1", 66, 10),  // out of range
            fallback,
        ]);

        let report = query(15, 20).execute(&store, 365).unwrap();
        let order: Vec<(NaiveDate, i64)> = report.rows.iter().map(|r| (r.date, r.campaign_id)).collect();
        assert_eq!(order, vec![(date(17), 5), (date(15), 1), (date(15), 2)]);

        assert_eq!(report.summary.record_count, 3);
        assert_eq!(report.summary.total_revenue, Decimal::new(450, 2));
        assert_eq!(report.summary.total_searches, 300);
        assert_eq!(report.summary.unique_campaigns, 3);
        assert_eq!(report.summary.unique_feeds, 2);
    }

    #[test]
    fn test_empty_result() {
        let report = query(1, 2).execute(&StatsStore::new(), 365).unwrap();
        assert!(report.rows.is_empty());
        assert_eq!(report.summary, PublisherStatsSummary::default());
    }

    // 3. Feed listing -------------------------------------------------------

    #[test]
    fn test_feed_listing_per_traffic_source() {
        let store = StatsStore::new();
        let mut fallback = record(20, 4, "sb2", 66, 0);
        fallback.is_feed_data = false;
        store.upsert_batch(vec![
            record(16, 1, "sb2", 66, 10),
            record(15, 2, "sb2", 66, 10),
            fallback,
            record(18, 1, "sb1", 66, 10),
            record(17, 1, "sb9", 67, 10),
        ]);

        let listing = FeedSummaryQuery { traffic_source_id: 66 }.execute(&store);
        assert_eq!(listing.traffic_source_id, 66);
        assert_eq!(
            listing.feeds,
            vec![
                FeedSummary {
                    feed_id: FeedId::normalize("sb1"),
                    first_date: date(18),
                    last_date: date(18),
                    record_count: 1,
                },
                FeedSummary {
                    feed_id: FeedId::normalize("sb2"),
                    first_date: date(15),
                    last_date: date(20),
                    record_count: 3,
                },
            ]
        );
        assert!(FeedSummaryQuery { traffic_source_id: 1 }.execute(&store).feeds.is_empty());
    }

    #[test]
    fn test_summary_totals_do_not_overflow() {
        let store = StatsStore::new();
        let rows: Vec<DistributedStatRecord> = (1..=3)
            .map(|id| DistributedStatRecord {
                total_searches: i64::MAX as u64,
                ..record(15, id, "sb1", 66, 100)
            })
            .collect();
        store.upsert_batch(rows);
        let report = query(15, 15).execute(&store, 365).unwrap();
        assert_eq!(report.summary.total_searches, 3 * i64::MAX as u128);
    }
}
