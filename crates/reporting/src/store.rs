//! In-memory store of distributed rows keyed by (date, campaign, feed).
//! Re-running a batch overwrites the previous values for the same keys;
//! [`StatsStore::replace_groups`] also drops rows a re-run no longer produces.

use std::collections::HashSet;

use dashmap::DashMap;
use feedshare_core::{DistributedStatRecord, GroupKey, StatKey};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Stale rows dropped by [`StatsStore::replace_groups`].
    pub removed: usize,
}

/// Concurrent stats store backed by `DashMap`.
pub struct StatsStore {
    rows: DashMap<StatKey, DistributedStatRecord>,
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    pub fn upsert(&self, record: DistributedStatRecord) -> bool {
        self.rows.insert(record.key(), record).is_some()
    }

    pub fn upsert_batch<I>(&self, records: I) -> UpsertOutcome
    where
        I: IntoIterator<Item = DistributedStatRecord>,
    {
        let outcome = self.apply(records);
        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            total = self.rows.len(),
            "Distributed stats upserted"
        );
        outcome
    }

    /// Make `records` the complete content of every group in `groups`.
    ///
    /// Stored rows of those groups whose key is not in `records` are removed
    /// before the upsert. Rows of other groups are left alone.
    pub fn replace_groups<I>(&self, groups: &[GroupKey], records: I) -> UpsertOutcome
    where
        I: IntoIterator<Item = DistributedStatRecord>,
    {
        let records: Vec<DistributedStatRecord> = records.into_iter().collect();
        let groups: HashSet<&GroupKey> = groups.iter().collect();
        let incoming: HashSet<StatKey> = records.iter().map(|r| r.key()).collect();

        let mut removed = 0;
        self.rows.retain(|key, _| {
            let stale = !incoming.contains(key) && groups.contains(&key.group_key());
            if stale {
                removed += 1;
            }
            !stale
        });

        let mut outcome = self.apply(records);
        outcome.removed = removed;
        info!(
            groups = groups.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            removed = outcome.removed,
            total = self.rows.len(),
            "Distributed stat groups replaced"
        );
        outcome
    }

    fn apply<I>(&self, records: I) -> UpsertOutcome
    where
        I: IntoIterator<Item = DistributedStatRecord>,
    {
        let mut outcome = UpsertOutcome::default();
        for record in records {
            if self.upsert(record) {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        outcome
    }

    pub fn get(&self, key: &StatKey) -> Option<DistributedStatRecord> {
        self.rows.get(key).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Snapshot of rows matching `predicate`, in key order.
    pub fn select<F>(&self, predicate: F) -> Vec<DistributedStatRecord>
    where
        F: Fn(&DistributedStatRecord) -> bool,
    {
        let mut rows: Vec<DistributedStatRecord> = self
            .rows
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|r| r.key());
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use feedshare_core::FeedId;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn record(campaign_id: i64, feed: &str, revenue: i64) -> DistributedStatRecord {
        DistributedStatRecord {
            batch_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            campaign_id,
            campaign_name: format!("c{campaign_id}"),
            feed_id: FeedId::normalize(feed),
            traffic_source_id: 66,
            total_searches: 10,
            monetized_searches: 5,
            paid_clicks: 1,
            feed_revenue: Decimal::new(revenue, 2),
            pub_revenue: Decimal::new(revenue * 3 / 4, 2),
            is_feed_data: true,
        }
    }

    #[test]
    fn test_upsert_overwrites_same_key() {
        let store = StatsStore::new();
        let first = store.upsert_batch(vec![record(1, "sb1", 100), record(2, "sb1", 200)]);
        assert_eq!(first, UpsertOutcome { inserted: 2, updated: 0, removed: 0 });

        let second = store.upsert_batch(vec![record(1, "SB1", 400)]);
        assert_eq!(second, UpsertOutcome { inserted: 0, updated: 1, removed: 0 });
        assert_eq!(store.len(), 2);

        let key = record(1, "sb1", 0).key();
        assert_eq!(store.get(&key).unwrap().feed_revenue, Decimal::new(400, 2));
    }

    #[test]
    fn test_select_returns_key_order() {
        let store = StatsStore::new();
        store.upsert_batch(vec![record(3, "sb1", 1), record(1, "sb2", 1), record(1, "sb1", 1)]);
        let rows = store.select(|_| true);
        let keys: Vec<(i64, &str)> = rows.iter().map(|r| (r.campaign_id, r.feed_id.as_str())).collect();
        assert_eq!(keys, vec![(1, "SB1"), (1, "SB2"), (3, "SB1")]);
    }

    fn group(feed: &str) -> GroupKey {
        GroupKey {
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            feed_id: FeedId::normalize(feed),
        }
    }

    #[test]
    fn test_replace_groups_drops_rows_no_longer_produced() {
        let store = StatsStore::new();
        store.upsert_batch(vec![record(1, "sb1", 6000), record(2, "sb1", 4000), record(1, "sb2", 500)]);

        // Campaign 1 lost its clicks on sb1; campaign 2 now takes the whole feed.
        let outcome = store.replace_groups(&[group("sb1")], vec![record(2, "sb1", 10000)]);
        assert_eq!(outcome, UpsertOutcome { inserted: 0, updated: 1, removed: 1 });

        let sb1 = store.select(|r| r.feed_id.as_str() == "SB1");
        assert_eq!(sb1.len(), 1);
        let total: Decimal = sb1.iter().map(|r| r.feed_revenue).sum();
        assert_eq!(total, Decimal::new(10000, 2));

        // Untouched group keeps its row.
        assert_eq!(store.len(), 2);
        assert!(store.get(&record(1, "sb2", 0).key()).is_some());
    }

    #[test]
    fn test_replace_groups_with_no_records_clears_group() {
        let store = StatsStore::new();
        store.upsert_batch(vec![record(1, "sb1", 100), record(2, "sb1", 100)]);
        let outcome = store.replace_groups(&[group("SB1")], Vec::new());
        assert_eq!(outcome.removed, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_store() {
        let store = StatsStore::default();
        assert!(store.is_empty());
        assert!(store.select(|_| true).is_empty());
    }
}
