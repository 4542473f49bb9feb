use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Cents;

pub type CampaignId = i64;
pub type TrafficSourceId = i64;

/// Canonical (trimmed, upper-cased) feed provider identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    /// Fold a raw feed identifier to its canonical form.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Raw input rows ─────────────────────────────────────────────────────────

/// Click row as handed over by the ingestion side, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawClickRow {
    pub date: Option<NaiveDate>,
    pub campaign_id: Option<CampaignId>,
    pub campaign_name: Option<String>,
    #[serde(alias = "fp_feed_id")]
    pub feed_id: Option<String>,
    pub traffic_source_id: Option<TrafficSourceId>,
    pub clicks: Option<i64>,
}

/// Feed provider totals row as handed over by the ingestion side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFeedRow {
    pub date: Option<NaiveDate>,
    #[serde(alias = "fp_feed_id")]
    pub feed_id: Option<String>,
    pub total_searches: Option<i64>,
    pub monetized_searches: Option<i64>,
    pub paid_clicks: Option<i64>,
    pub feed_revenue: Option<Decimal>,
}

// ─── Normalized records ─────────────────────────────────────────────────────

/// One campaign's clicks against one feed on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickRecord {
    pub date: NaiveDate,
    pub campaign_id: CampaignId,
    pub campaign_name: String,
    pub feed_id: FeedId,
    pub traffic_source_id: TrafficSourceId,
    pub clicks: u64,
}

/// One feed's reported totals on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedAggregateRecord {
    pub date: NaiveDate,
    pub feed_id: FeedId,
    pub total_searches: u64,
    pub monetized_searches: u64,
    pub paid_clicks: u64,
    pub feed_revenue: Cents,
}

impl FeedAggregateRecord {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            date: self.date,
            feed_id: self.feed_id.clone(),
        }
    }

    /// True when the feed reports nothing at all to distribute.
    pub fn is_empty(&self) -> bool {
        self.total_searches == 0
            && self.monetized_searches == 0
            && self.paid_clicks == 0
            && self.feed_revenue == Cents::ZERO
    }
}

// ─── Output ─────────────────────────────────────────────────────────────────

/// One feed's totals on one date are distributed as a unit; this names that unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub date: NaiveDate,
    pub feed_id: FeedId,
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.date, self.feed_id)
    }
}

/// Natural key of a distributed row; the persistence side upserts on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatKey {
    pub date: NaiveDate,
    pub campaign_id: CampaignId,
    pub feed_id: FeedId,
}

impl StatKey {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            date: self.date,
            feed_id: self.feed_id.clone(),
        }
    }
}

impl std::fmt::Display for StatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.date, self.campaign_id, self.feed_id)
    }
}

/// Feed totals apportioned to a single campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedStatRecord {
    pub batch_id: Uuid,
    pub date: NaiveDate,
    pub campaign_id: CampaignId,
    pub campaign_name: String,
    pub feed_id: FeedId,
    pub traffic_source_id: TrafficSourceId,
    pub total_searches: u64,
    pub monetized_searches: u64,
    pub paid_clicks: u64,
    pub feed_revenue: Decimal,
    pub pub_revenue: Decimal,
    /// `true` for proportional allocations, `false` for zero-valued fallback rows.
    pub is_feed_data: bool,
}

impl DistributedStatRecord {
    pub fn key(&self) -> StatKey {
        StatKey {
            date: self.date,
            campaign_id: self.campaign_id,
            feed_id: self.feed_id.clone(),
        }
    }
}
