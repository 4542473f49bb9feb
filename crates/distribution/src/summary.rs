//! Run summary and verification totals.

use chrono::{DateTime, Utc};
use feedshare_core::{DistributedStatRecord, FeedAggregateRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::issues::{RunIssue, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every group distributed or skipped with a warning; no errors.
    Completed,
    /// Finished, but some groups failed or some keys were duplicated.
    Degraded,
    /// Stopped by a threshold or the duplicate policy.
    Aborted,
    /// Stopped by the run deadline.
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub status: RunStatus,
    /// Raw click rows plus raw feed rows examined.
    pub records_processed: usize,
    pub records_rejected: usize,
    pub records_out: usize,
    pub warnings: usize,
    pub errors: usize,
    pub groups_total: usize,
    pub groups_distributed: usize,
    pub groups_fallback: usize,
    pub groups_skipped: usize,
    pub groups_failed: usize,
    /// Groups never attempted because the run stopped early.
    pub groups_abandoned: usize,
    pub issues: Vec<RunIssue>,
}

impl RunSummary {
    pub(crate) fn count(issues: &[RunIssue], severity: Severity) -> usize {
        issues.iter().filter(|i| i.severity == severity).count()
    }
}

/// Run-level sums. Each feed total fits in 63 bits, so the counts are
/// widened to 128 bits to add up any number of feeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTotals {
    pub total_searches: u128,
    pub monetized_searches: u128,
    pub paid_clicks: u128,
    pub feed_revenue: Decimal,
}

impl MetricTotals {
    pub fn from_feeds<'a>(feeds: impl IntoIterator<Item = &'a FeedAggregateRecord>) -> Self {
        feeds.into_iter().fold(Self::default(), |mut acc, f| {
            acc.total_searches += f.total_searches as u128;
            acc.monetized_searches += f.monetized_searches as u128;
            acc.paid_clicks += f.paid_clicks as u128;
            acc.feed_revenue += f.feed_revenue.to_decimal();
            acc
        })
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DistributedStatRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut acc, r| {
            acc.total_searches += r.total_searches as u128;
            acc.monetized_searches += r.monetized_searches as u128;
            acc.paid_clicks += r.paid_clicks as u128;
            acc.feed_revenue += r.feed_revenue;
            acc
        })
    }
}

/// Before/after totals for a run. `original` always equals `distributed` plus
/// `undistributed`; anything else means totals were lost or invented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTotals {
    pub original: MetricTotals,
    pub distributed: MetricTotals,
    pub undistributed: MetricTotals,
    /// Feeds whose totals reached no campaign.
    pub undistributed_feeds: usize,
}

impl VerificationTotals {
    pub fn is_balanced(&self) -> bool {
        self.original.total_searches == self.distributed.total_searches + self.undistributed.total_searches
            && self.original.monetized_searches
                == self.distributed.monetized_searches + self.undistributed.monetized_searches
            && self.original.paid_clicks == self.distributed.paid_clicks + self.undistributed.paid_clicks
            && self.original.feed_revenue == self.distributed.feed_revenue + self.undistributed.feed_revenue
    }
}
