use chrono::NaiveDate;
use feedshare_core::{CampaignId, Cents, FeedId, StatKey};
use thiserror::Error;

/// Why an input row was not admitted into a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("empty feed identifier")]
    EmptyFeedId,

    #[error("negative {field} ({value})")]
    NegativeValue { field: &'static str, value: String },

    #[error("feed revenue {0} is out of range")]
    RevenueOutOfRange(String),

    #[error("duplicate click key {0}")]
    DuplicateClickKey(StatKey),

    #[error("duplicate feed key {date}/{feed_id}")]
    DuplicateFeedKey { date: NaiveDate, feed_id: FeedId },
}

/// Failure while distributing a single (date, feed) group.
///
/// Any of these means the allocation code is wrong or the group's numbers
/// exceed what the engine can represent; the group is dropped as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("click total overflows 64 bits")]
    ClickOverflow,

    #[error("{metric} does not fit the allocation arithmetic")]
    ArithmeticOverflow { metric: &'static str },

    #[error("negative feed revenue {0}")]
    NegativeRevenue(Cents),

    #[error("{metric} allocations sum to {actual}, expected {expected}")]
    SumMismatch {
        metric: &'static str,
        expected: i128,
        actual: i128,
    },

    #[error("negative {metric} allocated to campaign {campaign_id}")]
    NegativeAllocation {
        metric: &'static str,
        campaign_id: CampaignId,
    },
}
