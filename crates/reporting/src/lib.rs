//! Downstream side of a distribution run: idempotent storage of distributed
//! rows and the publisher statistics view served from them.

pub mod pubstats;
pub mod store;

pub use pubstats::{
    FeedListing, FeedSummary, FeedSummaryQuery, PublisherStatRow, PublisherStatsQuery,
    PublisherStatsReport, PublisherStatsSummary,
};
pub use store::{StatsStore, UpsertOutcome};
