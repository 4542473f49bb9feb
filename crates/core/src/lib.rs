//! Shared record types, money handling, configuration and errors for the
//! feed revenue distribution engine.

pub mod config;
pub mod error;
pub mod money;
pub mod types;

pub use config::{AppConfig, DistributionConfig, DuplicatePolicy, ReportingConfig};
pub use error::{DistributionError, DistributionResult};
pub use money::Cents;
pub use types::{
    CampaignId, ClickRecord, DistributedStatRecord, FeedAggregateRecord, FeedId, GroupKey,
    RawClickRow, RawFeedRow, StatKey, TrafficSourceId,
};
