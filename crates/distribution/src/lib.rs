//! Distribution engine — apportions a feed provider's daily totals to the
//! campaigns that drove clicks against it, preserving every total exactly.
//!
//! Run counters are emitted through the `metrics` facade and go nowhere until
//! the host installs a recorder; the `feedshare` binary installs a Prometheus
//! one.

pub mod error;
pub mod grouper;
pub mod issues;
pub mod largest_remainder;
pub mod normalizer;
pub mod orchestrator;
pub mod revenue;
pub mod summary;
pub mod weights;

pub use error::{GroupError, RejectReason};
pub use grouper::{CampaignGroup, Grouping};
pub use issues::{IssueKind, RunIssue, Severity};
pub use normalizer::{NormalizedBatch, Normalizer, Rejection, RowSource};
pub use orchestrator::{DistributionOrchestrator, DistributionRun};
pub use revenue::{RevenueShare, PUBLISHER_SHARE_PERCENT};
pub use summary::{MetricTotals, RunStatus, RunSummary, VerificationTotals};
pub use weights::{Weight, WeightCalculator};
