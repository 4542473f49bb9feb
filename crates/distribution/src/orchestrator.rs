//! Distribution orchestrator — drives normalization, grouping and the
//! per-group allocators for one batch, and assembles the run summary.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use feedshare_core::{
    ClickRecord, DistributedStatRecord, DistributionConfig, DuplicatePolicy, FeedAggregateRecord,
    FeedId, GroupKey, RawClickRow, RawFeedRow,
};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::GroupError;
use crate::grouper::{group_records, CampaignGroup};
use crate::issues::{IssueKind, RunIssue, Severity};
use crate::largest_remainder::allocate;
use crate::normalizer::Normalizer;
use crate::revenue::{allocate_revenue, RevenueShare};
use crate::summary::{MetricTotals, RunStatus, RunSummary, VerificationTotals};
use crate::weights::{Weight, WeightCalculator};

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct DistributionRun {
    /// Sorted by (date, feed id, campaign id).
    pub records: Vec<DistributedStatRecord>,
    pub summary: RunSummary,
    pub verification: VerificationTotals,
    /// Groups this run reached a final outcome for (distributed, fallback or
    /// skipped), in (date, feed id) order. Stored rows of these groups that
    /// are not in `records` are stale. Failed and abandoned groups are not
    /// listed.
    pub settled_groups: Vec<GroupKey>,
}

pub struct DistributionOrchestrator {
    config: DistributionConfig,
}

// ---------------------------------------------------------------------------
// Per-group outcome and per-worker accumulation
// ---------------------------------------------------------------------------

enum GroupOutcome {
    Distributed(Vec<DistributedStatRecord>),
    Fallback(Vec<DistributedStatRecord>),
    Skipped(RunIssue),
    Failed(GroupError),
}

#[derive(Default)]
struct WorkerAccumulator<'a> {
    records: Vec<DistributedStatRecord>,
    issues: Vec<RunIssue>,
    distributed: usize,
    fallback: usize,
    skipped: usize,
    failed: usize,
    abandoned: usize,
    undistributed: Vec<&'a FeedAggregateRecord>,
    settled: Vec<GroupKey>,
}

impl<'a> WorkerAccumulator<'a> {
    fn merge(&mut self, other: WorkerAccumulator<'a>) {
        self.records.extend(other.records);
        self.issues.extend(other.issues);
        self.distributed += other.distributed;
        self.fallback += other.fallback;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.undistributed.extend(other.undistributed);
        self.settled.extend(other.settled);
    }

    /// Fold in a joined worker. A worker that panicked loses its whole
    /// chunk, and every group in it counts as failed.
    fn absorb(
        &mut self,
        batch_id: Uuid,
        chunk: &[CampaignGroup<'a>],
        joined: std::thread::Result<WorkerAccumulator<'a>>,
    ) {
        match joined {
            Ok(acc) => self.merge(acc),
            Err(_) => {
                error!(batch_id = %batch_id, groups = chunk.len(), "Distribution worker panicked");
                self.failed += chunk.len();
                self.undistributed.extend(chunk.iter().map(|g| g.feed));
                self.issues.push(RunIssue::error(
                    IssueKind::GroupFailed,
                    format!("worker panicked, {} group(s) lost", chunk.len()),
                ));
            }
        }
    }
}

const RUNNING: u8 = 0;
const ABORTED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Stop conditions shared by all workers of a run.
struct RunControl {
    deadline: Option<Instant>,
    failure_budget: usize,
    failures: AtomicUsize,
    state: AtomicU8,
}

impl RunControl {
    fn stopped(&self) -> bool {
        if self.state.load(Ordering::Acquire) != RUNNING {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            let _ = self
                .state
                .compare_exchange(RUNNING, TIMED_OUT, Ordering::AcqRel, Ordering::Acquire);
            return true;
        }
        false
    }

    fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures > self.failure_budget {
            let _ = self
                .state
                .compare_exchange(RUNNING, ABORTED, Ordering::AcqRel, Ordering::Acquire);
        }
    }

    fn status(&self) -> Option<RunStatus> {
        match self.state.load(Ordering::Acquire) {
            ABORTED => Some(RunStatus::Aborted),
            TIMED_OUT => Some(RunStatus::TimedOut),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

impl DistributionOrchestrator {
    pub fn new(config: DistributionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Run a batch under a fresh batch id.
    pub fn run(&self, clicks: &[RawClickRow], feeds: &[RawFeedRow]) -> DistributionRun {
        self.run_batch(Uuid::new_v4(), clicks, feeds)
    }

    /// Run a batch under a caller-supplied batch id. Identical input and
    /// batch id always produce identical records.
    pub fn run_batch(
        &self,
        batch_id: Uuid,
        clicks: &[RawClickRow],
        feeds: &[RawFeedRow],
    ) -> DistributionRun {
        let started_at = Utc::now();
        let timer = Instant::now();

        info!(
            batch_id = %batch_id,
            click_rows = clicks.len(),
            feed_rows = feeds.len(),
            workers = self.config.workers,
            duplicate_policy = %self.config.duplicate_policy,
            "Distribution run started"
        );

        let batch = Normalizer::normalize_batch(clicks, feeds);
        let records_processed = clicks.len() + feeds.len();
        let records_rejected = batch.rows_rejected();

        let mut issues: Vec<RunIssue> = batch.rejections.iter().map(|r| r.to_issue()).collect();
        issues.extend(batch.duplicates.iter().map(|reason| {
            RunIssue::error(
                IssueKind::DuplicateKey,
                format!("{reason} (policy {})", self.config.duplicate_policy),
            )
        }));
        issues.extend(batch.warnings.iter().cloned());

        let mut abort_reason = None;
        if self.config.duplicate_policy == DuplicatePolicy::FailRun && !batch.duplicates.is_empty() {
            abort_reason = Some(format!(
                "{} duplicate key(s) under fail_run policy",
                batch.duplicates.len()
            ));
        } else if records_processed > 0 {
            let ratio = records_rejected as f64 / records_processed as f64;
            if ratio > self.config.max_rejection_ratio {
                abort_reason = Some(format!(
                    "rejection ratio {ratio:.3} exceeds {}",
                    self.config.max_rejection_ratio
                ));
            }
        }

        let grouping = group_records(&batch.clicks, &batch.feeds);
        issues.extend(orphan_click_warnings(&grouping.orphan_clicks));

        let groups_total = grouping.groups.len();
        let control = RunControl {
            deadline: self
                .config
                .max_run_duration_ms
                .map(|ms| timer + Duration::from_millis(ms)),
            failure_budget: (self.config.max_group_failure_ratio * groups_total as f64).floor()
                as usize,
            failures: AtomicUsize::new(0),
            state: AtomicU8::new(RUNNING),
        };

        let acc = match &abort_reason {
            Some(reason) => {
                error!(batch_id = %batch_id, reason = %reason, "Run aborted before distribution");
                issues.push(RunIssue::error(IssueKind::RunAborted, reason.clone()));
                control.state.store(ABORTED, Ordering::Release);
                WorkerAccumulator {
                    abandoned: groups_total,
                    undistributed: grouping.groups.iter().map(|g| g.feed).collect(),
                    ..Default::default()
                }
            }
            None => self.process_groups(batch_id, &grouping.groups, &control),
        };

        let WorkerAccumulator {
            mut records,
            issues: group_issues,
            distributed,
            fallback,
            skipped,
            failed,
            abandoned,
            undistributed,
            mut settled,
        } = acc;
        issues.extend(group_issues);

        let status = match (abort_reason.is_some(), control.status()) {
            (true, _) => RunStatus::Aborted,
            (false, Some(RunStatus::TimedOut)) => {
                warn!(batch_id = %batch_id, abandoned, "Run deadline reached");
                issues.push(RunIssue::error(
                    IssueKind::RunTimedOut,
                    format!("run deadline reached, {abandoned} group(s) not attempted"),
                ));
                RunStatus::TimedOut
            }
            (false, Some(status)) => {
                error!(batch_id = %batch_id, failed, abandoned, "Group failure threshold exceeded");
                issues.push(RunIssue::error(
                    IssueKind::RunAborted,
                    format!(
                        "{failed} failed group(s) exceed the failure budget of {}, {abandoned} group(s) not attempted",
                        control.failure_budget
                    ),
                ));
                status
            }
            (false, None) if RunSummary::count(&issues, Severity::Error) > 0 => RunStatus::Degraded,
            (false, None) => RunStatus::Completed,
        };

        records.sort_by(|a, b| {
            (a.date, &a.feed_id, a.campaign_id).cmp(&(b.date, &b.feed_id, b.campaign_id))
        });
        settled.sort();

        let verification = VerificationTotals {
            original: MetricTotals::from_feeds(&batch.feeds),
            distributed: MetricTotals::from_records(&records),
            undistributed: MetricTotals::from_feeds(undistributed.iter().copied()),
            undistributed_feeds: undistributed.len(),
        };

        let warnings = RunSummary::count(&issues, Severity::Warning);
        let errors = RunSummary::count(&issues, Severity::Error);
        let elapsed_ms = timer.elapsed().as_millis() as u64;

        metrics::counter!("distribution.rows_processed").increment(records_processed as u64);
        metrics::counter!("distribution.rows_rejected").increment(records_rejected as u64);
        metrics::counter!("distribution.groups_distributed").increment(distributed as u64);
        metrics::counter!("distribution.groups_failed").increment(failed as u64);
        metrics::counter!("distribution.records_out").increment(records.len() as u64);
        metrics::histogram!("distribution.run_ms").record(elapsed_ms as f64);

        info!(
            batch_id = %batch_id,
            status = ?status,
            records_out = records.len(),
            rejected = records_rejected,
            warnings,
            errors,
            groups_distributed = distributed,
            groups_failed = failed,
            elapsed_ms,
            "Distribution run finished"
        );

        let summary = RunSummary {
            batch_id,
            started_at,
            completed_at: Utc::now(),
            elapsed_ms,
            status,
            records_processed,
            records_rejected,
            records_out: records.len(),
            warnings,
            errors,
            groups_total,
            groups_distributed: distributed,
            groups_fallback: fallback,
            groups_skipped: skipped,
            groups_failed: failed,
            groups_abandoned: abandoned,
            issues,
        };

        DistributionRun {
            records,
            summary,
            verification,
            settled_groups: settled,
        }
    }

    /// Spread groups over the configured workers. Each worker accumulates
    /// privately; results are merged in group order once all have finished.
    fn process_groups<'a>(
        &self,
        batch_id: Uuid,
        groups: &[CampaignGroup<'a>],
        control: &RunControl,
    ) -> WorkerAccumulator<'a> {
        let workers = self.config.workers.max(1);
        if workers == 1 || groups.len() <= 1 {
            return self.process_chunk(batch_id, groups, control);
        }

        let chunk_size = groups.len().div_ceil(workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = groups
                .chunks(chunk_size)
                .map(|chunk| (chunk, s.spawn(move || self.process_chunk(batch_id, chunk, control))))
                .collect();

            let mut merged = WorkerAccumulator::default();
            for (chunk, handle) in handles {
                merged.absorb(batch_id, chunk, handle.join());
            }
            merged
        })
    }

    fn process_chunk<'a>(
        &self,
        batch_id: Uuid,
        groups: &[CampaignGroup<'a>],
        control: &RunControl,
    ) -> WorkerAccumulator<'a> {
        let mut acc = WorkerAccumulator::default();
        for group in groups {
            if control.stopped() {
                acc.abandoned += 1;
                acc.undistributed.push(group.feed);
                continue;
            }

            match distribute_group(batch_id, group, self.config.emit_fallback_records) {
                GroupOutcome::Distributed(records) => {
                    debug!(
                        date = %group.feed.date,
                        feed_id = %group.feed.feed_id,
                        campaigns = records.len(),
                        "Group distributed"
                    );
                    acc.distributed += 1;
                    acc.records.extend(records);
                    acc.settled.push(group.feed.group_key());
                }
                GroupOutcome::Fallback(records) => {
                    acc.fallback += 1;
                    acc.records.extend(records);
                    acc.undistributed.push(group.feed);
                    acc.settled.push(group.feed.group_key());
                }
                GroupOutcome::Skipped(issue) => {
                    warn!(issue = %issue.message, "Group skipped");
                    acc.skipped += 1;
                    acc.issues.push(issue);
                    acc.undistributed.push(group.feed);
                    acc.settled.push(group.feed.group_key());
                }
                GroupOutcome::Failed(err) => {
                    error!(
                        date = %group.feed.date,
                        feed_id = %group.feed.feed_id,
                        error = %err,
                        "Group distribution failed"
                    );
                    acc.failed += 1;
                    acc.issues.push(RunIssue::error(
                        IssueKind::GroupFailed,
                        format!("{}/{}: {err}", group.feed.date, group.feed.feed_id),
                    ));
                    acc.undistributed.push(group.feed);
                    control.record_failure();
                }
            }
        }
        acc
    }
}

// ---------------------------------------------------------------------------
// Group distribution
// ---------------------------------------------------------------------------

fn distribute_group(batch_id: Uuid, group: &CampaignGroup<'_>, emit_fallback: bool) -> GroupOutcome {
    let feed = group.feed;

    if group.is_empty() {
        return GroupOutcome::Skipped(RunIssue::warning(
            IssueKind::OrphanFeed,
            format!(
                "feed {}/{} has no click records, {} revenue not distributed",
                feed.date, feed.feed_id, feed.feed_revenue
            ),
        ));
    }

    let weights = match WeightCalculator::calculate(group) {
        Ok(Some(weights)) => weights,
        Ok(None) => {
            return GroupOutcome::Skipped(RunIssue::warning(
                IssueKind::ZeroClicks,
                format!(
                    "feed {}/{} has zero total clicks across {} campaign(s), {} revenue not distributed",
                    feed.date,
                    feed.feed_id,
                    group.clicks.len(),
                    feed.feed_revenue
                ),
            ))
        }
        Err(err) => return GroupOutcome::Failed(err),
    };

    if feed.is_empty() {
        if !emit_fallback {
            return GroupOutcome::Skipped(RunIssue::warning(
                IssueKind::FallbackSkipped,
                format!("feed {}/{} reports no totals, campaigns not recorded", feed.date, feed.feed_id),
            ));
        }
        let records = group
            .clicks
            .iter()
            .map(|click| DistributedStatRecord {
                batch_id,
                date: click.date,
                campaign_id: click.campaign_id,
                campaign_name: click.campaign_name.clone(),
                feed_id: click.feed_id.clone(),
                traffic_source_id: click.traffic_source_id,
                total_searches: 0,
                monetized_searches: 0,
                paid_clicks: 0,
                feed_revenue: Decimal::ZERO,
                pub_revenue: Decimal::ZERO,
                is_feed_data: false,
            })
            .collect();
        return GroupOutcome::Fallback(records);
    }

    match distribute_proportionally(batch_id, group, &weights) {
        Ok(records) => GroupOutcome::Distributed(records),
        Err(err) => GroupOutcome::Failed(err),
    }
}

fn distribute_proportionally(
    batch_id: Uuid,
    group: &CampaignGroup<'_>,
    weights: &[Weight],
) -> Result<Vec<DistributedStatRecord>, GroupError> {
    let feed = group.feed;
    let searches = allocate(feed.total_searches, weights);
    let monetized = allocate(feed.monetized_searches, weights);
    let paid_clicks = allocate(feed.paid_clicks, weights);
    let revenue = allocate_revenue(feed.feed_revenue, weights)?;

    verify_group(feed, &searches, &monetized, &paid_clicks, &revenue)?;

    Ok(group
        .clicks
        .iter()
        .enumerate()
        .map(|(i, click)| DistributedStatRecord {
            batch_id,
            date: click.date,
            campaign_id: click.campaign_id,
            campaign_name: click.campaign_name.clone(),
            feed_id: click.feed_id.clone(),
            traffic_source_id: click.traffic_source_id,
            total_searches: searches[i],
            monetized_searches: monetized[i],
            paid_clicks: paid_clicks[i],
            feed_revenue: revenue[i].feed_revenue.to_decimal(),
            pub_revenue: revenue[i].pub_revenue.to_decimal(),
            is_feed_data: true,
        })
        .collect())
}

/// Post-hoc check of the per-group totals. A mismatch here is a bug in the
/// allocators, never bad input.
fn verify_group(
    feed: &FeedAggregateRecord,
    searches: &[u64],
    monetized: &[u64],
    paid_clicks: &[u64],
    revenue: &[RevenueShare],
) -> Result<(), GroupError> {
    for (metric, expected, parts) in [
        ("total_searches", feed.total_searches, searches),
        ("monetized_searches", feed.monetized_searches, monetized),
        ("paid_clicks", feed.paid_clicks, paid_clicks),
    ] {
        let actual: i128 = parts.iter().map(|&p| p as i128).sum();
        if actual != expected as i128 {
            return Err(GroupError::SumMismatch {
                metric,
                expected: expected as i128,
                actual,
            });
        }
    }

    let actual: i128 = revenue.iter().map(|r| r.feed_revenue.0 as i128).sum();
    if actual != feed.feed_revenue.0 as i128 {
        return Err(GroupError::SumMismatch {
            metric: "feed_revenue",
            expected: feed.feed_revenue.0 as i128,
            actual,
        });
    }

    for share in revenue {
        if share.feed_revenue.is_negative() {
            return Err(GroupError::NegativeAllocation {
                metric: "feed_revenue",
                campaign_id: share.campaign_id,
            });
        }
        if share.pub_revenue.is_negative() {
            return Err(GroupError::NegativeAllocation {
                metric: "pub_revenue",
                campaign_id: share.campaign_id,
            });
        }
    }
    Ok(())
}

/// One warning per (date, feed) that has clicks but no feed totals.
fn orphan_click_warnings(orphans: &[&ClickRecord]) -> Vec<RunIssue> {
    let mut by_key: BTreeMap<(NaiveDate, &FeedId), (usize, u64)> = BTreeMap::new();
    for click in orphans {
        let entry = by_key.entry((click.date, &click.feed_id)).or_default();
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(click.clicks);
    }
    by_key
        .into_iter()
        .map(|((date, feed_id), (campaigns, clicks))| {
            warn!(%date, feed_id = %feed_id, campaigns, clicks, "Clicks without feed totals");
            RunIssue::warning(
                IssueKind::OrphanClicks,
                format!("{date}/{feed_id}: {campaigns} campaign(s) with {clicks} click(s) have no feed totals"),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
