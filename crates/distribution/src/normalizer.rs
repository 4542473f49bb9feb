//! Input normalization: canonical feed ids, row validation and duplicate
//! key detection.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use feedshare_core::{
    Cents, ClickRecord, FeedAggregateRecord, FeedId, RawClickRow, RawFeedRow, StatKey,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RejectReason;
use crate::issues::{IssueKind, RunIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    Click,
    Feed,
}

impl std::fmt::Display for RowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Click => write!(f, "click"),
            Self::Feed => write!(f, "feed"),
        }
    }
}

/// A raw row that did not make it into the run, with its position in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub source: RowSource,
    pub row: usize,
    pub reason: RejectReason,
}

impl Rejection {
    pub fn to_issue(&self) -> RunIssue {
        RunIssue::rejection(format!("{} row {}: {}", self.source, self.row, self.reason))
    }
}

/// Output of [`Normalizer::normalize_batch`].
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub clicks: Vec<ClickRecord>,
    pub feeds: Vec<FeedAggregateRecord>,
    pub rejections: Vec<Rejection>,
    /// One entry per distinct duplicated key, independent of how many rows shared it.
    pub duplicates: Vec<RejectReason>,
    pub warnings: Vec<RunIssue>,
}

impl NormalizedBatch {
    pub fn rows_rejected(&self) -> usize {
        self.rejections.len()
    }
}

pub struct Normalizer;

impl Normalizer {
    /// Validate one click row and canonicalize its feed id.
    pub fn normalize_click(row: &RawClickRow) -> Result<ClickRecord, RejectReason> {
        let date = row.date.ok_or(RejectReason::MissingField("date"))?;
        let campaign_id = row
            .campaign_id
            .ok_or(RejectReason::MissingField("campaign_id"))?;
        let feed_id = Self::feed_id(row.feed_id.as_deref())?;
        let traffic_source_id = row
            .traffic_source_id
            .ok_or(RejectReason::MissingField("traffic_source_id"))?;
        let clicks = non_negative("clicks", row.clicks)?;

        Ok(ClickRecord {
            date,
            campaign_id,
            campaign_name: row
                .campaign_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            feed_id,
            traffic_source_id,
            clicks,
        })
    }

    /// Validate one feed row. The flag is set when revenue had to be rounded
    /// to the cent.
    pub fn normalize_feed(row: &RawFeedRow) -> Result<(FeedAggregateRecord, bool), RejectReason> {
        let date = row.date.ok_or(RejectReason::MissingField("date"))?;
        let feed_id = Self::feed_id(row.feed_id.as_deref())?;
        let total_searches = non_negative("total_searches", row.total_searches)?;
        let monetized_searches = non_negative("monetized_searches", row.monetized_searches)?;
        let paid_clicks = non_negative("paid_clicks", row.paid_clicks)?;

        let revenue = row
            .feed_revenue
            .ok_or(RejectReason::MissingField("feed_revenue"))?;
        if revenue.is_sign_negative() && !revenue.is_zero() {
            return Err(RejectReason::NegativeValue {
                field: "feed_revenue",
                value: revenue.to_string(),
            });
        }
        let (feed_revenue, rounded) = Cents::from_decimal(revenue)
            .ok_or_else(|| RejectReason::RevenueOutOfRange(revenue.to_string()))?;

        Ok((
            FeedAggregateRecord {
                date,
                feed_id,
                total_searches,
                monetized_searches,
                paid_clicks,
                feed_revenue,
            },
            rounded,
        ))
    }

    /// Normalize a whole batch. Rows sharing a natural key are all rejected:
    /// keeping any one of them would make the result depend on input order.
    pub fn normalize_batch(raw_clicks: &[RawClickRow], raw_feeds: &[RawFeedRow]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        let mut clicks_by_key: BTreeMap<StatKey, Vec<(usize, ClickRecord)>> = BTreeMap::new();
        for (row, raw) in raw_clicks.iter().enumerate() {
            match Self::normalize_click(raw) {
                Ok(record) => {
                    let key = StatKey {
                        date: record.date,
                        campaign_id: record.campaign_id,
                        feed_id: record.feed_id.clone(),
                    };
                    clicks_by_key.entry(key).or_default().push((row, record));
                }
                Err(reason) => batch.rejections.push(Rejection {
                    source: RowSource::Click,
                    row,
                    reason,
                }),
            }
        }

        for (key, mut entries) in clicks_by_key {
            if entries.len() == 1 {
                if let Some((_, record)) = entries.pop() {
                    batch.clicks.push(record);
                }
                continue;
            }
            warn!(key = %key, rows = entries.len(), "Duplicate click key");
            let reason = RejectReason::DuplicateClickKey(key);
            for (row, _) in entries {
                batch.rejections.push(Rejection {
                    source: RowSource::Click,
                    row,
                    reason: reason.clone(),
                });
            }
            batch.duplicates.push(reason);
        }

        let mut feeds_by_key: BTreeMap<(NaiveDate, FeedId), Vec<(usize, FeedAggregateRecord, bool)>> =
            BTreeMap::new();
        for (row, raw) in raw_feeds.iter().enumerate() {
            match Self::normalize_feed(raw) {
                Ok((record, rounded)) => {
                    feeds_by_key
                        .entry((record.date, record.feed_id.clone()))
                        .or_default()
                        .push((row, record, rounded));
                }
                Err(reason) => batch.rejections.push(Rejection {
                    source: RowSource::Feed,
                    row,
                    reason,
                }),
            }
        }

        for ((date, feed_id), mut entries) in feeds_by_key {
            if entries.len() == 1 {
                if let Some((row, record, rounded)) = entries.pop() {
                    if rounded {
                        batch.warnings.push(RunIssue::warning(
                            IssueKind::RevenueRounded,
                            format!(
                                "feed row {row} ({date}/{feed_id}): revenue rounded to {}",
                                record.feed_revenue
                            ),
                        ));
                    }
                    batch.feeds.push(record);
                }
                continue;
            }
            warn!(%date, feed_id = %feed_id, rows = entries.len(), "Duplicate feed key");
            let reason = RejectReason::DuplicateFeedKey { date, feed_id };
            for (row, _, _) in entries {
                batch.rejections.push(Rejection {
                    source: RowSource::Feed,
                    row,
                    reason: reason.clone(),
                });
            }
            batch.duplicates.push(reason);
        }

        batch.rejections.sort_by_key(|r| (r.source, r.row));

        debug!(
            clicks = batch.clicks.len(),
            feeds = batch.feeds.len(),
            rejected = batch.rejections.len(),
            duplicates = batch.duplicates.len(),
            "Batch normalized"
        );

        batch
    }

    fn feed_id(raw: Option<&str>) -> Result<FeedId, RejectReason> {
        let feed_id = FeedId::normalize(raw.ok_or(RejectReason::MissingField("feed_id"))?);
        if feed_id.is_empty() {
            return Err(RejectReason::EmptyFeedId);
        }
        Ok(feed_id)
    }
}

fn non_negative(field: &'static str, value: Option<i64>) -> Result<u64, RejectReason> {
    let value = value.ok_or(RejectReason::MissingField(field))?;
    u64::try_from(value).map_err(|_| RejectReason::NegativeValue {
        field,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
