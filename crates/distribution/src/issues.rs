//! Run issues: every rejection, warning and error a run produces is kept
//! here so the summary counters can be traced back to concrete keys.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Rejection,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    RejectedRow,
    DuplicateKey,
    RevenueRounded,
    OrphanClicks,
    OrphanFeed,
    ZeroClicks,
    FallbackSkipped,
    GroupFailed,
    RunAborted,
    RunTimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl RunIssue {
    pub fn rejection(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::RejectedRow,
            severity: Severity::Rejection,
            message: message.into(),
        }
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}
