// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use super::{Row, ToRow, Value};
use crate::shim::clock::ChainEpoch;

/// `status_information` of the row recording a null round.
pub const NULL_ROUND: &str = "NULL_ROUND";

/// `status_information` of tasks that ran out of time.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Ok,
    Info,
    Error,
    Skip,
}

impl ReportStatus {
    /// Status of a finished task: errors win over information.
    pub fn derive(has_errors: bool, status_info: Option<&str>) -> Self {
        if has_errors {
            Self::Error
        } else if status_info.is_some_and(|info| !info.is_empty()) {
            Self::Info
        } else {
            Self::Ok
        }
    }

    /// Order in which reports of the same task and height are preferred; a
    /// task is complete at a height iff its best report is `OK`.
    pub fn rank(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::Info => 2,
            Self::Skip => 3,
        }
    }

    /// Whether `index` counts the report as a success.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Info)
    }
}

/// Audit row written for every attempt at a task on a tipset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub height: ChainEpoch,
    pub state_root: String,
    pub reporter: String,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub status_information: Option<String>,
    pub errors_detected: Option<serde_json::Value>,
}

impl ProcessingReport {
    /// Whether the row records a null round rather than a task attempt.
    pub fn is_null_round(&self) -> bool {
        self.status == ReportStatus::Info && self.status_information.as_deref() == Some(NULL_ROUND)
    }
}

impl ToRow for ProcessingReport {
    fn to_row(&self) -> Row {
        Row {
            table: "processing_reports",
            key: &["height", "state_root", "reporter", "task", "started_at"],
            columns: vec![
                ("height", self.height.into()),
                ("state_root", self.state_root.clone().into()),
                ("reporter", self.reporter.clone().into()),
                ("task", self.task.clone().into()),
                ("started_at", self.started_at.to_rfc3339().into()),
                ("completed_at", self.completed_at.to_rfc3339().into()),
                ("status", self.status.to_string().into()),
                (
                    "status_information",
                    self.status_information.clone().into(),
                ),
                (
                    "errors_detected",
                    self.errors_detected
                        .as_ref()
                        .map(|e| Value::Text(e.to_string()))
                        .unwrap_or(Value::Null),
                ),
            ],
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum GapStatus {
    Gap,
    Filled,
}

/// A task at a height that needs to be indexed again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub height: ChainEpoch,
    pub task: String,
    pub status: GapStatus,
    pub reporter: String,
    pub reported_at: DateTime<Utc>,
}

impl ToRow for GapReport {
    fn to_row(&self) -> Row {
        Row {
            table: "gap_reports",
            key: &["height", "task", "status"],
            columns: vec![
                ("height", self.height.into()),
                ("task", self.task.clone().into()),
                ("status", self.status.to_string().into()),
                ("reporter", self.reporter.clone().into()),
                ("reported_at", self.reported_at.to_rfc3339().into()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn status_is_derived() {
        assert_eq!(ReportStatus::derive(true, Some("x")), ReportStatus::Error);
        assert_eq!(ReportStatus::derive(false, Some("x")), ReportStatus::Info);
        assert_eq!(ReportStatus::derive(false, Some("")), ReportStatus::Ok);
        assert_eq!(ReportStatus::derive(false, None), ReportStatus::Ok);
    }

    #[test]
    fn status_literals() {
        assert_eq!(ReportStatus::Ok.to_string(), "OK");
        assert_eq!(ReportStatus::from_str("SKIP").unwrap(), ReportStatus::Skip);
        assert_eq!(GapStatus::Filled.as_ref(), "FILLED");
        assert_eq!(
            serde_json::to_string(&ReportStatus::Info).unwrap(),
            "\"INFO\""
        );
    }

    #[test]
    fn rank_order() {
        let mut statuses = [
            ReportStatus::Skip,
            ReportStatus::Info,
            ReportStatus::Ok,
            ReportStatus::Error,
        ];
        statuses.sort_by_key(|s| s.rank());
        assert_eq!(
            statuses,
            [
                ReportStatus::Ok,
                ReportStatus::Error,
                ReportStatus::Info,
                ReportStatus::Skip
            ]
        );
    }
}
