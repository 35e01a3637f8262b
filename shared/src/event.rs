use std::fmt;

use crate::model::PlaceId;
use crate::refresh::{PhotoUpdate, RefreshError, RefreshOutcome, RefreshReport};

/// Results produced by background tasks. They are only ever applied by
/// `App`, on the caller's side of the channel.
#[derive(Debug)]
pub(crate) enum CoreEvent {
    RefreshFinished {
        cycle: u64,
        result: Result<RefreshOutcome, RefreshError>,
    },
    PhotoFetched {
        cycle: u64,
        id: PlaceId,
        result: Result<PhotoUpdate, RefreshError>,
    },
    /// The task panicked or was cancelled before it could report.
    TaskFailed { task: BackgroundTask, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BackgroundTask {
    Refresh,
    Photo(PlaceId),
}

impl CoreEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::RefreshFinished { .. } => "refresh_finished",
            Self::PhotoFetched { .. } => "photo_fetched",
            Self::TaskFailed { .. } => "task_failed",
        }
    }
}

/// Something the presentation layer should tell the user about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    RefreshCompleted(RefreshReport),
    /// The merged result was over the payload budget; nothing was applied.
    RefreshAborted { size: usize, budget: usize },
    RefreshFailed(String),
    PhotoUpdated(PlaceId),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Self::RefreshCompleted(report) if report.failed == 0 => {
                format!("Updated {} places", report.updated)
            }
            Self::RefreshCompleted(report) => format!(
                "Updated {} places, {} could not be refreshed",
                report.updated, report.failed
            ),
            Self::RefreshAborted { .. } => "Too much data, refresh cancelled".to_string(),
            Self::RefreshFailed(reason) => format!("Refresh failed: {reason}"),
            Self::PhotoUpdated(_) => "Photo updated".to_string(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
