use crate::db::SubjectId;
use serde::Serialize;

/// Outcome of one credential within a batch refresh.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RefreshStatus {
    #[serde(rename = "success")]
    Refreshed,
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub subject_id: SubjectId,
    pub google_email: String,
    #[serde(flatten)]
    pub status: RefreshStatus,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
    pub results: Vec<RefreshReport>,
}

impl FromIterator<RefreshReport> for RefreshSummary {
    fn from_iter<I: IntoIterator<Item = RefreshReport>>(iter: I) -> Self {
        let mut summary = RefreshSummary::default();
        for report in iter {
            match report.status {
                RefreshStatus::Refreshed => summary.refreshed += 1,
                RefreshStatus::Skipped { .. } => summary.skipped += 1,
                RefreshStatus::Failed { .. } => summary.failed += 1,
            }
            summary.total += 1;
            summary.results.push(report);
        }
        summary.results.sort_by_key(|r| r.subject_id);
        summary
    }
}
