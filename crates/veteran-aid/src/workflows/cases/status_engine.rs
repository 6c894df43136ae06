//! Derives case status from the evidence checklist and records administrative overrides.
//!
//! Every mutation path funnels through [`reconcile`] so that the derived status and
//! its audit entry are produced by one function.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    Case, CaseDocument, CaseHistoryEntry, CaseStatus, DocumentStatus, HistoryOrigin,
    InvalidStatus,
};

pub(crate) const AUTO_TAG: &str = "[AUTO]";
pub(crate) const ADMIN_TAG: &str = "[ADMIN]";
const DEFAULT_ADMIN_COMMENT: &str = "Status changed";

/// Per-status document counts for one case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChecklistSnapshot {
    pub total: usize,
    pub required: usize,
    pub uploaded: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl ChecklistSnapshot {
    pub fn from_documents<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a CaseDocument>,
    {
        documents
            .into_iter()
            .fold(Self::default(), |mut snapshot, document| {
                snapshot.total += 1;
                match document.status {
                    DocumentStatus::Required => snapshot.required += 1,
                    DocumentStatus::Uploaded => snapshot.uploaded += 1,
                    DocumentStatus::Approved => snapshot.approved += 1,
                    DocumentStatus::Rejected => snapshot.rejected += 1,
                }
                snapshot
            })
    }
}

/// Pure status derivation. First matching rule wins.
pub fn recalculate(snapshot: &ChecklistSnapshot) -> CaseStatus {
    if snapshot.total == 0 {
        return CaseStatus::Draft;
    }
    if snapshot.approved == snapshot.total {
        return CaseStatus::Done;
    }
    if snapshot.rejected > 0 {
        return CaseStatus::InReview;
    }
    if snapshot.required == 0 {
        return CaseStatus::Submitted;
    }
    CaseStatus::Draft
}

/// Applies [`recalculate`] to `case`. Returns the automatic audit entry only when the
/// stored status actually changed.
pub fn reconcile(
    case: &mut Case,
    documents: &[CaseDocument],
    now: DateTime<Utc>,
) -> Option<CaseHistoryEntry> {
    let derived = recalculate(&ChecklistSnapshot::from_documents(documents));
    if derived == case.status {
        return None;
    }

    tracing::info!(
        case_id = %case.id,
        from = %case.status,
        to = %derived,
        "case status recalculated"
    );
    case.status = derived;

    Some(CaseHistoryEntry {
        case_id: case.id.clone(),
        status: derived,
        comment: format!("{AUTO_TAG} Case status recalculated automatically -> {derived}"),
        origin: HistoryOrigin::Automatic,
        recorded_at: now,
    })
}

/// Administrative override. Any of the six statuses may follow any other; the entry is
/// always recorded, even when the status does not change.
pub fn apply_admin_transition(
    case: &mut Case,
    requested: &str,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CaseHistoryEntry, InvalidStatus> {
    let status: CaseStatus = requested.trim().parse()?;
    case.status = status;

    let comment = comment
        .map(str::trim)
        .filter(|comment| !comment.is_empty())
        .unwrap_or(DEFAULT_ADMIN_COMMENT);

    Ok(CaseHistoryEntry {
        case_id: case.id.clone(),
        status,
        comment: format!("{ADMIN_TAG} {comment}"),
        origin: HistoryOrigin::Administrative,
        recorded_at: now,
    })
}
