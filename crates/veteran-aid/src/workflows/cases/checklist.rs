use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CaseDocument, CaseId, DocumentId, DocumentStatus, InvalidStatus};
use super::status_engine::ChecklistSnapshot;

/// Seeds one `required` document per non-blank template line, keeping template order.
pub fn instantiate(case_id: &CaseId, template: &str, now: DateTime<Utc>) -> Vec<CaseDocument> {
    template
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|title| CaseDocument {
            id: DocumentId::next(),
            case_id: case_id.clone(),
            title: title.to_string(),
            status: DocumentStatus::Required,
            comment: None,
            file: None,
            created_at: now,
            updated_at: None,
        })
        .collect()
}

/// Completion figures for a case checklist.
///
/// The readiness flags are computed independently of the case status: a checklist with
/// a rejected item and nothing left `required` reports `is_ready_to_submit` while the
/// case itself sits in `in_review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecklistProgress {
    pub total: usize,
    pub approved: usize,
    pub uploaded: usize,
    pub rejected: usize,
    pub required: usize,
    pub percent: u8,
    pub is_ready_to_submit: bool,
    pub is_ready_for_approval: bool,
}

impl From<ChecklistSnapshot> for ChecklistProgress {
    fn from(snapshot: ChecklistSnapshot) -> Self {
        let ChecklistSnapshot {
            total,
            required,
            uploaded,
            approved,
            rejected,
        } = snapshot;

        let percent = if total > 0 {
            // Ties go to the even neighbour (1 of 8 approved reports 12).
            (approved as f64 / total as f64 * 100.0).round_ties_even() as u8
        } else {
            0
        };

        Self {
            total,
            approved,
            uploaded,
            rejected,
            required,
            percent,
            is_ready_to_submit: required == 0 && total > 0,
            is_ready_for_approval: approved == total && total > 0,
        }
    }
}

pub fn progress(documents: &[CaseDocument]) -> ChecklistProgress {
    ChecklistProgress::from(ChecklistSnapshot::from_documents(documents))
}

/// Partial update of a checklist item. Omitted fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Applies `update` to `document`. The status text is validated before anything changes.
pub fn update_document(
    mut document: CaseDocument,
    update: &DocumentUpdate,
    now: DateTime<Utc>,
) -> Result<CaseDocument, InvalidStatus> {
    let status = update
        .status
        .as_deref()
        .map(|raw| raw.trim().parse::<DocumentStatus>())
        .transpose()?;

    if let Some(status) = status {
        document.status = status;
    }
    if let Some(comment) = &update.comment {
        document.comment = Some(comment.clone());
    }
    if status.is_some() || update.comment.is_some() {
        document.updated_at = Some(now);
    }

    Ok(document)
}
