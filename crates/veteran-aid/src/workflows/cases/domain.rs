use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $sequence:ident) => {
        identifier!($(#[$meta])* $name);

        static $sequence: AtomicU64 = AtomicU64::new(1);

        impl $name {
            pub(crate) fn next() -> Self {
                let id = $sequence.fetch_add(1, Ordering::Relaxed);
                Self(format!(concat!($prefix, "-{:06}"), id))
            }
        }
    };
}

identifier!(
    /// Identifier of a claimant's case.
    CaseId,
    "case",
    CASE_SEQUENCE
);
identifier!(
    /// Identifier of one checklist item.
    DocumentId,
    "doc",
    DOCUMENT_SEQUENCE
);
identifier!(ArtifactId, "artifact", ARTIFACT_SEQUENCE);
identifier!(BenefitId);
identifier!(UserId);

/// Raised when text does not name a known case or document status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status: {value}")]
pub struct InvalidStatus {
    pub value: String,
}

/// Administrative status set. Automatic recalculation only ever yields
/// `Draft`, `Submitted`, `InReview` or `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Draft,
    Submitted,
    InReview,
    Approved,
    Rejected,
    Done,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 6] = [
        CaseStatus::Draft,
        CaseStatus::Submitted,
        CaseStatus::InReview,
        CaseStatus::Approved,
        CaseStatus::Rejected,
        CaseStatus::Done,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::Draft => "draft",
            CaseStatus::Submitted => "submitted",
            CaseStatus::InReview => "in_review",
            CaseStatus::Approved => "approved",
            CaseStatus::Rejected => "rejected",
            CaseStatus::Done => "done",
        }
    }
}

impl FromStr for CaseStatus {
    type Err = InvalidStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CaseStatus::ALL
            .into_iter()
            .find(|status| status.label() == value)
            .ok_or_else(|| InvalidStatus {
                value: value.to_string(),
            })
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a single piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Required,
    Uploaded,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Required,
        DocumentStatus::Uploaded,
        DocumentStatus::Approved,
        DocumentStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::Required => "required",
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = InvalidStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.label() == value)
            .ok_or_else(|| InvalidStatus {
                value: value.to_string(),
            })
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Claimant,
    Admin,
}

/// Identity of whoever is calling into the case service. Authentication happens upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn claimant(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role: Role::Claimant,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Catalog entry for a social guarantee and the evidence it requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Benefit {
    pub id: BenefitId,
    pub title: String,
    pub category: String,
    pub description: String,
    pub authority: String,
    /// One evidence label per line.
    pub required_documents: String,
    /// Comma separated claimant categories.
    pub eligible_statuses: String,
}

impl Benefit {
    pub fn eligible_statuses(&self) -> Vec<&str> {
        self.eligible_statuses
            .split(',')
            .map(str::trim)
            .filter(|status| !status.is_empty())
            .collect()
    }
}

/// Claimant details used when drafting letters and answering questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimantProfile {
    pub user_id: UserId,
    pub email: String,
    pub full_name: Option<String>,
    pub region: Option<String>,
    /// Free-text claimant category, e.g. a veteran status.
    pub status: Option<String>,
}

impl ClaimantProfile {
    /// Stand-in profile for actors the directory does not know about.
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            email: user_id.0.clone(),
            user_id,
            full_name: None,
            region: None,
            status: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub owner: UserId,
    pub benefit_id: BenefitId,
    pub status: CaseStatus,
    pub title: String,
    pub description: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Reference to an evidence file held by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_name: String,
    /// Key relative to the store root.
    pub path: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDocument {
    pub id: DocumentId,
    pub case_id: CaseId,
    pub title: String,
    pub status: DocumentStatus,
    pub comment: Option<String>,
    pub file: Option<StoredFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CaseDocument {
    pub fn view(&self) -> DocumentView {
        DocumentView {
            id: self.id.clone(),
            case_id: self.case_id.clone(),
            title: self.title.clone(),
            status: self.status,
            comment: self.comment.clone().unwrap_or_default(),
            file_name: self.file.as_ref().map(|file| file.file_name.clone()),
        }
    }
}

/// Outward representation of a checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub case_id: CaseId,
    pub title: String,
    pub status: DocumentStatus,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Who caused an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrigin {
    Claimant,
    Automatic,
    Administrative,
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseHistoryEntry {
    pub case_id: CaseId,
    pub status: CaseStatus,
    pub comment: String,
    pub origin: HistoryOrigin,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ApplicationText,
    ApplicationPdf,
}

/// Persisted record of a generated output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseArtifact {
    pub id: ArtifactId,
    pub case_id: CaseId,
    pub kind: ArtifactKind,
    pub title: String,
    pub content_text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_status_round_trips_through_labels() {
        for status in CaseStatus::ALL {
            assert_eq!(status.label().parse::<CaseStatus>(), Ok(status));
        }
        assert_eq!(
            "closed".parse::<CaseStatus>(),
            Err(InvalidStatus {
                value: "closed".to_string()
            })
        );
    }

    #[test]
    fn document_status_rejects_case_only_values() {
        assert!("in_review".parse::<DocumentStatus>().is_err());
        assert!("Approved".parse::<DocumentStatus>().is_err());
        assert_eq!(
            "uploaded".parse::<DocumentStatus>(),
            Ok(DocumentStatus::Uploaded)
        );
    }

    #[test]
    fn document_view_defaults_missing_comment() {
        let document = CaseDocument {
            id: DocumentId::from("doc-1"),
            case_id: CaseId::from("case-1"),
            title: "Passport".to_string(),
            status: DocumentStatus::Required,
            comment: None,
            file: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        let view = document.view();
        assert_eq!(view.comment, "");
        assert!(view.file_name.is_none());
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let mut profile = ClaimantProfile::unknown(UserId::from("user-7"));
        profile.email = "claimant@example.org".to_string();
        profile.full_name = Some("  ".to_string());
        assert_eq!(profile.display_name(), "claimant@example.org");

        profile.full_name = Some("Olena Kovalenko".to_string());
        assert_eq!(profile.display_name(), "Olena Kovalenko");
    }
}
