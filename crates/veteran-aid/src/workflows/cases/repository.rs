use super::domain::{
    Benefit, BenefitId, Case, CaseArtifact, CaseDocument, CaseHistoryEntry, CaseId,
    ClaimantProfile, UserId,
};

/// Everything one case mutation writes. Repositories apply it as a single unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseMutation {
    /// Inserted when new, replaced otherwise.
    pub case: Case,
    /// Upserted by id.
    pub documents: Vec<CaseDocument>,
    /// Appended in order.
    pub history: Vec<CaseHistoryEntry>,
    /// Appended in order.
    pub artifacts: Vec<CaseArtifact>,
}

impl CaseMutation {
    pub fn new(case: Case) -> Self {
        Self {
            case,
            documents: Vec::new(),
            history: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_documents(mut self, documents: impl IntoIterator<Item = CaseDocument>) -> Self {
        self.documents.extend(documents);
        self
    }

    pub fn record(mut self, entry: impl Into<Option<CaseHistoryEntry>>) -> Self {
        self.history.extend(entry.into());
        self
    }

    pub fn with_artifact(mut self, artifact: CaseArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Storage abstraction for cases and the records hanging off them.
pub trait CaseRepository: Send + Sync {
    fn benefit(&self, id: &BenefitId) -> Result<Option<Benefit>, RepositoryError>;
    fn benefits(&self) -> Result<Vec<Benefit>, RepositoryError>;
    fn claimant(&self, id: &UserId) -> Result<Option<ClaimantProfile>, RepositoryError>;
    fn case(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError>;
    /// Newest first. `None` lists every case.
    fn cases(&self, owner: Option<&UserId>) -> Result<Vec<Case>, RepositoryError>;
    /// Checklist order.
    fn documents(&self, case_id: &CaseId) -> Result<Vec<CaseDocument>, RepositoryError>;
    /// Append order.
    fn history(&self, case_id: &CaseId) -> Result<Vec<CaseHistoryEntry>, RepositoryError>;
    /// Append order.
    fn artifacts(&self, case_id: &CaseId) -> Result<Vec<CaseArtifact>, RepositoryError>;
    fn commit(&self, mutation: CaseMutation) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
