//! Case document lifecycle: checklist seeding, status derivation, evidence uploads and
//! the service and router that tie them to storage, the text oracle and the renderer.

pub mod catalog;
pub mod checklist;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub mod status_engine;
pub mod uploads;

#[cfg(test)]
mod tests;

pub use catalog::{default_catalog, load_benefits, load_benefits_from_path, CatalogImportError};
pub use checklist::{ChecklistProgress, DocumentUpdate};
pub use domain::{
    Actor, ArtifactId, ArtifactKind, Benefit, BenefitId, Case, CaseArtifact, CaseDocument,
    CaseHistoryEntry, CaseId, CaseStatus, ClaimantProfile, DocumentId, DocumentStatus,
    DocumentView, HistoryOrigin, InvalidStatus, Role, StoredFile, UserId,
};
pub use repository::{CaseMutation, CaseRepository, RepositoryError};
pub use router::{case_router, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use service::{
    AdminStatusChange, ApplicationRequest, CaseEdit, CaseService, CaseServiceError,
    DraftedApplication, GeneratedPdf, NewCase,
};
pub use status_engine::{recalculate, ChecklistSnapshot};
pub use uploads::{
    AcceptedKind, DocumentStore, LocalDirectoryStore, UploadPolicy, UploadRejection,
    UploadSession,
};
