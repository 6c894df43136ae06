use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::workflows::application::prompt::{
    application_prompt, case_application_prompt, case_question_prompt, catalog_question_prompt,
    rank_benefits,
};
use crate::workflows::application::{
    application_file_name, case_application_file_name, OracleError, PdfRenderer,
    RenderedDocument, TextOracle,
};

use super::checklist::{self, ChecklistProgress, DocumentUpdate};
use super::domain::{
    Actor, ArtifactId, ArtifactKind, Benefit, BenefitId, Case, CaseArtifact, CaseDocument,
    CaseHistoryEntry, CaseId, CaseStatus, ClaimantProfile, DocumentId, DocumentStatus,
    HistoryOrigin, InvalidStatus, UserId,
};
use super::repository::{CaseMutation, CaseRepository, RepositoryError};
use super::status_engine::{apply_admin_transition, reconcile};
use super::uploads::{DocumentStore, UploadPolicy, UploadRejection, UploadSession};

/// Request body for opening a case.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCase {
    pub benefit_id: BenefitId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Owner edit of the free-text case fields. Omitted fields stay untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminStatusChange {
    pub status: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Standalone letter request, not tied to a case.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationRequest {
    pub benefit_id: BenefitId,
    #[serde(default)]
    pub extra_info: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftedApplication {
    pub benefit_id: BenefitId,
    pub text: String,
}

/// A rendered letter together with its download name.
#[derive(Debug, Clone)]
pub struct GeneratedPdf {
    pub file_name: String,
    pub document: RenderedDocument,
}

// Keeps storage keys unique when two uploads for one document start in the same millisecond.
static UPLOAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Per-case mutexes held across read, recompute and commit. An entry lives only while
/// some caller holds a lease on it.
#[derive(Default)]
struct CaseLocks {
    inner: Mutex<HashMap<CaseId, Arc<Mutex<()>>>>,
}

impl CaseLocks {
    fn lease(&self, case_id: &CaseId) -> CaseLease<'_> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = locks.entry(case_id.clone()).or_default().clone();
        CaseLease {
            locks: self,
            case_id: case_id.clone(),
            handle,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct CaseLease<'a> {
    locks: &'a CaseLocks,
    case_id: CaseId,
    handle: Arc<Mutex<()>>,
}

impl CaseLease<'_> {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaseLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under the map lock, so a count of two (map and this
        // lease) means nobody else is waiting on the case.
        let idle = locks.get(&self.case_id).is_some_and(|handle| {
            Arc::ptr_eq(handle, &self.handle) && Arc::strong_count(handle) == 2
        });
        if idle {
            locks.remove(&self.case_id);
        }
    }
}

/// Mutation facade over cases, their checklists and generated letters.
pub struct CaseService<R, S, O> {
    repository: Arc<R>,
    store: Arc<S>,
    oracle: Arc<O>,
    renderer: Arc<PdfRenderer>,
    uploads: UploadPolicy,
    locks: CaseLocks,
}

impl<R, S, O> CaseService<R, S, O>
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    pub fn new(
        repository: Arc<R>,
        store: Arc<S>,
        oracle: Arc<O>,
        renderer: Arc<PdfRenderer>,
        uploads: UploadPolicy,
    ) -> Self {
        Self {
            repository,
            store,
            oracle,
            renderer,
            uploads,
            locks: CaseLocks::default(),
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        self.uploads
    }

    #[cfg(test)]
    pub(super) fn tracked_case_locks(&self) -> usize {
        self.locks.tracked()
    }

    pub fn benefits(&self) -> Result<Vec<Benefit>, CaseServiceError> {
        Ok(self.repository.benefits()?)
    }

    /// Opens a case and seeds its checklist from the benefit's document template.
    pub fn create_case(&self, actor: &Actor, request: NewCase) -> Result<Case, CaseServiceError> {
        let benefit = self.benefit(&request.benefit_id)?;
        let now = Utc::now();

        let mut case = Case {
            id: CaseId::next(),
            owner: actor.id.clone(),
            benefit_id: benefit.id.clone(),
            status: CaseStatus::Draft,
            title: non_blank(request.title).unwrap_or_else(|| benefit.title.clone()),
            description: request.description.unwrap_or_default(),
            note: request.note.unwrap_or_default(),
            created_at: now,
        };
        let documents = checklist::instantiate(&case.id, &benefit.required_documents, now);

        let created = CaseHistoryEntry {
            case_id: case.id.clone(),
            status: case.status,
            comment: "Case created".to_string(),
            origin: origin_of(actor),
            recorded_at: now,
        };
        let recalculated = reconcile(&mut case, &documents, now);

        let document_count = documents.len();
        self.repository.commit(
            CaseMutation::new(case.clone())
                .with_documents(documents)
                .record(created)
                .record(recalculated),
        )?;

        tracing::info!(
            case_id = %case.id,
            benefit_id = %case.benefit_id,
            documents = document_count,
            status = %case.status,
            "case created"
        );
        Ok(case)
    }

    /// Newest first. Administrators see every case.
    pub fn list_cases(&self, actor: &Actor) -> Result<Vec<Case>, CaseServiceError> {
        let owner = (!actor.is_admin()).then_some(&actor.id);
        Ok(self.repository.cases(owner)?)
    }

    pub fn admin_cases(&self, actor: &Actor) -> Result<Vec<Case>, CaseServiceError> {
        require_admin(actor)?;
        Ok(self.repository.cases(None)?)
    }

    pub fn case(&self, actor: &Actor, case_id: &CaseId) -> Result<Case, CaseServiceError> {
        self.accessible_case(actor, case_id)
    }

    pub fn update_case(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        edit: CaseEdit,
    ) -> Result<Case, CaseServiceError> {
        let lease = self.locks.lease(case_id);
        let _guard = lease.lock();

        let mut case = self.accessible_case(actor, case_id)?;
        if let Some(title) = non_blank(edit.title) {
            case.title = title;
        }
        if let Some(description) = edit.description {
            case.description = description;
        }
        if let Some(note) = edit.note {
            case.note = note;
        }

        let entry = CaseHistoryEntry {
            case_id: case.id.clone(),
            status: case.status,
            comment: "Case updated".to_string(),
            origin: origin_of(actor),
            recorded_at: Utc::now(),
        };
        self.repository
            .commit(CaseMutation::new(case.clone()).record(entry))?;
        Ok(case)
    }

    /// Administrative status override. The requested status is validated before the
    /// case is loaded.
    pub fn admin_set_status(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        change: AdminStatusChange,
    ) -> Result<Case, CaseServiceError> {
        require_admin(actor)?;
        change.status.trim().parse::<CaseStatus>()?;

        let lease = self.locks.lease(case_id);
        let _guard = lease.lock();

        let mut case = self
            .repository
            .case(case_id)?
            .ok_or(CaseServiceError::CaseNotFound)?;
        let previous = case.status;
        let entry = apply_admin_transition(
            &mut case,
            &change.status,
            change.comment.as_deref(),
            Utc::now(),
        )?;
        self.repository
            .commit(CaseMutation::new(case.clone()).record(entry))?;

        tracing::info!(
            case_id = %case.id,
            actor = %actor.id,
            from = %previous,
            to = %case.status,
            "administrative status change"
        );
        Ok(case)
    }

    pub fn documents(
        &self,
        actor: &Actor,
        case_id: &CaseId,
    ) -> Result<Vec<CaseDocument>, CaseServiceError> {
        self.accessible_case(actor, case_id)?;
        Ok(self.repository.documents(case_id)?)
    }

    /// Changes a checklist item, then recalculates the case status.
    pub fn update_document(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        document_id: &DocumentId,
        update: DocumentUpdate,
    ) -> Result<CaseDocument, CaseServiceError> {
        let lease = self.locks.lease(case_id);
        let _guard = lease.lock();

        let mut case = self.accessible_case(actor, case_id)?;
        let mut documents = self.repository.documents(case_id)?;
        let position = locate(&documents, document_id)?;

        let now = Utc::now();
        let updated = checklist::update_document(documents[position].clone(), &update, now)?;
        documents[position] = updated.clone();

        let entry = CaseHistoryEntry {
            case_id: case.id.clone(),
            status: case.status,
            comment: format!("Document updated: {} -> {}", updated.title, updated.status),
            origin: origin_of(actor),
            recorded_at: now,
        };
        let recalculated = reconcile(&mut case, &documents, now);

        self.repository.commit(
            CaseMutation::new(case)
                .with_documents([updated.clone()])
                .record(entry)
                .record(recalculated),
        )?;

        tracing::info!(
            case_id = %case_id,
            document_id = %document_id,
            status = %updated.status,
            "document updated"
        );
        Ok(updated)
    }

    /// Opens an upload for a checklist item. Bytes are pushed by the caller and the
    /// session is handed back to [`CaseService::complete_upload`].
    pub fn begin_upload(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        document_id: &DocumentId,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadSession<S>, CaseServiceError> {
        self.accessible_case(actor, case_id)?;
        let documents = self.repository.documents(case_id)?;
        locate(&documents, document_id)?;

        let key_stem = format!(
            "{case_id}/{document_id}_{}_{}",
            Utc::now().timestamp_millis(),
            UPLOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let session =
            self.uploads
                .begin(Arc::clone(&self.store), &key_stem, file_name, content_type)?;
        tracing::debug!(
            case_id = %case_id,
            document_id = %document_id,
            key = session.key(),
            "upload started"
        );
        Ok(session)
    }

    /// Attaches the finished file, marks the item `uploaded` and recalculates the case.
    pub fn complete_upload(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        document_id: &DocumentId,
        session: UploadSession<S>,
    ) -> Result<CaseDocument, CaseServiceError> {
        let lease = self.locks.lease(case_id);
        let _guard = lease.lock();

        let mut case = self.accessible_case(actor, case_id)?;
        let mut documents = self.repository.documents(case_id)?;
        let position = locate(&documents, document_id)?;

        let stored = session.finish()?;
        let now = Utc::now();

        let mut document = documents[position].clone();
        let replaced = document.file.replace(stored.clone());
        document.status = DocumentStatus::Uploaded;
        document.updated_at = Some(now);
        documents[position] = document.clone();

        let entry = CaseHistoryEntry {
            case_id: case.id.clone(),
            status: case.status,
            comment: format!("File uploaded: {}", stored.file_name),
            origin: origin_of(actor),
            recorded_at: now,
        };
        let recalculated = reconcile(&mut case, &documents, now);

        let committed = self.repository.commit(
            CaseMutation::new(case)
                .with_documents([document.clone()])
                .record(entry)
                .record(recalculated),
        );
        if let Err(error) = committed {
            self.remove_file(&stored.path);
            return Err(error.into());
        }

        if let Some(previous) = replaced.filter(|previous| previous.path != stored.path) {
            self.remove_file(&previous.path);
        }

        tracing::info!(
            case_id = %case_id,
            document_id = %document_id,
            size_bytes = stored.size_bytes,
            "evidence file stored"
        );
        Ok(document)
    }

    pub fn progress(
        &self,
        actor: &Actor,
        case_id: &CaseId,
    ) -> Result<ChecklistProgress, CaseServiceError> {
        self.accessible_case(actor, case_id)?;
        let documents = self.repository.documents(case_id)?;
        Ok(checklist::progress(&documents))
    }

    /// Newest first.
    pub fn history(
        &self,
        actor: &Actor,
        case_id: &CaseId,
    ) -> Result<Vec<CaseHistoryEntry>, CaseServiceError> {
        self.accessible_case(actor, case_id)?;
        let mut history = self.repository.history(case_id)?;
        history.reverse();
        Ok(history)
    }

    /// Newest first.
    pub fn artifacts(
        &self,
        actor: &Actor,
        case_id: &CaseId,
    ) -> Result<Vec<CaseArtifact>, CaseServiceError> {
        self.accessible_case(actor, case_id)?;
        let mut artifacts = self.repository.artifacts(case_id)?;
        artifacts.reverse();
        Ok(artifacts)
    }

    /// Answers a question using the case, its checklist and recent history as context.
    pub fn ask_about_case(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        question: &str,
    ) -> Result<String, CaseServiceError> {
        if question.trim().is_empty() {
            return Err(CaseServiceError::EmptyInput("question"));
        }

        let case = self.accessible_case(actor, case_id)?;
        let benefit = self.benefit(&case.benefit_id)?;
        let profile = self.profile(&actor.id)?;
        let documents = self.repository.documents(case_id)?;
        let mut history = self.repository.history(case_id)?;
        history.reverse();

        let prompt = case_question_prompt(&profile, &case, &benefit, &documents, &history, question);
        Ok(self.oracle.generate(&prompt)?)
    }

    /// Drafts a letter for a benefit without touching any case.
    pub fn draft_application(
        &self,
        actor: &Actor,
        request: &ApplicationRequest,
    ) -> Result<DraftedApplication, CaseServiceError> {
        let benefit = self.benefit(&request.benefit_id)?;
        let profile = self.profile(&actor.id)?;
        let prompt = application_prompt(
            &profile,
            &benefit,
            request.extra_info.as_deref().unwrap_or_default(),
        );
        let text = self.oracle.generate(&prompt)?;

        Ok(DraftedApplication {
            benefit_id: benefit.id,
            text,
        })
    }

    pub fn draft_application_pdf(
        &self,
        actor: &Actor,
        request: &ApplicationRequest,
    ) -> Result<GeneratedPdf, CaseServiceError> {
        let benefit = self.benefit(&request.benefit_id)?;
        let drafted = self.draft_application(actor, request)?;
        let document = self.renderer.render(&drafted.text, None);

        Ok(GeneratedPdf {
            file_name: application_file_name(&benefit.title, Utc::now().date_naive()),
            document,
        })
    }

    /// Generates the case letter and stores it as an `application_text` artifact.
    pub fn case_application_text(
        &self,
        actor: &Actor,
        case_id: &CaseId,
    ) -> Result<CaseArtifact, CaseServiceError> {
        let (case, benefit, text) = self.generate_case_letter(actor, case_id)?;
        let now = Utc::now();

        let artifact = CaseArtifact {
            id: ArtifactId::next(),
            case_id: case.id.clone(),
            kind: ArtifactKind::ApplicationText,
            title: format!("Application draft: {}", benefit.title),
            content_text: text,
            created_at: now,
        };
        let entry = CaseHistoryEntry {
            case_id: case.id.clone(),
            status: case.status,
            comment: "Application text generated".to_string(),
            origin: origin_of(actor),
            recorded_at: now,
        };
        self.commit_artifact(case, artifact.clone(), entry)?;
        Ok(artifact)
    }

    /// Generates the case letter, renders it and records an `application_pdf` artifact.
    /// Nothing is recorded when the oracle fails.
    pub fn case_application_pdf(
        &self,
        actor: &Actor,
        case_id: &CaseId,
    ) -> Result<GeneratedPdf, CaseServiceError> {
        let (case, benefit, text) = self.generate_case_letter(actor, case_id)?;
        let document = self.renderer.render(&text, None);
        let now = Utc::now();

        let artifact = CaseArtifact {
            id: ArtifactId::next(),
            case_id: case.id.clone(),
            kind: ArtifactKind::ApplicationPdf,
            title: format!("Application: {}", benefit.title),
            content_text: text,
            created_at: now,
        };
        let entry = CaseHistoryEntry {
            case_id: case.id.clone(),
            status: case.status,
            comment: "Application PDF generated".to_string(),
            origin: origin_of(actor),
            recorded_at: now,
        };
        let file_name = case_application_file_name(&case.id, now.date_naive());
        self.commit_artifact(case, artifact, entry)?;

        Ok(GeneratedPdf {
            file_name,
            document,
        })
    }

    /// Answers a general question from the best matching catalog entries.
    pub fn ask_catalog(&self, actor: &Actor, question: &str) -> Result<String, CaseServiceError> {
        if question.trim().is_empty() {
            return Err(CaseServiceError::EmptyInput("question"));
        }

        let benefits = self.repository.benefits()?;
        let context = rank_benefits(&benefits, question);
        let profile = self.profile(&actor.id)?;
        let prompt = catalog_question_prompt(&profile, &context, question);
        Ok(self.oracle.generate(&prompt)?)
    }

    fn generate_case_letter(
        &self,
        actor: &Actor,
        case_id: &CaseId,
    ) -> Result<(Case, Benefit, String), CaseServiceError> {
        let case = self.accessible_case(actor, case_id)?;
        let benefit = self.benefit(&case.benefit_id)?;
        let profile = self.profile(&case.owner)?;
        let text = self
            .oracle
            .generate(&case_application_prompt(&profile, &benefit))?;
        Ok((case, benefit, text))
    }

    fn commit_artifact(
        &self,
        case: Case,
        artifact: CaseArtifact,
        entry: CaseHistoryEntry,
    ) -> Result<(), CaseServiceError> {
        let lease = self.locks.lease(&case.id);
        let _guard = lease.lock();

        // The letter was generated outside the lock; commit against the current record.
        let current = self
            .repository
            .case(&case.id)?
            .ok_or(CaseServiceError::CaseNotFound)?;
        let entry = CaseHistoryEntry {
            status: current.status,
            ..entry
        };
        tracing::info!(case_id = %current.id, kind = ?artifact.kind, "artifact recorded");
        self.repository.commit(
            CaseMutation::new(current)
                .with_artifact(artifact)
                .record(entry),
        )?;
        Ok(())
    }

    fn accessible_case(&self, actor: &Actor, case_id: &CaseId) -> Result<Case, CaseServiceError> {
        let case = self
            .repository
            .case(case_id)?
            .ok_or(CaseServiceError::CaseNotFound)?;
        if case.owner != actor.id && !actor.is_admin() {
            tracing::warn!(case_id = %case_id, actor = %actor.id, "case access denied");
            return Err(CaseServiceError::Forbidden);
        }
        Ok(case)
    }

    fn benefit(&self, benefit_id: &BenefitId) -> Result<Benefit, CaseServiceError> {
        self.repository
            .benefit(benefit_id)?
            .ok_or(CaseServiceError::BenefitNotFound)
    }

    fn profile(&self, user_id: &UserId) -> Result<ClaimantProfile, CaseServiceError> {
        Ok(self
            .repository
            .claimant(user_id)?
            .unwrap_or_else(|| ClaimantProfile::unknown(user_id.clone())))
    }

    fn remove_file(&self, key: &str) {
        if let Err(error) = self.store.remove(key) {
            tracing::warn!(key, %error, "failed to remove stored file");
        }
    }
}

fn require_admin(actor: &Actor) -> Result<(), CaseServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(CaseServiceError::AdminOnly)
    }
}

fn origin_of(actor: &Actor) -> HistoryOrigin {
    if actor.is_admin() {
        HistoryOrigin::Administrative
    } else {
        HistoryOrigin::Claimant
    }
}

fn locate(documents: &[CaseDocument], document_id: &DocumentId) -> Result<usize, CaseServiceError> {
    documents
        .iter()
        .position(|document| &document.id == document_id)
        .ok_or(CaseServiceError::DocumentNotFound)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Error raised by the case service.
#[derive(Debug, thiserror::Error)]
pub enum CaseServiceError {
    #[error("case not found")]
    CaseNotFound,
    #[error("document not found")]
    DocumentNotFound,
    #[error("benefit not found")]
    BenefitNotFound,
    #[error("access to this case is not allowed")]
    Forbidden,
    #[error("administrator role required")]
    AdminOnly,
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),
    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),
    #[error(transparent)]
    Upload(#[from] UploadRejection),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
