use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use veteran_aid::config::CatalogConfig;
use veteran_aid::workflows::application::{OracleError, TextOracle};
use veteran_aid::workflows::cases::{
    default_catalog, load_benefits_from_path, Benefit, BenefitId, Case, CaseArtifact,
    CaseDocument, CaseHistoryEntry, CaseId, CaseMutation, CaseRepository, CatalogImportError,
    ClaimantProfile, DocumentStore, RepositoryError, UserId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct CaseTables {
    cases: Vec<Case>,
    documents: Vec<CaseDocument>,
    history: Vec<CaseHistoryEntry>,
    artifacts: Vec<CaseArtifact>,
}

/// Process-local case storage. Everything is lost on restart.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCaseRepository {
    benefits: Arc<Vec<Benefit>>,
    claimants: Arc<Mutex<HashMap<UserId, ClaimantProfile>>>,
    tables: Arc<Mutex<CaseTables>>,
}

impl InMemoryCaseRepository {
    pub(crate) fn with_catalog(benefits: Vec<Benefit>) -> Self {
        Self {
            benefits: Arc::new(benefits),
            ..Self::default()
        }
    }

    pub(crate) fn register_claimant(&self, profile: ClaimantProfile) {
        let mut guard = self.claimants.lock().expect("claimant mutex poisoned");
        guard.insert(profile.user_id.clone(), profile);
    }
}

impl CaseRepository for InMemoryCaseRepository {
    fn benefit(&self, id: &BenefitId) -> Result<Option<Benefit>, RepositoryError> {
        Ok(self.benefits.iter().find(|benefit| &benefit.id == id).cloned())
    }

    fn benefits(&self) -> Result<Vec<Benefit>, RepositoryError> {
        Ok(self.benefits.as_ref().clone())
    }

    fn claimant(&self, id: &UserId) -> Result<Option<ClaimantProfile>, RepositoryError> {
        let guard = self.claimants.lock().expect("claimant mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn case(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        let guard = self.tables.lock().expect("repository mutex poisoned");
        Ok(guard.cases.iter().find(|case| &case.id == id).cloned())
    }

    fn cases(&self, owner: Option<&UserId>) -> Result<Vec<Case>, RepositoryError> {
        let guard = self.tables.lock().expect("repository mutex poisoned");
        Ok(guard
            .cases
            .iter()
            .rev()
            .filter(|case| owner.map_or(true, |owner| &case.owner == owner))
            .cloned()
            .collect())
    }

    fn documents(&self, case_id: &CaseId) -> Result<Vec<CaseDocument>, RepositoryError> {
        let guard = self.tables.lock().expect("repository mutex poisoned");
        Ok(guard
            .documents
            .iter()
            .filter(|document| &document.case_id == case_id)
            .cloned()
            .collect())
    }

    fn history(&self, case_id: &CaseId) -> Result<Vec<CaseHistoryEntry>, RepositoryError> {
        let guard = self.tables.lock().expect("repository mutex poisoned");
        Ok(guard
            .history
            .iter()
            .filter(|entry| &entry.case_id == case_id)
            .cloned()
            .collect())
    }

    fn artifacts(&self, case_id: &CaseId) -> Result<Vec<CaseArtifact>, RepositoryError> {
        let guard = self.tables.lock().expect("repository mutex poisoned");
        Ok(guard
            .artifacts
            .iter()
            .filter(|artifact| &artifact.case_id == case_id)
            .cloned()
            .collect())
    }

    fn commit(&self, mutation: CaseMutation) -> Result<(), RepositoryError> {
        let mut guard = self.tables.lock().expect("repository mutex poisoned");
        let CaseMutation {
            case,
            documents,
            history,
            artifacts,
        } = mutation;

        match guard.cases.iter_mut().find(|stored| stored.id == case.id) {
            Some(stored) => *stored = case,
            None => guard.cases.push(case),
        }
        for document in documents {
            match guard
                .documents
                .iter_mut()
                .find(|stored| stored.id == document.id)
            {
                Some(stored) => *stored = document,
                None => guard.documents.push(document),
            }
        }
        guard.history.extend(history);
        guard.artifacts.extend(artifacts);
        Ok(())
    }
}

/// Evidence store used by the demo; keeps bytes in memory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDocumentStore {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryDocumentStore {
    pub(crate) fn stored_bytes(&self) -> usize {
        let guard = self.files.lock().expect("store mutex poisoned");
        guard.values().map(Vec::len).sum()
    }

    pub(crate) fn file_count(&self) -> usize {
        self.files.lock().expect("store mutex poisoned").len()
    }
}

pub(crate) struct InMemoryWriter {
    key: String,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.files.lock().expect("store mutex poisoned");
        guard
            .entry(self.key.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    type Writer = InMemoryWriter;

    fn create(&self, key: &str) -> io::Result<Self::Writer> {
        let mut guard = self.files.lock().expect("store mutex poisoned");
        if guard.contains_key(key) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, key.to_string()));
        }
        guard.insert(key.to_string(), Vec::new());
        Ok(InMemoryWriter {
            key: key.to_string(),
            files: Arc::clone(&self.files),
        })
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.files.lock().expect("store mutex poisoned").remove(key);
        Ok(())
    }
}

/// Offline oracle for the demo: always answers with the same letter.
pub(crate) struct CannedOracle {
    letter: String,
}

impl CannedOracle {
    pub(crate) fn new(letter: impl Into<String>) -> Self {
        Self {
            letter: letter.into(),
        }
    }
}

impl TextOracle for CannedOracle {
    fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        tracing::debug!(prompt_len = prompt.len(), "canned oracle answering");
        Ok(self.letter.clone())
    }
}

/// Catalog from `BENEFIT_CATALOG_CSV` when configured, the bundled entries otherwise.
pub(crate) fn load_catalog(config: &CatalogConfig) -> Result<Vec<Benefit>, CatalogImportError> {
    match &config.seed_csv {
        Some(path) => {
            let benefits = load_benefits_from_path(path)?;
            tracing::info!(path = %path.display(), count = benefits.len(), "benefit catalog loaded");
            Ok(benefits)
        }
        None => Ok(default_catalog()),
    }
}
