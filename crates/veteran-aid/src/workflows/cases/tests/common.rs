use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use serde_json::Value;

use crate::workflows::application::{FontSet, Labels, OracleError, PdfRenderer, TextOracle};
use crate::workflows::cases::domain::{
    Actor, Benefit, BenefitId, Case, CaseArtifact, CaseDocument, CaseHistoryEntry, CaseId,
    ClaimantProfile, UserId,
};
use crate::workflows::cases::repository::{CaseMutation, CaseRepository, RepositoryError};
use crate::workflows::cases::router::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use crate::workflows::cases::service::{CaseService, NewCase};
use crate::workflows::cases::uploads::{DocumentStore, UploadPolicy};

pub(super) const PDF_BYTES: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF\n";
pub(super) const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
pub(super) const UPLOAD_LIMIT: u64 = 64;

pub(super) const SAMPLE_LETTER: &str = "[TO]\nRegional social protection office\n\
[FROM]\nOlena Kovalenko\nolena@example.org\n\
[BODY]\nI ask for housing support.\n\nThank you.\n\
[ATTACHMENTS]\n- Passport\n- ID code";

#[derive(Default)]
struct MemoryState {
    benefits: Vec<Benefit>,
    claimants: HashMap<UserId, ClaimantProfile>,
    cases: Vec<Case>,
    documents: Vec<CaseDocument>,
    history: Vec<CaseHistoryEntry>,
    artifacts: Vec<CaseArtifact>,
}

#[derive(Default)]
pub(super) struct MemoryCaseRepository {
    state: Mutex<MemoryState>,
    reject_commits: AtomicBool,
    commit_threads: Mutex<Vec<ThreadId>>,
}

impl MemoryCaseRepository {
    pub(super) fn with_benefits(benefits: Vec<Benefit>) -> Self {
        let repository = Self::default();
        repository.state.lock().expect("repository mutex poisoned").benefits = benefits;
        repository
    }

    pub(super) fn add_claimant(&self, profile: ClaimantProfile) {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        state.claimants.insert(profile.user_id.clone(), profile);
    }

    pub(super) fn reject_commits(&self) {
        self.reject_commits.store(true, Ordering::SeqCst);
    }

    /// Thread of every commit attempt, oldest first.
    pub(super) fn commit_threads(&self) -> Vec<ThreadId> {
        self.commit_threads
            .lock()
            .expect("thread log poisoned")
            .clone()
    }
}

impl CaseRepository for MemoryCaseRepository {
    fn benefit(&self, id: &BenefitId) -> Result<Option<Benefit>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.benefits.iter().find(|benefit| &benefit.id == id).cloned())
    }

    fn benefits(&self) -> Result<Vec<Benefit>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.benefits.clone())
    }

    fn claimant(&self, id: &UserId) -> Result<Option<ClaimantProfile>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.claimants.get(id).cloned())
    }

    fn case(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.cases.iter().find(|case| &case.id == id).cloned())
    }

    fn cases(&self, owner: Option<&UserId>) -> Result<Vec<Case>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state
            .cases
            .iter()
            .rev()
            .filter(|case| owner.map_or(true, |owner| &case.owner == owner))
            .cloned()
            .collect())
    }

    fn documents(&self, case_id: &CaseId) -> Result<Vec<CaseDocument>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state
            .documents
            .iter()
            .filter(|document| &document.case_id == case_id)
            .cloned()
            .collect())
    }

    fn history(&self, case_id: &CaseId) -> Result<Vec<CaseHistoryEntry>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state
            .history
            .iter()
            .filter(|entry| &entry.case_id == case_id)
            .cloned()
            .collect())
    }

    fn artifacts(&self, case_id: &CaseId) -> Result<Vec<CaseArtifact>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state
            .artifacts
            .iter()
            .filter(|artifact| &artifact.case_id == case_id)
            .cloned()
            .collect())
    }

    fn commit(&self, mutation: CaseMutation) -> Result<(), RepositoryError> {
        self.commit_threads
            .lock()
            .expect("thread log poisoned")
            .push(thread::current().id());
        if self.reject_commits.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("commits disabled".to_string()));
        }

        let mut state = self.state.lock().expect("repository mutex poisoned");
        match state.cases.iter_mut().find(|case| case.id == mutation.case.id) {
            Some(existing) => *existing = mutation.case,
            None => state.cases.push(mutation.case),
        }
        for document in mutation.documents {
            match state.documents.iter_mut().find(|stored| stored.id == document.id) {
                Some(existing) => *existing = document,
                None => state.documents.push(document),
            }
        }
        state.history.extend(mutation.history);
        state.artifacts.extend(mutation.artifacts);
        Ok(())
    }
}

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Keeps uploaded bytes in memory so tests can see partial writes and removals.
#[derive(Default)]
pub(super) struct MemoryStore {
    files: Files,
    io_threads: Arc<Mutex<Vec<ThreadId>>>,
}

impl MemoryStore {
    pub(super) fn keys(&self) -> Vec<String> {
        let files = self.files.lock().expect("store mutex poisoned");
        let mut keys: Vec<String> = files.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(super) fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().expect("store mutex poisoned").get(key).cloned()
    }

    /// Thread of every create, write and remove call.
    pub(super) fn io_threads(&self) -> Vec<ThreadId> {
        self.io_threads.lock().expect("thread log poisoned").clone()
    }
}

fn log_thread(log: &Mutex<Vec<ThreadId>>) {
    log.lock()
        .expect("thread log poisoned")
        .push(thread::current().id());
}

pub(super) struct MemoryWriter {
    key: String,
    files: Files,
    io_threads: Arc<Mutex<Vec<ThreadId>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        log_thread(&self.io_threads);
        let mut files = self.files.lock().expect("store mutex poisoned");
        files.entry(self.key.clone()).or_default().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    type Writer = MemoryWriter;

    fn create(&self, key: &str) -> io::Result<Self::Writer> {
        log_thread(&self.io_threads);
        let mut files = self.files.lock().expect("store mutex poisoned");
        if files.contains_key(key) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, key.to_string()));
        }
        files.insert(key.to_string(), Vec::new());
        Ok(MemoryWriter {
            key: key.to_string(),
            files: Arc::clone(&self.files),
            io_threads: Arc::clone(&self.io_threads),
        })
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        log_thread(&self.io_threads);
        self.files.lock().expect("store mutex poisoned").remove(key);
        Ok(())
    }
}

/// Oracle that replays queued replies and records every prompt it receives.
#[derive(Default)]
pub(super) struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub(super) fn failing(error: OracleError) -> Self {
        let oracle = Self::default();
        oracle.queue(Err(error));
        oracle
    }

    pub(super) fn queue(&self, reply: Result<String, OracleError>) {
        self.replies.lock().expect("oracle mutex poisoned").push_back(reply);
    }

    pub(super) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("oracle mutex poisoned").clone()
    }
}

impl TextOracle for ScriptedOracle {
    fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts
            .lock()
            .expect("oracle mutex poisoned")
            .push(prompt.to_string());
        self.replies
            .lock()
            .expect("oracle mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(SAMPLE_LETTER.to_string()))
    }
}

pub(super) type TestService = CaseService<MemoryCaseRepository, MemoryStore, ScriptedOracle>;

pub(super) struct Fixture {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<MemoryCaseRepository>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) oracle: Arc<ScriptedOracle>,
}

pub(super) fn housing_benefit() -> Benefit {
    Benefit {
        id: BenefitId::from("housing"),
        title: "Housing and utilities discount".to_string(),
        category: "housing".to_string(),
        description: "Discount on rent and utility bills.".to_string(),
        authority: "Social protection office".to_string(),
        required_documents: "Passport\nID code\n".to_string(),
        eligible_statuses: "veteran,combatant".to_string(),
    }
}

pub(super) fn empty_benefit() -> Benefit {
    Benefit {
        id: BenefitId::from("consultation"),
        title: "Legal consultation".to_string(),
        category: "legal".to_string(),
        description: "Free legal advice.".to_string(),
        authority: "Legal aid center".to_string(),
        required_documents: "  \n".to_string(),
        eligible_statuses: "veteran".to_string(),
    }
}

pub(super) fn claimant() -> Actor {
    Actor::claimant("user-1")
}

pub(super) fn stranger() -> Actor {
    Actor::claimant("user-2")
}

pub(super) fn admin() -> Actor {
    Actor::admin("admin-1")
}

pub(super) fn claimant_profile() -> ClaimantProfile {
    ClaimantProfile {
        user_id: UserId::from("user-1"),
        email: "olena@example.org".to_string(),
        full_name: Some("Olena Kovalenko".to_string()),
        region: Some("Kyiv".to_string()),
        status: Some("veteran".to_string()),
    }
}

pub(super) fn renderer() -> Arc<PdfRenderer> {
    Arc::new(PdfRenderer::new(FontSet::builtin(), Labels::english()))
}

pub(super) fn fixture_with_oracle(oracle: ScriptedOracle) -> Fixture {
    let repository = Arc::new(MemoryCaseRepository::with_benefits(vec![
        housing_benefit(),
        empty_benefit(),
    ]));
    repository.add_claimant(claimant_profile());
    let store = Arc::new(MemoryStore::default());
    let oracle = Arc::new(oracle);

    let service = Arc::new(CaseService::new(
        Arc::clone(&repository),
        Arc::clone(&store),
        Arc::clone(&oracle),
        renderer(),
        UploadPolicy::new(UPLOAD_LIMIT),
    ));

    Fixture {
        service,
        repository,
        store,
        oracle,
    }
}

pub(super) fn fixture() -> Fixture {
    fixture_with_oracle(ScriptedOracle::default())
}

pub(super) fn new_case(benefit_id: &str) -> NewCase {
    NewCase {
        benefit_id: BenefitId::from(benefit_id),
        title: None,
        description: None,
        note: Some("first visit".to_string()),
    }
}

pub(super) fn open_case(fixture: &Fixture) -> Case {
    fixture
        .service
        .create_case(&claimant(), new_case("housing"))
        .expect("case created")
}

pub(super) fn request(method: &str, uri: &str, actor: &Actor, body: Option<Value>) -> Request<Body> {
    let role = if actor.is_admin() { "admin" } else { "claimant" };
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_ID_HEADER, actor.id.0.as_str())
        .header(ACTOR_ROLE_HEADER, role);

    match body {
        Some(body) => builder
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("json body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
