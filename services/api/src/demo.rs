use crate::infra::{CannedOracle, InMemoryCaseRepository, InMemoryDocumentStore};
use chrono::Local;
use clap::Args;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use veteran_aid::error::AppError;
use veteran_aid::workflows::application::{FontSet, Labels, PdfRenderer};
use veteran_aid::workflows::cases::{
    default_catalog, Actor, BenefitId, CaseDocument, CaseId, CaseService, CaseServiceError,
    ClaimantProfile, DocumentUpdate, NewCase, UploadPolicy, UserId,
};

const CHUNK_SIZE: usize = 8 * 1024;
const DEMO_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;
const SAMPLE_EVIDENCE: &[u8] = b"%PDF-1.4\n% demo evidence\n%%EOF\n";

const DEMO_LETTER: &str = "[TO]\nSocial protection office\nKyiv city administration\n\
[FROM]\nOlena Kovalenko\nolena.kovalenko@example.org\nKyiv\n\
[BODY]\nI am a combat veteran and ask to be granted the housing and utility compensation \
provided for my category.\n\nThe supporting documents listed below are enclosed.\n\
[ATTACHMENTS]\n- Passport copy\n- Taxpayer ID copy\n- Veteran status certificate";

type DemoService = CaseService<InMemoryCaseRepository, InMemoryDocumentStore, CannedOracle>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Benefit to open the demo case for (defaults to housing-utilities)
    #[arg(long)]
    pub(crate) benefit: Option<String>,
    /// Evidence files uploaded in checklist order; a sample PDF fills the rest
    #[arg(long = "evidence")]
    pub(crate) evidence: Vec<PathBuf>,
    /// Write the generated application PDF here
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        benefit,
        evidence,
        output,
    } = args;

    let repository = Arc::new(InMemoryCaseRepository::with_catalog(default_catalog()));
    repository.register_claimant(ClaimantProfile {
        user_id: UserId::from("demo-claimant"),
        email: "olena.kovalenko@example.org".to_string(),
        full_name: Some("Olena Kovalenko".to_string()),
        region: Some("Kyiv".to_string()),
        status: Some("combatant".to_string()),
    });
    let store = Arc::new(InMemoryDocumentStore::default());
    let service = CaseService::new(
        repository,
        Arc::clone(&store),
        Arc::new(CannedOracle::new(DEMO_LETTER)),
        Arc::new(PdfRenderer::new(FontSet::builtin(), Labels::english())),
        UploadPolicy::new(DEMO_UPLOAD_LIMIT),
    );

    let claimant = Actor::claimant("demo-claimant");
    let reviewer = Actor::admin("demo-reviewer");
    let benefit_id = BenefitId(benefit.unwrap_or_else(|| "housing-utilities".to_string()));

    println!("Veteran aid case demo");
    let case = match service.create_case(
        &claimant,
        NewCase {
            benefit_id,
            title: None,
            description: Some("Demo claim".to_string()),
            note: None,
        },
    ) {
        Ok(case) => case,
        Err(err) => {
            println!("  Case could not be opened: {}", err);
            return Ok(());
        }
    };
    println!("- Opened {} \"{}\" -> status {}", case.id, case.title, case.status);

    let documents = match service.documents(&claimant, &case.id) {
        Ok(documents) => documents,
        Err(err) => {
            println!("  Checklist unavailable: {}", err);
            return Ok(());
        }
    };
    println!("  Checklist:");
    for document in &documents {
        println!("    - {} [{}]", document.title, document.status);
    }

    println!("\nUploading evidence");
    for (index, document) in documents.iter().enumerate() {
        let (file_name, bytes) = match evidence.get(index) {
            Some(path) => (display_name(path), fs::read(path)?),
            None => (format!("document_{}.pdf", index + 1), SAMPLE_EVIDENCE.to_vec()),
        };
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        match upload(&service, &claimant, &case.id, document, &file_name, &content_type, &bytes) {
            Ok(()) => println!("  - {} <- {} ({} bytes)", document.title, file_name, bytes.len()),
            Err(err) => println!("  - {} rejected {}: {}", document.title, file_name, err),
        }
    }
    print_status(&service, &claimant, &case.id);

    println!("\nReview");
    if let Some(last) = documents.last() {
        let rejection = DocumentUpdate {
            status: Some("rejected".to_string()),
            comment: Some("Scan is unreadable, please resubmit".to_string()),
        };
        if let Err(err) = service.update_document(&reviewer, &case.id, &last.id, rejection) {
            println!("  Review failed: {}", err);
        }
        println!("  - {} rejected", last.title);
        print_status(&service, &claimant, &case.id);
    }
    for document in &documents {
        let approval = DocumentUpdate {
            status: Some("approved".to_string()),
            comment: None,
        };
        if let Err(err) = service.update_document(&reviewer, &case.id, &document.id, approval) {
            println!("  Review failed: {}", err);
        }
    }
    println!("  - all documents approved");
    print_status(&service, &claimant, &case.id);

    println!("\nApplication letter");
    match service.case_application_pdf(&claimant, &case.id) {
        Ok(pdf) => {
            println!(
                "  - {} ({} page(s), {} bytes)",
                pdf.file_name,
                pdf.document.page_count,
                pdf.document.bytes.len()
            );
            if let Some(path) = output {
                fs::write(&path, &pdf.document.bytes)?;
                println!("  - written to {}", path.display());
            }
        }
        Err(err) => println!("  Letter unavailable: {}", err),
    }

    println!("\nHistory (newest first)");
    if let Ok(history) = service.history(&claimant, &case.id) {
        for entry in history {
            println!(
                "  {} [{}] {}",
                entry
                    .recorded_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S"),
                entry.status,
                entry.comment
            );
        }
    }
    println!(
        "\nStore holds {} file(s), {} bytes",
        store.file_count(),
        store.stored_bytes()
    );

    Ok(())
}

fn upload(
    service: &DemoService,
    actor: &Actor,
    case_id: &CaseId,
    document: &CaseDocument,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Result<(), CaseServiceError> {
    let mut session = service.begin_upload(actor, case_id, &document.id, file_name, content_type)?;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        session.push(chunk)?;
    }
    service.complete_upload(actor, case_id, &document.id, session)?;
    Ok(())
}

fn print_status(service: &DemoService, actor: &Actor, case_id: &CaseId) {
    let status = service.case(actor, case_id).map(|case| case.status);
    let progress = service.progress(actor, case_id);
    match (status, progress) {
        (Ok(status), Ok(progress)) => println!(
            "  Case status {} | {}% approved | ready to submit: {} | ready for approval: {}",
            status, progress.percent, progress.is_ready_to_submit, progress.is_ready_for_approval
        ),
        (Err(err), _) | (_, Err(err)) => println!("  Status unavailable: {}", err),
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "evidence".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_with_bundled_evidence() {
        run_demo(DemoArgs::default()).expect("demo completes");
    }

    #[test]
    fn display_name_uses_the_file_name() {
        assert_eq!(
            display_name(std::path::Path::new("/tmp/scans/passport.pdf")),
            "passport.pdf"
        );
    }
}
