use super::common::*;

use crate::workflows::cases::domain::{CaseStatus, DocumentStatus};
use crate::workflows::cases::service::CaseServiceError;
use crate::workflows::cases::uploads::UploadRejection;

#[test]
fn completed_upload_marks_document_uploaded() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    let mut session = fixture
        .service
        .begin_upload(
            &claimant(),
            &case.id,
            &documents[0].id,
            "passport.pdf",
            "application/pdf",
        )
        .expect("upload accepted");
    let (head, tail) = PDF_BYTES.split_at(2);
    session.push(head).expect("first chunk");
    session.push(tail).expect("second chunk");
    let key = session.key().to_string();

    let document = fixture
        .service
        .complete_upload(&claimant(), &case.id, &documents[0].id, session)
        .expect("upload stored");

    assert_eq!(document.status, DocumentStatus::Uploaded);
    let file = document.file.expect("file attached");
    assert_eq!(file.file_name, "passport.pdf");
    assert_eq!(file.content_type, "application/pdf");
    assert_eq!(file.size_bytes, PDF_BYTES.len() as u64);
    assert_eq!(file.path, key);
    assert!(key.starts_with(&format!("{}/{}_", case.id, documents[0].id)));
    assert!(key.ends_with(".pdf"));
    assert_eq!(fixture.store.contents(&key).as_deref(), Some(PDF_BYTES));

    let history = fixture
        .service
        .history(&claimant(), &case.id)
        .expect("history listed");
    assert_eq!(history[0].comment, "File uploaded: passport.pdf");
}

#[test]
fn uploading_every_document_submits_the_case() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    for document in &documents {
        let mut session = fixture
            .service
            .begin_upload(&claimant(), &case.id, &document.id, "scan.png", "image/png")
            .expect("upload accepted");
        session.push(PNG_BYTES).expect("chunk accepted");
        fixture
            .service
            .complete_upload(&claimant(), &case.id, &document.id, session)
            .expect("upload stored");
    }

    let stored = fixture.service.case(&claimant(), &case.id).expect("case loads");
    assert_eq!(stored.status, CaseStatus::Submitted);
    assert_eq!(fixture.store.keys().len(), 2);
}

#[test]
fn replacing_a_file_removes_the_previous_one() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    for name in ["first.pdf", "second.pdf"] {
        let mut session = fixture
            .service
            .begin_upload(&claimant(), &case.id, &documents[0].id, name, "application/pdf")
            .expect("upload accepted");
        session.push(PDF_BYTES).expect("chunk accepted");
        fixture
            .service
            .complete_upload(&claimant(), &case.id, &documents[0].id, session)
            .expect("upload stored");
    }

    assert_eq!(fixture.store.keys().len(), 1);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    let file = documents[0].file.as_ref().expect("file attached");
    assert_eq!(file.file_name, "second.pdf");
}

#[test]
fn disallowed_extension_is_refused_before_any_write() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    let result = fixture.service.begin_upload(
        &claimant(),
        &case.id,
        &documents[0].id,
        "passport.docx",
        "application/pdf",
    );
    assert!(matches!(
        result,
        Err(CaseServiceError::Upload(
            UploadRejection::UnsupportedExtension { .. }
        ))
    ));
    assert!(fixture.store.keys().is_empty());
}

#[test]
fn wrong_signature_leaves_no_file() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    let mut session = fixture
        .service
        .begin_upload(&claimant(), &case.id, &documents[0].id, "scan.jpg", "image/jpeg")
        .expect("upload accepted");
    let error = session.push(PDF_BYTES).expect_err("not a jpeg");
    assert!(matches!(
        error,
        UploadRejection::SignatureMismatch { expected: "jpg" }
    ));
    drop(session);

    assert!(fixture.store.keys().is_empty());
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    assert_eq!(documents[0].status, DocumentStatus::Required);
}

#[test]
fn oversize_upload_aborts_mid_stream() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    let mut session = fixture
        .service
        .begin_upload(&claimant(), &case.id, &documents[0].id, "big.pdf", "application/pdf")
        .expect("upload accepted");
    session.push(PDF_BYTES).expect("first chunk fits");
    let key = session.key().to_string();
    assert!(fixture.store.contents(&key).is_some());

    let error = session
        .push(&[b'x'; UPLOAD_LIMIT as usize])
        .expect_err("limit exceeded");
    assert!(matches!(error, UploadRejection::TooLarge { limit: UPLOAD_LIMIT }));
    assert!(fixture.store.keys().is_empty());
}

#[test]
fn rejected_sibling_upload_keeps_committed_evidence() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    let document_id = &documents[0].id;

    let mut accepted = fixture
        .service
        .begin_upload(&claimant(), &case.id, document_id, "scan.pdf", "application/pdf")
        .expect("first upload opens");
    let mut forged = fixture
        .service
        .begin_upload(&claimant(), &case.id, document_id, "scan.pdf", "application/pdf")
        .expect("second upload opens");
    assert_ne!(accepted.key(), forged.key());

    accepted.push(PDF_BYTES).expect("valid chunk");
    let stored = fixture
        .service
        .complete_upload(&claimant(), &case.id, document_id, accepted)
        .expect("first upload stored")
        .file
        .expect("file attached");

    forged.push(b"garbage").expect_err("signature mismatch");
    drop(forged);

    assert_eq!(fixture.store.keys(), vec![stored.path.clone()]);
    assert_eq!(fixture.store.contents(&stored.path).as_deref(), Some(PDF_BYTES));
}

#[test]
fn abandoned_session_is_discarded() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    {
        let mut session = fixture
            .service
            .begin_upload(&claimant(), &case.id, &documents[0].id, "scan.pdf", "application/pdf")
            .expect("upload accepted");
        session.push(PDF_BYTES).expect("chunk accepted");
    }

    assert!(fixture.store.keys().is_empty());
}

#[test]
fn empty_upload_is_rejected_on_completion() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    let session = fixture
        .service
        .begin_upload(&claimant(), &case.id, &documents[0].id, "scan.pdf", "application/pdf")
        .expect("upload accepted");
    let error = fixture
        .service
        .complete_upload(&claimant(), &case.id, &documents[0].id, session)
        .expect_err("nothing was sent");

    assert!(matches!(error, CaseServiceError::Upload(UploadRejection::Empty)));
    assert!(fixture.store.keys().is_empty());
}

#[test]
fn failed_commit_removes_the_new_file() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    let mut session = fixture
        .service
        .begin_upload(&claimant(), &case.id, &documents[0].id, "scan.pdf", "application/pdf")
        .expect("upload accepted");
    session.push(PDF_BYTES).expect("chunk accepted");
    fixture.repository.reject_commits();

    let error = fixture
        .service
        .complete_upload(&claimant(), &case.id, &documents[0].id, session)
        .expect_err("commit refused");
    assert!(matches!(error, CaseServiceError::Repository(_)));
    assert!(fixture.store.keys().is_empty());
}

#[test]
fn strangers_cannot_upload() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");

    let result = fixture.service.begin_upload(
        &stranger(),
        &case.id,
        &documents[0].id,
        "scan.pdf",
        "application/pdf",
    );
    assert!(matches!(result, Err(CaseServiceError::Forbidden)));
    assert!(fixture.store.keys().is_empty());
}
