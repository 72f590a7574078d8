//! Integration tests for the e-signature lifecycle.
//!
//! These tests exercise the full request flow using the actual service
//! types with temporary file-based databases and blob stores.
//!
//! Run with: cargo test --test `esign_integration`

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tempfile::TempDir;
use uuid::Uuid;

use esign_service::EsignError;
use esign_service::audit::AuditLogger;
use esign_service::config::KeyRetention;
use esign_service::esign::types::{
    ANOMALY_DEVICE_CHANGED, ANOMALY_IP_CHANGED, ANOMALY_SIGNED_TOO_FAST, CancelRequestInput,
    CreateRequestInput, DocumentResponse, DocumentStatus, RegisterDocumentRequest,
    RegisterKeyRequest, RequestStatus, SignRequestInput, SignerSpec, SignerStatus,
    StartSessionRequest,
};
use esign_service::esign::{
    CertificateBuilder, DocumentRegistry, IdentityManager, ReminderTracker, RequestWorkflow,
    SessionMonitor,
};
use esign_service::storage::{BlobStore, Storage};

/// All services wired to one temporary database and blob store.
struct TestStack {
    blobs: BlobStore,
    audit: Arc<AuditLogger>,
    identity: IdentityManager,
    monitor: SessionMonitor,
    workflow: RequestWorkflow,
    registry: DocumentRegistry,
    reminders: ReminderTracker,
    certificates: CertificateBuilder,
}

/// Create a test stack with temporary storage.
fn create_test_stack(temp_dir: &TempDir, enforce_order: bool) -> TestStack {
    let storage =
        Storage::open(&temp_dir.path().join("esign.redb")).expect("Failed to create storage");
    let blobs =
        BlobStore::new(temp_dir.path().join("blobs")).expect("Failed to create blob store");
    let audit =
        Arc::new(AuditLogger::new(storage.clone()).expect("Failed to create audit logger"));

    let identity = IdentityManager::new(
        storage.clone(),
        blobs.clone(),
        audit.clone(),
        KeyRetention::Retain,
    );
    let monitor = SessionMonitor::new(storage.clone(), audit.clone(), 10);
    let workflow = RequestWorkflow::new(
        storage.clone(),
        identity.clone(),
        monitor.clone(),
        audit.clone(),
        enforce_order,
        7,
    );
    let registry = DocumentRegistry::new(storage.clone(), blobs.clone(), audit.clone());
    let reminders = ReminderTracker::new(storage.clone(), audit.clone());
    let certificates = CertificateBuilder::new(storage, blobs.clone(), audit.clone());

    TestStack {
        blobs,
        audit,
        identity,
        monitor,
        workflow,
        registry,
        reminders,
        certificates,
    }
}

/// Register a signing key for a user.
fn register_key(stack: &TestStack, user_id: Uuid, pin: &str) {
    stack
        .identity
        .register(RegisterKeyRequest {
            user_id,
            pin: pin.to_string(),
            label: None,
        })
        .expect("Key registration failed");
}

/// Register a document owned by the given user.
fn register_document(stack: &TestStack, owner_id: Uuid, title: &str) -> DocumentResponse {
    stack
        .registry
        .register(RegisterDocumentRequest {
            owner_id,
            title: title.to_string(),
            filename: "contract.pdf".to_string(),
            content_base64: BASE64.encode(format!("pdf bytes for {title}")),
        })
        .expect("Document registration failed")
}

/// Recipient spec for a platform user.
fn signer_spec(email: &str, user_id: Uuid, order_index: Option<u32>) -> SignerSpec {
    SignerSpec {
        signer_email: email.to_string(),
        signer_name: None,
        signer_user_id: Some(user_id),
        order_index,
    }
}

/// Sign input without a session.
fn sign_input(user_id: Uuid, pin: &str) -> SignRequestInput {
    SignRequestInput {
        user_id,
        pin: pin.to_string(),
        signer_email: None,
        session_id: None,
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

#[test]
fn test_full_signing_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let stack = create_test_stack(&temp_dir, false);

    let creator = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    register_key(&stack, alice, "2468");
    register_key(&stack, bob, "1357");

    // ===== Setup =====

    let document = register_document(&stack, creator, "Master Service Agreement");
    assert_eq!(document.status, DocumentStatus::Draft);

    let detail = stack
        .workflow
        .create_request(CreateRequestInput {
            document_id: document.document_id,
            creator_id: creator,
            signers: vec![
                signer_spec("alice@example.com", alice, None),
                signer_spec("bob@example.com", bob, None),
            ],
            message: Some("Please review and sign".to_string()),
            expires_at: None,
        })
        .expect("Request creation failed");

    let request_id = detail.request.id;
    assert_eq!(detail.request.status, RequestStatus::Pending);
    assert_eq!(detail.signers.len(), 2);
    assert_eq!(detail.signers[0].order_index, 1);
    assert_eq!(detail.signers[1].order_index, 2);
    assert!(
        detail.request.expires_at.is_some(),
        "Default deadline should apply"
    );

    // Creating the request locks the document out of draft
    let doc = stack.registry.get(&document.document_id).unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);

    let sent = stack.workflow.mark_sent(&request_id).expect("Mark-sent failed");
    assert_eq!(sent.status, RequestStatus::Sent);

    // Repeated delivery notifications are no-ops
    let resent = stack.workflow.mark_sent(&request_id).unwrap();
    assert_eq!(resent.status, RequestStatus::Sent);

    // ===== Signing =====

    let session = stack
        .monitor
        .start_session(StartSessionRequest {
            signer_id: detail.signers[0].id,
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("integration-test".to_string()),
            device_fingerprint: Some("device-alice".to_string()),
        })
        .expect("Session start failed");

    let mut first_input = sign_input(alice, "2468");
    first_input.session_id = Some(session.session_id);
    let first = stack
        .workflow
        .sign(&request_id, first_input)
        .expect("First signature failed");

    assert!(!first.all_signed, "One of two signatures should not complete");
    assert_eq!(first.request_status, RequestStatus::Sent);
    assert!(first.fraud.is_some(), "Session evaluation should be attached");

    let second = stack
        .workflow
        .sign(&request_id, sign_input(bob, "1357"))
        .expect("Second signature failed");

    assert!(second.all_signed, "Last signature should complete the request");
    assert_eq!(second.request_status, RequestStatus::Signed);
    assert!(second.fraud.is_none(), "No session was supplied");

    let detail = stack.workflow.get_detail(&request_id).unwrap();
    assert_eq!(detail.request.status, RequestStatus::Signed);
    for signer in &detail.signers {
        assert_eq!(signer.status, SignerStatus::Signed);
        assert!(signer.signed_at.is_some());
        assert!(signer.signature_id.is_some());
    }

    let doc = stack.registry.get(&document.document_id).unwrap();
    assert_eq!(doc.status, DocumentStatus::Signed);

    let verification = stack
        .identity
        .verify_signature(&document.document_id, &alice)
        .expect("Verification failed");
    assert!(verification.valid, "Stored signature should verify");

    // ===== Certificate =====

    let certificate = stack
        .certificates
        .build(&request_id)
        .expect("Certificate build failed");

    assert_eq!(certificate.metadata.signers.len(), 2);
    assert!(
        certificate.metadata.fingerprint_mismatches.is_empty(),
        "Document was not modified after signing"
    );

    let pdf = stack.blobs.get(&certificate.certificate_path).unwrap();
    assert!(pdf.starts_with(b"%PDF"), "Certificate should be a PDF");

    // ===== Archival =====

    let archived = stack
        .registry
        .archive(&document.document_id)
        .expect("Archival failed");
    assert!(archived.blob_copied, "Blob copy should succeed");
    assert!(stack.blobs.exists(&archived.archive_path));

    // ===== Audit chain =====

    let latest = stack.audit.current_seq();
    assert!(latest > 0, "Lifecycle should have produced audit entries");
    assert!(
        stack.audit.verify_chain(1, latest).unwrap(),
        "Audit chain should verify after a full lifecycle"
    );
}

#[test]
fn test_signing_order_enforced() {
    let temp_dir = TempDir::new().unwrap();
    let stack = create_test_stack(&temp_dir, true);

    let creator = Uuid::new_v4();
    let first_signer = Uuid::new_v4();
    let second_signer = Uuid::new_v4();

    register_key(&stack, first_signer, "1111");
    register_key(&stack, second_signer, "2222");

    let document = register_document(&stack, creator, "Sequential Approval");
    let detail = stack
        .workflow
        .create_request(CreateRequestInput {
            document_id: document.document_id,
            creator_id: creator,
            signers: vec![
                signer_spec("first@example.com", first_signer, Some(1)),
                signer_spec("second@example.com", second_signer, Some(2)),
            ],
            message: None,
            expires_at: None,
        })
        .unwrap();

    let request_id = detail.request.id;
    stack.workflow.mark_sent(&request_id).unwrap();

    // Second signer cannot jump the queue
    let err = stack
        .workflow
        .sign(&request_id, sign_input(second_signer, "2222"))
        .unwrap_err();
    assert!(
        matches!(err, EsignError::SigningOrderNotReached(_)),
        "Out-of-order signing should be rejected: {err}"
    );

    stack
        .workflow
        .sign(&request_id, sign_input(first_signer, "1111"))
        .expect("First in order should sign");

    let second = stack
        .workflow
        .sign(&request_id, sign_input(second_signer, "2222"))
        .expect("Second in order should sign after the first");
    assert!(second.all_signed);
    assert_eq!(second.request_status, RequestStatus::Signed);
}

#[test]
fn test_cancel_requires_creator_and_cascades() {
    let temp_dir = TempDir::new().unwrap();
    let stack = create_test_stack(&temp_dir, false);

    let creator = Uuid::new_v4();
    let signer = Uuid::new_v4();
    let outsider = Uuid::new_v4();

    register_key(&stack, signer, "4321");

    let document = register_document(&stack, creator, "Rescinded Offer");
    let detail = stack
        .workflow
        .create_request(CreateRequestInput {
            document_id: document.document_id,
            creator_id: creator,
            signers: vec![signer_spec("signer@example.com", signer, None)],
            message: None,
            expires_at: None,
        })
        .unwrap();

    let request_id = detail.request.id;
    stack.workflow.mark_sent(&request_id).unwrap();

    let err = stack
        .workflow
        .cancel(&request_id, CancelRequestInput { actor_id: outsider })
        .unwrap_err();
    assert!(
        matches!(err, EsignError::Forbidden(_)),
        "Only the creator may cancel: {err}"
    );

    let cancelled = stack
        .workflow
        .cancel(&request_id, CancelRequestInput { actor_id: creator })
        .expect("Creator cancellation failed");
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    let detail = stack.workflow.get_detail(&request_id).unwrap();
    assert_eq!(detail.signers[0].status, SignerStatus::Cancelled);

    // Terminal requests reject further signatures and cancellations
    let err = stack
        .workflow
        .sign(&request_id, sign_input(signer, "4321"))
        .unwrap_err();
    assert!(matches!(err, EsignError::InvalidRequestState { .. }));

    let err = stack
        .workflow
        .cancel(&request_id, CancelRequestInput { actor_id: creator })
        .unwrap_err();
    assert!(matches!(err, EsignError::InvalidRequestState { .. }));
}

#[test]
fn test_expiry_sweep_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let stack = create_test_stack(&temp_dir, false);

    let creator = Uuid::new_v4();
    let signer = Uuid::new_v4();

    register_key(&stack, signer, "9876");

    let document = register_document(&stack, creator, "Lapsed Agreement");
    let detail = stack
        .workflow
        .create_request(CreateRequestInput {
            document_id: document.document_id,
            creator_id: creator,
            signers: vec![signer_spec("late@example.com", signer, None)],
            message: None,
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        })
        .unwrap();

    let request_id = detail.request.id;
    stack.workflow.mark_sent(&request_id).unwrap();

    let preview = stack.workflow.list_expiring(chrono::Utc::now()).unwrap();
    assert_eq!(preview.len(), 1, "Overdue request should be listed");

    let swept = stack.workflow.expire(chrono::Utc::now()).unwrap();
    assert_eq!(swept.expired_count, 1);
    assert_eq!(swept.request_ids, vec![request_id]);

    // A second sweep finds nothing
    let swept = stack.workflow.expire(chrono::Utc::now()).unwrap();
    assert_eq!(swept.expired_count, 0);

    let detail = stack.workflow.get_detail(&request_id).unwrap();
    assert_eq!(detail.request.status, RequestStatus::Expired);
    assert_eq!(detail.signers[0].status, SignerStatus::Expired);

    let err = stack
        .workflow
        .sign(&request_id, sign_input(signer, "9876"))
        .unwrap_err();
    assert!(
        matches!(err, EsignError::InvalidRequestState { .. }),
        "Expired requests reject signatures: {err}"
    );
}

#[test]
fn test_session_anomalies_are_flagged() {
    let temp_dir = TempDir::new().unwrap();
    let stack = create_test_stack(&temp_dir, false);

    let creator = Uuid::new_v4();
    let signer = Uuid::new_v4();

    register_key(&stack, signer, "5555");

    let document = register_document(&stack, creator, "Hasty Signature");
    let detail = stack
        .workflow
        .create_request(CreateRequestInput {
            document_id: document.document_id,
            creator_id: creator,
            signers: vec![signer_spec("hasty@example.com", signer, None)],
            message: None,
            expires_at: None,
        })
        .unwrap();

    let request_id = detail.request.id;
    stack.workflow.mark_sent(&request_id).unwrap();

    // An earlier session from a different network and device
    stack
        .monitor
        .start_session(StartSessionRequest {
            signer_id: detail.signers[0].id,
            ip_address: Some("198.51.100.1".to_string()),
            user_agent: Some("integration-test".to_string()),
            device_fingerprint: Some("device-old".to_string()),
        })
        .unwrap();

    let session = stack
        .monitor
        .start_session(StartSessionRequest {
            signer_id: detail.signers[0].id,
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: Some("integration-test".to_string()),
            device_fingerprint: Some("device-new".to_string()),
        })
        .unwrap();

    let mut input = sign_input(signer, "5555");
    input.session_id = Some(session.session_id);
    let response = stack
        .workflow
        .sign(&request_id, input)
        .expect("Flagged sessions must not block signing");

    assert!(response.all_signed);
    let fraud = response.fraud.expect("Session evaluation should be attached");
    assert!(fraud.is_suspicious);
    assert!(fraud.suspicion_reasons.contains(&ANOMALY_SIGNED_TOO_FAST.to_string()));
    assert!(fraud.suspicion_reasons.contains(&ANOMALY_IP_CHANGED.to_string()));
    assert!(fraud.suspicion_reasons.contains(&ANOMALY_DEVICE_CHANGED.to_string()));

    let flagged = stack.monitor.suspicious_sessions(10).unwrap();
    assert!(
        flagged.iter().any(|s| s.id == session.session_id),
        "Flagged session should appear in the suspicious listing"
    );
}

#[test]
fn test_reminders_escalate_for_pending_signers() {
    let temp_dir = TempDir::new().unwrap();
    let stack = create_test_stack(&temp_dir, false);

    let creator = Uuid::new_v4();
    let signer = Uuid::new_v4();

    let document = register_document(&stack, creator, "Awaiting Signature");
    let detail = stack
        .workflow
        .create_request(CreateRequestInput {
            document_id: document.document_id,
            creator_id: creator,
            signers: vec![signer_spec("slow@example.com", signer, None)],
            message: Some("Gentle nudge".to_string()),
            expires_at: None,
        })
        .unwrap();

    let request_id = detail.request.id;
    let signer_row = detail.signers[0].id;
    stack.workflow.mark_sent(&request_id).unwrap();

    // With a zero-day cutoff the signer is immediately due
    let pending = stack.reminders.pending_signers(0).unwrap();
    let entry = pending
        .iter()
        .find(|e| e.signer.id == signer_row)
        .expect("Pending signer should be listed for reminders");
    assert_eq!(entry.document_title, "Awaiting Signature");
    assert_eq!(entry.request_status, RequestStatus::Sent);
    assert_eq!(entry.message.as_deref(), Some("Gentle nudge"));

    let status = stack
        .reminders
        .record(esign_service::esign::types::RecordReminderRequest {
            signer_id: signer_row,
            level: 1,
        })
        .unwrap();
    assert_eq!(status.current_level, 1);
    assert_eq!(status.next_level, Some(2));

    for level in 2..=3 {
        stack
            .reminders
            .record(esign_service::esign::types::RecordReminderRequest {
                signer_id: signer_row,
                level,
            })
            .unwrap();
    }

    let status = stack.reminders.status(&signer_row).unwrap();
    assert_eq!(status.current_level, 3);
    assert_eq!(status.next_level, None, "Escalation stops at the ceiling");
    assert_eq!(status.reminders.len(), 3);
}
