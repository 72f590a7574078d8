//! Multi-signer signature request workflow.
//!
//! A request routes one document to a set of recipients. It starts
//! `pending`, moves to `sent` when dispatched, and reaches exactly one
//! terminal state: `signed` when every signer finishes, `cancelled` by
//! its creator, or `expired` by the deadline sweep. Completion checks
//! run inside the storage transaction that records the signature, so
//! racing signers cannot leave a request stuck short of `signed`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome};
use crate::error::{EsignError, EsignResult};
use crate::esign::fraud::SessionMonitor;
use crate::esign::identity::IdentityManager;
use crate::esign::types::{
    CancelRequestInput, CreateRequestInput, ExpireSweepResponse, RequestDetail, RequestId,
    RequestSigner, RequestStatus, SignRequestInput, SignResponse, SignatureMeta, SignatureRequest,
    SignerStatus, UserId,
};
use crate::storage::Storage;

#[derive(Clone)]
pub struct RequestWorkflow {
    storage: Storage,
    identity: IdentityManager,
    monitor: SessionMonitor,
    audit: Arc<AuditLogger>,
    enforce_order: bool,
    default_expiry_days: i64,
}

impl RequestWorkflow {
    pub fn new(
        storage: Storage,
        identity: IdentityManager,
        monitor: SessionMonitor,
        audit: Arc<AuditLogger>,
        enforce_order: bool,
        default_expiry_days: i64,
    ) -> Self {
        Self {
            storage,
            identity,
            monitor,
            audit,
            enforce_order,
            default_expiry_days,
        }
    }

    /// Create a request with one signer row per recipient.
    ///
    /// Signer rows and the request persist in a single transaction; a
    /// request with zero signers can never exist. `order_index` defaults
    /// to the recipient's position (1-based), and `expires_at` defaults
    /// to the configured TTL.
    pub fn create_request(&self, input: CreateRequestInput) -> EsignResult<RequestDetail> {
        if input.signers.is_empty() {
            return Err(EsignError::InvalidInput(
                "at least one signer is required".to_string(),
            ));
        }
        for spec in &input.signers {
            if spec.signer_email.trim().is_empty() {
                return Err(EsignError::InvalidInput(
                    "signer email must not be empty".to_string(),
                ));
            }
        }

        let expires_at = input
            .expires_at
            .or_else(|| Some(Utc::now() + Duration::days(self.default_expiry_days)));
        let request = SignatureRequest::new(
            input.document_id,
            input.creator_id,
            input.message.clone(),
            expires_at,
        );

        let signers: Vec<RequestSigner> = input
            .signers
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                let position = idx as u32;
                RequestSigner {
                    id: Uuid::new_v4(),
                    request_id: request.id,
                    signer_user_id: spec.signer_user_id,
                    signer_email: spec.signer_email.trim().to_string(),
                    signer_name: spec.signer_name.clone(),
                    order_index: spec.order_index.unwrap_or(position + 1),
                    position,
                    status: SignerStatus::Pending,
                    signed_at: None,
                    signature_id: None,
                }
            })
            .collect();

        self.storage.create_request_with_signers(&request, &signers)?;
        tracing::info!(
            request_id = %request.id,
            document_id = %request.document_id,
            signers = signers.len(),
            "Created signature request"
        );
        self.audit_log(
            AuditEventType::RequestCreated,
            AuditActor::User {
                user_id: input.creator_id,
            },
            Some(request.document_id),
            Some(request.id),
            AuditOutcome::Success,
            Some(serde_json::json!({ "signer_count": signers.len() })),
        );

        Ok(RequestDetail { request, signers })
    }

    /// A request with its signers, sorted by `(order_index, insertion)`.
    pub fn get_detail(&self, request_id: &RequestId) -> EsignResult<RequestDetail> {
        let request = self
            .storage
            .get_request(request_id)?
            .ok_or_else(|| EsignError::RequestNotFound(request_id.to_string()))?;
        let mut signers = self.storage.get_request_signers(request_id)?;
        signers.sort_by_key(|s| (s.order_index, s.position));

        Ok(RequestDetail { request, signers })
    }

    /// Requests created by one user, newest first, optionally filtered
    /// by status.
    pub fn list_by_creator(
        &self,
        creator_id: &UserId,
        status: Option<RequestStatus>,
    ) -> EsignResult<Vec<SignatureRequest>> {
        self.storage.list_requests_by_creator(creator_id, status)
    }

    /// Record that the request was dispatched to its recipients.
    ///
    /// Dispatch is retried by the caller, so marking an already-sent
    /// request succeeds without a change.
    pub fn mark_sent(&self, request_id: &RequestId) -> EsignResult<SignatureRequest> {
        let request = self.storage.mark_request_sent(request_id)?;
        self.audit_log(
            AuditEventType::RequestSent,
            AuditActor::Service {
                name: "request-dispatcher".to_string(),
            },
            Some(request.document_id),
            Some(request.id),
            AuditOutcome::Success,
            None,
        );
        Ok(request)
    }

    /// Full signing flow for one recipient.
    ///
    /// Locates the caller's pending signer row, verifies the PIN and
    /// produces the signature, then records it atomically together with
    /// the completion check. Session evaluation runs last and is
    /// advisory: its failures are logged, never returned.
    pub fn sign(
        &self,
        request_id: &RequestId,
        input: SignRequestInput,
    ) -> EsignResult<SignResponse> {
        let request = self
            .storage
            .get_request(request_id)?
            .ok_or_else(|| EsignError::RequestNotFound(request_id.to_string()))?;
        if !request.status.is_signable() {
            return Err(EsignError::InvalidRequestState {
                expected: "pending or sent".to_string(),
                actual: request.status.to_string(),
            });
        }

        // Resolve the signer before producing any signature, so a caller
        // who is not on the request never exercises the signing key.
        let signers = self.storage.get_request_signers(request_id)?;
        let matched: Vec<&RequestSigner> = signers
            .iter()
            .filter(|s| s.matches_identity(input.user_id, input.signer_email.as_deref()))
            .collect();
        if matched.is_empty() {
            return Err(EsignError::SignerNotFound(
                "user is not a signer on this request".to_string(),
            ));
        }
        if !matched.iter().any(|s| s.status == SignerStatus::Pending) {
            return Err(EsignError::SignerNotFound(
                "signer has already signed or is no longer pending".to_string(),
            ));
        }

        let document = self
            .storage
            .get_document(&request.document_id)?
            .ok_or_else(|| EsignError::DocumentNotFound(request.document_id.to_string()))?;

        let signature = self.identity.sign_document(
            &input.user_id,
            &input.pin,
            &document,
            SignatureMeta {
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
            },
        )?;

        let outcome = self.storage.record_signer_signed(
            request_id,
            &signature,
            input.signer_email.as_deref(),
            self.enforce_order,
        )?;

        tracing::info!(
            request_id = %request_id,
            signature_id = %signature.id,
            all_signed = outcome.all_signed,
            "Signer completed"
        );
        self.audit_log(
            AuditEventType::DocumentSigned,
            AuditActor::User {
                user_id: input.user_id,
            },
            Some(document.id),
            Some(*request_id),
            AuditOutcome::Success,
            Some(serde_json::json!({
                "signature_id": signature.id,
                "signer_id": outcome.signer.id,
                "all_signed": outcome.all_signed,
            })),
        );

        let fraud = match input.session_id {
            Some(session_id) => {
                match self.monitor.evaluate(&session_id, signature.created_at) {
                    Ok(evaluation) => Some(evaluation),
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "Session evaluation failed after signing"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(SignResponse {
            signature_id: signature.id,
            signer_id: outcome.signer.id,
            all_signed: outcome.all_signed,
            request_status: outcome.request.status,
            fraud,
        })
    }

    /// Cancel a request. Only its creator may cancel, and only from a
    /// non-terminal state.
    pub fn cancel(
        &self,
        request_id: &RequestId,
        input: CancelRequestInput,
    ) -> EsignResult<SignatureRequest> {
        let request = self
            .storage
            .get_request(request_id)?
            .ok_or_else(|| EsignError::RequestNotFound(request_id.to_string()))?;
        if request.creator_id != input.actor_id {
            return Err(EsignError::Forbidden(
                "only the request creator can cancel".to_string(),
            ));
        }

        let (request, cascaded) = self.storage.cancel_request(request_id)?;
        tracing::info!(request_id = %request_id, cascaded, "Cancelled signature request");
        self.audit_log(
            AuditEventType::RequestCancelled,
            AuditActor::User {
                user_id: input.actor_id,
            },
            Some(request.document_id),
            Some(request.id),
            AuditOutcome::Success,
            Some(serde_json::json!({ "cascaded_signers": cascaded })),
        );

        Ok(request)
    }

    /// Expire every live request whose deadline has passed.
    ///
    /// Safe to re-run: a second sweep with the same `now` finds nothing.
    pub fn expire(&self, now: DateTime<Utc>) -> EsignResult<ExpireSweepResponse> {
        let expired = self.storage.expire_overdue_requests(now)?;
        for request in &expired {
            self.audit_log(
                AuditEventType::RequestExpired,
                AuditActor::Service {
                    name: "expiry-sweep".to_string(),
                },
                Some(request.document_id),
                Some(request.id),
                AuditOutcome::Success,
                None,
            );
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue requests");
        }

        Ok(ExpireSweepResponse {
            expired_count: expired.len(),
            request_ids: expired.iter().map(|r| r.id).collect(),
        })
    }

    /// Live requests already past their deadline, without mutating them.
    pub fn list_expiring(&self, now: DateTime<Utc>) -> EsignResult<Vec<SignatureRequest>> {
        self.storage.list_overdue_requests(now)
    }

    fn audit_log(
        &self,
        event_type: AuditEventType,
        actor: AuditActor,
        document_id: Option<Uuid>,
        request_id: Option<Uuid>,
        outcome: AuditOutcome,
        context: Option<serde_json::Value>,
    ) {
        if let Err(e) = self
            .audit
            .append(event_type, actor, document_id, request_id, outcome, context)
        {
            tracing::warn!(error = %e, event = %event_type, "Failed to append audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyRetention;
    use crate::esign::signature;
    use crate::esign::types::{
        DocumentRecord, DocumentStatus, RegisterKeyRequest, SignerSpec, StartSessionRequest,
    };
    use crate::storage::BlobStore;
    use tempfile::TempDir;

    fn test_env(enforce_order: bool) -> (TempDir, BlobStore, RequestWorkflow) {
        let dir = TempDir::new().expect("tempdir");
        let storage = Storage::open_memory().expect("storage");
        let blob = BlobStore::new(dir.path().join("blobs")).expect("blob store");
        let audit = Arc::new(AuditLogger::new(storage.clone()).expect("audit logger"));
        let identity = IdentityManager::new(
            storage.clone(),
            blob.clone(),
            audit.clone(),
            KeyRetention::Retain,
        );
        let monitor = SessionMonitor::new(storage.clone(), audit.clone(), 10);
        let workflow = RequestWorkflow::new(storage, identity, monitor, audit, enforce_order, 7);
        (dir, blob, workflow)
    }

    fn seed_document(workflow: &RequestWorkflow, blob: &BlobStore, bytes: &[u8]) -> DocumentRecord {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let doc = DocumentRecord {
            id,
            owner_id: Uuid::new_v4(),
            title: "Lease Agreement".into(),
            filename: "lease.pdf".into(),
            storage_path: format!("documents/{id}/lease.pdf"),
            size_bytes: bytes.len() as u64,
            fingerprint: signature::document_fingerprint(bytes),
            status: DocumentStatus::Draft,
            archive_path: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        blob.put(&doc.storage_path, bytes).expect("put blob");
        workflow.storage.put_document(&doc).expect("put document");
        doc
    }

    fn register_key(workflow: &RequestWorkflow, user_id: UserId, pin: &str) {
        workflow
            .identity
            .register(RegisterKeyRequest {
                user_id,
                pin: pin.into(),
                label: None,
            })
            .expect("register key");
    }

    fn spec_for(user_id: Option<UserId>, email: &str, order: Option<u32>) -> SignerSpec {
        SignerSpec {
            signer_email: email.into(),
            signer_name: None,
            signer_user_id: user_id,
            order_index: order,
        }
    }

    fn sign_input(user_id: UserId, pin: &str) -> SignRequestInput {
        SignRequestInput {
            user_id,
            pin: pin.into(),
            signer_email: None,
            session_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn test_create_request_defaults() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"offer letter");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![
                    spec_for(None, "a@example.com", None),
                    spec_for(None, "b@example.com", None),
                ],
                message: Some("please sign".into()),
                expires_at: None,
            })
            .expect("create");

        assert_eq!(detail.request.status, RequestStatus::Pending);
        assert!(detail.request.expires_at.expect("default deadline") > Utc::now());
        assert_eq!(detail.signers[0].order_index, 1);
        assert_eq!(detail.signers[1].order_index, 2);

        let stored_doc = workflow
            .storage
            .get_document(&doc.id)
            .expect("get")
            .expect("some");
        assert_eq!(stored_doc.status, DocumentStatus::Pending);
    }

    #[test]
    fn test_create_request_validation() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"contract");

        let err = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![],
                message: None,
                expires_at: None,
            })
            .expect_err("empty signers");
        assert!(matches!(err, EsignError::InvalidInput(_)));

        let err = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![spec_for(None, "   ", None)],
                message: None,
                expires_at: None,
            })
            .expect_err("blank email");
        assert!(matches!(err, EsignError::InvalidInput(_)));

        let err = workflow
            .create_request(CreateRequestInput {
                document_id: Uuid::new_v4(),
                creator_id: doc.owner_id,
                signers: vec![spec_for(None, "a@example.com", None)],
                message: None,
                expires_at: None,
            })
            .expect_err("missing document");
        assert!(matches!(err, EsignError::DocumentNotFound(_)));
    }

    #[test]
    fn test_sign_flow_completes_request() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"two-party agreement");
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        register_key(&workflow, alice, "1111");
        register_key(&workflow, bob, "2222");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![
                    spec_for(Some(alice), "alice@example.com", None),
                    spec_for(Some(bob), "bob@example.com", None),
                ],
                message: None,
                expires_at: None,
            })
            .expect("create");
        workflow.mark_sent(&detail.request.id).expect("mark sent");

        let first = workflow
            .sign(&detail.request.id, sign_input(alice, "1111"))
            .expect("alice signs");
        assert!(!first.all_signed);
        assert_eq!(first.request_status, RequestStatus::Sent);

        let second = workflow
            .sign(&detail.request.id, sign_input(bob, "2222"))
            .expect("bob signs");
        assert!(second.all_signed);
        assert_eq!(second.request_status, RequestStatus::Signed);

        let after = workflow.get_detail(&detail.request.id).expect("detail");
        assert!(after
            .signers
            .iter()
            .all(|s| s.status == SignerStatus::Signed && s.signature_id.is_some()));
        let stored_doc = workflow
            .storage
            .get_document(&doc.id)
            .expect("get")
            .expect("some");
        assert_eq!(stored_doc.status, DocumentStatus::Signed);
    }

    #[test]
    fn test_sign_rejects_wrong_pin_and_non_signer() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");
        let alice = Uuid::new_v4();
        register_key(&workflow, alice, "1111");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![spec_for(Some(alice), "alice@example.com", None)],
                message: None,
                expires_at: None,
            })
            .expect("create");

        let err = workflow
            .sign(&detail.request.id, sign_input(alice, "9999"))
            .expect_err("wrong pin");
        assert!(matches!(err, EsignError::Unauthorized));

        let outsider = Uuid::new_v4();
        register_key(&workflow, outsider, "3333");
        let err = workflow
            .sign(&detail.request.id, sign_input(outsider, "3333"))
            .expect_err("not a signer");
        assert!(matches!(err, EsignError::SignerNotFound(_)));

        // Neither attempt may touch the signer row.
        let after = workflow.get_detail(&detail.request.id).expect("detail");
        assert_eq!(after.signers[0].status, SignerStatus::Pending);
    }

    #[test]
    fn test_sign_rejects_double_signing() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        register_key(&workflow, alice, "1111");
        register_key(&workflow, bob, "2222");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![
                    spec_for(Some(alice), "alice@example.com", None),
                    spec_for(Some(bob), "bob@example.com", None),
                ],
                message: None,
                expires_at: None,
            })
            .expect("create");

        workflow
            .sign(&detail.request.id, sign_input(alice, "1111"))
            .expect("first");
        let err = workflow
            .sign(&detail.request.id, sign_input(alice, "1111"))
            .expect_err("double sign");
        assert!(matches!(err, EsignError::SignerNotFound(_)));
    }

    #[test]
    fn test_sign_matches_by_email() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");
        let guest = Uuid::new_v4();
        register_key(&workflow, guest, "4444");

        // Recipient invited by email only, no platform account on the row.
        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![spec_for(None, "Guest@Example.com", None)],
                message: None,
                expires_at: None,
            })
            .expect("create");

        let mut input = sign_input(guest, "4444");
        input.signer_email = Some("guest@example.com".into());
        let resp = workflow.sign(&detail.request.id, input).expect("sign");
        assert!(resp.all_signed);
    }

    #[test]
    fn test_signing_order_enforced_when_configured() {
        let (_dir, blob, workflow) = test_env(true);
        let doc = seed_document(&workflow, &blob, b"agreement");
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        register_key(&workflow, first, "1111");
        register_key(&workflow, second, "2222");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![
                    spec_for(Some(first), "first@example.com", Some(1)),
                    spec_for(Some(second), "second@example.com", Some(2)),
                ],
                message: None,
                expires_at: None,
            })
            .expect("create");

        let err = workflow
            .sign(&detail.request.id, sign_input(second, "2222"))
            .expect_err("out of order");
        assert!(matches!(err, EsignError::SigningOrderNotReached(_)));

        workflow
            .sign(&detail.request.id, sign_input(first, "1111"))
            .expect("first in order");
        let resp = workflow
            .sign(&detail.request.id, sign_input(second, "2222"))
            .expect("second in order");
        assert!(resp.all_signed);
    }

    #[test]
    fn test_sign_evaluates_session_advisorily() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");
        let alice = Uuid::new_v4();
        register_key(&workflow, alice, "1111");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![spec_for(Some(alice), "alice@example.com", None)],
                message: None,
                expires_at: None,
            })
            .expect("create");

        let session = workflow
            .monitor
            .start_session(StartSessionRequest {
                signer_id: detail.signers[0].id,
                ip_address: Some("10.0.0.1".into()),
                user_agent: None,
                device_fingerprint: None,
            })
            .expect("start session");

        // Signing immediately after starting the session trips the
        // too-fast heuristic.
        let mut input = sign_input(alice, "1111");
        input.session_id = Some(session.session_id);
        let resp = workflow.sign(&detail.request.id, input).expect("sign");
        let fraud = resp.fraud.expect("evaluation");
        assert!(fraud.is_suspicious);

        // An unknown session must not fail the sign operation.
        let doc2 = seed_document(&workflow, &blob, b"second agreement");
        let detail2 = workflow
            .create_request(CreateRequestInput {
                document_id: doc2.id,
                creator_id: doc2.owner_id,
                signers: vec![spec_for(Some(alice), "alice@example.com", None)],
                message: None,
                expires_at: None,
            })
            .expect("create");
        let mut input = sign_input(alice, "1111");
        input.session_id = Some(Uuid::new_v4());
        let resp = workflow.sign(&detail2.request.id, input).expect("sign");
        assert!(resp.fraud.is_none());
        assert!(resp.all_signed);
    }

    #[test]
    fn test_cancel_requires_creator() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![spec_for(None, "a@example.com", None)],
                message: None,
                expires_at: None,
            })
            .expect("create");

        let err = workflow
            .cancel(
                &detail.request.id,
                CancelRequestInput {
                    actor_id: Uuid::new_v4(),
                },
            )
            .expect_err("not the creator");
        assert!(matches!(err, EsignError::Forbidden(_)));

        let cancelled = workflow
            .cancel(
                &detail.request.id,
                CancelRequestInput {
                    actor_id: doc.owner_id,
                },
            )
            .expect("cancel");
        assert_eq!(cancelled.status, RequestStatus::Cancelled);

        let after = workflow.get_detail(&detail.request.id).expect("detail");
        assert!(after.signers.iter().all(|s| s.status == SignerStatus::Cancelled));
    }

    #[test]
    fn test_mark_sent_transitions() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![spec_for(None, "a@example.com", None)],
                message: None,
                expires_at: None,
            })
            .expect("create");

        let sent = workflow.mark_sent(&detail.request.id).expect("send");
        assert_eq!(sent.status, RequestStatus::Sent);
        let again = workflow.mark_sent(&detail.request.id).expect("resend");
        assert_eq!(again.status, RequestStatus::Sent);

        workflow
            .cancel(
                &detail.request.id,
                CancelRequestInput {
                    actor_id: doc.owner_id,
                },
            )
            .expect("cancel");
        let err = workflow
            .mark_sent(&detail.request.id)
            .expect_err("terminal");
        assert!(matches!(err, EsignError::InvalidRequestState { .. }));
    }

    #[test]
    fn test_expire_sweep_is_idempotent() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![spec_for(None, "a@example.com", None)],
                message: None,
                expires_at: Some(Utc::now() - Duration::hours(1)),
            })
            .expect("create");

        let preview = workflow.list_expiring(Utc::now()).expect("preview");
        assert_eq!(preview.len(), 1);

        let now = Utc::now();
        let sweep = workflow.expire(now).expect("sweep");
        assert_eq!(sweep.expired_count, 1);
        assert_eq!(sweep.request_ids, vec![detail.request.id]);

        let again = workflow.expire(now).expect("second sweep");
        assert_eq!(again.expired_count, 0);

        let after = workflow.get_detail(&detail.request.id).expect("detail");
        assert_eq!(after.request.status, RequestStatus::Expired);
        assert!(after.signers.iter().all(|s| s.status == SignerStatus::Expired));
    }

    #[test]
    fn test_detail_sorted_by_order() {
        let (_dir, blob, workflow) = test_env(false);
        let doc = seed_document(&workflow, &blob, b"agreement");

        let detail = workflow
            .create_request(CreateRequestInput {
                document_id: doc.id,
                creator_id: doc.owner_id,
                signers: vec![
                    spec_for(None, "last@example.com", Some(2)),
                    spec_for(None, "first@example.com", Some(1)),
                ],
                message: None,
                expires_at: None,
            })
            .expect("create");

        let fetched = workflow.get_detail(&detail.request.id).expect("detail");
        assert_eq!(fetched.signers[0].signer_email, "first@example.com");
        assert_eq!(fetched.signers[1].signer_email, "last@example.com");
    }
}
