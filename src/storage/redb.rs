//! ReDB-backed storage for the e-signature service.
//!
//! All state-machine transitions that must be atomic (key registration,
//! request creation with its signer rows, recording a signature together
//! with the all-signed check, cancellation and expiry cascades) run as
//! single write transactions here. Values are JSON-serialized records;
//! range scans over `{parent_id}/{suffix}` keys stand in for secondary
//! indexes.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::{EsignError, EsignResult};
use crate::esign::types::{
    CompletionCertificate, DocumentId, DocumentRecord, DocumentSignature, DocumentStatus,
    PendingSignerEntry, ReminderRecord, RequestId, RequestSigner, RequestStatus, SessionId,
    SignatureRequest, SignerId, SignerStatus, SigningKey, SigningSession, UserId,
};

const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const SIGNING_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("signing_keys");
const ACTIVE_KEY_BY_USER: TableDefinition<&str, &[u8]> = TableDefinition::new("active_key_by_user");
const SIGNATURES: TableDefinition<&str, &[u8]> = TableDefinition::new("document_signatures");
const SIGNATURES_BY_DOCUMENT: TableDefinition<&str, &[u8]> =
    TableDefinition::new("signatures_by_document");
const REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("signature_requests");
const REQUEST_SIGNERS: TableDefinition<&str, &[u8]> = TableDefinition::new("request_signers");
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("signing_sessions");
const SESSIONS_BY_SIGNER: TableDefinition<&str, &[u8]> =
    TableDefinition::new("sessions_by_signer");
const REMINDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("reminders");
const CERTIFICATES: TableDefinition<&str, &[u8]> = TableDefinition::new("certificates");
const AUDIT_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_log");

/// Range bounds covering every key of the form `{prefix}/...`.
///
/// Key segments are UUIDs, zero-padded integers, or levels, none of which
/// contain `/`. `'0'` is the next byte after `'/'`, so `{prefix}/` ..
/// `{prefix}0` is exactly the child range.
fn child_range(prefix: &str) -> (String, String) {
    (format!("{prefix}/"), format!("{prefix}0"))
}

/// Sortable timestamp segment for index keys.
fn ts_key(ts: DateTime<Utc>) -> String {
    format!("{:020}", ts.timestamp_micros())
}

/// Storage wrapper for ReDB.
///
/// Thread-safe via internal Arc. Clone is cheap.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open or create a database at the given path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open(path: &Path) -> EsignResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path).map_err(|e| EsignError::Storage(e.to_string()))?;
        Self::init_tables(&db)?;

        tracing::info!(path = %path.display(), "Opened storage database");

        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory database for testing.
    pub fn open_memory() -> EsignResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| EsignError::Storage(e.to_string()))?;
        Self::init_tables(&db)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn init_tables(db: &Database) -> EsignResult<()> {
        // Just opening the tables creates them if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DOCUMENTS)?;
            let _ = write_txn.open_table(SIGNING_KEYS)?;
            let _ = write_txn.open_table(ACTIVE_KEY_BY_USER)?;
            let _ = write_txn.open_table(SIGNATURES)?;
            let _ = write_txn.open_table(SIGNATURES_BY_DOCUMENT)?;
            let _ = write_txn.open_table(REQUESTS)?;
            let _ = write_txn.open_table(REQUEST_SIGNERS)?;
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(SESSIONS_BY_SIGNER)?;
            let _ = write_txn.open_table(REMINDERS)?;
            let _ = write_txn.open_table(CERTIFICATES)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Store a document record.
    pub fn put_document(&self, doc: &DocumentRecord) -> EsignResult<()> {
        let value = serde_json::to_vec(doc)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOCUMENTS)?;
            table.insert(doc.id.to_string().as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(document_id = %doc.id, status = %doc.status, "Stored document record");
        Ok(())
    }

    /// Get a document record by ID.
    pub fn get_document(&self, document_id: &DocumentId) -> EsignResult<Option<DocumentRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS)?;
        match table.get(document_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Signing Keys
    // =========================================================================

    /// Register a new signing key for a user.
    ///
    /// Revokes the previous active key in the same transaction when one
    /// exists; with `purge_revoked` its MAC key material is dropped as
    /// well. Returns the revoked key's ID.
    pub fn register_signing_key(
        &self,
        key: &SigningKey,
        purge_revoked: bool,
    ) -> EsignResult<Option<Uuid>> {
        let value = serde_json::to_vec(key)?;
        let user_key = key.user_id.to_string();
        let write_txn = self.db.begin_write()?;
        let revoked_id = {
            let mut keys = write_txn.open_table(SIGNING_KEYS)?;
            let mut active = write_txn.open_table(ACTIVE_KEY_BY_USER)?;

            let previous: Option<Uuid> = match active.get(user_key.as_str())? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            if let Some(old_id) = previous {
                let old_key = old_id.to_string();
                let mut old: SigningKey = match keys.get(old_key.as_str())? {
                    Some(value) => serde_json::from_slice(value.value())?,
                    None => {
                        return Err(EsignError::Storage(format!(
                            "active key {old_id} missing for user {}",
                            key.user_id
                        )));
                    }
                };
                old.revoked_at = Some(Utc::now());
                if purge_revoked && let Some(mut mac) = old.mac_key.take() {
                    mac.zeroize();
                }
                let old_value = serde_json::to_vec(&old)?;
                keys.insert(old_key.as_str(), old_value.as_slice())?;
            }

            keys.insert(key.id.to_string().as_str(), value.as_slice())?;
            let pointer = serde_json::to_vec(&key.id)?;
            active.insert(user_key.as_str(), pointer.as_slice())?;

            previous
        };
        write_txn.commit()?;
        tracing::debug!(
            key_id = %key.id,
            user_id = %key.user_id,
            revoked = ?revoked_id,
            "Registered signing key"
        );
        Ok(revoked_id)
    }

    /// Overwrite a signing key record (PIN rotation).
    pub fn put_signing_key(&self, key: &SigningKey) -> EsignResult<()> {
        let value = serde_json::to_vec(key)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SIGNING_KEYS)?;
            table.insert(key.id.to_string().as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(key_id = %key.id, "Updated signing key");
        Ok(())
    }

    /// Get a signing key by ID.
    pub fn get_signing_key(&self, key_id: &Uuid) -> EsignResult<Option<SigningKey>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SIGNING_KEYS)?;
        match table.get(key_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get the active signing key for a user, if any.
    pub fn get_active_key(&self, user_id: &UserId) -> EsignResult<Option<SigningKey>> {
        let read_txn = self.db.begin_read()?;
        let active = read_txn.open_table(ACTIVE_KEY_BY_USER)?;
        let key_id: Uuid = match active.get(user_id.to_string().as_str())? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(None),
        };

        let keys = read_txn.open_table(SIGNING_KEYS)?;
        match keys.get(key_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Err(EsignError::Storage(format!(
                "active key {key_id} missing for user {user_id}"
            ))),
        }
    }

    // =========================================================================
    // Document Signatures
    // =========================================================================

    /// Store a standalone signature (outside the request workflow).
    pub fn put_document_signature(&self, sig: &DocumentSignature) -> EsignResult<()> {
        let value = serde_json::to_vec(sig)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SIGNATURES)?;
            table.insert(sig.id.to_string().as_str(), value.as_slice())?;

            let mut index = write_txn.open_table(SIGNATURES_BY_DOCUMENT)?;
            let index_key = format!(
                "{}/{}/{}",
                sig.document_id,
                ts_key(sig.created_at),
                sig.id
            );
            let pointer = serde_json::to_vec(&sig.id)?;
            index.insert(index_key.as_str(), pointer.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(signature_id = %sig.id, document_id = %sig.document_id, "Stored signature");
        Ok(())
    }

    /// Get a signature by ID.
    pub fn get_document_signature(&self, sig_id: &Uuid) -> EsignResult<Option<DocumentSignature>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SIGNATURES)?;
        match table.get(sig_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get the most recent signature a user produced over a document.
    pub fn latest_signature_for_user(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
    ) -> EsignResult<Option<DocumentSignature>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SIGNATURES_BY_DOCUMENT)?;
        let table = read_txn.open_table(SIGNATURES)?;

        let (start, end) = child_range(&document_id.to_string());
        for entry in index.range(start.as_str()..end.as_str())?.rev() {
            let (_, value) = entry?;
            let sig_id: Uuid = serde_json::from_slice(value.value())?;
            if let Some(raw) = table.get(sig_id.to_string().as_str())? {
                let sig: DocumentSignature = serde_json::from_slice(raw.value())?;
                if sig.user_id == *user_id {
                    return Ok(Some(sig));
                }
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Signature Requests
    // =========================================================================

    /// Create a request together with all of its signer rows.
    ///
    /// The referenced document must exist; its status moves to `pending`.
    /// Nothing persists if any part fails.
    pub fn create_request_with_signers(
        &self,
        request: &SignatureRequest,
        signers: &[RequestSigner],
    ) -> EsignResult<()> {
        let request_value = serde_json::to_vec(request)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut documents = write_txn.open_table(DOCUMENTS)?;
            let doc_key = request.document_id.to_string();
            let mut doc: DocumentRecord = match documents.get(doc_key.as_str())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => {
                    return Err(EsignError::DocumentNotFound(
                        request.document_id.to_string(),
                    ));
                }
            };
            doc.status = DocumentStatus::Pending;
            doc.updated_at = request.created_at;
            let doc_value = serde_json::to_vec(&doc)?;
            documents.insert(doc_key.as_str(), doc_value.as_slice())?;

            let mut requests = write_txn.open_table(REQUESTS)?;
            requests.insert(request.id.to_string().as_str(), request_value.as_slice())?;

            let mut rows = write_txn.open_table(REQUEST_SIGNERS)?;
            for signer in signers {
                let key = signer_key(&request.id, signer.position);
                let value = serde_json::to_vec(signer)?;
                rows.insert(key.as_str(), value.as_slice())?;
            }
        }
        write_txn.commit()?;
        tracing::debug!(
            request_id = %request.id,
            document_id = %request.document_id,
            signers = signers.len(),
            "Created signature request"
        );
        Ok(())
    }

    /// Get a signature request by ID.
    pub fn get_request(&self, request_id: &RequestId) -> EsignResult<Option<SignatureRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;
        match table.get(request_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get all signer rows of a request, in creation order.
    pub fn get_request_signers(&self, request_id: &RequestId) -> EsignResult<Vec<RequestSigner>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REQUEST_SIGNERS)?;
        let (start, end) = child_range(&request_id.to_string());

        let signers: Result<Vec<RequestSigner>, EsignError> = table
            .range(start.as_str()..end.as_str())?
            .map(|entry| {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(value.value())?)
            })
            .collect();

        signers
    }

    /// List requests created by a user, newest first.
    pub fn list_requests_by_creator(
        &self,
        creator_id: &UserId,
        status: Option<RequestStatus>,
    ) -> EsignResult<Vec<SignatureRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;

        let mut requests = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let request: SignatureRequest = serde_json::from_slice(value.value())?;
            if request.creator_id != *creator_id {
                continue;
            }
            if let Some(wanted) = status
                && request.status != wanted
            {
                continue;
            }
            requests.push(request);
        }
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Move a request from `pending` to `sent`.
    ///
    /// Marking an already-sent request is a no-op; terminal states are
    /// rejected.
    pub fn mark_request_sent(&self, request_id: &RequestId) -> EsignResult<SignatureRequest> {
        let write_txn = self.db.begin_write()?;
        let request = {
            let mut table = write_txn.open_table(REQUESTS)?;
            let key = request_id.to_string();
            let mut request: SignatureRequest = match table.get(key.as_str())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(EsignError::RequestNotFound(request_id.to_string())),
            };

            match request.status {
                RequestStatus::Pending => {
                    request.status = RequestStatus::Sent;
                    request.updated_at = Utc::now();
                    let value = serde_json::to_vec(&request)?;
                    table.insert(key.as_str(), value.as_slice())?;
                }
                RequestStatus::Sent => {}
                _ => {
                    return Err(EsignError::InvalidRequestState {
                        expected: "pending or sent".to_string(),
                        actual: request.status.to_string(),
                    });
                }
            }
            request
        };
        write_txn.commit()?;
        tracing::debug!(request_id = %request_id, "Marked request sent");
        Ok(request)
    }

    /// Record a signer's signature and complete the request if they were
    /// the last one.
    ///
    /// In one transaction: locates the matching pending signer row,
    /// enforces signing order when asked, persists the signature, updates
    /// the row, and when every signer has now signed flips the request
    /// and its document to `signed`.
    pub fn record_signer_signed(
        &self,
        request_id: &RequestId,
        signature: &DocumentSignature,
        signer_email: Option<&str>,
        enforce_order: bool,
    ) -> EsignResult<SignedOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut requests = write_txn.open_table(REQUESTS)?;
            let request_key = request_id.to_string();
            let mut request: SignatureRequest = match requests.get(request_key.as_str())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(EsignError::RequestNotFound(request_id.to_string())),
            };
            if !request.status.is_signable() {
                return Err(EsignError::InvalidRequestState {
                    expected: "pending or sent".to_string(),
                    actual: request.status.to_string(),
                });
            }

            let mut rows = write_txn.open_table(REQUEST_SIGNERS)?;
            let (start, end) = child_range(&request_key);
            let mut signers: Vec<RequestSigner> = Vec::new();
            for entry in rows.range(start.as_str()..end.as_str())? {
                let (_, value) = entry?;
                signers.push(serde_json::from_slice(value.value())?);
            }

            let matched = signers
                .iter()
                .filter(|s| s.matches_identity(signature.user_id, signer_email))
                .collect::<Vec<_>>();
            if matched.is_empty() {
                return Err(EsignError::SignerNotFound(
                    "user is not a signer on this request".to_string(),
                ));
            }
            let target = match matched.iter().find(|s| s.status == SignerStatus::Pending) {
                Some(signer) => (*signer).clone(),
                None => {
                    return Err(EsignError::SignerNotFound(
                        "signer has already signed or is no longer pending".to_string(),
                    ));
                }
            };

            if enforce_order {
                let blocking = signers.iter().find(|s| {
                    s.status == SignerStatus::Pending
                        && (s.order_index, s.position) < (target.order_index, target.position)
                });
                if let Some(earlier) = blocking {
                    return Err(EsignError::SigningOrderNotReached(format!(
                        "signer {} must sign first",
                        earlier.signer_email
                    )));
                }
            }

            let mut sigs = write_txn.open_table(SIGNATURES)?;
            let sig_value = serde_json::to_vec(signature)?;
            sigs.insert(signature.id.to_string().as_str(), sig_value.as_slice())?;
            let mut sig_index = write_txn.open_table(SIGNATURES_BY_DOCUMENT)?;
            let index_key = format!(
                "{}/{}/{}",
                signature.document_id,
                ts_key(signature.created_at),
                signature.id
            );
            let pointer = serde_json::to_vec(&signature.id)?;
            sig_index.insert(index_key.as_str(), pointer.as_slice())?;

            let mut signed_row = target.clone();
            signed_row.status = SignerStatus::Signed;
            signed_row.signed_at = Some(signature.created_at);
            signed_row.signature_id = Some(signature.id);
            let row_key = signer_key(request_id, signed_row.position);
            let row_value = serde_json::to_vec(&signed_row)?;
            rows.insert(row_key.as_str(), row_value.as_slice())?;

            let all_signed = signers
                .iter()
                .filter(|s| s.id != signed_row.id)
                .all(|s| s.status == SignerStatus::Signed);

            if all_signed {
                request.status = RequestStatus::Signed;
                request.updated_at = signature.created_at;
                let request_value = serde_json::to_vec(&request)?;
                requests.insert(request_key.as_str(), request_value.as_slice())?;

                let mut documents = write_txn.open_table(DOCUMENTS)?;
                let doc_key = request.document_id.to_string();
                let doc: Option<DocumentRecord> = match documents.get(doc_key.as_str())? {
                    Some(value) => Some(serde_json::from_slice(value.value())?),
                    None => None,
                };
                if let Some(mut doc) = doc {
                    doc.status = DocumentStatus::Signed;
                    doc.updated_at = signature.created_at;
                    let doc_value = serde_json::to_vec(&doc)?;
                    documents.insert(doc_key.as_str(), doc_value.as_slice())?;
                }
            }

            SignedOutcome {
                signer: signed_row,
                request,
                all_signed,
            }
        };
        write_txn.commit()?;
        tracing::debug!(
            request_id = %request_id,
            signature_id = %signature.id,
            all_signed = outcome.all_signed,
            "Recorded signer signature"
        );
        Ok(outcome)
    }

    /// Cancel a request and cascade its pending signers.
    ///
    /// The state check runs inside the transaction so a concurrent
    /// completion cannot be overwritten.
    pub fn cancel_request(&self, request_id: &RequestId) -> EsignResult<(SignatureRequest, usize)> {
        let write_txn = self.db.begin_write()?;
        let (request, cascaded) = {
            let mut requests = write_txn.open_table(REQUESTS)?;
            let key = request_id.to_string();
            let mut request: SignatureRequest = match requests.get(key.as_str())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(EsignError::RequestNotFound(request_id.to_string())),
            };
            if request.status.is_terminal() {
                return Err(EsignError::InvalidRequestState {
                    expected: "pending or sent".to_string(),
                    actual: request.status.to_string(),
                });
            }

            let now = Utc::now();
            request.status = RequestStatus::Cancelled;
            request.updated_at = now;
            let value = serde_json::to_vec(&request)?;
            requests.insert(key.as_str(), value.as_slice())?;

            let mut rows = write_txn.open_table(REQUEST_SIGNERS)?;
            let cascaded = cascade_pending_signers(&mut rows, request_id, SignerStatus::Cancelled)?;
            (request, cascaded)
        };
        write_txn.commit()?;
        tracing::debug!(request_id = %request_id, cascaded, "Cancelled signature request");
        Ok((request, cascaded))
    }

    /// Expire every live request whose deadline has passed.
    ///
    /// Pending signer rows of each expired request cascade to `expired`.
    /// Returns the updated requests. The whole sweep is one transaction.
    pub fn expire_overdue_requests(
        &self,
        now: DateTime<Utc>,
    ) -> EsignResult<Vec<SignatureRequest>> {
        let write_txn = self.db.begin_write()?;
        let expired = {
            let mut requests = write_txn.open_table(REQUESTS)?;

            let mut overdue: Vec<SignatureRequest> = Vec::new();
            for entry in requests.iter()? {
                let (_, value) = entry?;
                let request: SignatureRequest = serde_json::from_slice(value.value())?;
                if request.status.is_signable() && request.is_past_deadline(now) {
                    overdue.push(request);
                }
            }

            let mut rows = write_txn.open_table(REQUEST_SIGNERS)?;
            for request in &mut overdue {
                request.status = RequestStatus::Expired;
                request.updated_at = now;
                let value = serde_json::to_vec(&request)?;
                requests.insert(request.id.to_string().as_str(), value.as_slice())?;
                cascade_pending_signers(&mut rows, &request.id, SignerStatus::Expired)?;
            }
            overdue
        };
        write_txn.commit()?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue signature requests");
        }
        Ok(expired)
    }

    /// List live requests whose deadline has passed, without mutating them.
    pub fn list_overdue_requests(&self, now: DateTime<Utc>) -> EsignResult<Vec<SignatureRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;

        let mut overdue = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let request: SignatureRequest = serde_json::from_slice(value.value())?;
            if request.status.is_signable() && request.is_past_deadline(now) {
                overdue.push(request);
            }
        }
        overdue.sort_by_key(|r| r.expires_at);
        Ok(overdue)
    }

    /// Pending signers on live requests created before the cutoff, joined
    /// with their request and document for reminder dispatch.
    pub fn pending_signers_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> EsignResult<Vec<PendingSignerEntry>> {
        let read_txn = self.db.begin_read()?;
        let rows = read_txn.open_table(REQUEST_SIGNERS)?;
        let requests = read_txn.open_table(REQUESTS)?;
        let documents = read_txn.open_table(DOCUMENTS)?;

        let mut entries = Vec::new();
        for entry in rows.iter()? {
            let (_, value) = entry?;
            let signer: RequestSigner = serde_json::from_slice(value.value())?;
            if signer.status != SignerStatus::Pending {
                continue;
            }

            let request: SignatureRequest =
                match requests.get(signer.request_id.to_string().as_str())? {
                    Some(value) => serde_json::from_slice(value.value())?,
                    None => continue,
                };
            if !request.status.is_signable() || request.created_at >= cutoff {
                continue;
            }

            let doc: DocumentRecord = match documents.get(request.document_id.to_string().as_str())?
            {
                Some(value) => serde_json::from_slice(value.value())?,
                None => continue,
            };

            entries.push(PendingSignerEntry {
                signer,
                request_id: request.id,
                request_status: request.status,
                request_created_at: request.created_at,
                expires_at: request.expires_at,
                document_id: doc.id,
                document_title: doc.title,
                message: request.message.clone(),
            });
        }
        entries.sort_by(|a, b| {
            (a.request_created_at, a.signer.position)
                .cmp(&(b.request_created_at, b.signer.position))
        });
        Ok(entries)
    }

    // =========================================================================
    // Signing Sessions
    // =========================================================================

    /// Store a signing session and its per-signer index entry.
    pub fn put_signing_session(&self, session: &SigningSession) -> EsignResult<()> {
        let value = serde_json::to_vec(session)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            table.insert(session.id.to_string().as_str(), value.as_slice())?;

            let mut index = write_txn.open_table(SESSIONS_BY_SIGNER)?;
            let index_key = format!(
                "{}/{}/{}",
                session.signer_id,
                ts_key(session.started_at),
                session.id
            );
            let pointer = serde_json::to_vec(&session.id)?;
            index.insert(index_key.as_str(), pointer.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(session_id = %session.id, signer_id = %session.signer_id, "Stored signing session");
        Ok(())
    }

    /// Get a signing session by ID.
    pub fn get_signing_session(
        &self,
        session_id: &SessionId,
    ) -> EsignResult<Option<SigningSession>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;
        match table.get(session_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Most recent session for a signer other than the one given.
    pub fn latest_prior_session(
        &self,
        signer_id: &SignerId,
        exclude: &SessionId,
    ) -> EsignResult<Option<SigningSession>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SESSIONS_BY_SIGNER)?;
        let table = read_txn.open_table(SESSIONS)?;

        let (start, end) = child_range(&signer_id.to_string());
        for entry in index.range(start.as_str()..end.as_str())?.rev() {
            let (_, value) = entry?;
            let session_id: Uuid = serde_json::from_slice(value.value())?;
            if session_id == *exclude {
                continue;
            }
            if let Some(raw) = table.get(session_id.to_string().as_str())? {
                return Ok(Some(serde_json::from_slice(raw.value())?));
            }
        }
        Ok(None)
    }

    /// Sessions flagged by the fraud heuristics, newest first.
    pub fn suspicious_sessions(&self, limit: usize) -> EsignResult<Vec<SigningSession>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        let mut flagged = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let session: SigningSession = serde_json::from_slice(value.value())?;
            if session.is_suspicious {
                flagged.push(session);
            }
        }
        flagged.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        flagged.truncate(limit);
        Ok(flagged)
    }

    // =========================================================================
    // Reminders
    // =========================================================================

    /// Record a reminder at a level for a signer.
    ///
    /// Returns `false` without writing when that level was already
    /// recorded.
    pub fn record_reminder(&self, reminder: &ReminderRecord) -> EsignResult<bool> {
        let key = reminder_key(&reminder.signer_id, reminder.reminder_level);
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(REMINDERS)?;
            if table.get(key.as_str())?.is_some() {
                false
            } else {
                let value = serde_json::to_vec(reminder)?;
                table.insert(key.as_str(), value.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        tracing::debug!(
            signer_id = %reminder.signer_id,
            level = reminder.reminder_level,
            inserted,
            "Recorded reminder"
        );
        Ok(inserted)
    }

    /// All reminders recorded for a signer, in level order.
    pub fn reminders_for_signer(&self, signer_id: &SignerId) -> EsignResult<Vec<ReminderRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REMINDERS)?;
        let (start, end) = child_range(&signer_id.to_string());

        let reminders: Result<Vec<ReminderRecord>, EsignError> = table
            .range(start.as_str()..end.as_str())?
            .map(|entry| {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(value.value())?)
            })
            .collect();

        reminders
    }

    // =========================================================================
    // Completion Certificates
    // =========================================================================

    /// Store a certificate, replacing any previous one for the request.
    pub fn upsert_certificate(&self, cert: &CompletionCertificate) -> EsignResult<()> {
        let value = serde_json::to_vec(cert)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CERTIFICATES)?;
            table.insert(cert.request_id.to_string().as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(request_id = %cert.request_id, "Stored completion certificate");
        Ok(())
    }

    /// Get the certificate for a request.
    pub fn get_certificate(
        &self,
        request_id: &RequestId,
    ) -> EsignResult<Option<CompletionCertificate>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CERTIFICATES)?;
        match table.get(request_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Audit Log
    // =========================================================================

    /// Store a single audit entry by sequence number.
    pub fn put_audit_entry<T>(&self, entry: &T) -> EsignResult<()>
    where
        T: serde::Serialize + AsRef<crate::audit::AuditEntry>,
    {
        let audit_entry = entry.as_ref();
        let value = serde_json::to_vec(audit_entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            table.insert(audit_entry.seq, value.as_slice())?;
        }
        write_txn.commit()?;
        tracing::trace!(seq = audit_entry.seq, "Stored audit entry");
        Ok(())
    }

    /// Get a single audit entry by sequence number.
    pub fn get_audit_entry(&self, seq: u64) -> EsignResult<Option<crate::audit::AuditEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;
        match table.get(seq)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get audit log entries in a sequence range.
    pub fn get_audit_log_range(
        &self,
        start: u64,
        end: u64,
    ) -> EsignResult<Vec<crate::audit::AuditEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;

        let entries: Result<Vec<_>, EsignError> = table
            .range(start..end)?
            .map(|entry| {
                let (_, v) = entry?;
                Ok(serde_json::from_slice(v.value())?)
            })
            .collect();

        entries
    }

    /// Get the latest audit log sequence number.
    pub fn get_latest_audit_seq(&self) -> EsignResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;

        let latest = table.iter()?.last().transpose()?.map(|(k, _)| k.value());

        Ok(latest)
    }
}

/// Result of recording a signer's signature.
#[derive(Debug, Clone)]
pub struct SignedOutcome {
    /// The signer row after the update.
    pub signer: RequestSigner,
    /// The request after the update (flipped to `signed` when complete).
    pub request: SignatureRequest,
    /// Whether this signature completed the request.
    pub all_signed: bool,
}

fn signer_key(request_id: &RequestId, position: u32) -> String {
    format!("{request_id}/{position:04}")
}

fn reminder_key(signer_id: &SignerId, level: u8) -> String {
    format!("{signer_id}/{level}")
}

/// Flip every pending signer row of a request to the given terminal
/// status. Returns how many rows changed.
fn cascade_pending_signers(
    rows: &mut redb::Table<'_, &'static str, &'static [u8]>,
    request_id: &RequestId,
    status: SignerStatus,
) -> EsignResult<usize> {
    let (start, end) = child_range(&request_id.to_string());
    let mut pending: Vec<RequestSigner> = Vec::new();
    for entry in rows.range(start.as_str()..end.as_str())? {
        let (_, value) = entry?;
        let signer: RequestSigner = serde_json::from_slice(value.value())?;
        if signer.status == SignerStatus::Pending {
            pending.push(signer);
        }
    }

    let count = pending.len();
    for mut signer in pending {
        signer.status = status;
        let key = signer_key(request_id, signer.position);
        let value = serde_json::to_vec(&signer)?;
        rows.insert(key.as_str(), value.as_slice())?;
    }
    Ok(count)
}
