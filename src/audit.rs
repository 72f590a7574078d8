//! Hash-chained audit log for e-signature operations.
//!
//! Every entry carries the SHA-256 hash of its predecessor and an Ed25519
//! signature over its own canonical bytes, so edits and reordering are
//! detectable after the fact. Appends serialize under a mutex; the sequence
//! counter is atomic so readers never block.
//!
//! Audit emission is advisory: callers log append failures and carry on,
//! so a broken audit store never fails a signing operation.

use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use ed25519_dalek::{SecretKey, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EsignError, EsignResult};
use crate::esign::types::{DocumentId, RequestId, UserId};
use crate::storage::Storage;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Identity events
    KeyRegistered,
    PinRotated,
    // Request lifecycle events
    RequestCreated,
    RequestSent,
    RequestCancelled,
    RequestExpired,
    // Signature events
    DocumentSigned,
    SignatureVerified,
    CertificateBuilt,
    // Workflow support events
    ReminderRecorded,
    SessionFlagged,
    // Document events
    DocumentRegistered,
    DocumentArchived,
    // System events
    ServiceStart,
    ServiceStop,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyRegistered => write!(f, "key_registered"),
            Self::PinRotated => write!(f, "pin_rotated"),
            Self::RequestCreated => write!(f, "request_created"),
            Self::RequestSent => write!(f, "request_sent"),
            Self::RequestCancelled => write!(f, "request_cancelled"),
            Self::RequestExpired => write!(f, "request_expired"),
            Self::DocumentSigned => write!(f, "document_signed"),
            Self::SignatureVerified => write!(f, "signature_verified"),
            Self::CertificateBuilt => write!(f, "certificate_built"),
            Self::ReminderRecorded => write!(f, "reminder_recorded"),
            Self::SessionFlagged => write!(f, "session_flagged"),
            Self::DocumentRegistered => write!(f, "document_registered"),
            Self::DocumentArchived => write!(f, "document_archived"),
            Self::ServiceStart => write!(f, "service_start"),
            Self::ServiceStop => write!(f, "service_stop"),
        }
    }
}

/// Actor that triggered an audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditActor {
    /// A platform user (signer, request creator, document owner).
    User { user_id: UserId },
    /// An internal service caller (expiry sweeps, reminder jobs).
    Service { name: String },
    /// System action (startup, shutdown).
    System,
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure { reason: String },
}

/// A single audit log entry with hash-chain linking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Sequence number (monotonically increasing).
    pub seq: u64,
    /// Timestamp when the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Actor that triggered the event.
    pub actor: AuditActor,
    /// Related document (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    /// Related signature request (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Outcome of the operation.
    pub outcome: AuditOutcome,
    /// Additional context (JSON-serializable data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// SHA-256 hash of the previous entry (hex).
    pub prev_hash: String,
    /// Ed25519 signature of this entry (hex).
    pub signature: String,
}

impl AsRef<Self> for AuditEntry {
    fn as_ref(&self) -> &Self {
        self
    }
}

impl AuditEntry {
    /// Bytes covered by the entry signature: every field except the
    /// signature itself, pipe-delimited so optional fields stay unambiguous.
    fn signing_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.seq.to_be_bytes());
        for part in [
            self.timestamp.to_rfc3339(),
            self.event_type.to_string(),
            serde_json::to_string(&self.actor).unwrap_or_default(),
            self.document_id.map(|id| id.to_string()).unwrap_or_default(),
            self.request_id.map(|id| id.to_string()).unwrap_or_default(),
            serde_json::to_string(&self.outcome).unwrap_or_default(),
            self.context.as_ref().map(ToString::to_string).unwrap_or_default(),
            self.prev_hash.clone(),
        ] {
            buf.push(b'|');
            buf.extend_from_slice(part.as_bytes());
        }
        buf
    }

    /// SHA-256 over the signed payload plus the signature, hex-encoded.
    /// This is the value the next entry records as `prev_hash`.
    pub fn hash(&self) -> String {
        let digest = Sha256::new()
            .chain_update(self.signing_payload())
            .chain_update(self.signature.as_bytes())
            .finalize();
        hex::encode(digest)
    }

    /// Verify the Ed25519 signature on this entry.
    pub fn verify_signature(&self, verifying_key: &VerifyingKey) -> bool {
        let Ok(raw) = hex::decode(&self.signature) else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(&raw) else {
            return false;
        };
        verifying_key.verify(&self.signing_payload(), &signature).is_ok()
    }
}

/// Previous-hash value for the first entry in the chain.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audit logger with hash-chaining and signing.
pub struct AuditLogger {
    storage: Storage,
    signing_key: SigningKey,
    /// Current sequence number (atomic for thread safety).
    current_seq: AtomicU64,
    /// Serialize appends to preserve hash chain integrity.
    append_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create an audit logger with a fresh Ed25519 key.
    ///
    /// The key is ephemeral to this process; entries written before a restart
    /// verify only under the key that signed them (`with_signing_key` accepts
    /// a key loaded from secure storage instead).
    pub fn new(storage: Storage) -> EsignResult<Self> {
        let mut seed: SecretKey = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::with_signing_key(storage, SigningKey::from_bytes(&seed))
    }

    /// Create an audit logger with a specific signing key.
    pub fn with_signing_key(storage: Storage, signing_key: SigningKey) -> EsignResult<Self> {
        let current_seq = storage.get_latest_audit_seq()?.unwrap_or(0);

        Ok(Self {
            storage,
            signing_key,
            current_seq: AtomicU64::new(current_seq),
            append_lock: Mutex::new(()),
        })
    }

    /// Get the verifying key for signature verification.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Get the verifying key as hex.
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.verifying_key().as_bytes())
    }

    /// Hash the entry preceding `seq`, or the genesis value for the first.
    fn parent_hash(&self, seq: u64) -> EsignResult<String> {
        if seq == 1 {
            return Ok(GENESIS_HASH.to_string());
        }
        let parent = self
            .storage
            .get_audit_entry(seq - 1)?
            .ok_or_else(|| EsignError::Storage(format!("audit entry {} missing", seq - 1)))?;
        Ok(parent.hash())
    }

    /// Append a new audit entry and return its sequence number.
    pub fn append(
        &self,
        event_type: AuditEventType,
        actor: AuditActor,
        document_id: Option<DocumentId>,
        request_id: Option<RequestId>,
        outcome: AuditOutcome,
        context: Option<serde_json::Value>,
    ) -> EsignResult<u64> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_e| EsignError::Storage("audit append lock poisoned".to_string()))?;

        let seq = self.current_seq.load(Ordering::SeqCst) + 1;
        let mut entry = AuditEntry {
            seq,
            timestamp: Utc::now(),
            event_type,
            actor,
            document_id,
            request_id,
            outcome,
            context,
            prev_hash: self.parent_hash(seq)?,
            signature: String::new(),
        };
        let signature = self.signing_key.sign(&entry.signing_payload());
        entry.signature = hex::encode(signature.to_bytes());

        self.storage.put_audit_entry(&entry)?;
        self.current_seq.store(seq, Ordering::SeqCst);

        tracing::debug!(seq = seq, event_type = %event_type, "audit entry appended");
        Ok(seq)
    }

    /// Verify hashes, signatures, and sequence continuity over `start..=end`.
    ///
    /// Returns `Ok(true)` if the chain is intact, `Ok(false)` if any link
    /// fails, or an error if entries cannot be loaded.
    pub fn verify_chain(&self, start: u64, end: u64) -> EsignResult<bool> {
        // Sequence numbers begin at 1.
        if start == 0 || start > end {
            return Ok(false);
        }

        let verifying_key = self.verifying_key();
        let mut expected_prev = self.parent_hash(start)?;

        for seq in start..=end {
            let entry = self
                .storage
                .get_audit_entry(seq)?
                .ok_or_else(|| EsignError::Storage(format!("audit entry {seq} missing")))?;

            if entry.seq != seq {
                tracing::warn!(seq = seq, stored = entry.seq, "audit sequence mismatch");
                return Ok(false);
            }
            if entry.prev_hash != expected_prev {
                tracing::warn!(
                    seq = seq,
                    expected = %expected_prev,
                    actual = %entry.prev_hash,
                    "audit hash chain broken"
                );
                return Ok(false);
            }
            if !entry.verify_signature(&verifying_key) {
                tracing::warn!(seq = seq, "audit entry signature invalid");
                return Ok(false);
            }
            expected_prev = entry.hash();
        }

        Ok(true)
    }

    /// Get the current sequence number.
    pub fn current_seq(&self) -> u64 {
        self.current_seq.load(Ordering::SeqCst)
    }

    /// Get an audit entry by sequence number.
    pub fn get_entry(&self, seq: u64) -> EsignResult<Option<AuditEntry>> {
        self.storage.get_audit_entry(seq)
    }

    /// List audit entries in a range.
    pub fn list_entries(&self, start: u64, end: u64) -> EsignResult<Vec<AuditEntry>> {
        let mut entries = Vec::new();
        for seq in start..=end {
            if let Some(entry) = self.storage.get_audit_entry(seq)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
