//! E-signature domain types.
//!
//! This module defines the serializable records persisted by the storage
//! layer (keys, signatures, requests, signers, sessions, reminders,
//! certificates, documents) plus the request/response types exposed by
//! the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document ID type alias for clarity.
pub type DocumentId = Uuid;

/// Signature request ID type alias.
pub type RequestId = Uuid;

/// Platform user ID type alias.
pub type UserId = Uuid;

/// Request-signer row ID type alias (one row per recipient per request).
pub type SignerId = Uuid;

/// Signing session ID type alias.
pub type SessionId = Uuid;

// =============================================================================
// Status Enums
// =============================================================================

/// Document lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Uploaded, not yet part of a signature request.
    Draft,
    /// Attached to at least one live signature request.
    Pending,
    /// All signers of a request completed.
    Signed,
    /// Moved to long-term archive storage.
    Archived,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Pending => write!(f, "pending"),
            Self::Signed => write!(f, "signed"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Signature request state machine.
///
/// Terminal states (`signed`, `cancelled`, `expired`) are irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created, recipients not yet notified.
    Pending,
    /// Dispatched to recipients.
    Sent,
    /// Every signer completed.
    Signed,
    /// Withdrawn by the creator.
    Cancelled,
    /// Deadline passed before completion.
    Expired,
}

impl RequestStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Signed | Self::Cancelled | Self::Expired)
    }

    /// States a signer is still allowed to sign from.
    pub fn is_signable(&self) -> bool {
        matches!(self, Self::Pending | Self::Sent)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Signed => write!(f, "signed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Per-recipient state within a signature request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerStatus {
    /// Has not signed yet.
    Pending,
    /// Signed; `signature_id` links the produced signature.
    Signed,
    /// Request was cancelled while this signer was still pending.
    Cancelled,
    /// Request expired while this signer was still pending.
    Expired,
}

impl std::fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Signed => write!(f, "signed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

// =============================================================================
// Identity & Signature Records
// =============================================================================

/// A user's signing key: hashed PIN plus the MAC key used to produce
/// signature values. At most one key per user is active; re-registration
/// revokes the previous key instead of deleting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKey {
    /// Unique key identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: UserId,
    /// SHA-256 hash (hex) of the trimmed PIN.
    pub pin_hash: String,
    /// Per-key MAC secret (hex). `None` once purged on revocation.
    pub mac_key: Option<String>,
    /// Display label.
    pub label: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set when a newer key replaced this one.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SigningKey {
    /// Create a fresh active key.
    pub fn new(user_id: UserId, pin_hash: String, mac_key: String, label: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            pin_hash,
            mac_key: Some(mac_key),
            label,
            created_at: Utc::now(),
            revoked_at: None,
        }
    }

    /// A key is active until it has been revoked.
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Context captured alongside a produced signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureMeta {
    /// Client IP at signing time.
    pub ip_address: Option<String>,
    /// Client user agent at signing time.
    pub user_agent: Option<String>,
}

/// A signature produced over a document by a user's active key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSignature {
    /// Unique signature identifier.
    pub id: Uuid,
    /// Document that was signed.
    pub document_id: DocumentId,
    /// User who signed.
    pub user_id: UserId,
    /// SHA-256 fingerprint (hex) of the document bytes at signing time.
    pub document_fingerprint: String,
    /// HMAC-SHA256 (hex) over the fingerprint, keyed by the signer's MAC key.
    pub signature_value: String,
    /// Key that produced this signature.
    pub key_id: Uuid,
    /// Client context at signing time.
    pub meta: SignatureMeta,
    /// When the signature was produced.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Signature Request & Signers
// =============================================================================

/// A multi-signer signature request over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    /// Unique request identifier.
    pub id: RequestId,
    /// Document under signature.
    pub document_id: DocumentId,
    /// User who created the request.
    pub creator_id: UserId,
    /// Current state.
    pub status: RequestStatus,
    /// Optional message shown to recipients.
    pub message: Option<String>,
    /// Optional completion deadline.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last state-change time.
    pub updated_at: DateTime<Utc>,
}

impl SignatureRequest {
    /// Create a new pending request.
    pub fn new(
        document_id: DocumentId,
        creator_id: UserId,
        message: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            document_id,
            creator_id,
            status: RequestStatus::Pending,
            message,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the deadline has passed.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline < now)
    }
}

/// One recipient row of a signature request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSigner {
    /// Unique row identifier (referenced by sessions and reminders).
    pub id: SignerId,
    /// Owning request.
    pub request_id: RequestId,
    /// Platform user ID when the recipient has an account.
    pub signer_user_id: Option<UserId>,
    /// Recipient email.
    pub signer_email: String,
    /// Recipient display name.
    pub signer_name: Option<String>,
    /// Requested signing order. Equal values sign in creation order.
    pub order_index: u32,
    /// Creation order within the request (tiebreak for equal `order_index`).
    pub position: u32,
    /// Current state.
    pub status: SignerStatus,
    /// When this signer signed.
    pub signed_at: Option<DateTime<Utc>>,
    /// Signature produced by this signer.
    pub signature_id: Option<Uuid>,
}

impl RequestSigner {
    /// Match this row against a signing user's identity.
    ///
    /// A row matches when its `signer_user_id` equals the user, or when
    /// its email equals the supplied email (case-insensitive).
    pub fn matches_identity(&self, user_id: UserId, email: Option<&str>) -> bool {
        if self.signer_user_id == Some(user_id) {
            return true;
        }
        email.is_some_and(|e| self.signer_email.eq_ignore_ascii_case(e))
    }
}

// =============================================================================
// Signing Sessions & Fraud
// =============================================================================

/// Anomaly labels attached to a signing session.
pub const ANOMALY_SIGNED_TOO_FAST: &str = "SIGNED_TOO_FAST";
pub const ANOMALY_IP_CHANGED: &str = "IP_ADDRESS_CHANGED";
pub const ANOMALY_DEVICE_CHANGED: &str = "DEVICE_CHANGED";

/// Client context recorded when a recipient opens a document for signing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Request-signer row this session belongs to.
    pub signer_id: SignerId,
    /// Client IP when the session started.
    pub ip_address: Option<String>,
    /// Client user agent when the session started.
    pub user_agent: Option<String>,
    /// Opaque device fingerprint supplied by the client.
    pub device_fingerprint: Option<String>,
    /// When the recipient opened the document.
    pub started_at: DateTime<Utc>,
    /// When the recipient signed, if they did.
    pub signed_at: Option<DateTime<Utc>>,
    /// Seconds between open and sign.
    pub duration_seconds: Option<i64>,
    /// Whether any heuristic flagged this session.
    pub is_suspicious: bool,
    /// Anomaly labels raised by the heuristics.
    pub suspicion_reasons: Vec<String>,
}

impl SigningSession {
    /// Start a new session for a signer row.
    pub fn new(
        signer_id: SignerId,
        ip_address: Option<String>,
        user_agent: Option<String>,
        device_fingerprint: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signer_id,
            ip_address,
            user_agent,
            device_fingerprint,
            started_at: Utc::now(),
            signed_at: None,
            duration_seconds: None,
            is_suspicious: false,
            suspicion_reasons: Vec::new(),
        }
    }
}

/// Outcome of the fraud heuristics for one completed session.
///
/// Advisory only: a suspicious evaluation never blocks the signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudEvaluation {
    pub session_id: SessionId,
    pub is_suspicious: bool,
    pub suspicion_reasons: Vec<String>,
    pub duration_seconds: i64,
}

// =============================================================================
// Reminders
// =============================================================================

/// Reminder escalation ceiling.
pub const MAX_REMINDER_LEVEL: u8 = 3;

/// One recorded reminder for a pending signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    /// Request-signer row the reminder targets.
    pub signer_id: SignerId,
    /// Escalation level, 1 through [`MAX_REMINDER_LEVEL`].
    pub reminder_level: u8,
    /// When the reminder was recorded.
    pub sent_at: DateTime<Utc>,
}

// =============================================================================
// Completion Certificates
// =============================================================================

/// One signer line in a completion certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSigner {
    pub name: String,
    pub email: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
}

/// Evidence summary embedded in a completion certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateMetadata {
    pub request_id: RequestId,
    pub document_id: DocumentId,
    pub document_title: String,
    /// Fingerprint of the document bytes at certificate build time.
    pub document_fingerprint: String,
    /// Signature IDs whose stored fingerprint no longer matches the
    /// document bytes. Non-empty means the document changed after signing.
    pub fingerprint_mismatches: Vec<Uuid>,
    pub signers: Vec<CertificateSigner>,
    pub completed_at: DateTime<Utc>,
}

/// Completion artifact for a fully signed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionCertificate {
    /// Request this certificate evidences.
    pub request_id: RequestId,
    /// Blob path of the rendered PDF.
    pub certificate_path: String,
    /// Evidence summary.
    pub metadata: CertificateMetadata,
    /// When the certificate was generated (or regenerated).
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// Documents
// =============================================================================

/// A registered document and its blob location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique document identifier.
    pub id: DocumentId,
    /// Uploading user.
    pub owner_id: UserId,
    /// Display title.
    pub title: String,
    /// Original filename.
    pub filename: String,
    /// Blob path of the document bytes.
    pub storage_path: String,
    /// Size of the stored bytes.
    pub size_bytes: u64,
    /// SHA-256 fingerprint of the bytes at registration time.
    pub fingerprint: String,
    /// Current state.
    pub status: DocumentStatus,
    /// Blob path after archival.
    pub archive_path: Option<String>,
    /// When the document was archived.
    pub archived_at: Option<DateTime<Utc>>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last state-change time.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// API Request/Response Types
// =============================================================================

/// Request to register a signing key (PIN setup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterKeyRequest {
    pub user_id: UserId,
    pub pin: String,
    /// Display label; defaults when omitted.
    #[serde(default)]
    pub label: Option<String>,
}

/// Response from key registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterKeyResponse {
    pub key_id: Uuid,
    pub user_id: UserId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// Previous active key, now revoked, when one existed.
    pub revoked_key_id: Option<Uuid>,
}

/// Request to check a PIN against the active key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPinRequest {
    pub user_id: UserId,
    pub pin: String,
}

/// Response from PIN verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPinResponse {
    pub valid: bool,
}

/// Request to rotate the PIN on the active key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatePinRequest {
    pub user_id: UserId,
    pub current_pin: String,
    pub new_pin: String,
}

/// Response from PIN rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatePinResponse {
    pub key_id: Uuid,
    pub rotated_at: DateTime<Utc>,
}

/// Active-key summary. Never exposes the PIN hash or MAC key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveKeyResponse {
    pub key_id: Uuid,
    pub user_id: UserId,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Request to verify a stored signature against current document bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySignatureRequest {
    pub document_id: DocumentId,
    pub user_id: UserId,
}

/// Response from signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySignatureResponse {
    pub valid: bool,
    pub signature_id: Option<Uuid>,
    pub document_fingerprint: Option<String>,
    /// Why verification failed, when it did.
    pub reason: Option<String>,
}

/// One recipient in a request-creation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerSpec {
    pub signer_email: String,
    #[serde(default)]
    pub signer_name: Option<String>,
    /// Platform user ID when the recipient has an account.
    #[serde(default)]
    pub signer_user_id: Option<UserId>,
    /// Requested signing order; defaults to creation order.
    #[serde(default)]
    pub order_index: Option<u32>,
}

/// Input to create a signature request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestInput {
    pub document_id: DocumentId,
    pub creator_id: UserId,
    pub signers: Vec<SignerSpec>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A request together with its signer rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDetail {
    pub request: SignatureRequest,
    pub signers: Vec<RequestSigner>,
}

/// Input to sign a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequestInput {
    pub user_id: UserId,
    pub pin: String,
    /// Email match fallback for recipients invited without an account.
    #[serde(default)]
    pub signer_email: Option<String>,
    /// Session to close and evaluate for fraud, when one was started.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Response from signing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub signature_id: Uuid,
    pub signer_id: SignerId,
    /// Whether this signature completed the request.
    pub all_signed: bool,
    pub request_status: RequestStatus,
    /// Fraud evaluation of the supplied session, when one was given.
    pub fraud: Option<FraudEvaluation>,
}

/// Input to cancel a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequestInput {
    /// Must match the request creator.
    pub actor_id: UserId,
}

/// Request to start a signing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub signer_id: SignerId,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

/// Response from starting a signing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
}

/// Response from an expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireSweepResponse {
    pub expired_count: usize,
    pub request_ids: Vec<RequestId>,
}

/// Reminder escalation state for one signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderStatusResponse {
    pub signer_id: SignerId,
    /// Highest recorded level, 0 when none.
    pub current_level: u8,
    /// Next level to send, `None` once the ceiling is reached.
    pub next_level: Option<u8>,
    pub reminders: Vec<ReminderRecord>,
}

/// Request to record a sent reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordReminderRequest {
    pub signer_id: SignerId,
    pub level: u8,
}

/// A pending signer joined with its request and document, for reminder jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSignerEntry {
    pub signer: RequestSigner,
    pub request_id: RequestId,
    pub request_status: RequestStatus,
    pub request_created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub document_id: DocumentId,
    pub document_title: String,
    pub message: Option<String>,
}

/// Request to register a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDocumentRequest {
    pub owner_id: UserId,
    pub title: String,
    pub filename: String,
    /// Document bytes, base64 encoded.
    pub content_base64: String,
}

/// Document summary returned by the API. Never includes raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub document_id: DocumentId,
    pub owner_id: UserId,
    pub title: String,
    pub filename: String,
    pub size_bytes: u64,
    pub fingerprint: String,
    pub status: DocumentStatus,
    pub storage_path: String,
    pub archive_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentRecord> for DocumentResponse {
    fn from(doc: DocumentRecord) -> Self {
        Self {
            document_id: doc.id,
            owner_id: doc.owner_id,
            title: doc.title,
            filename: doc.filename,
            size_bytes: doc.size_bytes,
            fingerprint: doc.fingerprint,
            status: doc.status,
            storage_path: doc.storage_path,
            archive_path: doc.archive_path,
            created_at: doc.created_at,
        }
    }
}

/// Response from archiving a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveDocumentResponse {
    pub document_id: DocumentId,
    pub archive_path: String,
    /// False when the blob copy failed and only metadata was updated.
    pub blob_copied: bool,
}

/// Request to build (or rebuild) a completion certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCertificateRequest {
    pub request_id: RequestId,
}
