//! Signing identity management.
//!
//! Owns the PIN-gated key lifecycle (register, verify, rotate), the
//! signing act itself, and standalone signature verification against
//! current document bytes. At most one key per user is active;
//! re-registration revokes the previous key in the same transaction.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome};
use crate::config::KeyRetention;
use crate::error::{EsignError, EsignResult};
use crate::esign::signature;
use crate::esign::types::{
    ActiveKeyResponse, DocumentId, DocumentRecord, DocumentSignature, RegisterKeyRequest,
    RegisterKeyResponse, RotatePinRequest, RotatePinResponse, SignatureMeta, SigningKey, UserId,
    VerifySignatureResponse,
};
use crate::storage::{BlobStore, Storage};

const DEFAULT_KEY_LABEL: &str = "Default Signature";
const MIN_PIN_LEN: usize = 4;

/// Service for signing keys and signatures.
#[derive(Clone)]
pub struct IdentityManager {
    storage: Storage,
    blob: BlobStore,
    audit: Arc<AuditLogger>,
    key_retention: KeyRetention,
}

impl IdentityManager {
    pub fn new(
        storage: Storage,
        blob: BlobStore,
        audit: Arc<AuditLogger>,
        key_retention: KeyRetention,
    ) -> Self {
        Self {
            storage,
            blob,
            audit,
            key_retention,
        }
    }

    /// Register a signing key for a user.
    ///
    /// Any existing active key is revoked in the same transaction; under
    /// the purge retention policy its MAC material is dropped as well.
    pub fn register(&self, req: RegisterKeyRequest) -> EsignResult<RegisterKeyResponse> {
        validate_pin(&req.pin)?;
        let label = req
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_KEY_LABEL.to_string());

        let key = SigningKey::new(
            req.user_id,
            signature::hash_pin(&req.pin),
            signature::generate_mac_key(),
            label,
        );
        let revoked_key_id = self
            .storage
            .register_signing_key(&key, self.key_retention == KeyRetention::Purge)?;

        self.audit_log(
            AuditEventType::KeyRegistered,
            AuditActor::User {
                user_id: req.user_id,
            },
            None,
            None,
            AuditOutcome::Success,
            Some(serde_json::json!({
                "key_id": key.id,
                "revoked_key_id": revoked_key_id,
            })),
        );
        tracing::info!(user_id = %req.user_id, key_id = %key.id, "Registered signing key");

        Ok(RegisterKeyResponse {
            key_id: key.id,
            user_id: key.user_id,
            label: key.label,
            created_at: key.created_at,
            revoked_key_id,
        })
    }

    /// Check a PIN against the user's active key.
    ///
    /// Returns `false` when the user has no active key.
    pub fn verify_pin(&self, user_id: &UserId, pin: &str) -> EsignResult<bool> {
        match self.storage.get_active_key(user_id)? {
            Some(key) => Ok(key.pin_hash == signature::hash_pin(pin)),
            None => Ok(false),
        }
    }

    /// Rotate the PIN on the active key, keeping its MAC key.
    pub fn rotate_pin(&self, req: RotatePinRequest) -> EsignResult<RotatePinResponse> {
        validate_pin(&req.new_pin)?;

        let mut key = self
            .storage
            .get_active_key(&req.user_id)?
            .ok_or(EsignError::Unauthorized)?;
        if key.pin_hash != signature::hash_pin(&req.current_pin) {
            return Err(EsignError::Unauthorized);
        }

        key.pin_hash = signature::hash_pin(&req.new_pin);
        self.storage.put_signing_key(&key)?;

        let rotated_at = Utc::now();
        self.audit_log(
            AuditEventType::PinRotated,
            AuditActor::User {
                user_id: req.user_id,
            },
            None,
            None,
            AuditOutcome::Success,
            Some(serde_json::json!({ "key_id": key.id })),
        );
        tracing::info!(user_id = %req.user_id, key_id = %key.id, "Rotated signing PIN");

        Ok(RotatePinResponse {
            key_id: key.id,
            rotated_at,
        })
    }

    /// Active-key summary for a user.
    pub fn active_key(&self, user_id: &UserId) -> EsignResult<ActiveKeyResponse> {
        let key = self
            .storage
            .get_active_key(user_id)?
            .ok_or_else(|| EsignError::SignatureNotFound(format!("no active key for {user_id}")))?;

        Ok(ActiveKeyResponse {
            key_id: key.id,
            user_id: key.user_id,
            label: key.label,
            created_at: key.created_at,
        })
    }

    /// Produce a signature over a document's current bytes.
    ///
    /// Verifies the PIN against the active key and builds the signature
    /// record; the request workflow persists it atomically together with
    /// the signer-row update.
    pub fn sign_document(
        &self,
        user_id: &UserId,
        pin: &str,
        document: &DocumentRecord,
        meta: SignatureMeta,
    ) -> EsignResult<DocumentSignature> {
        let key = self
            .storage
            .get_active_key(user_id)?
            .ok_or(EsignError::Unauthorized)?;
        if key.pin_hash != signature::hash_pin(pin) {
            return Err(EsignError::Unauthorized);
        }
        let mac_key = key
            .mac_key
            .as_deref()
            .ok_or_else(|| EsignError::Internal("active key is missing MAC material".into()))?;

        let bytes = self.blob.get(&document.storage_path)?;
        let fingerprint = signature::document_fingerprint(&bytes);
        let signature_value = signature::sign_fingerprint(&fingerprint, mac_key)?;

        Ok(DocumentSignature {
            id: Uuid::new_v4(),
            document_id: document.id,
            user_id: *user_id,
            document_fingerprint: fingerprint,
            signature_value,
            key_id: key.id,
            meta,
            created_at: Utc::now(),
        })
    }

    /// Verify the most recent signature a user produced over a document.
    ///
    /// Refetches the current document bytes, so a document modified after
    /// signing verifies as invalid. Uses the key that produced the
    /// signature even when it has since been revoked; once that key's MAC
    /// material has been purged the signature can no longer be checked.
    pub fn verify_signature(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
    ) -> EsignResult<VerifySignatureResponse> {
        let document = self
            .storage
            .get_document(document_id)?
            .ok_or_else(|| EsignError::DocumentNotFound(document_id.to_string()))?;
        let sig = self
            .storage
            .latest_signature_for_user(document_id, user_id)?
            .ok_or_else(|| {
                EsignError::SignatureNotFound(format!(
                    "no signature by {user_id} on document {document_id}"
                ))
            })?;

        let response = self.check_signature(&document, &sig)?;

        self.audit_log(
            AuditEventType::SignatureVerified,
            AuditActor::User { user_id: *user_id },
            Some(*document_id),
            None,
            AuditOutcome::Success,
            Some(serde_json::json!({
                "signature_id": sig.id,
                "valid": response.valid,
            })),
        );

        Ok(response)
    }

    fn check_signature(
        &self,
        document: &DocumentRecord,
        sig: &DocumentSignature,
    ) -> EsignResult<VerifySignatureResponse> {
        let key = match self.storage.get_signing_key(&sig.key_id)? {
            Some(key) => key,
            None => {
                return Ok(invalid(sig.id, None, "signing key record is missing"));
            }
        };
        let Some(mac_key) = key.mac_key.as_deref() else {
            return Ok(invalid(
                sig.id,
                None,
                "signing key material was purged on revocation",
            ));
        };

        let bytes = self.blob.get(&document.storage_path)?;
        let current_fingerprint = signature::document_fingerprint(&bytes);
        if current_fingerprint != sig.document_fingerprint {
            return Ok(invalid(
                sig.id,
                Some(current_fingerprint),
                "document contents changed since signing",
            ));
        }

        if signature::verify_fingerprint(&sig.document_fingerprint, mac_key, &sig.signature_value)
        {
            Ok(VerifySignatureResponse {
                valid: true,
                signature_id: Some(sig.id),
                document_fingerprint: Some(current_fingerprint),
                reason: None,
            })
        } else {
            Ok(invalid(
                sig.id,
                Some(current_fingerprint),
                "signature value does not match",
            ))
        }
    }

    fn audit_log(
        &self,
        event_type: AuditEventType,
        actor: AuditActor,
        document_id: Option<DocumentId>,
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

fn validate_pin(pin: &str) -> EsignResult<()> {
    if pin.trim().len() < MIN_PIN_LEN {
        return Err(EsignError::InvalidInput(format!(
            "PIN must be at least {MIN_PIN_LEN} characters"
        )));
    }
    Ok(())
}

fn invalid(
    signature_id: Uuid,
    document_fingerprint: Option<String>,
    reason: &str,
) -> VerifySignatureResponse {
    VerifySignatureResponse {
        valid: false,
        signature_id: Some(signature_id),
        document_fingerprint,
        reason: Some(reason.to_string()),
    }
}
