//! Document registry: ingests document bytes into the blob store and
//! archives signed documents.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome};
use crate::error::{EsignError, EsignResult};
use crate::esign::signature;
use crate::esign::types::{
    ArchiveDocumentResponse, DocumentId, DocumentRecord, DocumentResponse, DocumentStatus,
    RegisterDocumentRequest,
};
use crate::storage::{BlobStore, Storage};

/// Service for document ingestion and archival.
#[derive(Clone)]
pub struct DocumentRegistry {
    storage: Storage,
    blob: BlobStore,
    audit: Arc<AuditLogger>,
}

impl DocumentRegistry {
    pub fn new(storage: Storage, blob: BlobStore, audit: Arc<AuditLogger>) -> Self {
        Self {
            storage,
            blob,
            audit,
        }
    }

    /// Register a document: store its bytes and create a `draft` record.
    pub fn register(&self, req: RegisterDocumentRequest) -> EsignResult<DocumentResponse> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(EsignError::InvalidInput("title must not be empty".into()));
        }
        let filename = req.filename.trim();
        if filename.is_empty() || filename.contains(['/', '\\']) {
            return Err(EsignError::InvalidInput(
                "filename must be a plain file name".into(),
            ));
        }
        let bytes = BASE64
            .decode(req.content_base64.as_bytes())
            .map_err(|e| EsignError::InvalidInput(format!("content is not valid base64: {e}")))?;
        if bytes.is_empty() {
            return Err(EsignError::InvalidInput("document is empty".into()));
        }

        let id = Uuid::new_v4();
        let storage_path = format!("documents/{id}/{filename}");
        self.blob.put(&storage_path, &bytes)?;

        let now = Utc::now();
        let doc = DocumentRecord {
            id,
            owner_id: req.owner_id,
            title: title.to_string(),
            filename: filename.to_string(),
            storage_path,
            size_bytes: bytes.len() as u64,
            fingerprint: signature::document_fingerprint(&bytes),
            status: DocumentStatus::Draft,
            archive_path: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.put_document(&doc)?;

        self.audit_log(
            AuditEventType::DocumentRegistered,
            AuditActor::User {
                user_id: req.owner_id,
            },
            Some(doc.id),
            AuditOutcome::Success,
            Some(serde_json::json!({ "size_bytes": doc.size_bytes })),
        );
        tracing::info!(document_id = %doc.id, size = doc.size_bytes, "Registered document");

        Ok(doc.into())
    }

    /// Document summary by ID.
    pub fn get(&self, document_id: &DocumentId) -> EsignResult<DocumentResponse> {
        Ok(self.load(document_id)?.into())
    }

    /// Full document record by ID.
    fn load(&self, document_id: &DocumentId) -> EsignResult<DocumentRecord> {
        self.storage
            .get_document(document_id)?
            .ok_or_else(|| EsignError::DocumentNotFound(document_id.to_string()))
    }

    /// Archive a document's bytes to long-term storage.
    ///
    /// Copies the blob to `archive/{year}/{document_id}/{filename}` and
    /// updates the record. A failed copy degrades to a metadata-only
    /// archive with a logged warning rather than failing the call.
    pub fn archive(&self, document_id: &DocumentId) -> EsignResult<ArchiveDocumentResponse> {
        let mut doc = self.load(document_id)?;

        let now = Utc::now();
        let archive_path = format!("archive/{}/{}/{}", now.year(), doc.id, doc.filename);

        let blob_copied = match self.blob.copy(&doc.storage_path, &archive_path) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    document_id = %doc.id,
                    error = %e,
                    "Archive copy failed; recording metadata-only archive"
                );
                false
            }
        };

        doc.status = DocumentStatus::Archived;
        doc.archive_path = Some(archive_path.clone());
        doc.archived_at = Some(now);
        doc.updated_at = now;
        self.storage.put_document(&doc)?;

        self.audit_log(
            AuditEventType::DocumentArchived,
            AuditActor::Service {
                name: "document-registry".to_string(),
            },
            Some(doc.id),
            AuditOutcome::Success,
            Some(serde_json::json!({
                "archive_path": archive_path,
                "blob_copied": blob_copied,
            })),
        );
        tracing::info!(document_id = %doc.id, archive_path, blob_copied, "Archived document");

        Ok(ArchiveDocumentResponse {
            document_id: doc.id,
            archive_path,
            blob_copied,
        })
    }

    fn audit_log(
        &self,
        event_type: AuditEventType,
        actor: AuditActor,
        document_id: Option<DocumentId>,
        outcome: AuditOutcome,
        context: Option<serde_json::Value>,
    ) {
        if let Err(e) = self
            .audit
            .append(event_type, actor, document_id, None, outcome, context)
        {
            tracing::warn!(error = %e, event = %event_type, "Failed to append audit entry");
        }
    }
}
