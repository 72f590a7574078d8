//! Completion certificates for fully signed requests.
//!
//! Once every signer on a request has signed, the builder assembles an
//! evidence summary (who signed, when, from where, over which document
//! fingerprint), renders it as a single-page PDF into the blob store,
//! and upserts the certificate record. The document fingerprint is
//! recomputed from the stored bytes at build time; any signature whose
//! recorded fingerprint no longer matches is reported in the metadata
//! instead of being silently accepted.

use std::sync::Arc;

use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome};
use crate::error::{EsignError, EsignResult};
use crate::esign::signature;
use crate::esign::types::{
    CertificateMetadata, CertificateSigner, CompletionCertificate, RequestId, RequestStatus,
};
use crate::storage::{BlobStore, Storage};

#[derive(Clone)]
pub struct CertificateBuilder {
    storage: Storage,
    blob: BlobStore,
    audit: Arc<AuditLogger>,
}

impl CertificateBuilder {
    pub fn new(storage: Storage, blob: BlobStore, audit: Arc<AuditLogger>) -> Self {
        Self {
            storage,
            blob,
            audit,
        }
    }

    /// Build (or rebuild) the completion certificate for a signed request.
    ///
    /// Rebuilding overwrites the stored artifact; the render is
    /// deterministic given the same request state and document bytes.
    pub fn build(&self, request_id: &RequestId) -> EsignResult<CompletionCertificate> {
        let request = self
            .storage
            .get_request(request_id)?
            .ok_or_else(|| EsignError::RequestNotFound(request_id.to_string()))?;
        if request.status != RequestStatus::Signed {
            return Err(EsignError::InvalidRequestState {
                expected: "signed".to_string(),
                actual: request.status.to_string(),
            });
        }

        let document = self
            .storage
            .get_document(&request.document_id)?
            .ok_or_else(|| EsignError::DocumentNotFound(request.document_id.to_string()))?;
        let bytes = self.blob.get(&document.storage_path)?;
        let current_fingerprint = signature::document_fingerprint(&bytes);

        let mut rows = self.storage.get_request_signers(request_id)?;
        rows.sort_by_key(|s| (s.order_index, s.position));

        let mut signers = Vec::with_capacity(rows.len());
        let mut fingerprint_mismatches = Vec::new();
        for row in &rows {
            let mut ip_address = None;
            if let Some(sig_id) = row.signature_id {
                if let Some(sig) = self.storage.get_document_signature(&sig_id)? {
                    ip_address = sig.meta.ip_address.clone();
                    if sig.document_fingerprint != current_fingerprint {
                        tracing::warn!(
                            request_id = %request_id,
                            signature_id = %sig.id,
                            "Document bytes changed after signing"
                        );
                        fingerprint_mismatches.push(sig.id);
                    }
                }
            }
            signers.push(CertificateSigner {
                name: row
                    .signer_name
                    .clone()
                    .unwrap_or_else(|| row.signer_email.clone()),
                email: row.signer_email.clone(),
                signed_at: row.signed_at,
                ip_address,
            });
        }

        let metadata = CertificateMetadata {
            request_id: *request_id,
            document_id: document.id,
            document_title: document.title.clone(),
            document_fingerprint: current_fingerprint,
            fingerprint_mismatches,
            signers,
            completed_at: request.updated_at,
        };

        let pdf = render_pdf(&metadata)?;
        let certificate_path = format!("certificates/{request_id}/certificate.pdf");
        self.blob.put(&certificate_path, &pdf)?;

        let certificate = CompletionCertificate {
            request_id: *request_id,
            certificate_path,
            metadata,
            generated_at: Utc::now(),
        };
        self.storage.upsert_certificate(&certificate)?;

        tracing::info!(
            request_id = %request_id,
            mismatches = certificate.metadata.fingerprint_mismatches.len(),
            "Built completion certificate"
        );
        if let Err(e) = self.audit.append(
            AuditEventType::CertificateBuilt,
            AuditActor::Service {
                name: "certificate-builder".to_string(),
            },
            Some(document.id),
            Some(*request_id),
            AuditOutcome::Success,
            Some(serde_json::json!({
                "certificate_path": certificate.certificate_path,
                "fingerprint_mismatches": certificate.metadata.fingerprint_mismatches.len(),
            })),
        ) {
            tracing::warn!(error = %e, "Failed to append audit entry");
        }

        Ok(certificate)
    }

    /// The stored certificate record for a request.
    pub fn get(&self, request_id: &RequestId) -> EsignResult<CompletionCertificate> {
        self.storage
            .get_certificate(request_id)?
            .ok_or_else(|| EsignError::CertificateNotFound(request_id.to_string()))
    }
}

/// Render the evidence summary as a single-page PDF.
fn render_pdf(meta: &CertificateMetadata) -> EsignResult<Vec<u8>> {
    let mut lines = vec![
        format!("Document: {}", meta.document_title),
        format!("Document ID: {}", meta.document_id),
        format!("Request ID: {}", meta.request_id),
        format!("Fingerprint (SHA-256): {}", meta.document_fingerprint),
        format!("Completed: {}", meta.completed_at.to_rfc3339()),
        String::new(),
        "Signers:".to_string(),
    ];
    for signer in &meta.signers {
        let signed_at = signer
            .signed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let ip = signer.ip_address.as_deref().unwrap_or("-");
        lines.push(format!(
            "  {} <{}>  signed {}  from {}",
            signer.name, signer.email, signed_at, ip
        ));
    }
    if !meta.fingerprint_mismatches.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "WARNING: {} signature(s) were produced over different document bytes.",
            meta.fingerprint_mismatches.len()
        ));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 18.into()]),
        Operation::new("Td", vec![72.into(), 770.into()]),
        Operation::new(
            "Tj",
            vec![Object::string_literal("Certificate of Completion")],
        ),
        Operation::new("ET", vec![]),
    ];
    let mut y = 740;
    for line in lines {
        y -= 16;
        if line.is_empty() {
            continue;
        }
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
        operations.push(Operation::new("Td", vec![72.into(), y.into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
        operations.push(Operation::new("ET", vec![]));
    }

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esign::types::{
        DocumentRecord, DocumentSignature, DocumentStatus, RequestSigner, SignatureMeta,
        SignatureRequest, SignerStatus,
    };
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_builder() -> (TempDir, CertificateBuilder) {
        let dir = TempDir::new().expect("tempdir");
        let storage = Storage::open_memory().expect("storage");
        let blob = BlobStore::new(dir.path().join("blobs")).expect("blob store");
        let audit = Arc::new(AuditLogger::new(storage.clone()).expect("audit logger"));
        (dir, CertificateBuilder::new(storage, blob, audit))
    }

    fn seed_document(builder: &CertificateBuilder, bytes: &[u8]) -> DocumentRecord {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let doc = DocumentRecord {
            id,
            owner_id: Uuid::new_v4(),
            title: "Purchase Order".into(),
            filename: "order.pdf".into(),
            storage_path: format!("documents/{id}/order.pdf"),
            size_bytes: bytes.len() as u64,
            fingerprint: signature::document_fingerprint(bytes),
            status: DocumentStatus::Draft,
            archive_path: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        builder.blob.put(&doc.storage_path, bytes).expect("put blob");
        builder.storage.put_document(&doc).expect("put document");
        doc
    }

    /// Drive a one-signer request to `signed` without the HTTP layer.
    fn signed_request(builder: &CertificateBuilder, doc: &DocumentRecord) -> SignatureRequest {
        let user = Uuid::new_v4();
        let request = SignatureRequest::new(doc.id, doc.owner_id, None, None);
        let signer = RequestSigner {
            id: Uuid::new_v4(),
            request_id: request.id,
            signer_user_id: Some(user),
            signer_email: "signer@example.com".into(),
            signer_name: Some("Sam Signer".into()),
            order_index: 1,
            position: 0,
            status: SignerStatus::Pending,
            signed_at: None,
            signature_id: None,
        };
        builder
            .storage
            .create_request_with_signers(&request, &[signer])
            .expect("create request");

        let sig = DocumentSignature {
            id: Uuid::new_v4(),
            document_id: doc.id,
            user_id: user,
            document_fingerprint: doc.fingerprint.clone(),
            signature_value: "ab".repeat(32),
            key_id: Uuid::new_v4(),
            meta: SignatureMeta {
                ip_address: Some("10.1.2.3".into()),
                user_agent: None,
            },
            created_at: Utc::now(),
        };
        let outcome = builder
            .storage
            .record_signer_signed(&request.id, &sig, None, false)
            .expect("record");
        assert!(outcome.all_signed);
        outcome.request
    }

    #[test]
    fn test_build_requires_signed_request() {
        let (_dir, builder) = test_builder();
        let doc = seed_document(&builder, b"unsigned");
        let request = SignatureRequest::new(doc.id, doc.owner_id, None, None);
        let signer = RequestSigner {
            id: Uuid::new_v4(),
            request_id: request.id,
            signer_user_id: None,
            signer_email: "a@example.com".into(),
            signer_name: None,
            order_index: 1,
            position: 0,
            status: SignerStatus::Pending,
            signed_at: None,
            signature_id: None,
        };
        builder
            .storage
            .create_request_with_signers(&request, &[signer])
            .expect("create");

        let err = builder.build(&request.id).expect_err("not signed");
        assert!(matches!(err, EsignError::InvalidRequestState { .. }));

        let err = builder.build(&Uuid::new_v4()).expect_err("missing");
        assert!(matches!(err, EsignError::RequestNotFound(_)));
    }

    #[test]
    fn test_build_renders_and_stores() {
        let (_dir, builder) = test_builder();
        let doc = seed_document(&builder, b"final contract body");
        let request = signed_request(&builder, &doc);

        let cert = builder.build(&request.id).expect("build");
        assert_eq!(cert.metadata.signers.len(), 1);
        assert_eq!(cert.metadata.signers[0].email, "signer@example.com");
        assert_eq!(
            cert.metadata.signers[0].ip_address.as_deref(),
            Some("10.1.2.3")
        );
        assert!(cert.metadata.fingerprint_mismatches.is_empty());
        assert_eq!(cert.metadata.document_fingerprint, doc.fingerprint);

        let pdf = builder.blob.get(&cert.certificate_path).expect("pdf blob");
        assert!(pdf.starts_with(b"%PDF"));

        let fetched = builder.get(&request.id).expect("get");
        assert_eq!(fetched.certificate_path, cert.certificate_path);
    }

    #[test]
    fn test_build_reports_post_signing_tampering() {
        let (_dir, builder) = test_builder();
        let doc = seed_document(&builder, b"original bytes");
        let request = signed_request(&builder, &doc);

        // Swap the stored bytes after signing.
        builder
            .blob
            .put(&doc.storage_path, b"tampered bytes")
            .expect("overwrite");

        let cert = builder.build(&request.id).expect("build");
        assert_eq!(cert.metadata.fingerprint_mismatches.len(), 1);
        assert_ne!(cert.metadata.document_fingerprint, doc.fingerprint);
    }

    #[test]
    fn test_rebuild_overwrites() {
        let (_dir, builder) = test_builder();
        let doc = seed_document(&builder, b"contract");
        let request = signed_request(&builder, &doc);

        let first = builder.build(&request.id).expect("first build");
        let second = builder.build(&request.id).expect("second build");
        assert_eq!(first.certificate_path, second.certificate_path);
        assert_eq!(
            first.metadata.document_fingerprint,
            second.metadata.document_fingerprint
        );
    }

    #[test]
    fn test_get_missing_certificate() {
        let (_dir, builder) = test_builder();
        let err = builder.get(&Uuid::new_v4()).expect_err("missing");
        assert!(matches!(err, EsignError::CertificateNotFound(_)));
    }
}
