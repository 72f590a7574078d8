//! Signing-session fraud heuristics.
//!
//! A session opens when a recipient views the document and closes when
//! they sign. Evaluation compares the session against the signer's most
//! recent prior session and flags three anomalies: signing faster than
//! the configured threshold, an IP address change, and a device
//! fingerprint change. Flags are advisory and never block a signature.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome};
use crate::error::{EsignError, EsignResult};
use crate::esign::types::{
    ANOMALY_DEVICE_CHANGED, ANOMALY_IP_CHANGED, ANOMALY_SIGNED_TOO_FAST, FraudEvaluation,
    SessionId, SigningSession, StartSessionRequest, StartSessionResponse,
};
use crate::storage::Storage;

/// Default cap on suspicious-session listings.
pub const DEFAULT_SUSPICIOUS_LIMIT: usize = 50;

/// Service that records signing sessions and evaluates them.
#[derive(Clone)]
pub struct SessionMonitor {
    storage: Storage,
    audit: Arc<AuditLogger>,
    fast_sign_threshold_secs: i64,
}

impl SessionMonitor {
    pub fn new(storage: Storage, audit: Arc<AuditLogger>, fast_sign_threshold_secs: i64) -> Self {
        Self {
            storage,
            audit,
            fast_sign_threshold_secs,
        }
    }

    /// Record the start of a signing session.
    pub fn start_session(&self, req: StartSessionRequest) -> EsignResult<StartSessionResponse> {
        let session = SigningSession::new(
            req.signer_id,
            req.ip_address,
            req.user_agent,
            req.device_fingerprint,
        );
        self.storage.put_signing_session(&session)?;
        tracing::debug!(session_id = %session.id, signer_id = %session.signer_id, "Started signing session");

        Ok(StartSessionResponse {
            session_id: session.id,
            started_at: session.started_at,
        })
    }

    /// Close a session at signing time and run the heuristics.
    ///
    /// Persists `signed_at`, the rounded duration, and any raised flags
    /// on the session, then returns the evaluation.
    pub fn evaluate(
        &self,
        session_id: &SessionId,
        signed_at: DateTime<Utc>,
    ) -> EsignResult<FraudEvaluation> {
        let mut session = self
            .storage
            .get_signing_session(session_id)?
            .ok_or_else(|| EsignError::SessionNotFound(session_id.to_string()))?;

        let duration_secs = (signed_at - session.started_at).num_milliseconds() as f64 / 1000.0;

        let mut reasons = Vec::new();
        if duration_secs < self.fast_sign_threshold_secs as f64 {
            reasons.push(ANOMALY_SIGNED_TOO_FAST.to_string());
        }

        if let Some(prior) = self.storage.latest_prior_session(&session.signer_id, session_id)? {
            if let Some(prev_ip) = prior.ip_address.as_deref().filter(|s| !s.is_empty())
                && session.ip_address.as_deref() != Some(prev_ip)
            {
                reasons.push(ANOMALY_IP_CHANGED.to_string());
            }
            if let Some(prev_device) = prior.device_fingerprint.as_deref().filter(|s| !s.is_empty())
                && session.device_fingerprint.as_deref() != Some(prev_device)
            {
                reasons.push(ANOMALY_DEVICE_CHANGED.to_string());
            }
        }

        let rounded = duration_secs.round() as i64;
        let is_suspicious = !reasons.is_empty();

        session.signed_at = Some(signed_at);
        session.duration_seconds = Some(rounded);
        session.is_suspicious = is_suspicious;
        session.suspicion_reasons = reasons.clone();
        self.storage.put_signing_session(&session)?;

        if is_suspicious {
            tracing::warn!(
                session_id = %session.id,
                signer_id = %session.signer_id,
                reasons = ?reasons,
                "Signing session flagged"
            );
            if let Err(e) = self.audit.append(
                AuditEventType::SessionFlagged,
                AuditActor::Service {
                    name: "session-monitor".to_string(),
                },
                None,
                None,
                AuditOutcome::Success,
                Some(serde_json::json!({
                    "session_id": session.id,
                    "signer_id": session.signer_id,
                    "reasons": reasons,
                    "duration_seconds": rounded,
                })),
            ) {
                tracing::warn!(error = %e, "Failed to append audit entry");
            }
        }

        Ok(FraudEvaluation {
            session_id: session.id,
            is_suspicious,
            suspicion_reasons: session.suspicion_reasons,
            duration_seconds: rounded,
        })
    }

    /// Sessions flagged by the heuristics, newest first.
    pub fn suspicious_sessions(&self, limit: usize) -> EsignResult<Vec<SigningSession>> {
        self.storage.suspicious_sessions(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_monitor() -> SessionMonitor {
        let storage = Storage::open_memory().expect("storage");
        let audit = Arc::new(AuditLogger::new(storage.clone()).expect("audit logger"));
        SessionMonitor::new(storage, audit, 10)
    }

    fn backdated_session(
        monitor: &SessionMonitor,
        signer_id: Uuid,
        secs_ago: i64,
        ip: Option<&str>,
        device: Option<&str>,
    ) -> SigningSession {
        let mut session = SigningSession::new(
            signer_id,
            ip.map(str::to_string),
            None,
            device.map(str::to_string),
        );
        session.started_at = Utc::now() - chrono::Duration::seconds(secs_ago);
        monitor.storage.put_signing_session(&session).expect("put");
        session
    }

    #[test]
    fn test_start_session_persists() {
        let monitor = test_monitor();
        let resp = monitor
            .start_session(StartSessionRequest {
                signer_id: Uuid::new_v4(),
                ip_address: Some("10.0.0.1".into()),
                user_agent: Some("Firefox".into()),
                device_fingerprint: None,
            })
            .expect("start");

        let session = monitor
            .storage
            .get_signing_session(&resp.session_id)
            .expect("get")
            .expect("some");
        assert_eq!(session.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(!session.is_suspicious);
    }

    #[test]
    fn test_fast_signing_is_flagged() {
        let monitor = test_monitor();
        let signer = Uuid::new_v4();
        let session = backdated_session(&monitor, signer, 3, Some("10.0.0.1"), None);

        let eval = monitor.evaluate(&session.id, Utc::now()).expect("evaluate");
        assert!(eval.is_suspicious);
        assert_eq!(eval.suspicion_reasons, vec![ANOMALY_SIGNED_TOO_FAST]);
        assert_eq!(eval.duration_seconds, 3);

        let stored = monitor
            .storage
            .get_signing_session(&session.id)
            .expect("get")
            .expect("some");
        assert!(stored.is_suspicious);
        assert!(stored.signed_at.is_some());
    }

    #[test]
    fn test_slow_first_session_is_clean() {
        let monitor = test_monitor();
        let session = backdated_session(&monitor, Uuid::new_v4(), 45, Some("10.0.0.1"), None);

        let eval = monitor.evaluate(&session.id, Utc::now()).expect("evaluate");
        assert!(!eval.is_suspicious);
        assert!(eval.suspicion_reasons.is_empty());
        assert_eq!(eval.duration_seconds, 45);
    }

    #[test]
    fn test_ip_and_device_change_flagged() {
        let monitor = test_monitor();
        let signer = Uuid::new_v4();
        backdated_session(&monitor, signer, 3600, Some("10.0.0.1"), Some("device-a"));
        let current = backdated_session(&monitor, signer, 60, Some("172.16.0.9"), Some("device-b"));

        let eval = monitor.evaluate(&current.id, Utc::now()).expect("evaluate");
        assert!(eval.is_suspicious);
        assert!(eval.suspicion_reasons.contains(&ANOMALY_IP_CHANGED.to_string()));
        assert!(eval.suspicion_reasons.contains(&ANOMALY_DEVICE_CHANGED.to_string()));
        assert!(!eval.suspicion_reasons.contains(&ANOMALY_SIGNED_TOO_FAST.to_string()));
    }

    #[test]
    fn test_unknown_prior_context_raises_no_flags() {
        let monitor = test_monitor();
        let signer = Uuid::new_v4();
        // Prior session recorded without IP or device.
        backdated_session(&monitor, signer, 3600, None, None);
        let current = backdated_session(&monitor, signer, 60, Some("10.0.0.1"), Some("device-a"));

        let eval = monitor.evaluate(&current.id, Utc::now()).expect("evaluate");
        assert!(!eval.is_suspicious);
    }

    #[test]
    fn test_evaluate_unknown_session() {
        let monitor = test_monitor();
        let err = monitor
            .evaluate(&Uuid::new_v4(), Utc::now())
            .expect_err("missing");
        assert!(matches!(err, EsignError::SessionNotFound(_)));
    }

    #[test]
    fn test_suspicious_listing() {
        let monitor = test_monitor();
        let signer = Uuid::new_v4();
        let fast = backdated_session(&monitor, signer, 2, None, None);
        monitor.evaluate(&fast.id, Utc::now()).expect("evaluate");

        let flagged = monitor.suspicious_sessions(50).expect("list");
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, fast.id);
    }
}
