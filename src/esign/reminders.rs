//! Reminder escalation for signers who have not signed yet.
//!
//! Reminders are delivered by an external notifier; this service only
//! records which escalation levels were sent so the notifier never
//! sends the same level twice, and surfaces the signers that are due
//! for a nudge.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome};
use crate::error::{EsignError, EsignResult};
use crate::esign::types::{
    MAX_REMINDER_LEVEL, PendingSignerEntry, RecordReminderRequest, ReminderRecord,
    ReminderStatusResponse, SignerId,
};
use crate::storage::Storage;

/// Days a signer may sit on a request before showing up as pending.
pub const DEFAULT_PENDING_DAYS: i64 = 2;

#[derive(Clone)]
pub struct ReminderTracker {
    storage: Storage,
    audit: Arc<AuditLogger>,
}

impl ReminderTracker {
    pub fn new(storage: Storage, audit: Arc<AuditLogger>) -> Self {
        Self { storage, audit }
    }

    /// Record that a reminder at the given escalation level went out.
    ///
    /// Levels run 1 through [`MAX_REMINDER_LEVEL`]. Recording a level
    /// that was already sent is a no-op, so retrying notifiers do not
    /// inflate the escalation state.
    pub fn record(&self, req: RecordReminderRequest) -> EsignResult<ReminderStatusResponse> {
        if req.level == 0 || req.level > MAX_REMINDER_LEVEL {
            return Err(EsignError::InvalidInput(format!(
                "reminder level must be between 1 and {MAX_REMINDER_LEVEL}"
            )));
        }

        let record = ReminderRecord {
            signer_id: req.signer_id,
            reminder_level: req.level,
            sent_at: Utc::now(),
        };
        let inserted = self.storage.record_reminder(&record)?;

        if inserted {
            tracing::info!(
                signer_id = %req.signer_id,
                level = req.level,
                "Recorded reminder"
            );
            if let Err(e) = self.audit.append(
                AuditEventType::ReminderRecorded,
                AuditActor::Service {
                    name: "reminder-tracker".to_string(),
                },
                None,
                None,
                AuditOutcome::Success,
                Some(serde_json::json!({
                    "signer_id": req.signer_id,
                    "reminder_level": req.level,
                })),
            ) {
                tracing::warn!(error = %e, "Failed to append audit entry");
            }
        } else {
            tracing::debug!(
                signer_id = %req.signer_id,
                level = req.level,
                "Reminder level already recorded"
            );
        }

        self.status(&req.signer_id)
    }

    /// Escalation state for one signer.
    pub fn status(&self, signer_id: &SignerId) -> EsignResult<ReminderStatusResponse> {
        let reminders = self.storage.reminders_for_signer(signer_id)?;
        let current_level = reminders.iter().map(|r| r.reminder_level).max().unwrap_or(0);
        let next_level = (current_level < MAX_REMINDER_LEVEL).then_some(current_level + 1);

        Ok(ReminderStatusResponse {
            signer_id: *signer_id,
            current_level,
            next_level,
            reminders,
        })
    }

    /// Signers on live requests whose request is older than `days` days.
    pub fn pending_signers(&self, days: i64) -> EsignResult<Vec<PendingSignerEntry>> {
        if days < 0 {
            return Err(EsignError::InvalidInput(
                "days must not be negative".to_string(),
            ));
        }
        let cutoff = Utc::now() - Duration::days(days);
        self.storage.pending_signers_before(cutoff)
    }
}
