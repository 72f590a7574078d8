//! E-signature subsystem.
//!
//! Organized as services over shared storage: identity (PIN-gated
//! signing keys), the signature primitive, the multi-signer request
//! workflow, fraud heuristics over signing sessions, reminder tracking,
//! completion certificates, and the document registry.

pub mod certificate;
pub mod documents;
pub mod fraud;
pub mod identity;
pub mod reminders;
pub mod signature;
pub mod types;
pub mod workflow;

pub use certificate::CertificateBuilder;
pub use documents::DocumentRegistry;
pub use fraud::SessionMonitor;
pub use identity::IdentityManager;
pub use reminders::ReminderTracker;
pub use workflow::RequestWorkflow;
