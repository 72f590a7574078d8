//! Storage backends for the e-signature service.
//!
//! Metadata (keys, requests, signatures, sessions, reminders,
//! certificates, audit log) lives in redb. Document bytes and rendered
//! certificate PDFs live in the filesystem blob store.

pub mod blob;
pub mod redb;

pub use blob::BlobStore;
pub use redb::Storage;
