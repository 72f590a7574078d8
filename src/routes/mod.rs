//! HTTP routes for the e-signature service.
//!
//! Routes are organized by functionality:
//! - `health`: Health check and build info (public)
//! - `keys`: Signing key and PIN endpoints (`/signature`)
//! - `requests`: Signature request workflow and sessions (`/esign`)
//! - `internal`: Document registry, scheduler, and reporting endpoints (`/internal`)

pub mod health;
pub mod internal;
pub mod keys;
pub mod requests;

pub use health::{build_info, health};
