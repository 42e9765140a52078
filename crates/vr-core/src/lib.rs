//! Core types and trait definitions for the visit report service.
//!
//! No HTTP, database or broker code lives here. The crate defines the
//! document shapes and pub/sub wire records, plus the gateway traits the rest
//! of the workspace is written against.

pub mod contact;
pub mod error;
pub mod event;
pub mod report;
pub mod stats;
pub mod store;
pub mod transport;

pub use error::{Error, Result};

/// The fixed discriminator stored in every visit report's `type` field.
///
/// It doubles as the partition key for every document-store operation on the
/// entity; no report is ever read or written outside this partition.
pub const RECORD_TYPE: &str = "visitreport";
