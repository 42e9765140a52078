//! Contact snapshot propagation and report change notification.
//!
//! - [`listener`]: consumes contact-change notifications and settles them.
//! - [`fanout`]: applies one contact change to every affected report.
//! - [`publisher`]: sends versioned domain events under a deadline.
//! - [`mutations`]: create/update/delete of reports, publishing on success.
//!
//! Everything here is written against the `vr-core` traits; storage and
//! transport are supplied by the caller.

pub mod error;
pub mod fanout;
pub mod listener;
pub mod mutations;
pub mod publisher;

pub use error::{MutationError, PublishError};
pub use fanout::{FanOutReport, FanOutUpdater, ReplaceError, ReplaceFailure};
pub use listener::{AckPolicy, ContactChangeListener, ListenerConfig, Settlement};
pub use mutations::ReportMutations;
pub use publisher::EventPublisher;

#[cfg(test)]
mod testing;
