//! View models derived from store, cache and audit state.
//!
//! Everything here is synchronous and recomputed from inputs; nothing
//! holds a connection except the audit log's guard.

mod audit_log;
mod bell;
mod feed;

pub use audit_log::{AuditLogBuffer, AuditLogFilter, AuditLogGuard, AUDIT_LOG_CAPACITY};
pub use bell::{badge_label, BellView, BADGE_CAP};
pub use feed::{build_feed, FeedItem, FeedKind, FEED_LIMIT};
