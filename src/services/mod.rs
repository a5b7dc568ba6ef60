//! Operations behind the HTTP surface.
//!
//! Every function takes the store and, where access matters, the calling
//! [`Principal`] explicitly. Nothing here reads request state.

pub mod admin;
pub mod approval;
pub mod assessment;
pub mod reports;
pub mod users;

use crate::db::Store;
use crate::error::AccessError;
use crate::models::{AuditEntry, Principal};

pub fn require_admin(principal: &Principal) -> Result<(), AccessError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(AccessError::Forbidden)
    }
}

/// Write an audit row; failures are logged and never reach the caller
pub async fn audit(store: &dyn Store, entry: AuditEntry) {
    let action = entry.action;
    if let Err(e) = store.record_audit(entry).await {
        tracing::warn!("Failed to write audit entry '{}': {}", action, e);
    }
}
