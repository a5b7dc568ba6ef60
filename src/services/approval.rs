//! Teacher approval workflow: `unapproved -> approved` or `unapproved -> deleted`

use super::{audit, require_admin};
use crate::db::Store;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::validation::ValidationError;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct RejectOutcome {
    pub teacher_id: Uuid,
    /// False when the teacher was already gone
    pub removed: bool,
    pub notifications_removed: u64,
}

/// Teachers waiting for an admin decision, oldest first
pub async fn pending_teachers(
    store: &dyn Store,
    principal: &Principal,
) -> AppResult<Vec<UserResponse>> {
    require_admin(principal)?;
    Ok(store
        .list_users()
        .await?
        .into_iter()
        .filter(|u| u.role == Role::Teacher && !u.approved)
        .map(UserResponse::from)
        .collect())
}

/// Approve a teacher and resolve its notifications. Approving twice is harmless.
pub async fn approve_teacher(
    store: &dyn Store,
    principal: &Principal,
    teacher_id: Uuid,
) -> AppResult<UserResponse> {
    require_admin(principal)?;

    let user = store
        .get_user(teacher_id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    if user.role != Role::Teacher {
        return Err(ValidationError::WrongRole {
            expected: "teacher",
        }
        .into());
    }

    let approved = store
        .approve_teacher(teacher_id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;

    tracing::info!("Teacher {} approved by {}", teacher_id, principal.id);
    audit(
        store,
        AuditEntry::new("teacher_approved", "user", teacher_id).by(principal.id),
    )
    .await;

    Ok(approved.into())
}

/// Reject a teacher: delete the account and its notifications.
///
/// Rejecting an id that no longer exists succeeds with `removed: false`.
pub async fn reject_teacher(
    store: &dyn Store,
    principal: &Principal,
    teacher_id: Uuid,
) -> AppResult<RejectOutcome> {
    require_admin(principal)?;

    let removed = match store.get_user(teacher_id).await? {
        Some(user) if user.role != Role::Teacher => {
            return Err(ValidationError::WrongRole {
                expected: "teacher",
            }
            .into());
        }
        Some(_) => store.delete_user(teacher_id).await?,
        None => false,
    };

    let notifications_removed = match store.delete_notifications_for_teacher(teacher_id).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("Could not remove notifications for {}: {}", teacher_id, e);
            0
        }
    };

    if removed {
        tracing::info!("Teacher {} rejected by {}", teacher_id, principal.id);
        audit(
            store,
            AuditEntry::new("teacher_rejected", "user", teacher_id).by(principal.id),
        )
        .await;
    }

    Ok(RejectOutcome {
        teacher_id,
        removed,
        notifications_removed,
    })
}
