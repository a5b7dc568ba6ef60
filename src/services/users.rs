//! Principal resolution, login and the user lifecycle

use super::{audit, require_admin};
use crate::db::{Store, StoreError};
use crate::error::{AccessError, AppError, AppResult};
use crate::models::*;
use crate::scope::{self, Scope};
use crate::security::{hash_password, verify_password};
use crate::validation::{
    validate_create_user, validate_password, validate_specialization, ValidationError,
};
use serde::Serialize;
use uuid::Uuid;

/// Turn an authenticated user id into a dashboard principal.
///
/// Unknown ids are unauthenticated and unapproved teachers are pending.
/// Students never get a dashboard principal.
pub async fn resolve_principal(store: &dyn Store, user_id: Uuid) -> AppResult<Principal> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or(AccessError::Unauthenticated)?;
    principal_for(&user).map_err(AppError::from)
}

fn principal_for(user: &User) -> Result<Principal, AccessError> {
    match user.role {
        Role::Student => Err(AccessError::NotDashboardUser),
        Role::Teacher if !user.approved => Err(AccessError::ApprovalPending),
        Role::Teacher | Role::Admin => Ok(Principal {
            id: user.id,
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
        }),
    }
}

/// Check credentials and apply the same role gate as [`resolve_principal`]
pub async fn authenticate(store: &dyn Store, email: &str, password: &str) -> AppResult<Principal> {
    let user = store
        .find_user_by_email(email.trim())
        .await?
        .filter(|u| verify_password(password, &u.password_hash))
        .ok_or(AccessError::InvalidCredentials)?;
    principal_for(&user).map_err(AppError::from)
}

/// Scope of a principal, computed from the current classes and users
pub async fn load_scope(store: &dyn Store, principal: &Principal) -> AppResult<Scope> {
    let classes = store.list_classes().await?;
    let users = store.list_users().await?;
    Ok(scope::compute(principal.role, principal.id, &classes, &users))
}

/// Create a student or teacher account (admin only)
pub async fn create_user(
    store: &dyn Store,
    principal: &Principal,
    input: &CreateUserRequest,
) -> AppResult<User> {
    require_admin(principal)?;
    let valid = validate_create_user(input)?;

    // Students may be placed in a class; the class teacher becomes their
    // teacher unless one is given explicitly.
    let (class_id, teacher_uid) = match valid.role {
        Role::Student => match input.class_id {
            Some(class_id) => {
                let class = store
                    .get_class(class_id)
                    .await?
                    .ok_or(AppError::NotFound("Class"))?;
                (Some(class.id), input.teacher_uid.or(Some(class.teacher_uid)))
            }
            None => (None, input.teacher_uid),
        },
        _ => (None, None),
    };

    let password_hash =
        hash_password(&valid.password).map_err(|e| AppError::Internal(e.to_string()))?;

    let new_user = NewUser {
        role: valid.role,
        first_name: valid.first_name,
        last_name: valid.last_name,
        email: valid.email,
        password_hash,
        class_id,
        teacher_uid,
        school: valid.school,
        approved: valid.role == Role::Student || input.approved,
    };

    let user = match store.create_user(new_user).await {
        Ok(user) => user,
        Err(StoreError::Duplicate(_)) => {
            return Err(AppError::Conflict(
                "A user with this email already exists".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("User {} created with role {}", user.id, user.role.as_str());
    audit(
        store,
        AuditEntry::new("user_created", "user", user.id)
            .by(principal.id)
            .with_details(serde_json::json!({ "role": user.role.as_str() })),
    )
    .await;

    Ok(user)
}

/// What a user deletion managed to remove
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub user_id: Uuid,
    pub roster_removed: bool,
    pub timesheets_deleted: usize,
    pub assessments_deleted: usize,
    pub notifications_deleted: u64,
    pub failures: Vec<String>,
}

/// Delete a user and everything keyed by its id (admin only).
///
/// Dependent records go first and a failing step is logged and skipped, so
/// the worst outcome is orphans of a deleted id. The user row goes last.
pub async fn delete_user(
    store: &dyn Store,
    principal: &Principal,
    user_id: Uuid,
) -> AppResult<DeletionReport> {
    require_admin(principal)?;
    if user_id == principal.id {
        return Err(AppError::Conflict(
            "You cannot delete your own account".to_string(),
        ));
    }

    let user = store
        .get_user(user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let mut report = DeletionReport {
        user_id,
        ..Default::default()
    };

    if let Some(class_id) = user.class_id {
        match store.remove_roster_entry(class_id, user_id).await {
            Ok(removed) => report.roster_removed = removed,
            Err(e) => report.fail(format!("roster entry in class {class_id}"), e),
        }
    }

    match store.list_timesheets_for_student(user_id).await {
        Ok(timesheets) => {
            for sheet in timesheets {
                match store.delete_timesheet(sheet.id).await {
                    Ok(_) => report.timesheets_deleted += 1,
                    Err(e) => report.fail(format!("timesheet {}", sheet.id), e),
                }
            }
        }
        Err(e) => report.fail("timesheet listing".to_string(), e),
    }

    match store.list_assessment_requests_for_student(user_id).await {
        Ok(requests) => {
            for request in requests {
                match store.delete_assessment_request(request.id).await {
                    Ok(_) => report.assessments_deleted += 1,
                    Err(e) => report.fail(format!("assessment request {}", request.id), e),
                }
            }
        }
        Err(e) => report.fail("assessment request listing".to_string(), e),
    }

    match store.delete_notifications_for_teacher(user_id).await {
        Ok(count) => report.notifications_deleted = count,
        Err(e) => tracing::warn!("Could not remove notifications for {}: {}", user_id, e),
    }

    store.delete_user(user_id).await?;

    tracing::info!(
        "User {} deleted ({} timesheets, {} assessment requests, {} failures)",
        user_id,
        report.timesheets_deleted,
        report.assessments_deleted,
        report.failures.len()
    );
    audit(
        store,
        AuditEntry::new("user_deleted", "user", user_id)
            .by(principal.id)
            .with_details(serde_json::json!({
                "role": user.role.as_str(),
                "failures": report.failures.len(),
            })),
    )
    .await;

    Ok(report)
}

impl DeletionReport {
    fn fail(&mut self, step: String, error: StoreError) {
        tracing::warn!("User deletion step failed for {}: {}: {}", self.user_id, step, error);
        self.failures.push(step);
    }
}

/// Set a student's specialization. Teachers may only touch students in scope.
pub async fn update_specialization(
    store: &dyn Store,
    principal: &Principal,
    student_id: Uuid,
    input: &SpecializationRequest,
) -> AppResult<()> {
    let specialization = validate_specialization(&input.specialization)?;

    let student = store
        .get_user(student_id)
        .await?
        .ok_or(AppError::NotFound("Student"))?;
    if student.role != Role::Student {
        return Err(ValidationError::WrongRole {
            expected: "student",
        }
        .into());
    }

    let scope = load_scope(store, principal).await?;
    if !scope.includes_student(student_id) {
        return Err(AccessError::Forbidden.into());
    }

    store.set_specialization(student_id, &specialization).await?;
    Ok(())
}

/// Replace the caller's password after re-checking the current one
pub async fn change_password(
    store: &dyn Store,
    principal: &Principal,
    input: &ChangePasswordRequest,
) -> AppResult<()> {
    let user = store
        .get_user(principal.id)
        .await?
        .ok_or(AccessError::Unauthenticated)?;
    if !verify_password(&input.current_password, &user.password_hash) {
        return Err(ValidationError::WrongPassword.into());
    }
    validate_password("new_password", &input.new_password)?;

    let password_hash =
        hash_password(&input.new_password).map_err(|e| AppError::Internal(e.to_string()))?;
    if !store.set_password_hash(user.id, &password_hash).await? {
        return Err(AccessError::Unauthenticated.into());
    }

    tracing::info!("User {} changed their password", user.id);
    audit(
        store,
        AuditEntry::new("password_changed", "user", user.id).by(user.id),
    )
    .await;
    Ok(())
}
