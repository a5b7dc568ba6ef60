//! The storage port used by services and handlers.
//!
//! Every query the application needs is a method here, so services can be
//! exercised against an in-memory implementation and the Postgres adapter
//! stays a thin translation to SQL.

use crate::models::*;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate value for {0}")]
    Duplicate(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of the atomic assessment commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Request finalized and every listed timesheet approved and locked
    Committed,
    /// The request was no longer pending with that token; nothing was written
    Stale,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn count_admins(&self) -> StoreResult<i64>;

    /// Insert the profile, its roster row and its admin notification together
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    /// Set `approved` and resolve open notifications for the teacher
    async fn approve_teacher(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn set_specialization(&self, id: Uuid, specialization: &str) -> StoreResult<bool>;

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<bool>;

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    // --- Classes ---
    async fn get_class(&self, id: Uuid) -> StoreResult<Option<Class>>;

    async fn list_classes(&self) -> StoreResult<Vec<Class>>;

    async fn create_class(&self, name: &str, teacher_uid: Uuid) -> StoreResult<Class>;

    async fn list_roster(&self, class_id: Uuid) -> StoreResult<Vec<RosterEntry>>;

    async fn remove_roster_entry(&self, class_id: Uuid, student_id: Uuid) -> StoreResult<bool>;

    // --- Timesheets ---
    async fn get_timesheet(&self, id: Uuid) -> StoreResult<Option<Timesheet>>;

    async fn list_timesheets(&self) -> StoreResult<Vec<Timesheet>>;

    async fn list_timesheets_for_student(&self, student_id: Uuid) -> StoreResult<Vec<Timesheet>>;

    async fn set_timesheet_approved(
        &self,
        id: Uuid,
        approved: bool,
    ) -> StoreResult<Option<Timesheet>>;

    async fn delete_timesheet(&self, id: Uuid) -> StoreResult<bool>;

    // --- Assessment requests ---
    async fn get_assessment_request(&self, id: Uuid) -> StoreResult<Option<AssessmentRequest>>;

    async fn list_assessment_requests(&self) -> StoreResult<Vec<AssessmentRequest>>;

    async fn list_assessment_requests_for_student(
        &self,
        student_id: Uuid,
    ) -> StoreResult<Vec<AssessmentRequest>>;

    async fn create_assessment_request(
        &self,
        request: NewAssessmentRequest,
    ) -> StoreResult<AssessmentRequest>;

    async fn delete_assessment_request(&self, id: Uuid) -> StoreResult<bool>;

    /// Finalize a request and approve+lock its timesheets, all or nothing
    async fn commit_assessment(&self, commit: &AssessmentCommit) -> StoreResult<CommitOutcome>;

    // --- Companies ---
    async fn get_company(&self, id: Uuid) -> StoreResult<Option<Company>>;

    async fn list_companies(&self) -> StoreResult<Vec<Company>>;

    async fn create_company(
        &self,
        company: CreateCompany,
        teacher_uid: Uuid,
    ) -> StoreResult<Company>;

    /// Replace the editable fields; owner and creation time are kept
    async fn update_company(
        &self,
        id: Uuid,
        company: CreateCompany,
    ) -> StoreResult<Option<Company>>;

    async fn delete_company(&self, id: Uuid) -> StoreResult<bool>;

    // --- Admin notifications ---
    async fn list_notifications_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> StoreResult<Vec<AdminNotification>>;

    async fn delete_notifications_for_teacher(&self, teacher_id: Uuid) -> StoreResult<u64>;

    // --- Sessions ---
    async fn create_session(&self, session: NewSession) -> StoreResult<()>;

    /// Unexpired session for a token hash
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<Session>>;

    async fn delete_session(&self, token_hash: &str) -> StoreResult<Option<Session>>;

    // --- Rate limiting and audit ---
    /// Attempts from this IP on this endpoint during the last hour
    async fn count_recent_attempts(&self, ip: &str, endpoint: &str) -> StoreResult<i64>;

    async fn record_attempt(&self, ip: &str, endpoint: &str) -> StoreResult<()>;

    async fn record_audit(&self, entry: AuditEntry) -> StoreResult<()>;
}
