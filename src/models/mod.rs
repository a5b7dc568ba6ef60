//! Data models for the application

use crate::hours::Entries;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assessment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    Submitted,
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub class_id: Option<Uuid>,
    pub teacher_uid: Option<Uuid>,
    pub school: Option<String>,
    pub approved: bool,
    pub specialization: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile data safe to hand to the dashboard (no credentials)
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub class_id: Option<Uuid>,
    pub teacher_uid: Option<Uuid>,
    pub school: Option<String>,
    pub approved: bool,
    pub specialization: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            name: user.name,
            email: user.email,
            class_id: user.class_id,
            teacher_uid: user.teacher_uid,
            school: user.school,
            approved: user.approved,
            specialization: user.specialization,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub role: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub school: Option<String>,
    pub class_id: Option<Uuid>,
    pub teacher_uid: Option<Uuid>,
    #[serde(default)]
    pub approved: bool,
}

/// A fully validated user ready to be written, credentials already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub class_id: Option<Uuid>,
    pub teacher_uid: Option<Uuid>,
    pub school: Option<String>,
    pub approved: bool,
}

impl NewUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Students placed in a class get a roster row alongside the profile
    pub fn needs_roster_entry(&self) -> bool {
        self.role == Role::Student && self.class_id.is_some()
    }

    /// Unapproved teachers are announced to the admins
    pub fn needs_admin_notification(&self) -> bool {
        self.role == Role::Teacher && !self.approved
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecializationRequest {
    pub specialization: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// The authenticated caller, passed explicitly into every scoped operation
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// =============================================================================
// Class
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Class {
    pub id: Uuid,
    pub name: String,
    pub teacher_uid: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClassRequest {
    pub name: String,
    /// Only honoured for admins; teachers always own the classes they create
    pub teacher_uid: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RosterEntry {
    pub class_id: Uuid,
    pub student_id: Uuid,
    pub name: String,
    pub email: String,
    pub added_at: DateTime<Utc>,
}

// =============================================================================
// Timesheet
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Timesheet {
    pub id: Uuid,
    pub student_uid: Uuid,
    pub teacher_uid: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub week_start: Option<NaiveDate>,
    pub entries: Json<Entries>,
    pub approved: bool,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimesheetSummary {
    pub id: Uuid,
    pub student_uid: Uuid,
    pub student_name: String,
    pub week_start: Option<NaiveDate>,
    pub week: Option<crate::hours::WeekNumber>,
    pub total_hours: f64,
    pub subtotals: BTreeMap<String, f64>,
    pub approved: bool,
    pub locked: bool,
}

// =============================================================================
// Assessment Request
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachedImage {
    pub url: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionAssessment {
    pub rating: u8,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AssessmentRequest {
    pub id: Uuid,
    pub student_uid: Uuid,
    pub student_name: String,
    pub teacher_uid: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub weeks: Json<Vec<String>>,
    pub total_hours: f64,
    pub status: AssessmentStatus,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub timesheet_ids: Vec<Uuid>,
    pub lunch_count: i32,
    pub travel_count: i32,
    pub images: Json<Vec<AttachedImage>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub supervisor_company: Option<String>,
    pub supervisor_name: Option<String>,
    pub supervisor_phone: Option<String>,
    pub lunch_approved: Option<i32>,
    pub travel_approved: Option<i32>,
    pub assessment_data: Option<Json<BTreeMap<String, CriterionAssessment>>>,
    pub average_rating: Option<String>,
    pub image_comments: Option<Json<BTreeMap<u32, String>>>,
    pub created_at: DateTime<Utc>,
}

/// Teacher input for issuing a supervisor link
#[derive(Debug, Clone, Deserialize)]
pub struct IssueAssessmentRequest {
    pub student_id: Uuid,
    pub weeks: Vec<String>,
    #[serde(default)]
    pub timesheet_ids: Vec<Uuid>,
    #[serde(default)]
    pub lunch_count: i32,
    #[serde(default)]
    pub travel_count: i32,
    #[serde(default)]
    pub images: Vec<AttachedImage>,
}

#[derive(Debug, Clone)]
pub struct NewAssessmentRequest {
    pub student_uid: Uuid,
    pub student_name: String,
    pub teacher_uid: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub weeks: Vec<String>,
    pub total_hours: f64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub timesheet_ids: Vec<Uuid>,
    pub lunch_count: i32,
    pub travel_count: i32,
    pub images: Vec<AttachedImage>,
}

/// Supervisor form payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssessmentSubmission {
    #[serde(default)]
    pub ratings: BTreeMap<String, i64>,
    #[serde(default)]
    pub comments: BTreeMap<String, String>,
    #[serde(default)]
    pub supervisor_company: String,
    #[serde(default)]
    pub supervisor_name: String,
    #[serde(default)]
    pub supervisor_phone: String,
    #[serde(default)]
    pub lunch_approved: i64,
    #[serde(default)]
    pub travel_approved: i64,
    #[serde(default)]
    pub image_comments: BTreeMap<u32, String>,
}

/// Every write of a successful supervisor submission, applied as one unit
#[derive(Debug, Clone)]
pub struct AssessmentCommit {
    pub request_id: Uuid,
    pub token_hash: String,
    pub student_uid: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub supervisor_company: String,
    pub supervisor_name: String,
    pub supervisor_phone: String,
    pub lunch_approved: i32,
    pub travel_approved: i32,
    pub assessment_data: BTreeMap<String, CriterionAssessment>,
    pub average_rating: String,
    pub image_comments: BTreeMap<u32, String>,
    pub timesheet_ids: Vec<Uuid>,
}

// =============================================================================
// Company
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub teacher_uid: Uuid,
    pub class_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCompany {
    pub name: String,
    pub class_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

// =============================================================================
// Admin Notification
// =============================================================================

pub const NOTIFICATION_NEW_TEACHER: &str = "new_teacher";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AdminNotification {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub teacher_email: String,
    pub school: Option<String>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

// =============================================================================
// Audit
// =============================================================================

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub actor_ip: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(action: &'static str, entity_type: &'static str, entity_id: Uuid) -> Self {
        Self {
            action,
            entity_type,
            entity_id: Some(entity_id),
            actor_id: None,
            actor_ip: None,
            details: None,
        }
    }

    pub fn by(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn from_ip(mut self, ip: impl Into<String>) -> Self {
        self.actor_ip = Some(ip.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// =============================================================================
// API Responses
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
