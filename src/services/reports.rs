//! Dashboard reads and the small teacher-side writes around them
//! (timesheet review, companies, classes)

use super::audit;
use super::users::load_scope;
use crate::db::Store;
use crate::error::{AccessError, AppError, AppResult};
use crate::hours::{iso_week, parse_week_start, task_totals, Axis};
use crate::models::*;
use crate::scope::Scope;
use crate::validation::{validate_name, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimesheetFilter {
    Pending,
    Approved,
    #[default]
    All,
}

impl TimesheetFilter {
    fn matches(self, sheet: &Timesheet) -> bool {
        match self {
            TimesheetFilter::Pending => !sheet.approved,
            TimesheetFilter::Approved => sheet.approved,
            TimesheetFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DashboardStats {
    pub students: usize,
    pub timesheets_pending: usize,
    pub timesheets_approved: usize,
    pub assessments_pending: usize,
    pub assessments_submitted: usize,
    pub total_hours: f64,
    pub approved_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    #[serde(flatten)]
    pub student: UserResponse,
    pub class_name: Option<String>,
    pub timesheet_count: usize,
    pub total_hours: f64,
    pub approved_hours: f64,
}

/// Lunches and travel approved by supervisors, per ISO week
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeekCompensation {
    pub week: String,
    pub lunches: i32,
    pub travel_km: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentReport {
    pub student: UserResponse,
    pub class_name: Option<String>,
    pub total_hours: f64,
    pub approved_hours: f64,
    pub task_totals: BTreeMap<String, f64>,
    pub timesheets: Vec<TimesheetSummary>,
    pub assessments: Vec<AssessmentRequest>,
    pub submitted_assessments: usize,
    pub compensation: Vec<WeekCompensation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    #[serde(flatten)]
    pub class: Class,
    pub students: Vec<RosterEntry>,
}

// =============================================================================
// Stats and students
// =============================================================================

/// Counts over everything in scope, optionally narrowed to one class
pub async fn stats(
    store: &dyn Store,
    principal: &Principal,
    class_id: Option<Uuid>,
) -> AppResult<DashboardStats> {
    let scope = load_scope(store, principal).await?;
    if let Some(class_id) = class_id {
        if !scope.includes_class(class_id) {
            return Err(AccessError::Forbidden.into());
        }
    }

    let students: Vec<User> = scoped_students(store, &scope)
        .await?
        .into_iter()
        .filter(|s| class_id.is_none() || s.class_id == class_id)
        .collect();
    let student_ids: BTreeSet<Uuid> = students.iter().map(|s| s.id).collect();
    let in_filter = |owner_class: Option<Uuid>, student: Uuid| {
        class_id.is_none() || owner_class == class_id || student_ids.contains(&student)
    };

    let timesheets: Vec<Timesheet> = scope
        .retain(store.list_timesheets().await?)
        .into_iter()
        .filter(|t| in_filter(t.class_id, t.student_uid))
        .collect();
    let requests: Vec<AssessmentRequest> = scope
        .retain(store.list_assessment_requests().await?)
        .into_iter()
        .filter(|r| in_filter(r.class_id, r.student_uid))
        .collect();

    let approved: Vec<&Timesheet> = timesheets.iter().filter(|t| t.approved).collect();
    Ok(DashboardStats {
        students: students.len(),
        timesheets_pending: timesheets.len() - approved.len(),
        timesheets_approved: approved.len(),
        assessments_pending: requests
            .iter()
            .filter(|r| r.status == AssessmentStatus::Pending)
            .count(),
        assessments_submitted: requests
            .iter()
            .filter(|r| r.status == AssessmentStatus::Submitted)
            .count(),
        total_hours: timesheets.iter().map(|t| t.entries.total()).sum(),
        approved_hours: approved.iter().map(|t| t.entries.total()).sum(),
    })
}

pub async fn students(store: &dyn Store, principal: &Principal) -> AppResult<Vec<StudentSummary>> {
    let scope = load_scope(store, principal).await?;
    let class_names = class_names(store).await?;
    let timesheets = scope.retain(store.list_timesheets().await?);

    let mut summaries: Vec<StudentSummary> = scoped_students(store, &scope)
        .await?
        .into_iter()
        .map(|student| {
            let own: Vec<&Timesheet> = timesheets
                .iter()
                .filter(|t| t.student_uid == student.id)
                .collect();
            StudentSummary {
                class_name: student.class_id.and_then(|c| class_names.get(&c).cloned()),
                timesheet_count: own.len(),
                total_hours: own.iter().map(|t| t.entries.total()).sum(),
                approved_hours: own
                    .iter()
                    .filter(|t| t.approved)
                    .map(|t| t.entries.total())
                    .sum(),
                student: student.into(),
            }
        })
        .collect();
    summaries.sort_by(|a, b| a.student.name.cmp(&b.student.name));
    Ok(summaries)
}

/// Everything the dashboard shows for one student
pub async fn student_report(
    store: &dyn Store,
    principal: &Principal,
    student_id: Uuid,
) -> AppResult<StudentReport> {
    let student = store
        .get_user(student_id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or(AppError::NotFound("Student"))?;

    let scope = load_scope(store, principal).await?;
    if !scope.includes_student(student.id) {
        return Err(AccessError::Forbidden.into());
    }

    let class_name = match student.class_id {
        Some(class_id) => store.get_class(class_id).await?.map(|c| c.name),
        None => None,
    };

    let sheets = store.list_timesheets_for_student(student.id).await?;
    let approved: Vec<&Timesheet> = sheets.iter().filter(|t| t.approved).collect();
    let assessments = store.list_assessment_requests_for_student(student.id).await?;
    let submitted: Vec<&AssessmentRequest> = assessments
        .iter()
        .filter(|r| r.status == AssessmentStatus::Submitted)
        .collect();

    let names = HashMap::from([(student.id, student.name.clone())]);
    Ok(StudentReport {
        class_name,
        total_hours: sheets.iter().map(|t| t.entries.total()).sum(),
        approved_hours: approved.iter().map(|t| t.entries.total()).sum(),
        task_totals: task_totals(sheets.iter().filter(|t| t.approved).map(|t| &t.entries.0)),
        timesheets: sheets.iter().map(|t| summarize(t, &names)).collect(),
        submitted_assessments: submitted.len(),
        compensation: compensation_by_week(&submitted),
        assessments,
        student: student.into(),
    })
}

/// Sum approved lunches and travel per week, newest week first.
///
/// A request counts towards the first week it covers.
pub fn compensation_by_week(requests: &[&AssessmentRequest]) -> Vec<WeekCompensation> {
    let mut weeks: BTreeMap<String, (i32, i32)> = BTreeMap::new();

    for request in requests {
        if request.lunch_approved.is_none() && request.travel_approved.is_none() {
            continue;
        }
        let Some(first) = request.weeks.iter().min() else {
            continue;
        };
        let key = match parse_week_start(first) {
            Some(date) => iso_week(date).to_string(),
            None => first.clone(),
        };
        let totals = weeks.entry(key).or_insert((0, 0));
        totals.0 += request.lunch_approved.unwrap_or(0);
        totals.1 += request.travel_approved.unwrap_or(0);
    }

    weeks
        .into_iter()
        .rev()
        .map(|(week, (lunches, travel_km))| WeekCompensation {
            week,
            lunches,
            travel_km,
        })
        .collect()
}

// =============================================================================
// Timesheets
// =============================================================================

/// Visible timesheets, newest week first
pub async fn timesheets(
    store: &dyn Store,
    principal: &Principal,
    filter: TimesheetFilter,
) -> AppResult<Vec<TimesheetSummary>> {
    let scope = load_scope(store, principal).await?;
    let names: HashMap<Uuid, String> = store
        .list_users()
        .await?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();

    let mut sheets: Vec<Timesheet> = scope
        .retain(store.list_timesheets().await?)
        .into_iter()
        .filter(|t| filter.matches(t))
        .collect();
    sheets.sort_by(|a, b| b.week_start.cmp(&a.week_start));

    Ok(sheets.iter().map(|t| summarize(t, &names)).collect())
}

/// Approve or reject one timesheet. Locked timesheets cannot be rejected.
pub async fn review_timesheet(
    store: &dyn Store,
    principal: &Principal,
    timesheet_id: Uuid,
    approve: bool,
) -> AppResult<TimesheetSummary> {
    let sheet = store
        .get_timesheet(timesheet_id)
        .await?
        .ok_or(AppError::NotFound("Timesheet"))?;

    let scope = load_scope(store, principal).await?;
    if !scope.permits(&sheet) {
        return Err(AccessError::Forbidden.into());
    }
    if !approve && sheet.locked {
        return Err(AppError::Conflict(
            "This timesheet is locked by a submitted assessment".to_string(),
        ));
    }

    let updated = store
        .set_timesheet_approved(timesheet_id, approve)
        .await?
        .ok_or(AppError::NotFound("Timesheet"))?;

    let action = if approve {
        "timesheet_approved"
    } else {
        "timesheet_rejected"
    };
    audit(
        store,
        AuditEntry::new(action, "timesheet", timesheet_id).by(principal.id),
    )
    .await;

    let names = match store.get_user(updated.student_uid).await? {
        Some(student) => HashMap::from([(student.id, student.name)]),
        None => HashMap::new(),
    };
    Ok(summarize(&updated, &names))
}

fn summarize(sheet: &Timesheet, names: &HashMap<Uuid, String>) -> TimesheetSummary {
    TimesheetSummary {
        id: sheet.id,
        student_uid: sheet.student_uid,
        student_name: names.get(&sheet.student_uid).cloned().unwrap_or_default(),
        week_start: sheet.week_start,
        week: sheet.week_start.map(iso_week),
        total_hours: sheet.entries.total(),
        subtotals: sheet.entries.totals_by(Axis::Outer),
        approved: sheet.approved,
        locked: sheet.locked,
    }
}

// =============================================================================
// Companies
// =============================================================================

pub async fn companies(store: &dyn Store, principal: &Principal) -> AppResult<Vec<Company>> {
    let scope = load_scope(store, principal).await?;
    Ok(scope.retain(store.list_companies().await?))
}

pub async fn create_company(
    store: &dyn Store,
    principal: &Principal,
    mut input: CreateCompany,
) -> AppResult<Company> {
    input.name = validate_name("name", &input.name)?;
    check_company_links(store, principal, &input).await?;

    let company = store.create_company(input, principal.id).await?;
    tracing::info!("Company {} created by {}", company.id, principal.id);
    Ok(company)
}

/// Replace a company's details. Same ownership rule as deletion.
pub async fn update_company(
    store: &dyn Store,
    principal: &Principal,
    id: Uuid,
    mut input: CreateCompany,
) -> AppResult<Company> {
    owned_company(store, principal, id).await?;
    input.name = validate_name("name", &input.name)?;
    check_company_links(store, principal, &input).await?;

    let company = store
        .update_company(id, input)
        .await?
        .ok_or(AppError::NotFound("Company"))?;
    tracing::info!("Company {} updated by {}", company.id, principal.id);
    Ok(company)
}

/// Only the owning teacher or an admin may delete a company
pub async fn delete_company(store: &dyn Store, principal: &Principal, id: Uuid) -> AppResult<()> {
    owned_company(store, principal, id).await?;
    store.delete_company(id).await?;
    Ok(())
}

async fn owned_company(store: &dyn Store, principal: &Principal, id: Uuid) -> AppResult<Company> {
    let company = store
        .get_company(id)
        .await?
        .ok_or(AppError::NotFound("Company"))?;
    if !principal.is_admin() && company.teacher_uid != principal.id {
        return Err(AccessError::Forbidden.into());
    }
    Ok(company)
}

/// A company may only point at a class or student the caller can see
async fn check_company_links(
    store: &dyn Store,
    principal: &Principal,
    input: &CreateCompany,
) -> AppResult<()> {
    let scope = load_scope(store, principal).await?;
    if input.class_id.is_some_and(|c| !scope.includes_class(c))
        || input.student_id.is_some_and(|s| !scope.includes_student(s))
    {
        return Err(AccessError::Forbidden.into());
    }
    Ok(())
}

// =============================================================================
// Classes
// =============================================================================

pub async fn classes(store: &dyn Store, principal: &Principal) -> AppResult<Vec<ClassSummary>> {
    let scope = load_scope(store, principal).await?;
    let mut summaries = Vec::new();
    for class in store.list_classes().await? {
        if scope.includes_class(class.id) {
            let students = store.list_roster(class.id).await?;
            summaries.push(ClassSummary { class, students });
        }
    }
    Ok(summaries)
}

/// Teachers create classes for themselves; admins may name another teacher
pub async fn create_class(
    store: &dyn Store,
    principal: &Principal,
    input: &CreateClassRequest,
) -> AppResult<Class> {
    let name = validate_name("name", &input.name)?;

    let teacher_uid = match (principal.role, input.teacher_uid) {
        (Role::Admin, Some(teacher_uid)) => {
            let owner = store
                .get_user(teacher_uid)
                .await?
                .ok_or(AppError::NotFound("Teacher"))?;
            if owner.role != Role::Teacher {
                return Err(ValidationError::WrongRole {
                    expected: "teacher",
                }
                .into());
            }
            teacher_uid
        }
        _ => principal.id,
    };

    let class = store.create_class(&name, teacher_uid).await?;
    tracing::info!("Class {} ({}) created for teacher {}", class.id, class.name, teacher_uid);
    Ok(class)
}

async fn scoped_students(store: &dyn Store, scope: &Scope) -> AppResult<Vec<User>> {
    Ok(store
        .list_users()
        .await?
        .into_iter()
        .filter(|u| u.role == Role::Student && scope.includes_student(u.id))
        .collect())
}

async fn class_names(store: &dyn Store) -> AppResult<HashMap<Uuid, String>> {
    Ok(store
        .list_classes()
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}
