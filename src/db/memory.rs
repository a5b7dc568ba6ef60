//! In-memory [`Store`] for unit tests, with hooks to inject failures

use super::store::{CommitOutcome, Store, StoreError, StoreResult};
use crate::models::*;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Data {
    users: HashMap<Uuid, User>,
    classes: HashMap<Uuid, Class>,
    roster: Vec<RosterEntry>,
    timesheets: HashMap<Uuid, Timesheet>,
    requests: HashMap<Uuid, AssessmentRequest>,
    companies: HashMap<Uuid, Company>,
    notifications: Vec<AdminNotification>,
    sessions: Vec<Session>,
    attempts: Vec<(String, String, chrono::DateTime<Utc>)>,
    audit: Vec<AuditEntry>,
    fail_commits: bool,
    failing_timesheet_deletes: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap()
    }

    pub fn insert_user(&self, user: User) -> User {
        self.data().users.insert(user.id, user.clone());
        user
    }

    pub fn insert_class(&self, class: Class) -> Class {
        self.data().classes.insert(class.id, class.clone());
        class
    }

    pub fn insert_roster_entry(&self, class_id: Uuid, student: &User) {
        self.data().roster.push(RosterEntry {
            class_id,
            student_id: student.id,
            name: student.name.clone(),
            email: student.email.clone(),
            added_at: Utc::now(),
        });
    }

    pub fn insert_timesheet(&self, timesheet: Timesheet) -> Timesheet {
        self.data().timesheets.insert(timesheet.id, timesheet.clone());
        timesheet
    }

    pub fn insert_request(&self, request: AssessmentRequest) -> AssessmentRequest {
        self.data().requests.insert(request.id, request.clone());
        request
    }

    pub fn insert_company(&self, company: Company) -> Company {
        self.data().companies.insert(company.id, company.clone());
        company
    }

    pub fn timesheet(&self, id: Uuid) -> Option<Timesheet> {
        self.data().timesheets.get(&id).cloned()
    }

    pub fn request(&self, id: Uuid) -> Option<AssessmentRequest> {
        self.data().requests.get(&id).cloned()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.data().users.get(&id).cloned()
    }

    pub fn notification_count(&self) -> usize {
        self.data().notifications.len()
    }

    pub fn session_count(&self) -> usize {
        self.data().sessions.len()
    }

    pub fn audit_actions(&self) -> Vec<&'static str> {
        self.data().audit.iter().map(|e| e.action).collect()
    }

    /// Make every assessment commit fail as if the database went away
    pub fn fail_commits(&self) {
        self.data().fail_commits = true;
    }

    /// Make deleting this timesheet fail
    pub fn fail_timesheet_delete(&self, id: Uuid) {
        self.data().failing_timesheet_deletes.insert(id);
    }
}

/// What an injected failure looks like to callers
fn injected_failure() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.data().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .data()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.data().users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn count_admins(&self) -> StoreResult<i64> {
        Ok(self
            .data()
            .users
            .values()
            .filter(|u| u.role == Role::Admin)
            .count() as i64)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut data = self.data();
        if data
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Duplicate("email"));
        }

        let name = user.full_name();
        let created = User {
            id: Uuid::new_v4(),
            role: user.role,
            name: name.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            class_id: user.class_id,
            teacher_uid: user.teacher_uid,
            school: user.school.clone(),
            approved: user.approved,
            specialization: None,
            created_at: Utc::now(),
        };

        if let (true, Some(class_id)) = (user.needs_roster_entry(), user.class_id) {
            data.roster.push(RosterEntry {
                class_id,
                student_id: created.id,
                name: name.clone(),
                email: created.email.clone(),
                added_at: Utc::now(),
            });
        }
        if user.needs_admin_notification() {
            data.notifications.push(AdminNotification {
                id: Uuid::new_v4(),
                kind: NOTIFICATION_NEW_TEACHER.to_string(),
                teacher_id: created.id,
                teacher_name: name,
                teacher_email: created.email.clone(),
                school: created.school.clone(),
                resolved: false,
                created_at: Utc::now(),
            });
        }

        data.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn approve_teacher(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut data = self.data();
        let user = match data.users.get_mut(&id) {
            Some(u) if u.role == Role::Teacher => {
                u.approved = true;
                u.clone()
            }
            _ => return Ok(None),
        };
        for n in data.notifications.iter_mut().filter(|n| n.teacher_id == id) {
            n.resolved = true;
        }
        Ok(Some(user))
    }

    async fn set_specialization(&self, id: Uuid, specialization: &str) -> StoreResult<bool> {
        match self.data().users.get_mut(&id) {
            Some(u) if u.role == Role::Student => {
                u.specialization = Some(specialization.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<bool> {
        match self.data().users.get_mut(&id) {
            Some(u) => {
                u.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut data = self.data();
        data.sessions.retain(|s| s.user_id != id);
        Ok(data.users.remove(&id).is_some())
    }

    async fn get_class(&self, id: Uuid) -> StoreResult<Option<Class>> {
        Ok(self.data().classes.get(&id).cloned())
    }

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        let mut classes: Vec<Class> = self.data().classes.values().cloned().collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(classes)
    }

    async fn create_class(&self, name: &str, teacher_uid: Uuid) -> StoreResult<Class> {
        let class = Class {
            id: Uuid::new_v4(),
            name: name.to_string(),
            teacher_uid,
            created_at: Utc::now(),
        };
        Ok(self.insert_class(class))
    }

    async fn list_roster(&self, class_id: Uuid) -> StoreResult<Vec<RosterEntry>> {
        Ok(self
            .data()
            .roster
            .iter()
            .filter(|r| r.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn remove_roster_entry(&self, class_id: Uuid, student_id: Uuid) -> StoreResult<bool> {
        let mut data = self.data();
        let before = data.roster.len();
        data.roster
            .retain(|r| !(r.class_id == class_id && r.student_id == student_id));
        Ok(data.roster.len() < before)
    }

    async fn get_timesheet(&self, id: Uuid) -> StoreResult<Option<Timesheet>> {
        Ok(self.data().timesheets.get(&id).cloned())
    }

    async fn list_timesheets(&self) -> StoreResult<Vec<Timesheet>> {
        let mut sheets: Vec<Timesheet> = self.data().timesheets.values().cloned().collect();
        sheets.sort_by(|a, b| b.week_start.cmp(&a.week_start));
        Ok(sheets)
    }

    async fn list_timesheets_for_student(&self, student_id: Uuid) -> StoreResult<Vec<Timesheet>> {
        let mut sheets: Vec<Timesheet> = self
            .data()
            .timesheets
            .values()
            .filter(|t| t.student_uid == student_id)
            .cloned()
            .collect();
        sheets.sort_by(|a, b| b.week_start.cmp(&a.week_start));
        Ok(sheets)
    }

    async fn set_timesheet_approved(
        &self,
        id: Uuid,
        approved: bool,
    ) -> StoreResult<Option<Timesheet>> {
        Ok(self.data().timesheets.get_mut(&id).map(|t| {
            t.approved = approved;
            t.updated_at = Utc::now();
            t.clone()
        }))
    }

    async fn delete_timesheet(&self, id: Uuid) -> StoreResult<bool> {
        let mut data = self.data();
        if data.failing_timesheet_deletes.contains(&id) {
            return Err(injected_failure());
        }
        Ok(data.timesheets.remove(&id).is_some())
    }

    async fn get_assessment_request(&self, id: Uuid) -> StoreResult<Option<AssessmentRequest>> {
        Ok(self.data().requests.get(&id).cloned())
    }

    async fn list_assessment_requests(&self) -> StoreResult<Vec<AssessmentRequest>> {
        let mut requests: Vec<AssessmentRequest> =
            self.data().requests.values().cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn list_assessment_requests_for_student(
        &self,
        student_id: Uuid,
    ) -> StoreResult<Vec<AssessmentRequest>> {
        Ok(self
            .data()
            .requests
            .values()
            .filter(|r| r.student_uid == student_id)
            .cloned()
            .collect())
    }

    async fn create_assessment_request(
        &self,
        request: NewAssessmentRequest,
    ) -> StoreResult<AssessmentRequest> {
        let created = AssessmentRequest {
            id: Uuid::new_v4(),
            student_uid: request.student_uid,
            student_name: request.student_name,
            teacher_uid: request.teacher_uid,
            class_id: request.class_id,
            weeks: Json(request.weeks),
            total_hours: request.total_hours,
            status: AssessmentStatus::Pending,
            token_hash: request.token_hash,
            expires_at: request.expires_at,
            timesheet_ids: request.timesheet_ids,
            lunch_count: request.lunch_count,
            travel_count: request.travel_count,
            images: Json(request.images),
            submitted_at: None,
            supervisor_company: None,
            supervisor_name: None,
            supervisor_phone: None,
            lunch_approved: None,
            travel_approved: None,
            assessment_data: None,
            average_rating: None,
            image_comments: None,
            created_at: Utc::now(),
        };
        Ok(self.insert_request(created))
    }

    async fn delete_assessment_request(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.data().requests.remove(&id).is_some())
    }

    async fn commit_assessment(&self, commit: &AssessmentCommit) -> StoreResult<CommitOutcome> {
        let mut guard = self.data();
        let data = &mut *guard;
        if data.fail_commits {
            return Err(injected_failure());
        }

        let Some(request) = data.requests.get_mut(&commit.request_id) else {
            return Ok(CommitOutcome::Stale);
        };
        if request.status != AssessmentStatus::Pending
            || request.token_hash != commit.token_hash
            || request.expires_at < commit.submitted_at
        {
            return Ok(CommitOutcome::Stale);
        }

        request.status = AssessmentStatus::Submitted;
        request.submitted_at = Some(commit.submitted_at);
        request.supervisor_company = Some(commit.supervisor_company.clone());
        request.supervisor_name = Some(commit.supervisor_name.clone());
        request.supervisor_phone = Some(commit.supervisor_phone.clone());
        request.lunch_approved = Some(commit.lunch_approved);
        request.travel_approved = Some(commit.travel_approved);
        request.assessment_data = Some(Json(commit.assessment_data.clone()));
        request.average_rating = Some(commit.average_rating.clone());
        request.image_comments = Some(Json(commit.image_comments.clone()));

        for id in &commit.timesheet_ids {
            let sheet = data.timesheets.entry(*id).or_insert_with(|| Timesheet {
                id: *id,
                student_uid: commit.student_uid,
                teacher_uid: None,
                class_id: None,
                week_start: None,
                entries: Json(Default::default()),
                approved: false,
                locked: false,
                created_at: commit.submitted_at,
                updated_at: commit.submitted_at,
            });
            sheet.approved = true;
            sheet.locked = true;
            sheet.updated_at = commit.submitted_at;
        }

        Ok(CommitOutcome::Committed)
    }

    async fn get_company(&self, id: Uuid) -> StoreResult<Option<Company>> {
        Ok(self.data().companies.get(&id).cloned())
    }

    async fn list_companies(&self) -> StoreResult<Vec<Company>> {
        let mut companies: Vec<Company> = self.data().companies.values().cloned().collect();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(companies)
    }

    async fn create_company(
        &self,
        company: CreateCompany,
        teacher_uid: Uuid,
    ) -> StoreResult<Company> {
        let created = Company {
            id: Uuid::new_v4(),
            name: company.name,
            teacher_uid,
            class_id: company.class_id,
            student_id: company.student_id,
            address: company.address,
            contact_person: company.contact_person,
            phone: company.phone,
            email: company.email,
            created_at: Utc::now(),
        };
        Ok(self.insert_company(created))
    }

    async fn update_company(
        &self,
        id: Uuid,
        company: CreateCompany,
    ) -> StoreResult<Option<Company>> {
        let mut data = self.data();
        let Some(existing) = data.companies.get_mut(&id) else {
            return Ok(None);
        };
        existing.name = company.name;
        existing.class_id = company.class_id;
        existing.student_id = company.student_id;
        existing.address = company.address;
        existing.contact_person = company.contact_person;
        existing.phone = company.phone;
        existing.email = company.email;
        Ok(Some(existing.clone()))
    }

    async fn delete_company(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.data().companies.remove(&id).is_some())
    }

    async fn list_notifications_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> StoreResult<Vec<AdminNotification>> {
        Ok(self
            .data()
            .notifications
            .iter()
            .filter(|n| n.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    async fn delete_notifications_for_teacher(&self, teacher_id: Uuid) -> StoreResult<u64> {
        let mut data = self.data();
        let before = data.notifications.len();
        data.notifications.retain(|n| n.teacher_id != teacher_id);
        Ok((before - data.notifications.len()) as u64)
    }

    async fn create_session(&self, session: NewSession) -> StoreResult<()> {
        self.data().sessions.push(Session {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            created_at: Utc::now(),
            ip_address: Some(session.ip_address),
            user_agent: session.user_agent,
        });
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let now = Utc::now();
        Ok(self
            .data()
            .sessions
            .iter()
            .find(|s| s.token_hash == token_hash && s.expires_at > now)
            .cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let mut data = self.data();
        let position = data.sessions.iter().position(|s| s.token_hash == token_hash);
        Ok(position.map(|i| data.sessions.remove(i)))
    }

    async fn count_recent_attempts(&self, ip: &str, endpoint: &str) -> StoreResult<i64> {
        let cutoff = Utc::now() - Duration::hours(1);
        Ok(self
            .data()
            .attempts
            .iter()
            .filter(|(i, e, at)| i == ip && e == endpoint && *at > cutoff)
            .count() as i64)
    }

    async fn record_attempt(&self, ip: &str, endpoint: &str) -> StoreResult<()> {
        self.data()
            .attempts
            .push((ip.to_string(), endpoint.to_string(), Utc::now()));
        Ok(())
    }

    async fn record_audit(&self, entry: AuditEntry) -> StoreResult<()> {
        self.data().audit.push(entry);
        Ok(())
    }
}
