//! PostgreSQL implementation of [`Store`]

use super::store::{CommitOutcome, Store, StoreError, StoreResult};
use crate::models::*;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Turn a unique-constraint violation into a domain error
fn map_unique(e: sqlx::Error, field: &'static str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Duplicate(field)
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn count_admins(&self) -> StoreResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        let name = user.full_name();

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (role, name, first_name, last_name, email, password_hash,
                               class_id, teacher_uid, school, approved)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(user.role)
        .bind(&name)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.class_id)
        .bind(user.teacher_uid)
        .bind(&user.school)
        .bind(user.approved)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "email"))?;

        if let (true, Some(class_id)) = (user.needs_roster_entry(), user.class_id) {
            sqlx::query(
                r#"
                INSERT INTO class_students (class_id, student_id, name, email)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (class_id, student_id) DO NOTHING
                "#,
            )
            .bind(class_id)
            .bind(created.id)
            .bind(&name)
            .bind(&created.email)
            .execute(&mut *tx)
            .await?;
        }

        if user.needs_admin_notification() {
            sqlx::query(
                r#"
                INSERT INTO admin_notifications
                    (type, teacher_id, teacher_name, teacher_email, school)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(NOTIFICATION_NEW_TEACHER)
            .bind(created.id)
            .bind(&name)
            .bind(&created.email)
            .bind(&created.school)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn approve_teacher(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET approved = true WHERE id = $1 AND role = 'teacher' RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if user.is_some() {
            sqlx::query("UPDATE admin_notifications SET resolved = true WHERE teacher_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn set_specialization(&self, id: Uuid, specialization: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET specialization = $2 WHERE id = $1 AND role = 'student'",
        )
        .bind(id)
        .bind(specialization)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_class(&self, id: Uuid) -> StoreResult<Option<Class>> {
        Ok(sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        Ok(
            sqlx::query_as::<_, Class>("SELECT * FROM classes ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_class(&self, name: &str, teacher_uid: Uuid) -> StoreResult<Class> {
        Ok(sqlx::query_as::<_, Class>(
            "INSERT INTO classes (name, teacher_uid) VALUES ($1, $2) RETURNING *",
        )
        .bind(name)
        .bind(teacher_uid)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_roster(&self, class_id: Uuid) -> StoreResult<Vec<RosterEntry>> {
        Ok(sqlx::query_as::<_, RosterEntry>(
            "SELECT * FROM class_students WHERE class_id = $1 ORDER BY name",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn remove_roster_entry(&self, class_id: Uuid, student_id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM class_students WHERE class_id = $1 AND student_id = $2")
                .bind(class_id)
                .bind(student_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_timesheet(&self, id: Uuid) -> StoreResult<Option<Timesheet>> {
        Ok(
            sqlx::query_as::<_, Timesheet>("SELECT * FROM timesheets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_timesheets(&self) -> StoreResult<Vec<Timesheet>> {
        Ok(sqlx::query_as::<_, Timesheet>(
            "SELECT * FROM timesheets ORDER BY week_start DESC NULLS LAST, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_timesheets_for_student(&self, student_id: Uuid) -> StoreResult<Vec<Timesheet>> {
        Ok(sqlx::query_as::<_, Timesheet>(
            r#"
            SELECT * FROM timesheets
            WHERE student_uid = $1
            ORDER BY week_start DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_timesheet_approved(
        &self,
        id: Uuid,
        approved: bool,
    ) -> StoreResult<Option<Timesheet>> {
        Ok(sqlx::query_as::<_, Timesheet>(
            r#"
            UPDATE timesheets SET approved = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_timesheet(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM timesheets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_assessment_request(&self, id: Uuid) -> StoreResult<Option<AssessmentRequest>> {
        Ok(sqlx::query_as::<_, AssessmentRequest>(
            "SELECT * FROM assessment_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_assessment_requests(&self) -> StoreResult<Vec<AssessmentRequest>> {
        Ok(sqlx::query_as::<_, AssessmentRequest>(
            "SELECT * FROM assessment_requests ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_assessment_requests_for_student(
        &self,
        student_id: Uuid,
    ) -> StoreResult<Vec<AssessmentRequest>> {
        Ok(sqlx::query_as::<_, AssessmentRequest>(
            "SELECT * FROM assessment_requests WHERE student_uid = $1 ORDER BY created_at DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_assessment_request(
        &self,
        request: NewAssessmentRequest,
    ) -> StoreResult<AssessmentRequest> {
        Ok(sqlx::query_as::<_, AssessmentRequest>(
            r#"
            INSERT INTO assessment_requests (
                student_uid, student_name, teacher_uid, class_id, weeks, total_hours,
                token_hash, expires_at, timesheet_ids, lunch_count, travel_count, images
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(request.student_uid)
        .bind(&request.student_name)
        .bind(request.teacher_uid)
        .bind(request.class_id)
        .bind(Json(&request.weeks))
        .bind(request.total_hours)
        .bind(&request.token_hash)
        .bind(request.expires_at)
        .bind(&request.timesheet_ids)
        .bind(request.lunch_count)
        .bind(request.travel_count)
        .bind(Json(&request.images))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_assessment_request(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM assessment_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_assessment(&self, commit: &AssessmentCommit) -> StoreResult<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        // The status and token guard makes a second submission of the same
        // link a no-op rather than an overwrite.
        let finalized = sqlx::query(
            r#"
            UPDATE assessment_requests SET
                status = 'submitted',
                submitted_at = $3,
                supervisor_company = $4,
                supervisor_name = $5,
                supervisor_phone = $6,
                lunch_approved = $7,
                travel_approved = $8,
                assessment_data = $9,
                average_rating = $10,
                image_comments = $11
            WHERE id = $1 AND token_hash = $2 AND status = 'pending' AND expires_at >= $3
            "#,
        )
        .bind(commit.request_id)
        .bind(&commit.token_hash)
        .bind(commit.submitted_at)
        .bind(&commit.supervisor_company)
        .bind(&commit.supervisor_name)
        .bind(&commit.supervisor_phone)
        .bind(commit.lunch_approved)
        .bind(commit.travel_approved)
        .bind(Json(&commit.assessment_data))
        .bind(&commit.average_rating)
        .bind(Json(&commit.image_comments))
        .execute(&mut *tx)
        .await?;

        if finalized.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::Stale);
        }

        // Upsert: a listed timesheet that no longer exists comes back as a
        // locked stub owned by the student.
        sqlx::query(
            r#"
            INSERT INTO timesheets (id, student_uid, approved, locked)
            SELECT ts_id, $2, true, true FROM UNNEST($1::uuid[]) AS ts_id
            ON CONFLICT (id) DO UPDATE SET approved = true, locked = true, updated_at = NOW()
            "#,
        )
        .bind(&commit.timesheet_ids)
        .bind(commit.student_uid)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn get_company(&self, id: Uuid) -> StoreResult<Option<Company>> {
        Ok(
            sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_companies(&self) -> StoreResult<Vec<Company>> {
        Ok(
            sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_company(
        &self,
        company: CreateCompany,
        teacher_uid: Uuid,
    ) -> StoreResult<Company> {
        Ok(sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (name, teacher_uid, class_id, student_id, address,
                                   contact_person, phone, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&company.name)
        .bind(teacher_uid)
        .bind(company.class_id)
        .bind(company.student_id)
        .bind(&company.address)
        .bind(&company.contact_person)
        .bind(&company.phone)
        .bind(&company.email)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_company(
        &self,
        id: Uuid,
        company: CreateCompany,
    ) -> StoreResult<Option<Company>> {
        Ok(sqlx::query_as::<_, Company>(
            r#"
            UPDATE companies SET
                name = $2,
                class_id = $3,
                student_id = $4,
                address = $5,
                contact_person = $6,
                phone = $7,
                email = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&company.name)
        .bind(company.class_id)
        .bind(company.student_id)
        .bind(&company.address)
        .bind(&company.contact_person)
        .bind(&company.phone)
        .bind(&company.email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_company(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_notifications_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> StoreResult<Vec<AdminNotification>> {
        Ok(sqlx::query_as::<_, AdminNotification>(
            "SELECT * FROM admin_notifications WHERE teacher_id = $1 ORDER BY created_at",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_notifications_for_teacher(&self, teacher_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM admin_notifications WHERE teacher_id = $1")
            .bind(teacher_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_session(&self, session: NewSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE token_hash = $1 AND expires_at > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        Ok(sqlx::query_as::<_, Session>(
            "DELETE FROM sessions WHERE token_hash = $1 RETURNING *",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn count_recent_attempts(&self, ip: &str, endpoint: &str) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM rate_limit_attempts
            WHERE ip_address = $1 AND endpoint = $2
            AND attempted_at > NOW() - INTERVAL '1 hour'
            "#,
        )
        .bind(ip)
        .bind(endpoint)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn record_attempt(&self, ip: &str, endpoint: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO rate_limit_attempts (ip_address, endpoint) VALUES ($1, $2)")
            .bind(ip)
            .bind(endpoint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_audit(&self, entry: AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (action, entity_type, entity_id, actor_id, actor_ip, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.actor_id)
        .bind(&entry.actor_ip)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
