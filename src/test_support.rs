//! Fixture builders shared by the unit tests

use crate::hours::Entries;
use crate::models::*;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use uuid::Uuid;

fn user(role: Role, name: &str) -> User {
    User {
        id: Uuid::new_v4(),
        role,
        name: name.to_string(),
        first_name: name.to_string(),
        last_name: String::new(),
        email: format!("{}@skola.se", name.to_lowercase()),
        password_hash: String::new(),
        class_id: None,
        teacher_uid: None,
        school: None,
        approved: false,
        specialization: None,
        created_at: Utc::now(),
    }
}

pub fn admin(name: &str) -> User {
    user(Role::Admin, name)
}

pub fn teacher(name: &str) -> User {
    let mut t = user(Role::Teacher, name);
    t.approved = true;
    t.school = Some("Tekniska gymnasiet".to_string());
    t
}

pub fn student(name: &str, class_id: Option<Uuid>, teacher_uid: Option<Uuid>) -> User {
    let mut s = user(Role::Student, name);
    s.class_id = class_id;
    s.teacher_uid = teacher_uid;
    s
}

pub fn class(name: &str, teacher_uid: Uuid) -> Class {
    Class {
        id: Uuid::new_v4(),
        name: name.to_string(),
        teacher_uid,
        created_at: Utc::now(),
    }
}

pub fn company(name: &str, teacher_uid: Uuid, class_id: Option<Uuid>) -> Company {
    Company {
        id: Uuid::new_v4(),
        name: name.to_string(),
        teacher_uid,
        class_id,
        student_id: None,
        address: None,
        contact_person: None,
        phone: None,
        email: None,
        created_at: Utc::now(),
    }
}

pub fn timesheet(student_uid: Uuid) -> Timesheet {
    Timesheet {
        id: Uuid::new_v4(),
        student_uid,
        teacher_uid: None,
        class_id: None,
        week_start: NaiveDate::from_ymd_opt(2026, 1, 5),
        entries: Json(Entries::default()),
        approved: false,
        locked: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn timesheet_with(
    student_uid: Uuid,
    week_start: NaiveDate,
    entries: serde_json::Value,
) -> Timesheet {
    let mut sheet = timesheet(student_uid);
    sheet.week_start = Some(week_start);
    sheet.entries = Json(Entries::from_json(&entries));
    sheet
}

/// A pending request asking for 5 lunches and 120 km with two images attached
pub fn pending_request(token_hash: &str, expires_at: DateTime<Utc>) -> AssessmentRequest {
    let image = |n: u32| AttachedImage {
        url: format!("https://files.example/apl/{n}.jpg"),
        file_name: format!("{n}.jpg"),
        uploaded_at: Utc::now(),
    };
    AssessmentRequest {
        id: Uuid::new_v4(),
        student_uid: Uuid::new_v4(),
        student_name: "Sara Lind".to_string(),
        teacher_uid: None,
        class_id: None,
        weeks: Json(vec!["2026-W02".to_string(), "2026-W03".to_string()]),
        total_hours: 64.0,
        status: AssessmentStatus::Pending,
        token_hash: token_hash.to_string(),
        expires_at,
        timesheet_ids: Vec::new(),
        lunch_count: 5,
        travel_count: 120,
        images: Json(vec![image(1), image(2)]),
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
    }
}
