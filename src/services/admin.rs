//! Admin overview: accounts, schools and open approval notifications

use super::require_admin;
use crate::db::Store;
use crate::error::AppResult;
use crate::models::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminCounts {
    pub schools: usize,
    pub teachers: usize,
    pub students: usize,
    pub pending_teachers: usize,
    pub approved_teachers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolSummary {
    pub school: String,
    pub teachers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentListing {
    #[serde(flatten)]
    pub student: UserResponse,
    pub class_name: Option<String>,
    pub teacher_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub counts: AdminCounts,
    pub approved_teachers: Vec<UserResponse>,
    pub pending_teachers: Vec<UserResponse>,
    pub schools: Vec<SchoolSummary>,
    pub students: Vec<StudentListing>,
    pub open_notifications: Vec<AdminNotification>,
}

pub async fn overview(store: &dyn Store, principal: &Principal) -> AppResult<AdminOverview> {
    require_admin(principal)?;

    let users = store.list_users().await?;
    let classes = store.list_classes().await?;
    let names: HashMap<Uuid, String> = users.iter().map(|u| (u.id, u.name.clone())).collect();

    let mut schools: BTreeMap<String, usize> = BTreeMap::new();
    let mut approved_teachers = Vec::new();
    let mut pending_teachers = Vec::new();
    let mut students = Vec::new();

    for user in users {
        match user.role {
            Role::Teacher => {
                if let Some(school) = user.school.as_deref().map(str::trim) {
                    if !school.is_empty() {
                        *schools.entry(school.to_string()).or_default() += 1;
                    }
                }
                if user.approved {
                    approved_teachers.push(UserResponse::from(user));
                } else {
                    pending_teachers.push(UserResponse::from(user));
                }
            }
            Role::Student => {
                let class = user
                    .class_id
                    .and_then(|id| classes.iter().find(|c| c.id == id));
                // A direct teacher wins over the class owner
                let teacher_name = user
                    .teacher_uid
                    .or(class.map(|c| c.teacher_uid))
                    .and_then(|id| names.get(&id).cloned());
                students.push(StudentListing {
                    class_name: class.map(|c| c.name.clone()),
                    teacher_name,
                    student: UserResponse::from(user),
                });
            }
            Role::Admin => {}
        }
    }

    let mut open_notifications = Vec::new();
    for teacher in &pending_teachers {
        match store.list_notifications_for_teacher(teacher.id).await {
            Ok(notes) => open_notifications.extend(notes.into_iter().filter(|n| !n.resolved)),
            Err(e) => tracing::warn!("Could not load notifications for {}: {}", teacher.id, e),
        }
    }

    let counts = AdminCounts {
        schools: schools.len(),
        teachers: approved_teachers.len() + pending_teachers.len(),
        students: students.len(),
        pending_teachers: pending_teachers.len(),
        approved_teachers: approved_teachers.len(),
    };

    Ok(AdminOverview {
        counts,
        approved_teachers,
        pending_teachers,
        schools: schools
            .into_iter()
            .map(|(school, teachers)| SchoolSummary { school, teachers })
            .collect(),
        students,
        open_notifications,
    })
}
