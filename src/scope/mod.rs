//! Role-scoped visibility
//!
//! Admins see everything, teachers see what they own through any of three
//! independent paths, everyone else sees nothing. The teacher rule is a
//! union: a record naming the teacher is visible even when its class does
//! not match, and the other way round.

use crate::models::{AssessmentRequest, Class, Company, Role, Timesheet, User};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Ownership fields a record can be scoped by
pub trait Owned {
    fn owner_teacher(&self) -> Option<Uuid>;
    fn owner_class(&self) -> Option<Uuid>;
    fn owner_student(&self) -> Option<Uuid>;
}

/// Teacher ownership OR class membership OR belonging to an in-scope student
pub fn is_in_teacher_scope<R: Owned + ?Sized>(
    record: &R,
    teacher_id: Uuid,
    class_ids: &BTreeSet<Uuid>,
    student_ids: &BTreeSet<Uuid>,
) -> bool {
    record.owner_teacher() == Some(teacher_id)
        || record.owner_class().is_some_and(|c| class_ids.contains(&c))
        || record.owner_student().is_some_and(|s| student_ids.contains(&s))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Everything,
    Teacher(Uuid),
    Nothing,
}

/// Classes and students visible to one principal
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    pub class_ids: BTreeSet<Uuid>,
    pub student_ids: BTreeSet<Uuid>,
    #[serde(skip)]
    visibility: Visibility,
}

/// Compute the scope of a principal from already-fetched classes and users
pub fn compute(role: Role, principal_id: Uuid, classes: &[Class], users: &[User]) -> Scope {
    let students = users.iter().filter(|u| u.role == Role::Student);

    match role {
        Role::Admin => Scope {
            class_ids: classes.iter().map(|c| c.id).collect(),
            student_ids: students.map(|s| s.id).collect(),
            visibility: Visibility::Everything,
        },
        Role::Teacher => {
            let class_ids: BTreeSet<Uuid> = classes
                .iter()
                .filter(|c| c.teacher_uid == principal_id)
                .map(|c| c.id)
                .collect();
            let student_ids = students
                .filter(|s| {
                    s.teacher_uid == Some(principal_id)
                        || s.class_id.is_some_and(|c| class_ids.contains(&c))
                })
                .map(|s| s.id)
                .collect();
            Scope {
                class_ids,
                student_ids,
                visibility: Visibility::Teacher(principal_id),
            }
        }
        Role::Student => Scope::empty(),
    }
}

impl Scope {
    pub fn empty() -> Self {
        Self {
            class_ids: BTreeSet::new(),
            student_ids: BTreeSet::new(),
            visibility: Visibility::Nothing,
        }
    }

    pub fn includes_student(&self, student_id: Uuid) -> bool {
        self.student_ids.contains(&student_id)
    }

    pub fn includes_class(&self, class_id: Uuid) -> bool {
        self.class_ids.contains(&class_id)
    }

    /// Whether a single record is visible
    pub fn permits<R: Owned + ?Sized>(&self, record: &R) -> bool {
        match self.visibility {
            Visibility::Everything => true,
            Visibility::Teacher(teacher_id) => {
                is_in_teacher_scope(record, teacher_id, &self.class_ids, &self.student_ids)
            }
            Visibility::Nothing => false,
        }
    }

    /// Keep only the visible records
    pub fn retain<R: Owned>(&self, mut records: Vec<R>) -> Vec<R> {
        records.retain(|r| self.permits(r));
        records
    }
}

// =============================================================================
// Ownership of stored records
// =============================================================================

impl Owned for Timesheet {
    fn owner_teacher(&self) -> Option<Uuid> {
        self.teacher_uid
    }
    fn owner_class(&self) -> Option<Uuid> {
        self.class_id
    }
    fn owner_student(&self) -> Option<Uuid> {
        Some(self.student_uid)
    }
}

impl Owned for AssessmentRequest {
    fn owner_teacher(&self) -> Option<Uuid> {
        self.teacher_uid
    }
    fn owner_class(&self) -> Option<Uuid> {
        self.class_id
    }
    fn owner_student(&self) -> Option<Uuid> {
        Some(self.student_uid)
    }
}

impl Owned for Company {
    fn owner_teacher(&self) -> Option<Uuid> {
        Some(self.teacher_uid)
    }
    fn owner_class(&self) -> Option<Uuid> {
        self.class_id
    }
    fn owner_student(&self) -> Option<Uuid> {
        self.student_id
    }
}

impl Owned for User {
    fn owner_teacher(&self) -> Option<Uuid> {
        self.teacher_uid
    }
    fn owner_class(&self) -> Option<Uuid> {
        self.class_id
    }
    fn owner_student(&self) -> Option<Uuid> {
        (self.role == Role::Student).then_some(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{class, company, student, teacher, timesheet};

    fn fixture() -> (Uuid, Uuid, Vec<Class>, Vec<User>) {
        let t1 = teacher("Anna");
        let t2 = teacher("Bo");
        let c1 = class("TE22", t1.id);
        let c2 = class("EL22", t2.id);

        let direct = student("Direct", None, Some(t1.id));
        let via_class = student("ViaClass", Some(c1.id), None);
        let both = student("Both", Some(c1.id), Some(t1.id));
        let other = student("Other", Some(c2.id), Some(t2.id));
        let orphan = student("Orphan", None, None);

        let (id1, id2) = (t1.id, t2.id);
        (
            id1,
            id2,
            vec![c1, c2],
            vec![t1, t2, direct, via_class, both, other, orphan],
        )
    }

    fn names(scope: &Scope, users: &[User]) -> Vec<String> {
        users
            .iter()
            .filter(|u| scope.includes_student(u.id))
            .map(|u| u.name.clone())
            .collect()
    }

    #[test]
    fn test_teacher_scope_is_union_of_direct_and_class_paths() {
        let (t1, _, classes, users) = fixture();
        let scope = compute(Role::Teacher, t1, &classes, &users);

        assert_eq!(scope.class_ids.len(), 1);
        assert_eq!(names(&scope, &users), vec!["Direct", "ViaClass", "Both"]);
    }

    #[test]
    fn test_student_in_scope_iff_direct_or_class_owner() {
        let (t1, t2, classes, users) = fixture();
        for teacher_id in [t1, t2] {
            let scope = compute(Role::Teacher, teacher_id, &classes, &users);
            let own_classes: BTreeSet<Uuid> = classes
                .iter()
                .filter(|c| c.teacher_uid == teacher_id)
                .map(|c| c.id)
                .collect();
            for user in users.iter().filter(|u| u.role == Role::Student) {
                let expected = user.teacher_uid == Some(teacher_id)
                    || user.class_id.is_some_and(|c| own_classes.contains(&c));
                assert_eq!(scope.includes_student(user.id), expected, "{}", user.name);
            }
        }
    }

    #[test]
    fn test_admin_sees_everything() {
        let (_, _, classes, users) = fixture();
        let admin_id = Uuid::new_v4();
        let scope = compute(Role::Admin, admin_id, &classes, &users);

        assert_eq!(scope.class_ids.len(), 2);
        assert_eq!(scope.student_ids.len(), 5);
    }

    #[test]
    fn test_student_principal_has_empty_scope() {
        let (_, _, classes, users) = fixture();
        let scope = compute(Role::Student, users[2].id, &classes, &users);

        assert!(scope.class_ids.is_empty());
        assert!(scope.student_ids.is_empty());
        assert!(!scope.permits(&company("Anywhere", users[0].id, None)));
    }

    #[test]
    fn test_record_naming_teacher_is_visible_despite_foreign_class() {
        let (t1, t2, classes, users) = fixture();
        let scope = compute(Role::Teacher, t1, &classes, &users);
        let foreign_class = classes.iter().find(|c| c.teacher_uid == t2).unwrap().id;

        let mut sheet = timesheet(Uuid::new_v4());
        sheet.teacher_uid = Some(t1);
        sheet.class_id = Some(foreign_class);
        assert!(scope.permits(&sheet));
    }

    #[test]
    fn test_record_paths_are_independent() {
        let (t1, t2, classes, users) = fixture();
        let scope = compute(Role::Teacher, t1, &classes, &users);
        let own_class = classes.iter().find(|c| c.teacher_uid == t1).unwrap().id;
        let in_scope_student = users.iter().find(|u| u.name == "Direct").unwrap().id;
        let foreign_student = users.iter().find(|u| u.name == "Other").unwrap().id;

        // class path only
        let mut by_class = timesheet(foreign_student);
        by_class.class_id = Some(own_class);
        assert!(scope.permits(&by_class));

        // student path only
        let by_student = timesheet(in_scope_student);
        assert!(scope.permits(&by_student));

        // no path
        let mut foreign = timesheet(foreign_student);
        foreign.teacher_uid = Some(t2);
        assert!(!scope.permits(&foreign));
    }

    #[test]
    fn test_retain_companies() {
        let (t1, t2, classes, users) = fixture();
        let scope = compute(Role::Teacher, t1, &classes, &users);
        let companies = vec![
            company("Mine", t1, None),
            company("Theirs", t2, None),
            company("Theirs but my class", t2, scope.class_ids.iter().next().copied()),
        ];

        let visible: Vec<String> = scope.retain(companies).into_iter().map(|c| c.name).collect();
        assert_eq!(visible, vec!["Mine", "Theirs but my class"]);
    }
}
