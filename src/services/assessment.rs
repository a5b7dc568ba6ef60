//! Supervisor assessment links: issuing, opening and the one-time submission

use super::audit;
use super::users::load_scope;
use crate::db::{CommitOutcome, Store};
use crate::error::{AccessError, AppError, AppResult};
use crate::models::*;
use crate::security::{generate_token, hash_token};
use crate::validation::{
    check_link, require_token, validate_assessment_submission, LinkError, ValidationError, CRITERIA,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentFilter {
    Pending,
    Submitted,
    #[default]
    All,
}

impl AssessmentFilter {
    fn matches(self, status: AssessmentStatus) -> bool {
        match self {
            AssessmentFilter::Pending => status == AssessmentStatus::Pending,
            AssessmentFilter::Submitted => status == AssessmentStatus::Submitted,
            AssessmentFilter::All => true,
        }
    }
}

/// What the supervisor sees after the link checks pass
#[derive(Debug, Clone, Serialize)]
pub struct LinkView {
    pub request_id: Uuid,
    pub student_name: String,
    pub weeks: Vec<String>,
    pub total_hours: f64,
    pub lunch_count: i32,
    pub travel_count: i32,
    pub images: Vec<AttachedImage>,
    pub criteria: Vec<&'static str>,
    pub known_companies: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub request_id: Uuid,
    pub average_rating: String,
    pub timesheets_locked: usize,
}

/// A freshly issued link. The raw token is only ever returned here.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedLink {
    pub request: AssessmentRequest,
    pub token: String,
    pub url: String,
}

/// Run the four link checks in order and return the pending request
pub async fn open_link(
    store: &dyn Store,
    request_id: Uuid,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<(AssessmentRequest, String)> {
    let token = require_token(token)?;
    let request = store
        .get_assessment_request(request_id)
        .await?
        .ok_or(LinkError::RequestNotFound)?;
    let token_hash = hash_token(token);
    check_link(&request, &token_hash, now)?;
    Ok((request, token_hash))
}

pub async fn view(
    store: &dyn Store,
    request_id: Uuid,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<LinkView> {
    let (request, _) = open_link(store, request_id, token, now).await?;

    // Company names already linked to this student or their teacher/class
    let known_companies: BTreeSet<String> = store
        .list_companies()
        .await?
        .into_iter()
        .filter(|c| {
            c.student_id == Some(request.student_uid)
                || (request.class_id.is_some() && c.class_id == request.class_id)
                || request.teacher_uid == Some(c.teacher_uid)
        })
        .map(|c| c.name)
        .collect();

    Ok(LinkView {
        request_id: request.id,
        student_name: request.student_name,
        weeks: request.weeks.0,
        total_hours: request.total_hours,
        lunch_count: request.lunch_count,
        travel_count: request.travel_count,
        images: request.images.0,
        criteria: CRITERIA.to_vec(),
        known_companies: known_companies.into_iter().collect(),
        expires_at: request.expires_at,
    })
}

/// Validate and commit a supervisor submission.
///
/// All checks run before anything is written. The commit itself is a single
/// store transaction; losing a race with another submission of the same link
/// reports the link as used.
pub async fn submit(
    store: &dyn Store,
    request_id: Uuid,
    token: Option<&str>,
    input: &AssessmentSubmission,
    now: DateTime<Utc>,
) -> AppResult<SubmissionReceipt> {
    let (request, token_hash) = open_link(store, request_id, token, now).await?;
    let valid = validate_assessment_submission(&request, input)?;

    let commit = AssessmentCommit {
        request_id: request.id,
        token_hash,
        student_uid: request.student_uid,
        submitted_at: now,
        supervisor_company: valid.supervisor_company,
        supervisor_name: valid.supervisor_name,
        supervisor_phone: valid.supervisor_phone,
        lunch_approved: valid.lunch_approved,
        travel_approved: valid.travel_approved,
        assessment_data: valid.assessment_data,
        average_rating: valid.average_rating.clone(),
        image_comments: valid.image_comments,
        timesheet_ids: request.timesheet_ids.clone(),
    };

    match store.commit_assessment(&commit).await {
        Ok(CommitOutcome::Committed) => {}
        Ok(CommitOutcome::Stale) => return Err(LinkError::InvalidOrUsed.into()),
        Err(e) => {
            tracing::error!("Assessment commit for {} failed: {}", request.id, e);
            return Err(AppError::Commit);
        }
    }

    tracing::info!(
        "Assessment {} submitted, {} timesheets locked",
        request.id,
        commit.timesheet_ids.len()
    );
    audit(
        store,
        AuditEntry::new("assessment_submitted", "assessment_request", request.id).with_details(
            serde_json::json!({ "average_rating": commit.average_rating }),
        ),
    )
    .await;

    Ok(SubmissionReceipt {
        request_id: request.id,
        average_rating: commit.average_rating,
        timesheets_locked: commit.timesheet_ids.len(),
    })
}

/// Create a pending request with a fresh link for an in-scope student
pub async fn issue_request(
    store: &dyn Store,
    principal: &Principal,
    input: &IssueAssessmentRequest,
    valid_days: i64,
    public_base_url: &str,
    now: DateTime<Utc>,
) -> AppResult<IssuedLink> {
    let student = store
        .get_user(input.student_id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or(AppError::NotFound("Student"))?;

    let scope = load_scope(store, principal).await?;
    if !scope.includes_student(student.id) {
        return Err(AccessError::Forbidden.into());
    }

    let weeks: Vec<String> = input
        .weeks
        .iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();
    if weeks.is_empty() {
        return Err(ValidationError::Required {
            field: "weeks".to_string(),
        }
        .into());
    }
    for (field, value) in [
        ("lunch_count", input.lunch_count),
        ("travel_count", input.travel_count),
    ] {
        if value < 0 {
            return Err(ValidationError::Negative {
                field: field.to_string(),
            }
            .into());
        }
    }

    // Listed timesheets must be the student's own; ids that do not exist
    // yet are allowed and will be created on submission.
    let mut total_hours = 0.0;
    for id in &input.timesheet_ids {
        if let Some(sheet) = store.get_timesheet(*id).await? {
            if sheet.student_uid != student.id {
                return Err(AccessError::Forbidden.into());
            }
            total_hours += sheet.entries.total();
        }
    }

    let token = generate_token();
    let request = store
        .create_assessment_request(NewAssessmentRequest {
            student_uid: student.id,
            student_name: student.name.clone(),
            teacher_uid: student.teacher_uid.or(match principal.role {
                Role::Teacher => Some(principal.id),
                _ => None,
            }),
            class_id: student.class_id,
            weeks,
            total_hours,
            token_hash: hash_token(&token),
            expires_at: now + Duration::days(valid_days),
            timesheet_ids: input.timesheet_ids.clone(),
            lunch_count: input.lunch_count,
            travel_count: input.travel_count,
            images: input.images.clone(),
        })
        .await?;

    let url = format!(
        "{}/supervisor/{}?token={}",
        public_base_url.trim_end_matches('/'),
        request.id,
        token
    );

    tracing::info!("Assessment link {} issued for student {}", request.id, student.id);
    audit(
        store,
        AuditEntry::new("assessment_issued", "assessment_request", request.id).by(principal.id),
    )
    .await;

    Ok(IssuedLink {
        request,
        token,
        url,
    })
}

/// Requests visible to the principal, newest first
pub async fn list_requests(
    store: &dyn Store,
    principal: &Principal,
    filter: AssessmentFilter,
) -> AppResult<Vec<AssessmentRequest>> {
    let scope = load_scope(store, principal).await?;
    let mut requests = scope.retain(store.list_assessment_requests().await?);
    requests.retain(|r| filter.matches(r.status));
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::services::users::resolve_principal;
    use crate::test_support::{class, company, pending_request, student, teacher, timesheet};
    use std::collections::BTreeMap;

    const TOKEN: &str = "d2f1c0ffee";

    fn full_submission() -> AssessmentSubmission {
        let ratings: BTreeMap<String, i64> = CRITERIA
            .iter()
            .zip([5, 4, 3, 5, 3])
            .map(|(c, r)| (c.to_string(), r))
            .collect();
        AssessmentSubmission {
            ratings,
            supervisor_company: "Elbolaget AB".to_string(),
            supervisor_name: "Per Handledare".to_string(),
            supervisor_phone: "070-123 45 67".to_string(),
            lunch_approved: 5,
            travel_approved: 100,
            ..Default::default()
        }
    }

    /// A pending request linked to one existing and one missing timesheet
    fn seeded() -> (MemoryStore, AssessmentRequest, Timesheet, Uuid) {
        let store = MemoryStore::new();
        let mut request = pending_request(&hash_token(TOKEN), Utc::now() + Duration::days(14));
        let existing = store.insert_timesheet(timesheet(request.student_uid));
        let missing = Uuid::new_v4();
        request.timesheet_ids = vec![existing.id, missing];
        let request = store.insert_request(request);
        (store, request, existing, missing)
    }

    #[tokio::test]
    async fn test_link_checks_run_in_order() {
        let (store, request, _, _) = seeded();
        let now = Utc::now();

        let err = |r: AppResult<LinkView>| match r {
            Err(AppError::Link(e)) => e,
            other => panic!("expected link error, got {other:?}"),
        };

        assert_eq!(err(view(&store, request.id, None, now).await), LinkError::MissingToken);
        assert_eq!(err(view(&store, request.id, Some("  "), now).await), LinkError::MissingToken);
        assert_eq!(
            err(view(&store, Uuid::new_v4(), Some(TOKEN), now).await),
            LinkError::RequestNotFound
        );
        assert_eq!(
            err(view(&store, request.id, Some("wrong"), now).await),
            LinkError::InvalidOrUsed
        );
        assert_eq!(
            err(view(&store, request.id, Some(TOKEN), now + Duration::days(30)).await),
            LinkError::Expired
        );

        let opened = view(&store, request.id, Some(TOKEN), now).await.unwrap();
        assert_eq!(opened.criteria.len(), 5);
        assert_eq!(opened.images.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_commits_request_and_locks_timesheets() {
        let (store, request, existing, missing) = seeded();

        let receipt = submit(&store, request.id, Some(TOKEN), &full_submission(), Utc::now())
            .await
            .unwrap();

        assert_eq!(receipt.average_rating, "4.0");
        assert_eq!(receipt.timesheets_locked, 2);

        let stored = store.request(request.id).unwrap();
        assert_eq!(stored.status, AssessmentStatus::Submitted);
        assert_eq!(stored.lunch_approved, Some(5));
        assert_eq!(stored.travel_approved, Some(100));
        assert_eq!(stored.average_rating.as_deref(), Some("4.0"));
        assert!(stored.submitted_at.is_some());

        for id in [existing.id, missing] {
            let sheet = store.timesheet(id).unwrap();
            assert!(sheet.approved && sheet.locked);
            assert_eq!(sheet.student_uid, request.student_uid);
        }
        assert!(store.audit_actions().contains(&"assessment_submitted"));
    }

    #[tokio::test]
    async fn test_submit_at_the_expiry_instant_is_accepted() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let request = store.insert_request(pending_request(&hash_token(TOKEN), now));

        assert!(view(&store, request.id, Some(TOKEN), now).await.is_ok());
        submit(&store, request.id, Some(TOKEN), &full_submission(), now)
            .await
            .unwrap();
        assert_eq!(store.request(request.id).unwrap().status, AssessmentStatus::Submitted);

        let late = store.insert_request(pending_request(&hash_token(TOKEN), now));
        let result = submit(
            &store,
            late.id,
            Some(TOKEN),
            &full_submission(),
            now + Duration::seconds(1),
        )
        .await;
        assert!(matches!(result, Err(AppError::Link(LinkError::Expired))));
    }

    #[tokio::test]
    async fn test_second_submission_is_rejected() {
        let (store, request, _, _) = seeded();
        submit(&store, request.id, Some(TOKEN), &full_submission(), Utc::now())
            .await
            .unwrap();

        let mut changed = full_submission();
        changed.supervisor_name = "Someone Else".to_string();
        let second = submit(&store, request.id, Some(TOKEN), &changed, Utc::now()).await;

        assert!(matches!(second, Err(AppError::Link(LinkError::InvalidOrUsed))));
        let stored = store.request(request.id).unwrap();
        assert_eq!(stored.supervisor_name.as_deref(), Some("Per Handledare"));
    }

    #[tokio::test]
    async fn test_invalid_submission_writes_nothing() {
        let (store, request, existing, missing) = seeded();

        let mut greedy = full_submission();
        greedy.lunch_approved = 6;
        let result = submit(&store, request.id, Some(TOKEN), &greedy, Utc::now()).await;
        match result {
            Err(AppError::Validation(e)) => assert_eq!(
                e.to_string(),
                "Approved lunches cannot exceed the requested amount (5)"
            ),
            other => panic!("expected validation error, got {other:?}"),
        }

        let mut unrated = full_submission();
        unrated.ratings.remove("initiative");
        assert!(matches!(
            submit(&store, request.id, Some(TOKEN), &unrated, Utc::now()).await,
            Err(AppError::Validation(ValidationError::RatingsIncomplete))
        ));

        assert_eq!(store.request(request.id).unwrap().status, AssessmentStatus::Pending);
        assert!(!store.timesheet(existing.id).unwrap().approved);
        assert!(store.timesheet(missing).is_none());
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_everything_pending() {
        let (store, request, existing, missing) = seeded();
        store.fail_commits();

        let result = submit(&store, request.id, Some(TOKEN), &full_submission(), Utc::now()).await;

        assert!(matches!(result, Err(AppError::Commit)));
        assert_eq!(store.request(request.id).unwrap().status, AssessmentStatus::Pending);
        assert!(!store.timesheet(existing.id).unwrap().locked);
        assert!(store.timesheet(missing).is_none());
    }

    #[tokio::test]
    async fn test_issue_request_for_scoped_student() {
        let store = MemoryStore::new();
        let anna = store.insert_user(teacher("Anna"));
        let bert = store.insert_user(teacher("Bert"));
        let ee = store.insert_class(class("EE22", anna.id));
        let pupil = store.insert_user(student("Ida", Some(ee.id), None));
        let foreign = store.insert_user(student("Kim", None, Some(bert.id)));
        let sheet = store.insert_timesheet(crate::test_support::timesheet_with(
            pupil.id,
            chrono::NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
            serde_json::json!({ "moment1": { "mon": 4, "tue": "3" } }),
        ));
        store.insert_company(company("Elbolaget AB", anna.id, Some(ee.id)));
        let anna = resolve_principal(&store, anna.id).await.unwrap();

        let input = IssueAssessmentRequest {
            student_id: pupil.id,
            weeks: vec!["2026-W03".to_string()],
            timesheet_ids: vec![sheet.id],
            lunch_count: 5,
            travel_count: 80,
            images: Vec::new(),
        };
        let now = Utc::now();
        let issued = issue_request(&store, &anna, &input, 14, "https://apl.example/", now)
            .await
            .unwrap();

        assert_eq!(issued.request.total_hours, 7.0);
        assert_eq!(issued.request.teacher_uid, Some(anna.id));
        assert_eq!(issued.request.expires_at, now + Duration::days(14));
        assert_eq!(
            issued.url,
            format!("https://apl.example/supervisor/{}?token={}", issued.request.id, issued.token)
        );
        assert_ne!(issued.request.token_hash, issued.token);

        let opened = view(&store, issued.request.id, Some(&issued.token), now).await.unwrap();
        assert_eq!(opened.known_companies, vec!["Elbolaget AB".to_string()]);

        let mut other = input.clone();
        other.student_id = foreign.id;
        other.timesheet_ids.clear();
        assert!(matches!(
            issue_request(&store, &anna, &other, 14, "https://apl.example", now).await,
            Err(AppError::Access(AccessError::Forbidden))
        ));
    }

    #[tokio::test]
    async fn test_list_requests_filters_scope_and_status() {
        let store = MemoryStore::new();
        let anna = store.insert_user(teacher("Anna"));
        let pupil = store.insert_user(student("Ida", None, Some(anna.id)));
        let mut mine = pending_request("a", Utc::now() + Duration::days(1));
        mine.student_uid = pupil.id;
        let mine = store.insert_request(mine);
        let mut done = pending_request("b", Utc::now() + Duration::days(1));
        done.teacher_uid = Some(anna.id);
        done.status = AssessmentStatus::Submitted;
        store.insert_request(done);
        store.insert_request(pending_request("c", Utc::now() + Duration::days(1)));
        let anna = resolve_principal(&store, anna.id).await.unwrap();

        let all = list_requests(&store, &anna, AssessmentFilter::All).await.unwrap();
        assert_eq!(all.len(), 2);
        let pending = list_requests(&store, &anna, AssessmentFilter::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, mine.id);
    }
}
