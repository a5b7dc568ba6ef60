//! Input validation module

use crate::models::{
    AssessmentRequest, AssessmentStatus, AssessmentSubmission, CreateUserRequest,
    CriterionAssessment, Role,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' is too long (max {max} characters)")]
    TooLong { field: String, max: usize },

    #[error("Field '{field}' is too short (min {min} characters)")]
    TooShort { field: String, min: usize },

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Invalid role: {role}")]
    InvalidRole { role: String },

    #[error("User is not a {expected}")]
    WrongRole { expected: &'static str },

    #[error("Please rate all criteria (1-5) before submitting")]
    RatingsIncomplete,

    #[error("Please fill in all signature fields (company, name, phone)")]
    SignatureIncomplete,

    #[error("Approved {field} cannot exceed the requested amount ({max})")]
    ExceedsRequested { field: &'static str, max: i32 },

    #[error("Field '{field}' cannot be negative")]
    Negative { field: String },

    #[error("Current password is incorrect")]
    WrongPassword,
}

/// Token-link failures, checked in this order
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("Invalid link: missing token")]
    MissingToken,

    #[error("Assessment request not found")]
    RequestNotFound,

    #[error("Invalid or already-used link")]
    InvalidOrUsed,

    #[error("This link has expired")]
    Expired,
}

// =============================================================================
// Users
// =============================================================================

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_NAME_LENGTH: usize = 255;

/// Create-user input with every field checked and normalised
#[derive(Debug, Clone)]
pub struct ValidatedUser {
    pub role: Role,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub school: Option<String>,
}

/// Validate a user creation request
pub fn validate_create_user(input: &CreateUserRequest) -> Result<ValidatedUser, ValidationError> {
    let role_raw = input.role.trim().to_lowercase();
    let email = input.email.trim().to_lowercase();
    let first_name = input.first_name.trim().to_string();
    let last_name = input.last_name.trim().to_string();
    let school = input
        .school
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    for (field, value) in [
        ("role", role_raw.as_str()),
        ("email", email.as_str()),
        ("password", input.password.as_str()),
        ("first_name", first_name.as_str()),
        ("last_name", last_name.as_str()),
    ] {
        if value.is_empty() {
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }
    }

    // Admin accounts are not created through this path
    let role = match role_raw.as_str() {
        "student" => Role::Student,
        "teacher" => Role::Teacher,
        _ => return Err(ValidationError::InvalidRole { role: role_raw }),
    };

    if role == Role::Teacher && school.is_none() {
        return Err(ValidationError::Required {
            field: "school".to_string(),
        });
    }

    if !validator::validate_email(email.as_str()) {
        return Err(ValidationError::InvalidEmail);
    }

    validate_password("password", &input.password)?;

    for (field, value) in [
        ("first_name", first_name.as_str()),
        ("last_name", last_name.as_str()),
        ("school", school.as_deref().unwrap_or_default()),
    ] {
        if value.len() > MAX_NAME_LENGTH {
            return Err(ValidationError::TooLong {
                field: field.to_string(),
                max: MAX_NAME_LENGTH,
            });
        }
    }

    Ok(ValidatedUser {
        role,
        email,
        password: input.password.clone(),
        first_name,
        last_name,
        school,
    })
}

/// Minimum length check for a password field
pub fn validate_password(field: &str, password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort {
            field: field.to_string(),
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

/// Validate a specialization value, returning it trimmed
pub fn validate_specialization(specialization: &str) -> Result<String, ValidationError> {
    let trimmed = specialization.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "specialization".to_string(),
        });
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "specialization".to_string(),
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}

/// Validate a required free-text name (class, company)
pub fn validate_name(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}

// =============================================================================
// Assessment links
// =============================================================================

/// Rating dimensions a supervisor must score
pub const CRITERIA: [&str; 5] = [
    "engagement",
    "initiative",
    "collaboration",
    "problem_solving",
    "work_quality",
];

/// First link check, done before anything is looked up
pub fn require_token(token: Option<&str>) -> Result<&str, LinkError> {
    match token.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(LinkError::MissingToken),
    }
}

/// Remaining link checks against the stored request.
///
/// A consumed link and a wrong token give the same error.
pub fn check_link(
    request: &AssessmentRequest,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<(), LinkError> {
    if request.status != AssessmentStatus::Pending || request.token_hash != token_hash {
        return Err(LinkError::InvalidOrUsed);
    }
    if request.expires_at < now {
        return Err(LinkError::Expired);
    }
    Ok(())
}

/// Supervisor submission after validation, ready to commit
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAssessment {
    pub assessment_data: BTreeMap<String, CriterionAssessment>,
    pub average_rating: String,
    pub supervisor_company: String,
    pub supervisor_name: String,
    pub supervisor_phone: String,
    pub lunch_approved: i32,
    pub travel_approved: i32,
    pub image_comments: BTreeMap<u32, String>,
}

/// Validate a supervisor submission against the request it answers
pub fn validate_assessment_submission(
    request: &AssessmentRequest,
    input: &AssessmentSubmission,
) -> Result<ValidatedAssessment, ValidationError> {
    let mut ratings = Vec::with_capacity(CRITERIA.len());
    let mut assessment_data = BTreeMap::new();
    for criterion in CRITERIA {
        let rating = match input.ratings.get(criterion) {
            Some(r) if (1..=5).contains(r) => *r as u8,
            _ => return Err(ValidationError::RatingsIncomplete),
        };
        ratings.push(rating);
        assessment_data.insert(
            criterion.to_string(),
            CriterionAssessment {
                rating,
                comment: input
                    .comments
                    .get(criterion)
                    .map(|c| c.trim().to_string())
                    .unwrap_or_default(),
            },
        );
    }

    let company = input.supervisor_company.trim();
    let name = input.supervisor_name.trim();
    let phone = input.supervisor_phone.trim();
    if company.is_empty() || name.is_empty() || phone.is_empty() {
        return Err(ValidationError::SignatureIncomplete);
    }

    let lunch_approved = check_allowance(
        "lunch_approved",
        "lunches",
        input.lunch_approved,
        request.lunch_count,
    )?;
    let travel_approved = check_allowance(
        "travel_approved",
        "travel kilometres",
        input.travel_approved,
        request.travel_count,
    )?;

    let image_count = request.images.len();
    let image_comments = input
        .image_comments
        .iter()
        .filter(|(index, _)| (**index as usize) < image_count)
        .map(|(index, comment)| (*index, comment.trim().to_string()))
        .filter(|(_, comment)| !comment.is_empty())
        .collect();

    Ok(ValidatedAssessment {
        assessment_data,
        average_rating: average_rating(&ratings),
        supervisor_company: company.to_string(),
        supervisor_name: name.to_string(),
        supervisor_phone: phone.to_string(),
        lunch_approved,
        travel_approved,
        image_comments,
    })
}

/// Arithmetic mean with one decimal, e.g. `"4.0"`
pub fn average_rating(ratings: &[u8]) -> String {
    if ratings.is_empty() {
        return "0.0".to_string();
    }
    let sum: u32 = ratings.iter().map(|r| u32::from(*r)).sum();
    format!("{:.1}", f64::from(sum) / ratings.len() as f64)
}

fn check_allowance(
    field: &'static str,
    label: &'static str,
    approved: i64,
    requested: i32,
) -> Result<i32, ValidationError> {
    if approved < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    if approved > i64::from(requested) {
        return Err(ValidationError::ExceedsRequested {
            field: label,
            max: requested,
        });
    }
    // bounded by `requested` above
    Ok(approved as i32)
}
