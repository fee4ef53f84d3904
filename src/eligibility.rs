//! Group eligibility checker.
//!
//! Validates a proposed group against a ledger snapshot and the roster. The
//! checks are pure: the same request, ledger and roster always produce the
//! same decision, and nothing is written.
//!
//! Order of checks:
//! 1. member emails are normalized and de-duplicated, first occurrence wins
//! 2. a student requester is put back at the front if they left themself out
//! 3. a student may create only one group per course
//! 4. emails missing from the roster are dropped (with a warning)
//! 5. the group must have between 3 and 15 members
//! 6. the name must not be blank
//! 7. the name must be unused by any group of any course (case-insensitive)
//! 8. nobody may already be in a group for the course

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Rejection;
use crate::ledger::LedgerView;
use crate::model::{Group, Identity, MAX_MEMBERS, MIN_MEMBERS, Role, Student, normalize_email};
use crate::roster::Roster;

/// A group creation form as submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRequest {
    pub requester: Identity,
    pub course: String,
    pub faculty: String,
    pub department: String,
    pub name: String,

    /// Member emails as typed or selected
    pub members: Vec<String>,
}

/// Something the requester should be told even though the request went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EligibilityWarning {
    /// The requester removed themself and was added back.
    RequesterReadded { email: String },

    /// The email is not on the roster and was left out.
    UnknownStudent { email: String },
}

impl fmt::Display for EligibilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EligibilityWarning::RequesterReadded { .. } => {
                write!(f, "You cannot remove yourself from the group. We've added you back.")
            }
            EligibilityWarning::UnknownStudent { email } => {
                write!(f, "{} is not an enrolled student and was left out", email)
            }
        }
    }
}

/// A validated group that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// `created_at` is left empty until the writer commits
    pub group: Group,
    pub requester: Identity,
    pub warnings: Vec<EligibilityWarning>,
}

/// Normalize, drop blanks and de-duplicate, keeping first-seen order.
pub fn normalize_members(members: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(members.len());
    for email in members.iter().map(|m| normalize_email(m)) {
        if !email.is_empty() && !seen.contains(&email) {
            seen.push(email);
        }
    }
    seen
}

/// Validate `request` against a ledger snapshot and the roster.
pub fn check(
    request: &GroupRequest,
    ledger: &LedgerView,
    roster: &Roster,
) -> Result<Candidate, Rejection> {
    let course = request.course.trim();
    if course.is_empty() {
        return Err(Rejection::MissingCourse);
    }

    let requester = Identity {
        email: normalize_email(&request.requester.email),
        role: request.requester.role,
    };
    let is_student = requester.role == Role::Student;
    let mut warnings = Vec::new();

    let mut members = normalize_members(&request.members);
    if is_student && !members.contains(&requester.email) {
        warnings.push(EligibilityWarning::RequesterReadded {
            email: requester.email.clone(),
        });
        members.insert(0, requester.email.clone());
    }

    if is_student && ledger.requester_already_created {
        return Err(Rejection::AlreadyCreated {
            course: course.to_string(),
        });
    }
    if is_student && !roster.contains(&requester.email) {
        return Err(Rejection::RequesterNotEnrolled {
            email: requester.email,
        });
    }

    let mut resolved: Vec<&Student> = Vec::with_capacity(members.len());
    for email in &members {
        match roster.get(email) {
            Some(student) => resolved.push(student),
            None => warnings.push(EligibilityWarning::UnknownStudent {
                email: email.clone(),
            }),
        }
    }

    if resolved.len() < MIN_MEMBERS {
        return Err(Rejection::TooFewMembers {
            count: resolved.len(),
        });
    }
    if resolved.len() > MAX_MEMBERS {
        return Err(Rejection::TooManyMembers {
            count: resolved.len(),
        });
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Err(Rejection::BlankGroupName);
    }

    let group = Group {
        created_at: String::new(),
        name: name.to_string(),
        faculty: request.faculty.trim().to_string(),
        department: request.department.trim().to_string(),
        course: course.to_string(),
        members: resolved.iter().map(|s| s.email.clone()).collect(),
        member_names: resolved.iter().map(|s| s.display_name()).collect(),
        created_by: requester.email.clone(),
    };
    let candidate = Candidate {
        group,
        requester,
        warnings,
    };

    check_collisions(&candidate, ledger)?;
    Ok(candidate)
}

/// Re-run the ledger-dependent checks (creator, name, membership) against a
/// newer snapshot. Used right before commit.
pub fn check_collisions(candidate: &Candidate, ledger: &LedgerView) -> Result<(), Rejection> {
    if candidate.requester.role == Role::Student && ledger.requester_already_created {
        return Err(Rejection::AlreadyCreated {
            course: candidate.group.course.clone(),
        });
    }

    if ledger.name_taken(&candidate.group.name) {
        return Err(Rejection::GroupNameTaken {
            name: candidate.group.name.clone(),
        });
    }

    let taken: Vec<String> = candidate
        .group
        .members
        .iter()
        .filter(|m| ledger.is_grouped(m))
        .cloned()
        .collect();
    if !taken.is_empty() {
        return Err(Rejection::AlreadyGrouped { emails: taken });
    }

    Ok(())
}

/// Students a requester may pick for a course: everyone not yet grouped, plus
/// the requester themself, optionally narrowed to a faculty and program.
pub fn available_students<'a>(
    roster: &'a Roster,
    ledger: &LedgerView,
    requester: &str,
    faculty: Option<&'a str>,
    program: Option<&'a str>,
) -> Vec<&'a Student> {
    let requester = normalize_email(requester);
    roster
        .students_in(faculty, program)
        .filter(|s| s.email == requester || !ledger.is_grouped(&s.email))
        .collect()
}
