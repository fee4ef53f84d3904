//! Typed records for students, groups and lab submissions.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Smallest group a student may form.
pub const MIN_MEMBERS: usize = 3;

/// Largest group a student may form.
pub const MAX_MEMBERS: usize = 15;

/// Format of every timestamp written to the record store.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time formatted for the record store.
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Normalize an email for comparison: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Case-insensitive comparison of two identifiers after trimming.
pub fn same_key(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Title-case every whitespace separated word ("computer  SCIENCE" -> "Computer Science").
pub fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a `", "`-joined list cell into trimmed, non-empty items.
pub fn split_list(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Role an authenticated user acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Normalized email address
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn student(email: &str) -> Self {
        Identity {
            email: normalize_email(email),
            role: Role::Student,
        }
    }

    pub fn admin(email: &str) -> Self {
        Identity {
            email: normalize_email(email),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An enrolled student as listed on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Normalized email address (roster key)
    pub email: String,

    /// Institutional id, doubles as the student's login secret
    pub student_id: String,

    pub first_name: String,
    pub last_name: String,
    pub faculty: String,
    pub program: String,
}

impl Student {
    /// "First Last" in title case.
    pub fn display_name(&self) -> String {
        title_case(&format!("{} {}", self.first_name, self.last_name))
    }

    /// "First Last (email)", the label shown in member pickers.
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.display_name(), self.email)
    }
}

/// An administrator login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub email: String,

    /// Plaintext secret or an argon2 PHC string
    pub password: String,
}

/// A lab offered for a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lab {
    pub course: String,
    pub name: String,
}

/// A persisted lab group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub created_at: String,
    pub name: String,
    pub faculty: String,
    pub department: String,
    pub course: String,

    /// Normalized member emails in selection order
    pub members: Vec<String>,

    /// Display names, parallel to `members`
    pub member_names: Vec<String>,

    pub created_by: String,
}

impl Group {
    pub fn has_member(&self, email: &str) -> bool {
        let email = normalize_email(email);
        self.members.iter().any(|m| normalize_email(m) == email)
    }

    pub fn is_for_course(&self, course: &str) -> bool {
        same_key(&self.course, course)
    }

    /// Members paired with their display names.
    pub fn roster(&self) -> impl Iterator<Item = (&str, &str)> {
        self.members.iter().enumerate().map(|(i, email)| {
            let name = self
                .member_names
                .get(i)
                .map(String::as_str)
                .unwrap_or(email.as_str());
            (email.as_str(), name)
        })
    }
}

/// Lifecycle position of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    Submitted,
    /// Terminal, only an administrator can change the grade.
    Graded,
}

/// A lab artifact submitted by a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub submitted_at: String,
    pub group_name: String,
    pub course: String,
    pub lab: String,
    pub submitted_by: String,
    pub file_name: String,
    pub file_link: String,
    pub graded: bool,
    pub grade: Option<String>,
}

impl Submission {
    pub fn state(&self) -> SubmissionState {
        if self.graded {
            SubmissionState::Graded
        } else {
            SubmissionState::Submitted
        }
    }

    /// Whether this row belongs to the (group, course, lab) triple.
    pub fn matches(&self, group_name: &str, course: &str, lab: &str) -> bool {
        same_key(&self.group_name, group_name)
            && same_key(&self.course, course)
            && same_key(&self.lab, lab)
    }
}

/// One line of a per-lab grade sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub recorded_at: String,
    pub course: String,
    pub lab: String,
    pub group_name: String,
    pub name: String,
    pub email: String,
    pub score: String,
}
