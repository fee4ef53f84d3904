//! Error taxonomy for the group ledger and submission desk.
//!
//! Failures fall into four families:
//! - [`AppError::Connection`] - the record store could not be reached
//! - [`AppError::Validation`] - a request was rejected, the user can fix and resubmit
//! - [`AppError::ConcurrencyConflict`] - a racing writer changed the ledger between
//!   validation and commit
//! - partial failures (notifications) are not errors at all; see
//!   [`crate::writer::WriteReport`]

use thiserror::Error;

/// Result alias used throughout the crate.
pub type AppResult<T> = Result<T, AppError>;

/// Errors raised by a [`crate::store::RecordStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing service is temporarily unreachable. Retried by [`crate::store::RetryPolicy`].
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("record store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be decoded or encoded.
    #[error("record store data is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether a read that failed with this error is worth repeating.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            StoreError::Corrupt(_) => false,
        }
    }
}

/// A table does not match the shape the typed records expect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },
}

/// Errors raised by a [`crate::files::FileStore`].
#[derive(Error, Debug)]
pub enum FileError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("link does not belong to this file store: {0}")]
    ForeignLink(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("file already exists: {0}")]
    Exists(String),

    #[error("file store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("notebook could not be parsed: {0}")]
    Notebook(#[from] serde_json::Error),
}

/// Errors raised while loading [`crate::config::Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// Why a request was refused. Every variant carries what the user needs to
/// see in order to correct the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("a course must be selected")]
    MissingCourse,

    #[error("you have already created a group for {course}")]
    AlreadyCreated { course: String },

    #[error("{email} is not on the enrolled students roster")]
    RequesterNotEnrolled { email: String },

    #[error("you must select at least 3 students (selected {count})")]
    TooFewMembers { count: usize },

    #[error("you can't select more than 15 students (selected {count})")]
    TooManyMembers { count: usize },

    #[error("please provide a group name")]
    BlankGroupName,

    #[error("group name '{name}' already exists")]
    GroupNameTaken { name: String },

    #[error("already in another group for this course: {}", .emails.join(", "))]
    AlreadyGrouped { emails: Vec<String> },

    #[error("group '{name}' was not found for {course}")]
    GroupNotFound { course: String, name: String },

    #[error("{email} is not part of any group for {course}")]
    NotInGroup { email: String, course: String },

    #[error("lab '{lab}' is not offered for {course}")]
    UnknownLab { course: String, lab: String },

    #[error("your group has already submitted {lab}")]
    AlreadySubmitted { lab: String },

    #[error("no submission found for {lab}")]
    SubmissionNotFound { lab: String },

    #[error("{lab} has been graded and can no longer be modified")]
    SubmissionGraded { lab: String },

    #[error("file type '{extension}' is not accepted")]
    UnsupportedFileType { extension: String },

    #[error("the uploaded file is empty")]
    EmptyUpload,

    #[error("please provide a grade")]
    BlankGrade,
}

/// Top level error returned by ledger, writer and submission operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// External service unreachable; the caller should show a retry-later message.
    #[error("could not reach the record store, please try again later ({0})")]
    Connection(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] Rejection),

    /// Last-moment re-validation found a collision introduced by a racing writer.
    #[error("the group ledger changed while you were submitting: {0}")]
    ConcurrencyConflict(Rejection),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Files(#[from] FileError),

    #[error("not authorised: {0}")]
    Unauthorized(String),
}

impl AppError {
    /// The rejection behind a validation or concurrency failure, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AppError::Validation(r) | AppError::ConcurrencyConflict(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient_but_corrupt_is_not() {
        assert!(StoreError::Unavailable("quota".into()).is_transient());
        assert!(!StoreError::Corrupt("bad gzip".into()).is_transient());
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(StoreError::Io(timeout).is_transient());
        let missing = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(!StoreError::Io(missing).is_transient());
    }

    #[test]
    fn already_grouped_lists_offending_emails() {
        let r = Rejection::AlreadyGrouped {
            emails: vec!["a@uni.edu".into(), "b@uni.edu".into()],
        };
        assert_eq!(
            r.to_string(),
            "already in another group for this course: a@uni.edu, b@uni.edu"
        );
    }

    #[test]
    fn conflict_exposes_its_rejection() {
        let err = AppError::ConcurrencyConflict(Rejection::GroupNameTaken {
            name: "Alpha".into(),
        });
        assert!(matches!(
            err.rejection(),
            Some(Rejection::GroupNameTaken { .. })
        ));
        assert!(AppError::Unauthorized("x".into()).rejection().is_none());
    }
}
