//! Lab submission desk.
//!
//! A group holds at most one submission per lab. Students can withdraw it
//! until it is graded; after that only an administrator changes it, by
//! grading again.

use log::{info, warn};

use crate::error::{AppResult, Rejection};
use crate::files::{FileStore, extension};
use crate::model::{GradeEntry, Group, Submission, normalize_email, same_key, timestamp_now};
use crate::schema::{Header, cell, decode_table, encode_row, grade_sheet_name, header_row, tables};
use crate::store::{RecordStore, RetryPolicy, Row};

/// File types a group may submit.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "docx", "zip", "ipynb", "py"];

/// A file as received from the browser.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A freshly read copy of the `Submissions` table.
#[derive(Debug, Clone, Default)]
pub struct SubmissionTable {
    pub rows: Vec<Row>,
    pub submissions: Vec<Submission>,
}

impl SubmissionTable {
    pub fn header(&self) -> Option<Header> {
        self.rows
            .first()
            .map(|head| Header::parse(tables::SUBMISSIONS, head))
    }

    /// Index into `rows` of the submission for (group, course, lab).
    fn row_of(&self, group: &str, course: &str, lab: &str) -> AppResult<Option<usize>> {
        let Some(header) = self.header() else {
            return Ok(None);
        };
        let g = header.require("group_name")?;
        let c = header.require("course")?;
        let l = header.require("lab")?;
        Ok(self.rows.iter().enumerate().skip(1).find_map(|(i, row)| {
            (same_key(cell(row, g), group)
                && same_key(cell(row, c), course)
                && same_key(cell(row, l), lab))
            .then_some(i)
        }))
    }
}

pub struct SubmissionDesk<'a> {
    store: &'a dyn RecordStore,
    files: &'a dyn FileStore,
    retry: RetryPolicy,
}

impl<'a> SubmissionDesk<'a> {
    pub fn new(store: &'a dyn RecordStore, files: &'a dyn FileStore, retry: RetryPolicy) -> Self {
        SubmissionDesk {
            store,
            files,
            retry,
        }
    }

    fn load(&self) -> AppResult<SubmissionTable> {
        let rows = self.retry.read_all(self.store, tables::SUBMISSIONS)?;
        let submissions = decode_table(&rows)?;
        Ok(SubmissionTable { rows, submissions })
    }

    /// Submissions for `course`, optionally narrowed to one lab.
    pub fn list(&self, course: &str, lab: Option<&str>) -> AppResult<Vec<Submission>> {
        Ok(self
            .load()?
            .submissions
            .into_iter()
            .filter(|s| same_key(&s.course, course))
            .filter(|s| lab.is_none_or(|l| same_key(&s.lab, l)))
            .collect())
    }

    pub fn find(&self, group: &str, course: &str, lab: &str) -> AppResult<Option<Submission>> {
        Ok(self
            .load()?
            .submissions
            .into_iter()
            .find(|s| s.matches(group, course, lab)))
    }

    /// Upload `upload` and record it as `group`'s submission for `lab`.
    ///
    /// `labs` are the labs offered for the group's course; an empty list
    /// skips the check.
    pub fn submit(
        &self,
        group: &Group,
        lab: &str,
        submitter: &str,
        upload: Upload,
        labs: &[String],
    ) -> AppResult<Submission> {
        let lab = lab.trim();
        if !group.has_member(submitter) {
            return Err(Rejection::NotInGroup {
                email: submitter.to_string(),
                course: group.course.clone(),
            }
            .into());
        }
        if !labs.is_empty() && !labs.iter().any(|l| same_key(l, lab)) {
            return Err(Rejection::UnknownLab {
                course: group.course.clone(),
                lab: lab.to_string(),
            }
            .into());
        }
        let ext = extension(&upload.file_name);
        if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Rejection::UnsupportedFileType { extension: ext }.into());
        }
        if upload.bytes.is_empty() {
            return Err(Rejection::EmptyUpload.into());
        }

        let table = self.load()?;
        if let Some(existing) = table
            .submissions
            .iter()
            .find(|s| s.matches(&group.name, &group.course, lab))
        {
            return Err(if existing.graded {
                Rejection::SubmissionGraded {
                    lab: lab.to_string(),
                }
            } else {
                Rejection::AlreadySubmitted {
                    lab: lab.to_string(),
                }
            }
            .into());
        }

        let destination = format!("{}/{}/{}", group.course, group.name, lab);
        let link = self
            .files
            .upload(&upload.bytes, &upload.file_name, &destination)?;

        let submission = Submission {
            submitted_at: timestamp_now(),
            group_name: group.name.clone(),
            course: group.course.clone(),
            lab: lab.to_string(),
            submitted_by: normalize_email(submitter),
            file_name: upload.file_name,
            file_link: link,
            graded: false,
            grade: None,
        };
        if let Err(err) = self.record(&table, &submission) {
            if let Err(e) = self.files.remove(&submission.file_link) {
                warn!("orphaned upload {}: {}", submission.file_link, e);
            }
            return Err(err);
        }
        info!(
            "{} submitted {} for group '{}' in {}",
            submission.submitted_by, submission.lab, submission.group_name, submission.course
        );
        Ok(submission)
    }

    fn record(&self, table: &SubmissionTable, submission: &Submission) -> AppResult<()> {
        let header = table.header();
        if table.rows.is_empty() {
            self.store
                .append(tables::SUBMISSIONS, header_row::<Submission>())?;
        }
        self.store.append(
            tables::SUBMISSIONS,
            encode_row(header.as_ref(), submission)?,
        )?;
        Ok(())
    }

    /// Withdraw `group`'s submission for `lab`. Graded submissions are kept.
    pub fn delete(&self, group: &Group, lab: &str, requester: &str) -> AppResult<Submission> {
        if !group.has_member(requester) {
            return Err(Rejection::NotInGroup {
                email: requester.to_string(),
                course: group.course.clone(),
            }
            .into());
        }

        let table = self.load()?;
        let not_found = || Rejection::SubmissionNotFound {
            lab: lab.trim().to_string(),
        };
        let existing = table
            .submissions
            .iter()
            .find(|s| s.matches(&group.name, &group.course, lab))
            .cloned()
            .ok_or_else(not_found)?;
        if existing.graded {
            return Err(Rejection::SubmissionGraded {
                lab: existing.lab,
            }
            .into());
        }

        let index = table
            .row_of(&group.name, &group.course, lab)?
            .ok_or_else(not_found)?;
        let mut rows = table.rows;
        rows.remove(index);
        self.store.clear_and_rewrite(tables::SUBMISSIONS, rows)?;
        if let Err(e) = self.files.remove(&existing.file_link) {
            warn!("could not remove withdrawn upload {}: {}", existing.file_link, e);
        }
        info!(
            "{} withdrew {} for group '{}' in {}",
            requester, existing.lab, existing.group_name, existing.course
        );
        Ok(existing)
    }

    /// Record `score` for `group`'s submission of `lab` and append one line
    /// per member to the lab's grade sheet. Grading again overwrites the
    /// score and appends a fresh set of grade sheet lines.
    pub fn grade(&self, group: &Group, lab: &str, score: &str) -> AppResult<Submission> {
        let score = score.trim();
        if score.is_empty() {
            return Err(Rejection::BlankGrade.into());
        }

        let table = self.load()?;
        let not_found = || Rejection::SubmissionNotFound {
            lab: lab.trim().to_string(),
        };
        let mut submission = table
            .submissions
            .iter()
            .find(|s| s.matches(&group.name, &group.course, lab))
            .cloned()
            .ok_or_else(not_found)?;
        let index = table
            .row_of(&group.name, &group.course, lab)?
            .ok_or_else(not_found)?;

        let header = table.header().unwrap_or_else(|| {
            Header::parse(tables::SUBMISSIONS, &header_row::<Submission>())
        });
        let graded_col = header.require("graded")?;
        let grade_col = header.require("grade")?;

        let mut rows = table.rows;
        let row = &mut rows[index];
        if row.len() < header.len() {
            row.resize(header.len(), String::new());
        }
        row[graded_col] = "Yes".to_string();
        row[grade_col] = score.to_string();
        self.store.clear_and_rewrite(tables::SUBMISSIONS, rows)?;

        submission.graded = true;
        submission.grade = Some(score.to_string());
        self.append_grade_sheet(group, &submission, score)?;
        info!(
            "graded {} for group '{}' in {}: {}",
            submission.lab, submission.group_name, submission.course, score
        );
        Ok(submission)
    }

    fn append_grade_sheet(&self, group: &Group, submission: &Submission, score: &str) -> AppResult<()> {
        let sheet = grade_sheet_name(&submission.course, &submission.lab);
        let rows = self.retry.read_all(self.store, &sheet)?;
        let header = rows.first().map(|head| Header::parse(&sheet, head));
        if rows.is_empty() {
            self.store.append(&sheet, header_row::<GradeEntry>())?;
        }

        let recorded_at = timestamp_now();
        for (email, name) in group.roster() {
            let entry = GradeEntry {
                recorded_at: recorded_at.clone(),
                course: submission.course.clone(),
                lab: submission.lab.clone(),
                group_name: submission.group_name.clone(),
                name: name.to_string(),
                email: email.to_string(),
                score: score.to_string(),
            };
            self.store.append(&sheet, encode_row(header.as_ref(), &entry)?)?;
        }
        Ok(())
    }

    /// Every line of the grade sheet for a course lab.
    pub fn grade_sheet(&self, course: &str, lab: &str) -> AppResult<Vec<GradeEntry>> {
        let rows = self
            .retry
            .read_all(self.store, &grade_sheet_name(course, lab))?;
        Ok(decode_table(&rows)?)
    }
}
