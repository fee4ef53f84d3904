//! Schema mapping between string rows in the record store and typed records.
//!
//! Every table's first row is a header. Columns are located by name once per
//! read (trimmed, case-insensitive), so reordered or extra columns are fine and
//! a missing required column fails the whole read with a [`SchemaError`]
//! instead of surfacing later at some arbitrary use site. Individual rows with
//! blank required cells are skipped.

use std::collections::HashMap;

use log::warn;

use crate::error::SchemaError;
use crate::model::{
    AdminAccount, GradeEntry, Group, Lab, Student, Submission, normalize_email, split_list,
};
use crate::store::Row;

/// Names of the tables in the record store.
pub mod tables {
    pub const STUDENTS: &str = "Enrolled Students";
    pub const ADMINS: &str = "Login_details";
    pub const COURSES: &str = "course_list";
    pub const LABS: &str = "Labs";
    pub const GROUPS: &str = "groups";
    pub const SUBMISSIONS: &str = "Submissions";
}

/// Name of the grade sheet for a course lab ("CSC 101", "Lab 1" -> "CSC_101_Lab_1").
pub fn grade_sheet_name(course: &str, lab: &str) -> String {
    format!("{}_{}", course.trim(), lab.trim()).replace(' ', "_")
}

/// Column positions of a table, keyed by normalized column name.
#[derive(Debug, Clone)]
pub struct Header {
    table: String,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn parse(table: &str, row: &[String]) -> Self {
        let names: Vec<String> = row.iter().map(|c| c.trim().to_lowercase()).collect();
        let mut index = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            // first occurrence wins on duplicate headers
            index.entry(name.clone()).or_insert(i);
        }
        Header {
            table: table.to_string(),
            names,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&column.trim().to_lowercase()).copied()
    }

    pub fn require(&self, column: &str) -> Result<usize, SchemaError> {
        self.position(column).ok_or_else(|| self.missing(column))
    }

    /// First column whose name contains `needle`, skipping `except`.
    pub fn position_containing(&self, needle: &str, except: Option<usize>) -> Option<usize> {
        self.names
            .iter()
            .enumerate()
            .find(|(i, name)| Some(*i) != except && name.contains(needle))
            .map(|(i, _)| i)
    }

    fn missing(&self, column: &str) -> SchemaError {
        SchemaError::MissingColumn {
            table: self.table.clone(),
            column: column.to_string(),
        }
    }
}

/// Trimmed cell at `index`, empty when the row is short.
pub fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|c| c.trim()).unwrap_or("")
}

/// A typed record stored as one row of a table.
pub trait Record: Sized {
    const TABLE: &'static str;

    /// Canonical column order, used for new tables.
    const COLUMNS: &'static [&'static str];

    /// Positions of [`Record::COLUMNS`] in a table with this header.
    fn locate(header: &Header) -> Result<Vec<usize>, SchemaError> {
        Self::COLUMNS.iter().map(|c| header.require(c)).collect()
    }

    /// Build a record from cells given in [`Record::COLUMNS`] order.
    /// `None` marks the row as malformed.
    fn from_cells(cells: &[&str]) -> Option<Self>;

    /// Cells in [`Record::COLUMNS`] order.
    fn to_cells(&self) -> Vec<String>;
}

/// Canonical header row for a record type.
pub fn header_row<R: Record>() -> Row {
    R::COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Decode every data row of a table. An empty table decodes to nothing.
pub fn decode_table<R: Record>(rows: &[Row]) -> Result<Vec<R>, SchemaError> {
    let Some((head, data)) = rows.split_first() else {
        return Ok(Vec::new());
    };
    let header = Header::parse(R::TABLE, head);
    let positions = R::locate(&header)?;

    let mut records = Vec::with_capacity(data.len());
    for (i, row) in data.iter().enumerate() {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let cells: Vec<&str> = positions.iter().map(|&p| cell(row, p)).collect();
        match R::from_cells(&cells) {
            Some(record) => records.push(record),
            // +2: one for the header, one for 1-based sheet rows
            None => warn!("skipping malformed row {} in table '{}'", i + 2, R::TABLE),
        }
    }
    Ok(records)
}

/// Encode a record for appending to a table whose current header is `header`
/// (`None` for an empty table, which gets the canonical layout).
pub fn encode_row<R: Record>(header: Option<&Header>, record: &R) -> Result<Row, SchemaError> {
    let cells = record.to_cells();
    let Some(header) = header else {
        return Ok(cells);
    };
    let positions = R::locate(header)?;
    let mut row = vec![String::new(); header.len()];
    for (value, position) in cells.into_iter().zip(positions) {
        row[position] = value;
    }
    Ok(row)
}

fn required(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Record for Student {
    const TABLE: &'static str = tables::STUDENTS;
    const COLUMNS: &'static [&'static str] = &[
        "email",
        "student_id",
        "first_name",
        "last_name",
        "faculty",
        "program",
    ];

    fn from_cells(cells: &[&str]) -> Option<Self> {
        Some(Student {
            email: required(&normalize_email(cells[0]))?,
            student_id: required(cells[1])?,
            first_name: cells[2].to_string(),
            last_name: cells[3].to_string(),
            faculty: cells[4].to_string(),
            program: cells[5].to_string(),
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![
            self.email.clone(),
            self.student_id.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.faculty.clone(),
            self.program.clone(),
        ]
    }
}

impl Record for AdminAccount {
    const TABLE: &'static str = tables::ADMINS;
    const COLUMNS: &'static [&'static str] = &["Email", "Password"];

    fn from_cells(cells: &[&str]) -> Option<Self> {
        Some(AdminAccount {
            email: required(&normalize_email(cells[0]))?,
            password: required(cells[1])?,
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![self.email.clone(), self.password.clone()]
    }
}

impl Record for Lab {
    const TABLE: &'static str = tables::LABS;
    const COLUMNS: &'static [&'static str] = &["Course", "Lab Name"];

    /// Lab sheets are maintained by hand; accept any column mentioning
    /// "course" and any other mentioning "lab".
    fn locate(header: &Header) -> Result<Vec<usize>, SchemaError> {
        let course = header
            .position_containing("course", None)
            .ok_or_else(|| header.missing("Course"))?;
        let lab = header
            .position_containing("lab", Some(course))
            .ok_or_else(|| header.missing("Lab Name"))?;
        Ok(vec![course, lab])
    }

    fn from_cells(cells: &[&str]) -> Option<Self> {
        Some(Lab {
            course: required(cells[0])?,
            name: required(cells[1])?,
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![self.course.clone(), self.name.clone()]
    }
}

impl Record for Group {
    const TABLE: &'static str = tables::GROUPS;
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "group_name",
        "faculty",
        "department",
        "course",
        "members",
        "member_names",
        "created_by",
    ];

    fn from_cells(cells: &[&str]) -> Option<Self> {
        let members: Vec<String> = split_list(cells[5])
            .iter()
            .map(|m| normalize_email(m))
            .collect();
        if members.is_empty() {
            return None;
        }
        Some(Group {
            created_at: cells[0].to_string(),
            name: required(cells[1])?,
            faculty: cells[2].to_string(),
            department: cells[3].to_string(),
            course: required(cells[4])?,
            members,
            member_names: split_list(cells[6]),
            created_by: normalize_email(cells[7]),
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![
            self.created_at.clone(),
            self.name.clone(),
            self.faculty.clone(),
            self.department.clone(),
            self.course.clone(),
            self.members.join(", "),
            self.member_names.join(", "),
            self.created_by.clone(),
        ]
    }
}

impl Record for Submission {
    const TABLE: &'static str = tables::SUBMISSIONS;
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "group_name",
        "course",
        "lab",
        "submitted_by",
        "file_name",
        "file_link",
        "graded",
        "grade",
    ];

    fn from_cells(cells: &[&str]) -> Option<Self> {
        let graded = cells[7].eq_ignore_ascii_case("yes");
        Some(Submission {
            submitted_at: cells[0].to_string(),
            group_name: required(cells[1])?,
            course: required(cells[2])?,
            lab: required(cells[3])?,
            submitted_by: normalize_email(cells[4]),
            file_name: cells[5].to_string(),
            file_link: cells[6].to_string(),
            graded,
            grade: required(cells[8]),
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![
            self.submitted_at.clone(),
            self.group_name.clone(),
            self.course.clone(),
            self.lab.clone(),
            self.submitted_by.clone(),
            self.file_name.clone(),
            self.file_link.clone(),
            if self.graded { "Yes" } else { "No" }.to_string(),
            self.grade.clone().unwrap_or_default(),
        ]
    }
}

impl Record for GradeEntry {
    // grade sheets are named per course lab, see `grade_sheet_name`
    const TABLE: &'static str = "grade sheet";
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "course",
        "lab",
        "group_name",
        "name",
        "email",
        "score",
    ];

    fn from_cells(cells: &[&str]) -> Option<Self> {
        Some(GradeEntry {
            recorded_at: cells[0].to_string(),
            course: required(cells[1])?,
            lab: required(cells[2])?,
            group_name: required(cells[3])?,
            name: cells[4].to_string(),
            email: required(&normalize_email(cells[5]))?,
            score: cells[6].to_string(),
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![
            self.recorded_at.clone(),
            self.course.clone(),
            self.lab.clone(),
            self.group_name.clone(),
            self.name.clone(),
            self.email.clone(),
            self.score.clone(),
        ]
    }
}
