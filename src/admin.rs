//! Administrator views over the group ledger.

use std::collections::BTreeSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, Rejection};
use crate::ledger::load_groups;
use crate::model::{Group, same_key};
use crate::schema::{cell, tables};
use crate::store::{RecordStore, RetryPolicy};

/// Faculty / department / course filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFilter {
    pub faculty: Option<String>,
    pub department: Option<String>,
    pub course: Option<String>,
}

impl GroupFilter {
    pub fn matches(&self, group: &Group) -> bool {
        let field = |wanted: &Option<String>, actual: &str| {
            wanted
                .as_deref()
                .filter(|w| !w.trim().is_empty())
                .is_none_or(|w| same_key(w, actual))
        };
        field(&self.faculty, &group.faculty)
            && field(&self.department, &group.department)
            && field(&self.course, &group.course)
    }
}

pub fn filter_groups<'a>(groups: &'a [Group], filter: &GroupFilter) -> Vec<&'a Group> {
    groups.iter().filter(|g| filter.matches(g)).collect()
}

/// Options for the cascading faculty -> department -> course selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub faculties: Vec<String>,

    /// Departments of the selected faculty
    pub departments: Vec<String>,

    /// Courses of the selected faculty and department
    pub courses: Vec<String>,
}

pub fn facets(groups: &[Group], faculty: Option<&str>, department: Option<&str>) -> Facets {
    fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
        values
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    let in_faculty = |g: &&Group| faculty.is_some_and(|f| same_key(&g.faculty, f));
    let in_department = |g: &&Group| department.is_some_and(|d| same_key(&g.department, d));

    Facets {
        faculties: distinct(groups.iter().map(|g| g.faculty.as_str())),
        departments: distinct(
            groups
                .iter()
                .filter(in_faculty)
                .map(|g| g.department.as_str()),
        ),
        courses: distinct(
            groups
                .iter()
                .filter(in_faculty)
                .filter(in_department)
                .map(|g| g.course.as_str()),
        ),
    }
}

/// The group called `name` in `course`.
pub fn find_group<'a>(groups: &'a [Group], course: &str, name: &str) -> Option<&'a Group> {
    groups
        .iter()
        .find(|g| g.is_for_course(course) && same_key(&g.name, name))
}

/// Remove the group called `name` in `course`.
///
/// The table is re-read immediately before it is rewritten so appends that
/// landed since the admin's page was rendered are kept. Rows that do not
/// decode are carried over untouched.
pub fn delete_group(
    store: &dyn RecordStore,
    retry: &RetryPolicy,
    course: &str,
    name: &str,
) -> AppResult<Group> {
    let fresh = load_groups(store, retry)?;
    let removed = find_group(&fresh.groups, course, name)
        .cloned()
        .ok_or_else(|| Rejection::GroupNotFound {
            course: course.to_string(),
            name: name.to_string(),
        })?;

    let Some(header) = fresh.header() else {
        return Err(Rejection::GroupNotFound {
            course: course.to_string(),
            name: name.to_string(),
        }
        .into());
    };
    let name_col = header.require("group_name")?;
    let course_col = header.require("course")?;

    let mut rows = fresh.rows;
    let before = rows.len();
    let mut kept = Vec::with_capacity(before);
    for (i, row) in rows.drain(..).enumerate() {
        let doomed =
            i > 0 && same_key(cell(&row, name_col), name) && same_key(cell(&row, course_col), course);
        if !doomed {
            kept.push(row);
        }
    }
    let dropped = before - kept.len();
    store.clear_and_rewrite(tables::GROUPS, kept)?;
    info!(
        "deleted group '{}' for {} ({} row(s))",
        removed.name, removed.course, dropped
    );

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, faculty: &str, department: &str, course: &str) -> Group {
        Group {
            created_at: String::new(),
            name: name.into(),
            faculty: faculty.into(),
            department: department.into(),
            course: course.into(),
            members: vec!["a@x.edu".into()],
            member_names: vec!["A".into()],
            created_by: "a@x.edu".into(),
        }
    }

    fn sample() -> Vec<Group> {
        vec![
            group("Alpha", "Computing", "CS", "CSC 101"),
            group("Beta", "Computing", "CS", "CSC 102"),
            group("Gamma", "Computing", "IT", "ITS 101"),
            group("Delta", "Arts", "History", "HIS 101"),
        ]
    }

    #[test]
    fn filter_matches_case_insensitively() {
        let groups = sample();
        let filter = GroupFilter {
            faculty: Some("computing".into()),
            department: Some("cs".into()),
            course: None,
        };
        let names: Vec<_> = filter_groups(&groups, &filter)
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert_eq!(filter_groups(&groups, &GroupFilter::default()).len(), 4);
    }

    #[test]
    fn blank_filter_fields_match_everything() {
        let groups = sample();
        let filter = GroupFilter {
            faculty: Some(" ".into()),
            ..Default::default()
        };
        assert_eq!(filter_groups(&groups, &filter).len(), 4);
    }

    #[test]
    fn facets_cascade() {
        let groups = sample();
        let f = facets(&groups, Some("Computing"), Some("CS"));
        assert_eq!(f.faculties, vec!["Arts", "Computing"]);
        assert_eq!(f.departments, vec!["CS", "IT"]);
        assert_eq!(f.courses, vec!["CSC 101", "CSC 102"]);

        let none = facets(&groups, None, None);
        assert!(none.departments.is_empty());
        assert!(none.courses.is_empty());
    }
}
