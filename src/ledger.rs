//! Membership ledger reader.
//!
//! The `groups` table is the shared source of truth for who is grouped with
//! whom. This module turns a snapshot of it into the facts the eligibility
//! checker needs for one course and one requester.

use std::collections::BTreeSet;

use log::debug;

use crate::error::AppResult;
use crate::model::{Group, normalize_email};
use crate::schema::{Header, decode_table, tables};
use crate::store::{RecordStore, RetryPolicy, Row};

/// What the ledger says about a course, from one requester's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerView {
    /// Normalized emails already in some group for the course
    pub already_grouped: BTreeSet<String>,

    /// Whether the requester is `created_by` of a group for the course
    pub requester_already_created: bool,

    /// Lowercased names of every existing group, all courses included
    pub existing_names: BTreeSet<String>,
}

impl LedgerView {
    pub fn is_grouped(&self, email: &str) -> bool {
        self.already_grouped.contains(&normalize_email(email))
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.existing_names.contains(&name.trim().to_lowercase())
    }
}

/// Build the view for `course` and `requester` from a group snapshot.
pub fn read_ledger(groups: &[Group], course: &str, requester: &str) -> LedgerView {
    let requester = normalize_email(requester);
    let mut view = LedgerView::default();

    for group in groups {
        view.existing_names.insert(group.name.trim().to_lowercase());
        if !group.is_for_course(course) {
            continue;
        }
        view.already_grouped
            .extend(group.members.iter().map(|m| normalize_email(m)));
        if normalize_email(&group.created_by) == requester {
            view.requester_already_created = true;
        }
    }

    debug!(
        "ledger for '{}': {} grouped, requester created: {}",
        course,
        view.already_grouped.len(),
        view.requester_already_created
    );
    view
}

/// A freshly read copy of the `groups` table.
#[derive(Debug, Clone, Default)]
pub struct GroupTable {
    /// Raw rows, header first
    pub rows: Vec<Row>,

    pub groups: Vec<Group>,
}

impl GroupTable {
    pub fn header(&self) -> Option<Header> {
        self.rows
            .first()
            .map(|head| Header::parse(tables::GROUPS, head))
    }
}

/// Read and decode the `groups` table, retrying transient failures.
pub fn load_groups(store: &dyn RecordStore, retry: &RetryPolicy) -> AppResult<GroupTable> {
    let rows = retry.read_all(store, tables::GROUPS)?;
    let groups = decode_table(&rows)?;
    Ok(GroupTable { rows, groups })
}

/// The group `email` belongs to for `course`, if any.
pub fn group_of<'a>(groups: &'a [Group], course: &str, email: &str) -> Option<&'a Group> {
    groups
        .iter()
        .find(|g| g.is_for_course(course) && g.has_member(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, course: &str, members: &[&str], created_by: &str) -> Group {
        Group {
            created_at: "2024-01-01 10:00:00".into(),
            name: name.into(),
            faculty: "Computing".into(),
            department: "CS".into(),
            course: course.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            member_names: Vec::new(),
            created_by: created_by.into(),
        }
    }

    #[test]
    fn empty_ledger_has_no_members() {
        let view = read_ledger(&[], "CSC 101", "a@x.edu");
        assert!(view.already_grouped.is_empty());
        assert!(!view.requester_already_created);
    }

    #[test]
    fn only_the_selected_course_counts_for_membership() {
        let groups = vec![
            group("Alpha", "CSC 101", &["A@x.edu", "b@x.edu"], "a@x.edu"),
            group("Beta", "CSC 102", &["c@x.edu"], "c@x.edu"),
        ];
        let view = read_ledger(&groups, "csc 101 ", "A@X.EDU");
        assert!(view.is_grouped("a@x.edu"));
        assert!(view.is_grouped("b@x.edu"));
        assert!(!view.is_grouped("c@x.edu"));
        assert!(view.requester_already_created);
        // names are tracked across all courses
        assert!(view.name_taken("beta"));
        assert!(view.name_taken(" ALPHA "));
    }

    #[test]
    fn creator_of_another_course_is_not_blocked() {
        let groups = vec![group("Beta", "CSC 102", &["c@x.edu"], "c@x.edu")];
        let view = read_ledger(&groups, "CSC 101", "c@x.edu");
        assert!(!view.requester_already_created);
    }

    #[test]
    fn finds_the_group_of_a_member() {
        let groups = vec![group("Alpha", "CSC 101", &["a@x.edu"], "a@x.edu")];
        assert_eq!(
            group_of(&groups, "CSC 101", "A@x.edu").map(|g| g.name.as_str()),
            Some("Alpha")
        );
        assert!(group_of(&groups, "CSC 102", "a@x.edu").is_none());
    }
}
