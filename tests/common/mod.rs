#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use labgroups::eligibility::GroupRequest;
use labgroups::model::{Group, Identity, Student};
use labgroups::notify::{Notifier, NotifyError};
use labgroups::roster::Roster;
use labgroups::schema::{Record, header_row, tables};
use labgroups::store::{MemoryStore, Row};

pub fn student(email: &str, id: &str, first: &str, last: &str) -> Student {
    Student {
        email: email.to_string(),
        student_id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        faculty: "Computing".to_string(),
        program: "Computer Science".to_string(),
    }
}

/// Twenty enrolled students, s1@uni.edu .. s20@uni.edu.
pub fn students() -> Vec<Student> {
    (1..=20)
        .map(|i| student(&format!("s{i}@uni.edu"), &format!("ID{i:03}"), "Student", &format!("No{i}")))
        .collect()
}

pub fn roster() -> Roster {
    Roster::new(students())
}

fn table<R: Record>(records: &[R]) -> Vec<Row> {
    let mut rows = vec![header_row::<R>()];
    rows.extend(records.iter().map(Record::to_cells));
    rows
}

/// A store holding the roster and an empty group ledger.
pub fn store() -> MemoryStore {
    let mut tables_map = BTreeMap::new();
    tables_map.insert(tables::STUDENTS.to_string(), table(&students()));
    MemoryStore::with_tables(tables_map)
}

pub fn group(name: &str, course: &str, members: &[&str]) -> Group {
    Group {
        created_at: "2024-09-01 09:00:00".to_string(),
        name: name.to_string(),
        faculty: "Computing".to_string(),
        department: "Computer Science".to_string(),
        course: course.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
        member_names: members.iter().map(|m| m.to_string()).collect(),
        created_by: members.first().map(|m| m.to_string()).unwrap_or_default(),
    }
}

pub fn request(requester: &str, course: &str, name: &str, members: &[&str]) -> GroupRequest {
    GroupRequest {
        requester: Identity::student(requester),
        course: course.to_string(),
        faculty: "Computing".to_string(),
        department: "Computer Science".to_string(),
        name: name.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

/// Records every message, failing for the listed recipients.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub unreachable: Vec<String>,
}

impl RecordingNotifier {
    pub fn failing_for(recipients: &[&str]) -> Self {
        RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            unreachable: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        if self.unreachable.iter().any(|r| r == recipient) {
            return Err(NotifyError(format!("{recipient}: mailbox unavailable")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}
