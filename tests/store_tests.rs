mod common;

use std::io::Write;

use common::{RecordingNotifier, request};
use labgroups::ledger::load_groups;
use labgroups::loader::import_csv;
use labgroups::roster::{Roster, labs_for, load_admins, load_courses, load_labs};
use labgroups::saving::{WorkbookStore, load_workbook};
use labgroups::schema::tables;
use labgroups::store::{RecordStore, RetryPolicy};
use labgroups::{AppError, GroupWriter};

fn csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const STUDENTS_CSV: &str = "\
email,student_id,first_name,last_name,faculty,program
S1@uni.edu,1001,ada,lovelace,Computing,Computer Science
s2@uni.edu,1002,Bob,Babbage,Computing,Computer Science
s3@uni.edu,1003,Grace,Hopper,Computing,\"Information Technology, Data\"
,1004,No,Email,Computing,Computer Science
";

#[test]
fn workbook_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("labgroups.bin.gz");

    {
        let store = WorkbookStore::open(&path).unwrap();
        store.append("groups", vec!["timestamp".into(), "group_name".into()]).unwrap();
        store.append("groups", vec!["t".into(), "Alpha".into()]).unwrap();
    }

    let reopened = WorkbookStore::open(&path).unwrap();
    let rows = reopened.read_all("groups").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1], "Alpha");
    assert!(reopened.read_all("missing").unwrap().is_empty());

    reopened.clear_and_rewrite("groups", Vec::new()).unwrap();
    assert!(load_workbook(&path).unwrap().tables["groups"].is_empty());
}

#[test]
fn a_corrupt_workbook_is_reported_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labgroups.bin.gz");
    std::fs::write(&path, b"definitely not gzip").unwrap();

    let store = WorkbookStore::open(&path).unwrap();
    let err = load_groups(&store, &RetryPolicy::immediate(3)).unwrap_err();
    assert!(matches!(err, AppError::Connection(ref e) if !e.is_transient()));
}

#[test]
fn imported_roster_drives_group_creation() {
    let dir = tempfile::tempdir().unwrap();
    let store = WorkbookStore::open(dir.path().join("labgroups.bin.gz")).unwrap();
    let retry = RetryPolicy::immediate(1);

    let students = csv(STUDENTS_CSV);
    assert_eq!(import_csv(&store, tables::STUDENTS, students.path(), true).unwrap(), 4);

    let roster = Roster::load(&store, &retry).unwrap();
    // the row without an email is skipped
    assert_eq!(roster.len(), 3);
    assert_eq!(roster.get("s1@uni.edu").unwrap().display_name(), "Ada Lovelace");
    assert_eq!(
        roster.programs("computing"),
        vec!["Computer Science", "Information Technology, Data"]
    );

    let notifier = RecordingNotifier::default();
    let report = GroupWriter::new(&store, &notifier, &roster, retry)
        .create(&request("s1@uni.edu", "CSC 101", "Team1", &["s2@uni.edu", "s3@uni.edu"]))
        .unwrap();
    assert_eq!(report.group.member_names[0], "Ada Lovelace");
    assert_eq!(load_groups(&store, &retry).unwrap().groups, vec![report.group]);
}

#[test]
fn reference_tables_load_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let store = WorkbookStore::open(dir.path().join("labgroups.bin.gz")).unwrap();
    let retry = RetryPolicy::immediate(1);

    import_csv(&store, tables::ADMINS, csv("Email,Password\nProf@uni.edu,pw\n").path(), true)
        .unwrap();
    import_csv(
        &store,
        tables::COURSES,
        csv("Course\nCSC 102\nCSC 101\nCSC 101\n").path(),
        true,
    )
    .unwrap();
    import_csv(
        &store,
        tables::LABS,
        csv("Course Code,Lab Title\nCSC 101,Lab 2\nCSC 101,Lab 1\nCSC 102,Lab 1\n").path(),
        true,
    )
    .unwrap();

    assert_eq!(load_admins(&store, &retry).unwrap()[0].email, "prof@uni.edu");
    assert_eq!(load_courses(&store, &retry).unwrap(), vec!["CSC 101", "CSC 102"]);
    let labs = load_labs(&store, &retry).unwrap();
    assert_eq!(labs_for(&labs, "csc 101"), vec!["Lab 1", "Lab 2"]);
}

#[test]
fn appending_imports_keep_a_single_header() {
    let dir = tempfile::tempdir().unwrap();
    let store = WorkbookStore::open(dir.path().join("labgroups.bin.gz")).unwrap();

    let first = csv("Course\nCSC 101\n");
    let second = csv("Course\nCSC 102\n");
    import_csv(&store, tables::COURSES, first.path(), false).unwrap();
    import_csv(&store, tables::COURSES, second.path(), false).unwrap();

    let rows = store.read_all(tables::COURSES).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec!["Course"]);
}
