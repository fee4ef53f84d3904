mod common;

use common::{group, request, roster};
use labgroups::eligibility::{EligibilityWarning, GroupRequest, available_students, check};
use labgroups::ledger::read_ledger;
use labgroups::model::Identity;
use labgroups::Rejection;

const COURSE: &str = "CSC 101";

#[test]
fn accepts_a_fresh_group_of_three() {
    let view = read_ledger(&[], COURSE, "s1@uni.edu");
    let candidate = check(
        &request("s1@uni.edu", COURSE, "Team1", &["s1@uni.edu", "s2@uni.edu", "s3@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap();

    assert_eq!(candidate.group.members, vec!["s1@uni.edu", "s2@uni.edu", "s3@uni.edu"]);
    assert_eq!(candidate.group.member_names[1], "Student No2");
    assert_eq!(candidate.group.created_by, "s1@uni.edu");
    assert!(candidate.warnings.is_empty());
}

#[test]
fn creator_may_only_create_once_per_course() {
    let ledger = vec![group("Team1", COURSE, &["s1@uni.edu", "s2@uni.edu", "s3@uni.edu"])];
    let view = read_ledger(&ledger, COURSE, "s1@uni.edu");
    let err = check(
        &request("s1@uni.edu", COURSE, "Team2", &["s4@uni.edu", "s5@uni.edu", "s6@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap_err();
    assert_eq!(err, Rejection::AlreadyCreated { course: COURSE.into() });
    assert!(err.to_string().contains("already created a group"));
}

#[test]
fn a_lone_requester_is_too_few() {
    let view = read_ledger(&[], COURSE, "s1@uni.edu");
    let err = check(&request("s1@uni.edu", COURSE, "Solo", &["s1@uni.edu"]), &view, &roster())
        .unwrap_err();
    assert_eq!(err, Rejection::TooFewMembers { count: 1 });
    assert!(err.to_string().contains("must select at least 3 students"));
}

#[test]
fn already_grouped_members_are_listed() {
    let ledger = vec![group("Team1", COURSE, &["s7@uni.edu", "s8@uni.edu", "s9@uni.edu"])];
    let view = read_ledger(&ledger, COURSE, "s1@uni.edu");
    let err = check(
        &request("s1@uni.edu", COURSE, "Team2", &["s2@uni.edu", "S8@Uni.edu", "s9@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        Rejection::AlreadyGrouped {
            emails: vec!["s8@uni.edu".into(), "s9@uni.edu".into()]
        }
    );
}

#[test]
fn grouping_in_another_course_does_not_count() {
    let ledger = vec![group("Team1", "CSC 102", &["s2@uni.edu", "s3@uni.edu", "s4@uni.edu"])];
    let view = read_ledger(&ledger, COURSE, "s1@uni.edu");
    assert!(
        check(
            &request("s1@uni.edu", COURSE, "Team2", &["s2@uni.edu", "s3@uni.edu"]),
            &view,
            &roster()
        )
        .is_ok()
    );
}

#[test]
fn requester_is_put_back_with_a_warning() {
    let view = read_ledger(&[], COURSE, "s1@uni.edu");
    let candidate = check(
        &request("S1@uni.edu ", COURSE, "Team1", &["s2@uni.edu", "s3@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap();
    assert_eq!(candidate.group.members[0], "s1@uni.edu");
    assert_eq!(candidate.group.members.len(), 3);
    assert_eq!(
        candidate.warnings,
        vec![EligibilityWarning::RequesterReadded {
            email: "s1@uni.edu".into()
        }]
    );
}

#[test]
fn members_are_normalized_and_deduplicated() {
    let view = read_ledger(&[], COURSE, "s1@uni.edu");
    let candidate = check(
        &request(
            "s1@uni.edu",
            COURSE,
            "Team1",
            &[" S2@UNI.EDU", "s1@uni.edu", "s2@uni.edu", "", "s3@uni.edu"],
        ),
        &view,
        &roster(),
    )
    .unwrap();
    assert_eq!(candidate.group.members, vec!["s2@uni.edu", "s1@uni.edu", "s3@uni.edu"]);
}

#[test]
fn unknown_emails_are_dropped_before_counting() {
    let view = read_ledger(&[], COURSE, "s1@uni.edu");
    let err = check(
        &request("s1@uni.edu", COURSE, "Team1", &["s2@uni.edu", "ghost@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap_err();
    assert_eq!(err, Rejection::TooFewMembers { count: 2 });

    let candidate = check(
        &request("s1@uni.edu", COURSE, "Team1", &["s2@uni.edu", "ghost@uni.edu", "s3@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap();
    assert!(!candidate.group.has_member("ghost@uni.edu"));
    assert!(candidate.warnings.contains(&EligibilityWarning::UnknownStudent {
        email: "ghost@uni.edu".into()
    }));
}

#[test]
fn more_than_fifteen_is_rejected() {
    let emails: Vec<String> = (1..=16).map(|i| format!("s{i}@uni.edu")).collect();
    let refs: Vec<&str> = emails.iter().map(String::as_str).collect();
    let view = read_ledger(&[], COURSE, "s1@uni.edu");
    let err = check(&request("s1@uni.edu", COURSE, "Big", &refs), &view, &roster()).unwrap_err();
    assert_eq!(err, Rejection::TooManyMembers { count: 16 });
    assert!(check(&request("s1@uni.edu", COURSE, "Big", &refs[..15]), &view, &roster()).is_ok());
}

#[test]
fn blank_names_are_rejected() {
    let view = read_ledger(&[], COURSE, "s1@uni.edu");
    let err = check(
        &request("s1@uni.edu", COURSE, "   ", &["s2@uni.edu", "s3@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap_err();
    assert_eq!(err, Rejection::BlankGroupName);
}

#[test]
fn names_are_unique_across_courses_ignoring_case() {
    let ledger = vec![group("Alpha", "CSC 102", &["s7@uni.edu", "s8@uni.edu", "s9@uni.edu"])];
    let view = read_ledger(&ledger, COURSE, "s1@uni.edu");
    let err = check(
        &request("s1@uni.edu", COURSE, "alpha", &["s2@uni.edu", "s3@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap_err();
    assert_eq!(err, Rejection::GroupNameTaken { name: "alpha".into() });
}

#[test]
fn unenrolled_students_cannot_create_groups() {
    let view = read_ledger(&[], COURSE, "visitor@uni.edu");
    let err = check(
        &request("visitor@uni.edu", COURSE, "Team1", &["s2@uni.edu", "s3@uni.edu", "s4@uni.edu"]),
        &view,
        &roster(),
    )
    .unwrap_err();
    assert!(matches!(err, Rejection::RequesterNotEnrolled { .. }));
}

#[test]
fn admins_form_groups_without_joining_them() {
    let mut ledger = vec![group("Team1", COURSE, &["s7@uni.edu", "s8@uni.edu", "s9@uni.edu"])];
    // an admin may create several groups for the same course
    ledger[0].created_by = "prof@uni.edu".into();

    let mut req = request("prof@uni.edu", COURSE, "Team2", &["s2@uni.edu", "s3@uni.edu", "s4@uni.edu"]);
    req.requester = Identity::admin("prof@uni.edu");
    let view = read_ledger(&ledger, COURSE, "prof@uni.edu");
    let candidate = check(&req, &view, &roster()).unwrap();
    assert!(!candidate.group.has_member("prof@uni.edu"));
    assert!(candidate.warnings.is_empty());
}

#[test]
fn missing_course_is_rejected_first() {
    let view = read_ledger(&[], "", "s1@uni.edu");
    let req = GroupRequest {
        course: " ".into(),
        ..request("s1@uni.edu", "", "Team1", &[])
    };
    assert_eq!(check(&req, &view, &roster()).unwrap_err(), Rejection::MissingCourse);
}

#[test]
fn available_students_exclude_the_grouped_but_keep_the_requester() {
    let ledger = vec![group("Team1", COURSE, &["s1@uni.edu", "s2@uni.edu", "s3@uni.edu"])];
    let roster = roster();
    let view = read_ledger(&ledger, COURSE, "s1@uni.edu");
    let emails: Vec<&str> = available_students(&roster, &view, "s1@uni.edu", None, None)
        .into_iter()
        .map(|s| s.email.as_str())
        .collect();
    assert!(emails.contains(&"s1@uni.edu"));
    assert!(!emails.contains(&"s2@uni.edu"));
    assert_eq!(emails.len(), 18);

    let none = available_students(&roster, &view, "s1@uni.edu", Some("Arts"), None);
    assert!(none.is_empty());
}
