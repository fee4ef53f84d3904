//! Outbound notifications.
//!
//! Delivery is best effort and one call per recipient: a failure for one
//! member never stops the others and never undoes the write that triggered it.

use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::model::Group;

/// Why a single message could not be delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Sends a plain-text message to one recipient.
pub trait Notifier: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        (**self).send(recipient, subject, body)
    }
}

/// Notifier that only writes each message to the log. Used when no SMTP
/// server is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        info!("notification to {}: {}", recipient, subject);
        Ok(())
    }
}

/// A recipient that could not be notified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationFailure {
    pub recipient: String,
    pub reason: String,
}

/// Subject line for the "you've been added" message.
pub fn group_subject(group: &Group) -> String {
    format!("[{}] You've been added to '{}'", group.course, group.name)
}

/// Body of the "you've been added" message for one member.
pub fn group_body(group: &Group, member_name: &str) -> String {
    let members = group
        .roster()
        .map(|(email, name)| format!("- {} ({})", name, email))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Dear {},\n\n\
         You have been added to the group '{}' for the course {}, created by {}.\n\n\
         Group Members:\n{}\n\n\
         Please collaborate with your teammates.\n\n\
         Best regards,\n\
         Group Formation Support",
        member_name, group.name, group.course, group.created_by, members
    )
}

/// Tell every member of `group` about it. Returns the members that could not
/// be reached.
pub fn notify_members(notifier: &dyn Notifier, group: &Group) -> Vec<NotificationFailure> {
    let subject = group_subject(group);
    group
        .roster()
        .filter_map(|(email, name)| {
            notifier
                .send(email, &subject, &group_body(group, name))
                .err()
                .map(|e| NotificationFailure {
                    recipient: email.to_string(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
        fail_for: Option<String>,
    }

    impl Notifier for Outbox {
        fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
            if self.fail_for.as_deref() == Some(recipient) {
                return Err(NotifyError("mailbox full".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn group() -> Group {
        Group {
            created_at: String::new(),
            name: "Team1".into(),
            faculty: "Computing".into(),
            department: "CS".into(),
            course: "CSC 101".into(),
            members: vec!["a@x.edu".into(), "b@x.edu".into(), "c@x.edu".into()],
            member_names: vec!["Ada A".into(), "Bob B".into(), "Cy C".into()],
            created_by: "a@x.edu".into(),
        }
    }

    #[test]
    fn body_lists_every_member() {
        let body = group_body(&group(), "Bob B");
        assert!(body.starts_with("Dear Bob B,"));
        assert!(body.contains("- Ada A (a@x.edu)"));
        assert!(body.contains("- Cy C (c@x.edu)"));
        assert!(body.contains("created by a@x.edu"));
        assert_eq!(group_subject(&group()), "[CSC 101] You've been added to 'Team1'");
    }

    #[test]
    fn one_failure_does_not_stop_the_rest() {
        let outbox = Outbox {
            fail_for: Some("b@x.edu".into()),
            ..Default::default()
        };
        let failures = notify_members(&outbox, &group());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].recipient, "b@x.edu");
        assert_eq!(failures[0].reason, "mailbox full");
        assert_eq!(outbox.sent.lock().unwrap().len(), 2);
    }
}
