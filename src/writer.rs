//! Group writer.
//!
//! Creating a group is two steps. [`GroupWriter::prepare`] validates the
//! request against a snapshot of the ledger. [`GroupWriter::commit`] re-reads
//! the ledger, re-runs the collision checks, appends the row and notifies the
//! members.
//!
//! The record store has no transactions, so a racing writer can still append
//! between the re-read and our append. Re-reading right before the append
//! narrows that window to a single store round trip; it does not close it.

use log::{info, warn};
use serde::Serialize;

use crate::eligibility::{Candidate, EligibilityWarning, GroupRequest, check, check_collisions};
use crate::error::{AppError, AppResult};
use crate::ledger::{load_groups, read_ledger};
use crate::model::{Group, timestamp_now};
use crate::notify::{NotificationFailure, Notifier, notify_members};
use crate::roster::Roster;
use crate::schema::{encode_row, header_row, tables};
use crate::store::{RecordStore, RetryPolicy};

/// Outcome of a successful group creation.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    pub group: Group,
    pub warnings: Vec<EligibilityWarning>,

    /// Members the notifier could not reach. The group is persisted regardless.
    pub failed_notifications: Vec<NotificationFailure>,
}

impl WriteReport {
    /// Written, but at least one member was not notified.
    pub fn is_partial_failure(&self) -> bool {
        !self.failed_notifications.is_empty()
    }
}

pub struct GroupWriter<'a> {
    store: &'a dyn RecordStore,
    notifier: &'a dyn Notifier,
    roster: &'a Roster,
    retry: RetryPolicy,
}

impl<'a> GroupWriter<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        notifier: &'a dyn Notifier,
        roster: &'a Roster,
        retry: RetryPolicy,
    ) -> Self {
        GroupWriter {
            store,
            notifier,
            roster,
            retry,
        }
    }

    /// Validate `request` against the current ledger.
    pub fn prepare(&self, request: &GroupRequest) -> AppResult<Candidate> {
        let table = load_groups(self.store, &self.retry)?;
        let view = read_ledger(&table.groups, &request.course, &request.requester.email);
        Ok(check(request, &view, self.roster)?)
    }

    /// Re-validate against a fresh read of the ledger, then persist and notify.
    pub fn commit(&self, candidate: Candidate) -> AppResult<WriteReport> {
        let fresh = load_groups(self.store, &self.retry)?;
        let view = read_ledger(
            &fresh.groups,
            &candidate.group.course,
            &candidate.requester.email,
        );
        if let Err(rejection) = check_collisions(&candidate, &view) {
            warn!(
                "group '{}' lost a race before commit: {}",
                candidate.group.name, rejection
            );
            return Err(AppError::ConcurrencyConflict(rejection));
        }

        let Candidate {
            mut group,
            warnings,
            ..
        } = candidate;
        group.created_at = timestamp_now();

        let header = fresh.header();
        if fresh.rows.is_empty() {
            self.store.append(tables::GROUPS, header_row::<Group>())?;
        }
        let row = encode_row(header.as_ref(), &group)?;
        self.store.append(tables::GROUPS, row)?;
        info!(
            "group '{}' created for {} by {} with {} members",
            group.name,
            group.course,
            group.created_by,
            group.members.len()
        );

        let failed_notifications = notify_members(self.notifier, &group);
        for failure in &failed_notifications {
            warn!(
                "failed to notify {} about group '{}': {}",
                failure.recipient, group.name, failure.reason
            );
        }

        Ok(WriteReport {
            group,
            warnings,
            failed_notifications,
        })
    }

    /// [`GroupWriter::prepare`] followed by [`GroupWriter::commit`].
    pub fn create(&self, request: &GroupRequest) -> AppResult<WriteReport> {
        let candidate = self.prepare(request)?;
        self.commit(candidate)
    }
}
