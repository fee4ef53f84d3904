/*!
# Lab Groups

Lab-group formation and submission tracking for course administrators and
students, built in Rust.

## Overview

Students log in with their roster email and student id, pick classmates for a
course and form a group of 3 to 15. Group rows are appended to a shared
tabular record store that offers no transactions, so every rule is checked
against a fresh read of the ledger and re-checked right before the write.
Groups then submit one file per lab, which administrators preview and grade.

## Architecture

### Rules Layer
- **roster** - enrolled students, admin logins, courses and labs
- **ledger** - who is already grouped for a course, which names are taken
- **eligibility** - pure checks turning a request into a candidate group
- **writer** - re-validates and commits a candidate, then notifies members
- **admin** - filters, facets and rewrite-based deletion
- **submission** - submit, withdraw and grade lab files

### Collaborators
- **store** - the `RecordStore` trait, retry policy and an in-memory store
- **saving** - `WorkbookStore`, a gzip + bincode file-backed record store
- **files** - the `FileStore` trait, a local implementation and previews
- **notify** - the `Notifier` trait; **mailer** delivers over SMTP (`web`)

### Web Layer (`web` feature)
- **app** - axum routes, session cookies and JSON envelopes

## Failure Model

- **Connection** - the record store could not be read; transient failures are retried
- **Validation** - the request breaks a rule and can be corrected
- **Concurrency conflict** - a racing writer won between validation and commit
- **Partial failure** - the group was written but some members were not notified;
  reported on the `WriteReport`, never as an error
*/

pub mod admin;
pub mod auth;
pub mod config;
pub mod downloader;
pub mod eligibility;
pub mod error;
pub mod files;
pub mod ledger;
pub mod loader;
pub mod model;
pub mod notify;
pub mod roster;
pub mod saving;
pub mod schema;
pub mod store;
pub mod submission;
pub mod writer;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod mailer;

pub use error::{AppError, AppResult, Rejection};
pub use model::{Group, Identity, Role, Student, Submission};
pub use store::{MemoryStore, RecordStore, RetryPolicy};
pub use writer::{GroupWriter, WriteReport};
