//! Job queue row and view models.
//!
//! Keep these structs focused on the data moved in and out of the `jobs`
//! table. Retry policy lives in the queue worker.

use crate::model::{JobKind, JobState};
use serde::Serialize;

/// Insert shape for a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub queue: String,
    pub kind: JobKind,
    pub payload: String,
    pub max_retry: i32,
    pub timeout_secs: i64,
}

/// A job claimed by a worker, already flipped to `active`.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    pub queue: String,
    pub kind: String,
    pub payload: String,
    pub max_retry: i32,
    pub retried: i32,
    pub timeout_secs: i64,
}

/// Operator-facing job status. Carries no error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: String,
    pub queue: String,
    pub kind: String,
    pub state: JobState,
    pub max_retry: i32,
    pub retried: i32,
}
