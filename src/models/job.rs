// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Generation job model and the coarse status shown to users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One unit of background generation work (`jobs` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    /// Job kind, e.g. "generate_reading"
    #[serde(rename = "type")]
    pub kind: String,
    pub status: JobStatus,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub idempotency_key: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate status of a user's whole job set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// No jobs exist yet
    Idle,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    /// Reduce a job set to one status.
    ///
    /// Precedence: processing > pending > failed > completed. An empty set is
    /// idle. The result depends only on the multiset of statuses.
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut any = false;
        let mut pending = false;
        let mut failed = false;

        for job in jobs {
            any = true;
            match job.status {
                JobStatus::Processing => return GenerationStatus::Processing,
                JobStatus::Pending => pending = true,
                JobStatus::Failed => failed = true,
                JobStatus::Completed => {}
            }
        }

        if !any {
            GenerationStatus::Idle
        } else if pending {
            GenerationStatus::Pending
        } else if failed {
            GenerationStatus::Failed
        } else {
            GenerationStatus::Completed
        }
    }

    /// Whether more content may still arrive without user action.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, GenerationStatus::Pending | GenerationStatus::Processing)
    }
}
