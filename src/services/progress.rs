// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reading generation progress.
//!
//! A view showing a user's life map "mounts" the tracker, which keeps two
//! collections refreshing through the shared query cache:
//!
//! - produced `readings` rows, every `readings_poll_interval` (default 5s)
//! - `jobs` rows, every `jobs_poll_interval` (default 3s)
//!
//! Polling runs for as long as the [`ProgressHandle`] lives and is not stopped
//! when generation completes. A failed refresh keeps the previous rows and
//! raises an error flag until the next successful refresh.

use crate::config::Config;
use crate::db::SupabaseDb;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::reading::{has_all_sections, reading_for_section};
use crate::models::{GenerationStatus, Job, Reading, ReadingSection};
use crate::services::query_cache::{kinds, PollHandle, Queries, QueryCache, QueryKey, QueryState};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;

/// Progress of one section of the life map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionProgress {
    pub section: ReadingSection,
    pub name: &'static str,
    pub reading: Option<Reading>,
}

/// Everything a reading view needs, derived from the two cached collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingProgress {
    pub status: GenerationStatus,
    /// Every required section has a produced row, whatever the job states
    pub all_sections_complete: bool,
    pub sections: Vec<SectionProgress>,
    pub job_count: usize,
    /// True until both collections have loaded (or failed) once
    pub is_loading: bool,
    /// Error from the latest refresh; previous rows stay visible
    pub error: Option<String>,
}

impl ReadingProgress {
    pub fn from_states(readings: &QueryState<Vec<Reading>>, jobs: &QueryState<Vec<Job>>) -> Self {
        let empty_readings = Vec::new();
        let empty_jobs = Vec::new();
        let readings_rows = readings.data.as_deref().unwrap_or(&empty_readings);
        let job_rows = jobs.data.as_deref().unwrap_or(&empty_jobs);

        let sections = ReadingSection::ALL
            .iter()
            .map(|&section| SectionProgress {
                section,
                name: section.display_name(),
                reading: reading_for_section(readings_rows, section).cloned(),
            })
            .collect();

        Self {
            status: GenerationStatus::from_jobs(job_rows),
            all_sections_complete: has_all_sections(readings_rows, &ReadingSection::ALL),
            sections,
            job_count: job_rows.len(),
            is_loading: readings.is_loading() || jobs.is_loading(),
            error: readings.error.clone().or_else(|| jobs.error.clone()),
        }
    }
}

/// Mounts progress polling for users.
#[derive(Clone)]
pub struct ProgressTracker {
    db: SupabaseDb,
    readings: QueryCache<Vec<Reading>>,
    jobs: QueryCache<Vec<Job>>,
    readings_interval: Duration,
    jobs_interval: Duration,
    max_age: Duration,
}

async fn fetch_readings(db: SupabaseDb, user: AuthUser) -> Result<Vec<Reading>, AppError> {
    db.list_readings(&user.access_token, &user.user_id).await
}

async fn fetch_jobs(db: SupabaseDb, user: AuthUser) -> Result<Vec<Job>, AppError> {
    db.list_jobs(&user.access_token, &user.user_id).await
}

pub fn readings_key(user_id: &str) -> QueryKey {
    QueryKey::new(kinds::READINGS, user_id)
}

pub fn jobs_key(user_id: &str) -> QueryKey {
    QueryKey::new(kinds::JOBS, user_id)
}

impl ProgressTracker {
    pub fn new(db: SupabaseDb, queries: &Queries, config: &Config) -> Self {
        Self {
            db,
            readings: queries.readings.clone(),
            jobs: queries.jobs.clone(),
            readings_interval: config.readings_poll_interval,
            jobs_interval: config.jobs_poll_interval,
            max_age: config.cache_max_age,
        }
    }

    /// Start polling both collections for `user`.
    pub fn mount(&self, user: &AuthUser) -> ProgressHandle {
        tracing::debug!(user_id = %user.user_id, "Mounting progress polling");

        let readings_key = readings_key(&user.user_id);
        let jobs_key = jobs_key(&user.user_id);
        let readings_rx = self.readings.subscribe(&readings_key);
        let jobs_rx = self.jobs.subscribe(&jobs_key);

        let (db, polled) = (self.db.clone(), user.clone());
        let readings_poll = self
            .readings
            .poll(readings_key, self.readings_interval, move || {
                fetch_readings(db.clone(), polled.clone())
            });

        let (db, polled) = (self.db.clone(), user.clone());
        let jobs_poll = self.jobs.poll(jobs_key, self.jobs_interval, move || {
            fetch_jobs(db.clone(), polled.clone())
        });

        ProgressHandle {
            tracker: self.clone(),
            user: user.clone(),
            readings_rx,
            jobs_rx,
            _readings_poll: readings_poll,
            _jobs_poll: jobs_poll,
        }
    }

    /// One-shot progress, served from cache when fresh.
    pub async fn current(&self, user: &AuthUser) -> ReadingProgress {
        let (db, owner) = (self.db.clone(), user.clone());
        let (db2, owner2) = (self.db.clone(), user.clone());

        let rkey = readings_key(&user.user_id);
        let jkey = jobs_key(&user.user_id);
        let (readings, jobs) = tokio::join!(
            self.readings
                .get(&rkey, self.max_age, move || {
                    fetch_readings(db, owner)
                }),
            self.jobs
                .get(&jkey, self.max_age, move || {
                    fetch_jobs(db2, owner2)
                }),
        );
        ReadingProgress::from_states(&readings, &jobs)
    }

    /// Refetch both collections now (manual retry).
    pub async fn refresh(&self, user: &AuthUser) -> ReadingProgress {
        tracing::debug!(user_id = %user.user_id, "Manual progress refresh");
        let rkey = readings_key(&user.user_id);
        let jkey = jobs_key(&user.user_id);
        let (readings, jobs) = tokio::join!(
            self.readings.fetch(
                &rkey,
                fetch_readings(self.db.clone(), user.clone())
            ),
            self.jobs.fetch(
                &jkey,
                fetch_jobs(self.db.clone(), user.clone())
            ),
        );
        ReadingProgress::from_states(&readings, &jobs)
    }
}

/// A mounted progress view. Dropping it stops polling.
pub struct ProgressHandle {
    tracker: ProgressTracker,
    user: AuthUser,
    readings_rx: watch::Receiver<QueryState<Vec<Reading>>>,
    jobs_rx: watch::Receiver<QueryState<Vec<Job>>>,
    _readings_poll: PollHandle,
    _jobs_poll: PollHandle,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> ReadingProgress {
        let readings = self.readings_rx.borrow().clone();
        let jobs = self.jobs_rx.borrow().clone();
        ReadingProgress::from_states(&readings, &jobs)
    }

    /// Wait until either collection changes. Returns `false` once the
    /// underlying cache entries are gone (e.g. the user signed out).
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            result = self.readings_rx.changed() => result.is_ok(),
            result = self.jobs_rx.changed() => result.is_ok(),
        }
    }

    pub async fn retry(&self) -> ReadingProgress {
        self.tracker.refresh(&self.user).await
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }
}
