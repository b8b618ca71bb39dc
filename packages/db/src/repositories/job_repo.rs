//! Job repository: create, lookup and the pending -> printed transition.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use label_core::{DeliveryState, Job, JobId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Database, DbError};

/// Attempts made when an optimistic transaction conflict is reported.
const MAX_CONFLICT_RETRIES: usize = 8;

/// Repository for job persistence operations.
///
/// Clones share the per-job transition locks, so every acknowledgment in the
/// process goes through the same gate.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
    transitions: Arc<Mutex<HashMap<JobId, Arc<Mutex<()>>>>>,
}

/// Internal record type for SurrealDB. The numeric id lives in the record key.
#[derive(Debug, Deserialize)]
struct JobRecord {
    content: String,
    state: DeliveryState,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    printed_at: Option<DateTime<Utc>>,
}

/// Struct for creating jobs - omits `printed_at`, which stays NONE until acknowledged.
#[derive(Debug, Serialize)]
struct JobCreate {
    content: String,
    state: DeliveryState,
    created_at: i64,
}

impl JobRecord {
    fn into_job(self, id: JobId) -> Job {
        Job {
            id,
            content: self.content,
            created_at: self.created_at,
            state: self.state,
            printed_at: self.printed_at,
        }
    }
}

/// Outcome of [`JobRepository::mark_printed`]. Both variants are success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkPrinted {
    /// This call moved the job from pending to printed.
    Transitioned(Job),
    /// The job was already printed; nothing changed.
    AlreadyPrinted(Job),
}

impl MarkPrinted {
    pub fn job(&self) -> &Job {
        match self {
            MarkPrinted::Transitioned(job) | MarkPrinted::AlreadyPrinted(job) => job,
        }
    }

    pub fn transitioned(&self) -> bool {
        matches!(self, MarkPrinted::Transitioned(_))
    }
}

/// Record keys are signed in SurrealDB.
fn key(id: JobId) -> Result<i64, DbError> {
    i64::try_from(id.get()).map_err(|_| DbError::Query(format!("Job id out of range: {}", id)))
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            transitions: Arc::default(),
        }
    }

    async fn transition_lock(&self, id: JobId) -> Arc<Mutex<()>> {
        self.transitions.lock().await.entry(id).or_default().clone()
    }

    /// Forget the lock for `id` once no other caller holds or waits on it.
    async fn release_transition_lock(&self, id: JobId, lock: Arc<Mutex<()>>) {
        let mut locks = self.transitions.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&id);
        }
    }

    /// Allocate the next job id from the store's sequence.
    async fn next_id(&self) -> Result<JobId, DbError> {
        let mut attempt = 0;
        loop {
            let result = async {
                let mut response = self
                    .db
                    .query("UPSERT sequence:job SET value = (value OR 0) + 1 RETURN VALUE value")
                    .await?
                    .check()?;
                let values: Vec<i64> = response.take(0)?;
                Ok::<_, DbError>(values.first().copied())
            }
            .await;

            match result {
                Ok(Some(value)) if value > 0 => return Ok(JobId(value as u64)),
                Ok(_) => return Err(DbError::Query("Job sequence returned no value".into())),
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    tracing::debug!("Retrying job sequence after conflict ({})", attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persist rendered label content as a new pending job.
    pub async fn create(&self, content: impl Into<String>) -> Result<Job, DbError> {
        let id = self.next_id().await?;
        let content = content.into();
        // Stored at millisecond precision; keep the returned job identical to a re-read.
        let created_at = DateTime::from_timestamp_millis(Utc::now().timestamp_millis())
            .unwrap_or_else(Utc::now);

        let create_data = JobCreate {
            content: content.clone(),
            state: DeliveryState::Pending,
            created_at: created_at.timestamp_millis(),
        };

        self.db
            .query("CREATE type::thing('job', $id) CONTENT $record RETURN NONE")
            .bind(("id", key(id)?))
            .bind(("record", create_data))
            .await?
            .check()?;

        tracing::debug!(job_id = %id, "Created job");
        Ok(Job {
            id,
            content,
            created_at,
            state: DeliveryState::Pending,
            printed_at: None,
        })
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        let mut response = self
            .db
            .query("SELECT content, state, created_at, printed_at FROM type::thing('job', $id)")
            .bind(("id", key(id)?))
            .await?
            .check()?;

        let record: Option<JobRecord> = response.take(0)?;

        record
            .map(|r| r.into_job(id))
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// Move a job from pending to printed.
    ///
    /// Callers for the same id are serialized and the update is conditional on
    /// the stored state, so concurrent acknowledgments produce exactly one
    /// transition and every caller succeeds. Fails with [`DbError::NotFound`]
    /// for an unknown id.
    pub async fn mark_printed(&self, id: JobId) -> Result<MarkPrinted, DbError> {
        let lock = self.transition_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.mark_printed_locked(id).await
        };
        self.release_transition_lock(id, lock).await;
        result
    }

    async fn mark_printed_locked(&self, id: JobId) -> Result<MarkPrinted, DbError> {
        let mut attempt = 0;
        loop {
            match self.try_mark_printed(id).await {
                Ok(Some(outcome)) => return Ok(outcome),
                // Neither updated nor printed: the write did not land.
                Ok(None) if attempt < MAX_CONFLICT_RETRIES => attempt += 1,
                Ok(None) => {
                    return Err(DbError::Query(format!(
                        "Job {} did not settle to printed",
                        id
                    )));
                }
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    tracing::debug!(job_id = %id, "Retrying mark_printed after conflict ({})", attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_mark_printed(&self, id: JobId) -> Result<Option<MarkPrinted>, DbError> {
        let now = Utc::now();
        let mut response = self
            .db
            .query(
                r#"
                UPDATE type::thing('job', $id)
                SET state = "printed", printed_at = $now
                WHERE state = "pending"
                RETURN VALUE printed_at
                "#,
            )
            .bind(("id", key(id)?))
            .bind(("now", now.timestamp_millis()))
            .await?
            .check()?;

        let updated: Vec<i64> = response.take(0)?;
        let job = self.get(id).await?;

        if !updated.is_empty() {
            return Ok(Some(MarkPrinted::Transitioned(job)));
        }
        if job.is_printed() {
            return Ok(Some(MarkPrinted::AlreadyPrinted(job)));
        }
        Ok(None)
    }

    /// Count jobs by delivery state.
    pub async fn count_by_state(&self) -> Result<HashMap<DeliveryState, u64>, DbError> {
        let mut result = self
            .db
            .query("SELECT state, count() AS count FROM job GROUP BY state")
            .await?
            .check()?;

        #[derive(Deserialize)]
        struct StateCount {
            state: DeliveryState,
            count: i64,
        }

        let counts: Vec<StateCount> = result.take(0)?;

        Ok(counts
            .into_iter()
            .map(|c| (c.state, c.count.max(0) as u64))
            .collect())
    }
}
