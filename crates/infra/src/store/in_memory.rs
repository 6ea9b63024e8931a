use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use conveyor_core::{Attempt, Job, JobId, JobState};

use super::r#trait::{AttemptStore, JobStore, StoreError};

#[derive(Debug, Clone)]
struct StoredJob {
    job: Job,
    /// Position in the ENQUEUED queue. Bumped every time the job re-enters it.
    enqueue_seq: u64,
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, StoredJob>,
    attempts: HashMap<JobId, Vec<Attempt>>,
    next_seq: u64,
}

/// In-memory job and attempt store.
///
/// Intended for tests/dev. Jobs are stored without their children; attempts
/// live in a separate table keyed by job and are attached by `load_children`.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: RwLock<State>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of attempts stored for `job_id`.
    pub fn attempt_count(&self, job_id: JobId) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.attempts.get(&job_id).map(Vec::len).unwrap_or(0))
    }
}

fn detached(job: &Job) -> Job {
    let mut job = job.clone();
    job.attempts.clear();
    job
}

impl JobStore for InMemoryJobStore {
    fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.jobs.get(&id).map(|s| s.job.clone()))
    }

    fn find_all(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let mut jobs: Vec<Job> = state.jobs.values().map(|s| s.job.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn find_by_state(&self, wanted: JobState) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let mut matching: Vec<&StoredJob> =
            state.jobs.values().filter(|s| s.job.state == wanted).collect();
        matching.sort_by_key(|s| (s.enqueue_seq, s.job.id));
        Ok(matching.into_iter().map(|s| s.job.clone()).collect())
    }

    fn save(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let previous = state.jobs.get(&job.id).map(|s| (s.job.state, s.enqueue_seq));

        let enqueue_seq = match previous {
            Some((JobState::Enqueued, seq)) => seq,
            Some((_, seq)) if job.state != JobState::Enqueued => seq,
            _ => {
                state.next_seq += 1;
                state.next_seq
            }
        };

        state.jobs.insert(
            job.id,
            StoredJob {
                job: detached(job),
                enqueue_seq,
            },
        );
        Ok(())
    }

    fn purge_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.jobs.clear();
        state.attempts.clear();
        Ok(())
    }

    fn load_children(&self, job: &Job) -> Result<Job, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let mut loaded = detached(job);
        if let Some(attempts) = state.attempts.get(&job.id) {
            loaded.attempts = attempts.clone();
        }
        Ok(loaded)
    }
}

impl AttemptStore for InMemoryJobStore {
    fn find_latest_for_job(&self, job_id: JobId) -> Result<Option<Attempt>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .attempts
            .get(&job_id)
            .and_then(|attempts| attempts.iter().max_by_key(|a| a.sequence))
            .cloned())
    }

    fn save(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        if !state.jobs.contains_key(&attempt.job_id) {
            return Err(StoreError::NotFound(attempt.job_id));
        }

        let attempts = state.attempts.entry(attempt.job_id).or_default();
        match attempts.iter_mut().find(|a| a.id == attempt.id) {
            Some(existing) => *existing = attempt.clone(),
            None => {
                attempts.push(attempt.clone());
                attempts.sort_by_key(|a| a.sequence);
            }
        }
        Ok(())
    }

    fn purge_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.attempts.clear();
        Ok(())
    }
}
