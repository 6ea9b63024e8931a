//! Test doubles shared by the unit and integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use conveyor_core::{Attempt, Credential, Job, JobId, JobState};

use crate::accounts::InMemoryAccountResolver;
use crate::backend::{BackendError, Dispatch, ExecutionBackend, TransferOutcome};
use crate::config::ConveyorConfig;
use crate::dispatcher::QueueDispatcher;
use crate::error::ConveyorError;
use crate::hooks::PreparationHook;
use crate::listener::FailureListener;
use crate::store::{AttemptStore, InMemoryJobStore, JobStore, StoreError};

pub fn rods() -> Credential {
    Credential::new("grid.example.org", 1247, "tempZone", "rods")
}

/// Keeps every dispatch until the test completes it.
#[derive(Default)]
pub struct ParkingBackend {
    parked: Mutex<Vec<Dispatch>>,
    refusals: AtomicU32,
}

impl ParkingBackend {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse the next `n` hand-offs.
    pub fn refuse_next(&self, n: u32) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    pub fn parked_count(&self) -> usize {
        self.parked.lock().unwrap().len()
    }

    pub fn parked_job_ids(&self) -> Vec<JobId> {
        self.parked.lock().unwrap().iter().map(|d| d.job.id).collect()
    }

    /// Complete the oldest parked dispatch.
    pub fn complete_next(&self, outcome: TransferOutcome) -> Job {
        self.try_complete_next(outcome).unwrap()
    }

    pub fn try_complete_next(&self, outcome: TransferOutcome) -> Result<Job, ConveyorError> {
        let dispatch = self.parked.lock().unwrap().remove(0);
        dispatch.completion.complete(outcome)
    }
}

impl ExecutionBackend for ParkingBackend {
    fn process(&self, dispatch: Dispatch) -> Result<(), BackendError> {
        if take(&self.refusals) {
            return Err(BackendError::Refused("worker unavailable".into()));
        }
        self.parked.lock().unwrap().push(dispatch);
        Ok(())
    }
}

/// Counts and records every notification.
#[derive(Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl FailureListener for RecordingListener {
    fn notify(&self, error: &ConveyorError) {
        self.seen.lock().unwrap().push(error.to_string());
    }
}

/// In-memory store that fails selected calls a set number of times.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryJobStore,
    find_by_id_failures: AtomicU32,
    find_by_state_failures: AtomicU32,
    job_save_failures: AtomicU32,
    attempt_lookup_failures: AtomicU32,
    attempt_save_failures: AtomicU32,
    purge_failures: AtomicU32,
    poisoned: Mutex<HashSet<JobId>>,
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected(call: &str) -> StoreError {
    StoreError::storage(format!("injected {call} failure"))
}

impl FlakyStore {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_find_by_id(&self, n: u32) {
        self.find_by_id_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_find_by_state(&self, n: u32) {
        self.find_by_state_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_job_saves(&self, n: u32) {
        self.job_save_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_attempt_lookups(&self, n: u32) {
        self.attempt_lookup_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_attempt_saves(&self, n: u32) {
        self.attempt_save_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_purges(&self, n: u32) {
        self.purge_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every later save of this job.
    pub fn poison(&self, id: JobId) {
        self.poisoned.lock().unwrap().insert(id);
    }
}

impl JobStore for FlakyStore {
    fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        if take(&self.find_by_id_failures) {
            return Err(injected("find_by_id"));
        }
        self.inner.find_by_id(id)
    }

    fn find_all(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.find_all()
    }

    fn find_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError> {
        if take(&self.find_by_state_failures) {
            return Err(injected("find_by_state"));
        }
        self.inner.find_by_state(state)
    }

    fn save(&self, job: &Job) -> Result<(), StoreError> {
        if take(&self.job_save_failures) {
            return Err(injected("job save"));
        }
        if self.poisoned.lock().unwrap().contains(&job.id) {
            return Err(injected("poisoned job save"));
        }
        JobStore::save(&self.inner, job)
    }

    fn purge_all(&self) -> Result<(), StoreError> {
        if take(&self.purge_failures) {
            return Err(injected("purge"));
        }
        JobStore::purge_all(&self.inner)
    }

    fn load_children(&self, job: &Job) -> Result<Job, StoreError> {
        self.inner.load_children(job)
    }
}

impl AttemptStore for FlakyStore {
    fn find_latest_for_job(&self, job_id: JobId) -> Result<Option<Attempt>, StoreError> {
        if take(&self.attempt_lookup_failures) {
            return Err(injected("attempt lookup"));
        }
        self.inner.find_latest_for_job(job_id)
    }

    fn save(&self, attempt: &Attempt) -> Result<(), StoreError> {
        if take(&self.attempt_save_failures) {
            return Err(injected("attempt save"));
        }
        AttemptStore::save(&self.inner, attempt)
    }

    fn purge_all(&self) -> Result<(), StoreError> {
        AttemptStore::purge_all(&self.inner)
    }
}

/// Fully wired dispatcher over a flaky store and a parking backend.
pub struct Harness {
    pub dispatcher: Arc<QueueDispatcher>,
    pub store: Arc<FlakyStore>,
    pub backend: Arc<ParkingBackend>,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(
            ConveyorConfig::default()
                .with_max_dispatch_retries(3)
                .with_retry_backoff_ms(1),
        )
    }

    pub fn with_config(config: ConveyorConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_preparation_hook(hook: Arc<dyn PreparationHook>) -> Self {
        Self::build(
            ConveyorConfig::default()
                .with_max_dispatch_retries(3)
                .with_retry_backoff_ms(1),
            Some(hook),
        )
    }

    fn build(config: ConveyorConfig, hook: Option<Arc<dyn PreparationHook>>) -> Self {
        let store = FlakyStore::arc();
        let backend = ParkingBackend::arc();
        let listener = RecordingListener::arc();
        let accounts = InMemoryAccountResolver::arc();
        accounts.register(rods()).unwrap();

        let mut dispatcher =
            QueueDispatcher::new(store.clone(), store.clone(), accounts, backend.clone())
                .with_failure_listener(listener.clone())
                .with_config(config);
        if let Some(hook) = hook {
            dispatcher = dispatcher.with_preparation_hook(hook);
        }

        Self {
            dispatcher: Arc::new(dispatcher),
            store,
            backend,
            listener,
        }
    }

    pub fn state_of(&self, id: JobId) -> JobState {
        self.store.inner.find_by_id(id).unwrap().unwrap().state
    }
}

/// Preparation hook that always fails and counts its calls.
#[derive(Default)]
pub struct FailingHook {
    calls: AtomicU32,
}

impl FailingHook {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PreparationHook for FailingHook {
    fn prepare_for_processing(&self, _job: &Job) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(injected("preparation hook"))
    }
}
