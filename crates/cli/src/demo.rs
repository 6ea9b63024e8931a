//! `conveyor demo`: simulated transfers through the in-memory stack.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::info;

use conveyor_core::{Credential, JobState, TransferKind};
use conveyor_infra::{
    ConveyorConfig, DispatchTimer, InMemoryAccountResolver, InMemoryJobStore, QueueDispatcher,
    ThreadedBackend,
};

#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    pub jobs: u32,
    pub fail_every: u32,
    pub transfer_ms: u64,
    pub poll_ms: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DemoSummary {
    pub complete: usize,
    pub failed: usize,
}

pub fn run(config: ConveyorConfig, options: DemoOptions) -> Result<DemoSummary> {
    let store = InMemoryJobStore::arc();
    let accounts = InMemoryAccountResolver::arc();
    let credential = Credential::new("localhost", 1247, "tempZone", "rods");
    accounts.register(credential.clone())?;

    let transfers = Arc::new(AtomicU32::new(0));
    let counter = transfers.clone();
    let backend = Arc::new(
        ThreadedBackend::new(move |job, attempt| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(Duration::from_millis(options.transfer_ms));
            if options.fail_every > 0 && n % options.fail_every == 0 {
                return Err(format!(
                    "simulated failure of {} on attempt {}",
                    job.source_path, attempt.sequence
                ));
            }
            Ok(())
        })
        .with_name("demo-transfer"),
    );

    let dispatcher = Arc::new(
        QueueDispatcher::new(store.clone(), store.clone(), accounts, backend.clone())
            .with_config(config),
    );
    dispatcher.startup()?;

    let timer = DispatchTimer::spawn(dispatcher.clone(), Duration::from_millis(options.poll_ms))?;

    for i in 0..options.jobs {
        dispatcher.enqueue_by_locations(
            format!("/data/demo/file-{i}.dat"),
            format!("/tempZone/home/rods/demo/file-{i}.dat"),
            &credential,
            TransferKind::Put,
        )?;
    }

    let per_job = Duration::from_millis(options.transfer_ms + options.poll_ms);
    let deadline = Instant::now() + per_job * (options.jobs + 1) + Duration::from_secs(5);
    loop {
        let jobs = dispatcher.list_all()?;
        if jobs.iter().all(|j| j.state.is_terminal()) {
            break;
        }
        if Instant::now() > deadline {
            timer.shutdown();
            bail!("demo did not drain before the deadline");
        }
        thread::sleep(Duration::from_millis(options.poll_ms.clamp(1, 50)));
    }

    timer.shutdown();
    backend.wait_idle();

    let mut summary = DemoSummary::default();
    for job in dispatcher.list_all()? {
        let loaded = dispatcher.load_children(&job)?;
        println!(
            "{}  {:<10}  {} -> {}  attempts={}",
            job.id,
            job.state.to_string(),
            job.source_path,
            job.target_path,
            loaded.attempts.len()
        );
        match job.state {
            JobState::Complete => summary.complete += 1,
            JobState::Error => summary.failed += 1,
            _ => {}
        }
    }

    info!(
        complete = summary.complete,
        failed = summary.failed,
        transfers = transfers.load(Ordering::SeqCst),
        "demo finished"
    );
    Ok(summary)
}
