use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use conveyor_core::{Credential, Job, JobState, TransferKind};
use conveyor_infra::{
    AcceptAll, ExecutionGate, InMemoryAccountResolver, InMemoryJobStore, InlineBackend, JobStore,
    QueueDispatcher,
};
use std::sync::Arc;

fn rods() -> Credential {
    Credential::new("grid.example.org", 1247, "tempZone", "rods")
}

fn dispatcher(store: Arc<InMemoryJobStore>) -> QueueDispatcher {
    let accounts = InMemoryAccountResolver::arc();
    accounts.register(rods()).unwrap();
    QueueDispatcher::new(
        store.clone(),
        store,
        accounts,
        Arc::new(InlineBackend::succeeding()),
    )
}

/// enqueue → dispatch → complete, all on the calling thread.
fn bench_enqueue_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_cycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("standard_policy", |b| {
        let dispatcher = dispatcher(InMemoryJobStore::arc());
        let credential = rods();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let job = Job::new(
                TransferKind::Put,
                format!("/data/in/{n}.dat"),
                format!("/tempZone/home/rods/{n}.dat"),
            );
            black_box(dispatcher.enqueue(job, &credential).unwrap());
        });
    });

    group.bench_function("accept_all", |b| {
        let dispatcher = dispatcher(InMemoryJobStore::arc()).with_rejection_policy(Arc::new(AcceptAll));
        let credential = rods();
        b.iter(|| {
            let job = Job::new(TransferKind::Put, "/data/in/x.dat", "/tempZone/home/rods/x.dat");
            black_box(dispatcher.enqueue(job, &credential).unwrap());
        });
    });

    group.finish();
}

fn bench_gate(c: &mut Criterion) {
    let gate = ExecutionGate::arc();
    c.bench_function("gate_try_permit", |b| {
        b.iter(|| {
            let permit = gate.try_permit();
            black_box(permit.is_some());
        });
    });
}

/// FIFO head selection against a growing backlog.
fn bench_fifo_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_selection");

    for backlog in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("find_enqueued", backlog), backlog, |b, &size| {
            let store = InMemoryJobStore::new();
            for i in 0..size {
                let mut job = Job::new(TransferKind::Get, format!("/tempZone/{i}"), format!("/tmp/{i}"));
                job.enqueue(Utc::now()).unwrap();
                JobStore::save(&store, &job).unwrap();
            }

            b.iter(|| black_box(store.find_by_state(JobState::Enqueued).unwrap().first().map(|j| j.id)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_enqueue_cycle, bench_gate, bench_fifo_selection);
criterion_main!(benches);
