//! # Coordinator Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | join + finish cycle, in-memory store | < 50µs |
//! | state record encode/decode | < 10µs |
//! | supervisor scan, 100 active sessions | < 5ms |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_bus::InMemoryEventBus;
use shared_types::{ConnectionId, GridDimensions, Participant, SessionId};
use tokio::runtime::Runtime;
use turn_coordinator::domain::codec;
use turn_coordinator::{
    CoordinatorConfig, InMemoryStateStore, ManualClock, SessionTurnState, SupervisorConfig,
    TimeoutSupervisor, TurnCoordinatorApi, TurnCoordinatorBusAdapter, TurnCoordinatorService,
};

type Service = TurnCoordinatorService<Arc<InMemoryStateStore>, Arc<ManualClock>>;

fn service(clock: Arc<ManualClock>) -> Arc<Service> {
    Arc::new(TurnCoordinatorService::new(
        Arc::new(InMemoryStateStore::new()),
        clock,
        CoordinatorConfig::default(),
    ))
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn bench_turn_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("turn-coordinator");
    let rt = runtime();
    let coordinator = service(Arc::new(ManualClock::new(0)));
    let session = SessionId::from("bench");

    for players in [2usize, 8, 32] {
        rt.block_on(async {
            for i in 0..players {
                let participant = Participant::new(ConnectionId::new(format!("p{i}")), "P", "");
                coordinator.join_queue(&session, participant).await.unwrap();
            }
        });

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("finish_turn", players), &players, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let state = coordinator.peek(&session).await.unwrap().unwrap();
                    let holder = state.current_turn().unwrap().clone();
                    black_box(coordinator.finish_turn(&session, &holder).await.unwrap())
                })
            })
        });
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("state-codec");
    let mut state = SessionTurnState::new(GridDimensions::new(16, 64));
    for i in 0..32 {
        state.join(Participant::new(ConnectionId::new(format!("p{i}")), "Player", "🎛"), 0);
    }
    let bytes = codec::encode(&state).unwrap();

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode", |b| b.iter(|| black_box(codec::encode(&state).unwrap())));
    group.bench_function("decode", |b| b.iter(|| black_box(codec::decode(&bytes).unwrap())));
    group.finish();
}

fn bench_supervisor_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("timeout-supervisor");
    group.measurement_time(Duration::from_secs(5));
    let rt = runtime();
    let clock = Arc::new(ManualClock::new(0));
    let coordinator = service(Arc::clone(&clock));

    rt.block_on(async {
        for s in 0..100 {
            let session = SessionId::new(format!("s{s}"));
            for p in 0..3 {
                let id = ConnectionId::new(format!("s{s}-p{p}"));
                let participant = Participant::new(id, "P", "");
                coordinator.join_queue(&session, participant).await.unwrap();
            }
        }
    });
    let adapter = Arc::new(TurnCoordinatorBusAdapter::new(
        coordinator,
        Arc::new(InMemoryEventBus::new()),
    ));
    let supervisor = TimeoutSupervisor::new(adapter, SupervisorConfig::default());

    group.bench_function("scan_100_sessions_all_expired", |b| {
        b.iter(|| {
            clock.advance(Duration::from_secs(31));
            rt.block_on(async { black_box(supervisor.scan_once().await.unwrap()) })
        })
    });
    group.bench_function("scan_100_sessions_none_expired", |b| {
        b.iter(|| rt.block_on(async { black_box(supervisor.scan_once().await.unwrap()) }))
    });
    group.finish();
}

criterion_group!(benches, bench_turn_cycle, bench_codec, bench_supervisor_scan);
criterion_main!(benches);
