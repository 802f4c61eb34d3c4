//! Integration tests for the Scheduler
//!
//! These tests validate real-world functionality including:
//! - parallel_for fan-out and result correctness
//! - Diamond and grouped dependency graphs
//! - Counter-based bulk completion
//! - Pause semantics
//! - Arena reuse across reset cycles
//! - Parallel speed-up with independent jobs
//! - Orderly drain on stop

use jobgraph::{Counter, Scheduler, SchedulerConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn scheduler(workers: usize) -> Scheduler {
    jobgraph::util::init_tracing();
    Scheduler::new(
        SchedulerConfig::new()
            .with_worker_count(workers)
            .with_scratch_capacity(1024 * 1024),
    )
    .unwrap()
}

/// Payload for jobs that append a label to a shared execution log.
struct LogProbe {
    name: &'static str,
    log: *const Mutex<Vec<&'static str>>,
}

fn record(data: *mut ()) {
    let probe = unsafe { &*data.cast::<LogProbe>() };
    let log = unsafe { &*probe.log };
    log.lock().unwrap().push(probe.name);
}

fn position(log: &[&str], name: &str) -> usize {
    log.iter()
        .position(|entry| *entry == name)
        .unwrap_or_else(|| panic!("{name} missing from log {log:?}"))
}

// ============================================================================
// FAN-OUT
// ============================================================================

#[test]
fn test_parallel_for_squares() {
    let sch = scheduler(4);

    let mut out = [0u64; 100];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = i as u64;
    }

    let calls = AtomicU32::new(0);
    sch.parallel_for(&mut out, |value| {
        *value *= *value;
        calls.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    for (i, value) in out.iter().enumerate() {
        assert_eq!(*value, (i * i) as u64, "wrong result at index {i}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 100);
}

#[test]
fn test_parallel_for_empty_slice() {
    let sch = scheduler(2);
    let mut out: [u32; 0] = [];
    sch.parallel_for(&mut out, |_| panic!("must not be called"))
        .unwrap();
}

#[test]
fn test_parallel_for_single_worker() {
    let sch = scheduler(1);
    let mut out = [1u32; 32];
    sch.parallel_for(&mut out, |value| *value += 1).unwrap();
    assert!(out.iter().all(|v| *v == 2));
}

// ============================================================================
// DEPENDENCY GRAPHS
// ============================================================================

#[test]
fn test_diamond_dag_ordering() {
    let sch = scheduler(4);
    let log = Mutex::new(Vec::new());

    let leaf_probe = LogProbe {
        name: "leaf",
        log: &log,
    };
    let a_probe = LogProbe {
        name: "a",
        log: &log,
    };
    let b_probe = LogProbe {
        name: "b",
        log: &log,
    };
    let root_probe = LogProbe {
        name: "root",
        log: &log,
    };

    // root waits on a and b; both wait on leaf.
    let root = sch
        .create_job(record, &root_probe as *const _ as *mut (), None)
        .unwrap();
    let a = sch
        .create_job(record, &a_probe as *const _ as *mut (), None)
        .unwrap();
    let b = sch
        .create_job(record, &b_probe as *const _ as *mut (), None)
        .unwrap();
    let leaf = sch
        .create_job(record, &leaf_probe as *const _ as *mut (), None)
        .unwrap();

    sch.depend(root, a).unwrap();
    sch.depend(root, b).unwrap();
    sch.depend(a, leaf).unwrap();
    sch.depend(b, leaf).unwrap();

    sch.kick();
    sch.wait(root);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 4);
    let leaf_at = position(&log, "leaf");
    let a_at = position(&log, "a");
    let b_at = position(&log, "b");
    let root_at = position(&log, "root");
    assert!(leaf_at < a_at, "leaf must run before a: {log:?}");
    assert!(leaf_at < b_at, "leaf must run before b: {log:?}");
    assert!(a_at < root_at, "a must run before root: {log:?}");
    assert!(b_at < root_at, "b must run before root: {log:?}");
}

#[test]
fn test_group_aggregation() {
    const CHILDREN: u32 = 30;

    let sch = scheduler(4);
    let counter = Counter::new();
    let log = Mutex::new(Vec::new());

    let parent_probe = LogProbe {
        name: "parent",
        log: &log,
    };
    let group0_probe = LogProbe {
        name: "group0_job",
        log: &log,
    };
    let group1_probe = LogProbe {
        name: "group1_job",
        log: &log,
    };
    let child_probe = LogProbe {
        name: "child",
        log: &log,
    };

    let parent = sch
        .create_job(record, &parent_probe as *const _ as *mut (), Some(&counter))
        .unwrap();

    let group0 = sch.create_group(Some(parent)).unwrap();
    let group0_job = sch
        .create_job(record, &group0_probe as *const _ as *mut (), Some(&counter))
        .unwrap();
    sch.depend(group0, group0_job).unwrap();

    let group1 = sch.create_group(Some(parent)).unwrap();
    let group1_job = sch
        .create_job(record, &group1_probe as *const _ as *mut (), Some(&counter))
        .unwrap();
    sch.depend(group1, group1_job).unwrap();

    for i in 0..CHILDREN {
        let child = sch
            .create_job(record, &child_probe as *const _ as *mut (), Some(&counter))
            .unwrap();
        if i < CHILDREN / 2 {
            sch.depend(group0_job, child).unwrap();
        } else {
            sch.depend(group1_job, child).unwrap();
        }
    }

    sch.kick();
    sch.wait(parent);
    sch.wait_counter(&counter);
    assert!(counter.is_zero());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), CHILDREN as usize + 3);

    let parent_at = position(&log, "parent");
    let group0_at = position(&log, "group0_job");
    let group1_at = position(&log, "group1_job");
    assert_eq!(parent_at, log.len() - 1, "parent must run last: {log:?}");
    // Each group job runs only after all thirty children; the last child
    // therefore precedes both group jobs' earliest possible position.
    let last_child = log
        .iter()
        .enumerate()
        .filter(|(_, name)| **name == "child")
        .map(|(at, _)| at)
        .max()
        .unwrap();
    assert!(group0_at > CHILDREN as usize / 2 - 1);
    assert!(group1_at > CHILDREN as usize / 2 - 1);
    assert!(last_child < parent_at);
}

#[test]
fn test_chain_runs_in_order() {
    const DEPTH: usize = 16;

    let sch = scheduler(4);
    let log = Mutex::new(Vec::new());
    static NAMES: [&str; DEPTH] = [
        "j0", "j1", "j2", "j3", "j4", "j5", "j6", "j7", "j8", "j9", "j10", "j11", "j12", "j13",
        "j14", "j15",
    ];

    let probes: Vec<LogProbe> = NAMES
        .iter()
        .map(|&name| LogProbe { name, log: &log })
        .collect();

    let mut prev = None;
    let mut sink = None;
    for probe in &probes {
        let job = sch
            .create_job(record, probe as *const _ as *mut (), None)
            .unwrap();
        if let Some(prev) = prev {
            sch.depend(job, prev).unwrap();
        }
        prev = Some(job);
        sink = Some(job);
    }

    sch.kick();
    sch.wait(sink.unwrap());

    let log = log.lock().unwrap();
    let expected: Vec<&str> = NAMES.to_vec();
    assert_eq!(*log, expected);
}

// ============================================================================
// COUNTERS
// ============================================================================

#[test]
fn test_counter_gates_bulk_completion() {
    const JOBS: u32 = 1000;

    fn add_one(data: *mut ()) {
        let total = unsafe { &*data.cast::<AtomicU32>() };
        total.fetch_add(1, Ordering::Relaxed);
    }

    let sch = scheduler(4);
    let counter = Counter::new();
    let total = AtomicU32::new(0);

    for _ in 0..JOBS {
        sch.create_job(add_one, &total as *const _ as *mut (), Some(&counter))
            .unwrap();
    }
    assert_eq!(counter.value(), JOBS);

    sch.kick();
    sch.wait_counter(&counter);

    assert!(counter.is_zero());
    assert_eq!(total.load(Ordering::Relaxed), JOBS);
}

#[test]
fn test_counter_on_sink_only() {
    fn noop(_data: *mut ()) {}

    let sch = scheduler(2);
    let counter = Counter::new();

    // Binding the counter to the sink alone is enough: it depends on all
    // the other jobs, so counter-zero implies the whole graph finished.
    let sink = sch
        .create_job(noop, std::ptr::null_mut(), Some(&counter))
        .unwrap();
    let mut leaves = Vec::new();
    for _ in 0..8 {
        let leaf = sch.create_job(noop, std::ptr::null_mut(), None).unwrap();
        sch.depend(sink, leaf).unwrap();
        leaves.push(leaf);
    }

    sch.kick();
    sch.wait_counter(&counter);
    assert!(sink.is_finished());
    assert!(leaves.iter().all(|leaf| leaf.is_finished()));
}

// ============================================================================
// PAUSE SEMANTICS
// ============================================================================

#[test]
fn test_pause_blocks_new_job_starts() {
    const JOBS: usize = 8;

    struct StartLog {
        starts: Mutex<Vec<Instant>>,
    }

    fn slow(data: *mut ()) {
        let log = unsafe { &*data.cast::<StartLog>() };
        log.starts.lock().unwrap().push(Instant::now());
        std::thread::sleep(Duration::from_millis(40));
    }

    let sch = scheduler(2);
    let log = StartLog {
        starts: Mutex::new(Vec::new()),
    };

    let counter = Counter::new();
    for _ in 0..JOBS {
        sch.create_job(slow, &log as *const _ as *mut (), Some(&counter))
            .unwrap();
    }
    sch.kick();

    std::thread::sleep(Duration::from_millis(10));
    sch.set_paused(true);

    // Give in-flight jobs time to drain, then observe a quiet window.
    std::thread::sleep(Duration::from_millis(200));
    let started_at_pause = log.starts.lock().unwrap().len();
    std::thread::sleep(Duration::from_millis(100));
    let started_later = log.starts.lock().unwrap().len();
    assert_eq!(
        started_at_pause, started_later,
        "no job may start while paused"
    );
    assert!(started_later < JOBS, "pause must leave jobs unstarted");

    sch.set_paused(false);
    sch.wait_counter(&counter);
    assert_eq!(log.starts.lock().unwrap().len(), JOBS);
}

// ============================================================================
// RESET AND ARENA REUSE
// ============================================================================

#[test]
fn test_reset_reuses_arena() {
    let mut sch = scheduler(4);
    let mut used_per_cycle = Vec::new();

    for cycle in 0..100 {
        sch.reset();
        assert_eq!(sch.scratch().used(), 0, "arena dirty at cycle {cycle}");

        let mut out = [0u32; 100];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = i as u32;
        }
        sch.parallel_for(&mut out, |value| *value *= *value).unwrap();
        for (i, value) in out.iter().enumerate() {
            assert_eq!(*value, (i * i) as u32);
        }

        used_per_cycle.push(sch.scratch().used());
    }

    // Identical graphs consume identical scratch: no growth across cycles.
    assert!(used_per_cycle.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_arena_payloads_feed_jobs() {
    fn square_in_place(data: *mut ()) {
        let value = unsafe { &mut *data.cast::<u32>() };
        *value *= *value;
    }

    let sch = scheduler(2);
    let counter = Counter::new();

    // Payloads live in the scratch arena alongside the job records.
    let values = sch.alloc_slice::<u32>(16, 16).unwrap();
    for (i, value) in values.iter_mut().enumerate() {
        *value = i as u32;
        sch.create_job(
            square_in_place,
            std::ptr::from_mut(value).cast::<()>(),
            Some(&counter),
        )
        .unwrap();
    }

    sch.kick();
    sch.wait_counter(&counter);

    for (i, value) in values.iter().enumerate() {
        assert_eq!(*value, (i * i) as u32);
    }
}

#[test]
fn test_exactly_once_per_cycle() {
    const JOBS: usize = 100;

    fn tick(data: *mut ()) {
        let slot = unsafe { &*data.cast::<AtomicU32>() };
        slot.fetch_add(1, Ordering::SeqCst);
    }

    let mut sch = scheduler(4);
    for _ in 0..5 {
        sch.reset();
        let counter = Counter::new();
        let slots: Vec<AtomicU32> = (0..JOBS).map(|_| AtomicU32::new(0)).collect();
        for slot in &slots {
            sch.create_job(tick, slot as *const _ as *mut (), Some(&counter))
                .unwrap();
        }
        sch.kick();
        sch.wait_counter(&counter);
        assert!(slots.iter().all(|slot| slot.load(Ordering::SeqCst) == 1));
    }
}

// ============================================================================
// PARALLELISM
// ============================================================================

#[test]
fn test_independent_jobs_run_in_parallel() {
    const JOBS: usize = 8;
    const JOB_MS: u64 = 50;

    fn sleepy(_data: *mut ()) {
        std::thread::sleep(Duration::from_millis(JOB_MS));
    }

    let sch = scheduler(4);
    let counter = Counter::new();
    for _ in 0..JOBS {
        sch.create_job(sleepy, std::ptr::null_mut(), Some(&counter))
            .unwrap();
    }

    let start = Instant::now();
    sch.kick();
    sch.wait_counter(&counter);
    let elapsed = start.elapsed();

    // Serial execution would take JOBS * JOB_MS = 400ms; four workers should
    // land near 100ms. Assert well under serial with generous headroom.
    assert!(
        elapsed < Duration::from_millis(JOBS as u64 * JOB_MS * 3 / 4),
        "no parallel speed-up observed: {elapsed:?}"
    );
}

// ============================================================================
// STOP AND DRAIN
// ============================================================================

#[test]
fn test_stop_drains_in_flight_jobs() {
    const JOBS: u32 = 20;

    struct DrainProbe {
        started: AtomicU32,
        finished: AtomicU32,
    }

    fn tracked(data: *mut ()) {
        let probe = unsafe { &*data.cast::<DrainProbe>() };
        probe.started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        probe.finished.fetch_add(1, Ordering::SeqCst);
    }

    let probe = DrainProbe {
        started: AtomicU32::new(0),
        finished: AtomicU32::new(0),
    };

    let sch = scheduler(2);
    for _ in 0..JOBS {
        sch.create_job(tracked, &probe as *const _ as *mut (), None)
            .unwrap();
    }
    sch.kick();

    std::thread::sleep(Duration::from_millis(30));
    sch.set_running(false);

    // Dropping joins every worker; after this no thread is running jobs.
    drop(sch);

    let started = probe.started.load(Ordering::SeqCst);
    let finished = probe.finished.load(Ordering::SeqCst);
    assert_eq!(started, finished, "every started job must run to completion");
    assert!(started <= JOBS);
}

#[test]
fn test_wait_returns_after_stop_discards_job() {
    fn sleepy(_data: *mut ()) {
        std::thread::sleep(Duration::from_millis(20));
    }

    let sch = scheduler(1);
    // Enough jobs that the tail is still queued when we stop.
    let mut jobs = Vec::new();
    for _ in 0..10 {
        jobs.push(sch.create_job(sleepy, std::ptr::null_mut(), None).unwrap());
    }
    sch.kick();
    std::thread::sleep(Duration::from_millis(25));
    sch.set_running(false);

    // The last job was almost certainly discarded; wait must not hang.
    sch.wait(*jobs.last().unwrap());
}
