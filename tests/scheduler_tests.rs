mod common;

use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;

use framelift::core::Clock;
use framelift::registry::Source;
use framelift::scheduler::SourceMode;

use common::{Harness, IDLE_TIMEOUT, source};

#[test]
fn dispatches_once_per_interval() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 5)]);

    assert_eq!(h.step(), vec![1]);
    for _ in 0..4 {
        h.advance(1);
        assert!(h.step().is_empty());
    }
    h.advance(1);
    assert_eq!(h.step(), vec![1]);

    assert_eq!(h.fetcher.call_count("10.0.0.1"), 2);
}

#[test]
fn disabled_source_is_never_dispatched() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![Source::new(1, "10.0.0.1", 1)]);

    for _ in 0..3 {
        assert!(h.step().is_empty());
        h.advance(5);
    }
    assert_eq!(h.scheduler.mode(1), Some(SourceMode::Paused));
    assert!(h.fetcher.calls().is_empty());

    h.scheduler.enable(1);
    assert_eq!(h.step(), vec![1]);
}

#[test]
fn toggling_mid_interval() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 5)]);

    assert_eq!(h.step(), vec![1]);

    h.advance(3);
    h.scheduler.disable(1);
    h.advance(2);
    assert!(h.step().is_empty(), "paused source dispatched");

    h.advance(2);
    h.scheduler.enable(1);
    assert_eq!(h.step(), vec![1], "resumed source should be overdue");
}

#[test]
fn source_without_address_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "", 1), source(2, "10.0.0.2", 1)]);

    assert_eq!(h.step(), vec![2]);
    assert_eq!(h.fetcher.calls(), vec!["10.0.0.2".to_string()]);
}

#[test]
fn failing_source_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(
        dir.path(),
        vec![source(1, "10.0.0.1", 5), source(2, "10.0.0.2", 5)],
    );
    h.fetcher.fail_address("10.0.0.1");

    assert_eq!(h.step(), vec![1, 2]);

    assert!(dir.path().join("2024/05/01/2_000000.jpeg").exists());
    assert!(!dir.path().join("2024/05/01/1_000000.jpeg").exists());

    let status = h.scheduler.status();
    let a = status.iter().find(|s| s.id == 1).unwrap();
    let b = status.iter().find(|s| s.id == 2).unwrap();
    assert_eq!(a.failures, 1);
    assert!(a.last_error.as_deref().unwrap().contains("10.0.0.1"));
    assert_eq!(b.failures, 0);
    assert_eq!(b.cycles, 1);
}

#[test]
fn failed_source_waits_a_full_interval() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 5)]);
    h.fetcher.fail_address("10.0.0.1");

    assert_eq!(h.step(), vec![1]);
    h.advance(1);
    assert!(h.step().is_empty());

    h.fetcher.heal_address("10.0.0.1");
    h.advance(4);
    assert_eq!(h.step(), vec![1]);
    assert!(dir.path().join("2024/05/01/1_000005.jpeg").exists());
}

#[test]
fn never_more_than_one_cycle_in_flight_per_source() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 1)]);
    h.fetcher.set_delay(Duration::from_millis(150));

    let mut dispatched = 0;
    for _ in 0..20 {
        dispatched += h.scheduler.tick().len();
        h.advance(1);
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(h.scheduler.wait_idle(IDLE_TIMEOUT));

    assert!(dispatched >= 2, "expected repeated dispatch, got {}", dispatched);
    assert!(dispatched < 20, "in-flight source was dispatched again");
    assert_eq!(h.fetcher.max_in_flight("10.0.0.1"), 1);
}

#[test]
fn disable_all_and_enable_all() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(
        dir.path(),
        vec![source(1, "10.0.0.1", 1), source(2, "10.0.0.2", 1)],
    );

    // before any tick has seen the sources
    h.scheduler.disable_all();
    assert!(h.step().is_empty());
    h.advance(10);
    assert!(h.step().is_empty());

    h.scheduler.enable_all();
    assert_eq!(h.step(), vec![1, 2]);
}

#[test]
fn sources_sharing_an_address_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(
        dir.path(),
        vec![source(1, "10.0.0.9", 5), source(2, "10.0.0.9", 5)],
    );

    assert_eq!(h.step(), vec![1, 2]);
    assert_eq!(h.fetcher.call_count("10.0.0.9"), 2);
    assert!(dir.path().join("2024/05/01/1_000000.jpeg").exists());
    assert!(dir.path().join("2024/05/01/2_000000.jpeg").exists());
}

#[test]
fn registry_changes_are_picked_up_on_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 5)]);

    assert_eq!(h.step(), vec![1]);

    h.registry.upsert(source(2, "10.0.0.2", 5));
    h.registry.remove(1);
    h.advance(5);
    assert_eq!(h.step(), vec![2]);

    let status = h.scheduler.status();
    assert!(!status.iter().find(|s| s.id == 1).unwrap().registered);
}

#[test]
fn stop_lets_running_cycles_finish() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 5)]);
    h.fetcher.set_delay(Duration::from_millis(300));

    h.scheduler.start().unwrap();
    assert!(h.scheduler.is_running());

    let deadline = Instant::now() + Duration::from_secs(2);
    while h.scheduler.in_flight() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(h.scheduler.in_flight(), 1);

    h.scheduler.stop();
    assert!(!h.scheduler.is_running());
    assert!(h.scheduler.wait_idle(IDLE_TIMEOUT));
    assert!(dir.path().join("2024/05/01/1_000000.jpeg").exists());

    // stopped: due sources stay idle
    h.advance(10);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(h.fetcher.call_count("10.0.0.1"), 1);
}

#[test]
fn start_is_idempotent_and_loop_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), Vec::new());

    h.scheduler.start().unwrap();
    h.scheduler.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while h.scheduler.ticks() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(h.scheduler.ticks() >= 3);

    h.scheduler.shutdown();
    assert!(!h.scheduler.is_running());
}

#[test]
fn tick_jitter_keeps_the_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 5)]);
    let base = h.clock.now();

    // the tick that captures arrives later than the ones that follow
    h.clock.set(base + ChronoDuration::milliseconds(3));
    assert_eq!(h.step(), vec![1]);

    let mut captured_at = Vec::new();
    for k in 1..=12 {
        h.clock.set(base + ChronoDuration::seconds(k) + ChronoDuration::milliseconds(1));
        if !h.step().is_empty() {
            captured_at.push(k);
        }
    }

    assert_eq!(captured_at, vec![5, 10]);
}

#[test]
fn disable_all_also_pauses_sources_added_later() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path(), vec![source(1, "10.0.0.1", 1)]);

    h.scheduler.disable_all();
    h.registry.upsert(source(2, "10.0.0.2", 1));
    assert!(h.step().is_empty());
    assert_eq!(h.scheduler.mode(2), Some(SourceMode::Paused));

    h.scheduler.enable_all();
    h.registry.upsert(Source::new(3, "10.0.0.3", 1));
    assert_eq!(h.step(), vec![1, 2, 3]);
}
