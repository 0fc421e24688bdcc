//! Watchdog state machine behavior, driven event by event with mocks.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use common::Harness;
use monitor::event::{Event, EventKind};
use monitor::traits::{MockAlerter, MockControlChannel, MockProcessControl, MockProber};
use monitor::watchdog::{AliveState, DeadState, ErrorState, WatchKind};
use shared::MsgType;

fn quiet_prober() -> MockProber {
    let mut prober = MockProber::new();
    prober.expect_check().returning(|| true);
    prober
}

#[tokio::test(start_paused = true)]
async fn test_startup_reaches_alive_when_worker_acknowledges() {
    let mut process = MockProcessControl::new();
    process.expect_run().times(1).returning(|| Ok(()));
    process.expect_is_alive().returning(|| true);

    let mut control = MockControlChannel::new();
    control
        .expect_send_control()
        .withf(|m, _| m.msg_type() == MsgType::StartWeb)
        .times(1)
        .returning(|_, _| Ok(()));

    let mut alerter = MockAlerter::new();
    alerter
        .expect_notify()
        .withf(|subject, _| subject == "http started")
        .times(1)
        .returning(|_, _| ());

    let mut h = Harness::new(process, control, quiet_prober(), alerter);
    let mut machine = h.start(Box::new(DeadState::new())).await;

    machine.on(&mut h.ctx, Event::new(EventKind::Initialize)).await.unwrap();

    // the heartbeat cancels the startup timer and advances the evaluation
    machine.on(&mut h.ctx, Event::new(EventKind::Alive)).await.unwrap();
    assert_eq!(machine.current_kind(), WatchKind::Dead);

    machine.on(&mut h.ctx, Event::new(EventKind::WebAlive)).await.unwrap();
    assert_eq!(machine.current_kind(), WatchKind::Alive);
}

#[tokio::test(start_paused = true)]
async fn test_missing_readiness_ack_is_fatal() {
    let mut process = MockProcessControl::new();
    process.expect_run().times(1).returning(|| Ok(()));
    process.expect_is_alive().returning(|| true);
    process.expect_stop().times(1).returning(|| ());

    let mut control = MockControlChannel::new();
    control.expect_send_control().times(1).returning(|_, _| Ok(()));

    let mut h = Harness::new(process, control, MockProber::new(), MockAlerter::new());
    let mut machine = h.start(Box::new(DeadState::new())).await;

    machine.on(&mut h.ctx, Event::new(EventKind::Initialize)).await.unwrap();
    machine.on(&mut h.ctx, Event::new(EventKind::Alive)).await.unwrap();

    // StartWeb went out but the readiness ack never arrives
    let check = h.next_event().await;
    assert_eq!(check.kind, EventKind::IsWebAliveCheck);
    machine.on(&mut h.ctx, check).await.unwrap();
    assert_eq!(machine.current_kind(), WatchKind::Error);
}

#[tokio::test(start_paused = true)]
async fn test_missing_heartbeat_is_fatal() {
    let mut process = MockProcessControl::new();
    process.expect_run().times(1).returning(|| Ok(()));
    process.expect_is_alive().returning(|| true);
    process.expect_stop().times(1).returning(|| ());

    let control = MockControlChannel::new();
    let alerter = MockAlerter::new();

    let mut h = Harness::new(process, control, MockProber::new(), alerter);
    let mut machine = h.start(Box::new(DeadState::new())).await;

    machine.on(&mut h.ctx, Event::new(EventKind::Initialize)).await.unwrap();

    // the startup window expires with no heartbeat received
    let check = h.next_event().await;
    assert_eq!(check.kind, EventKind::IsAliveCheck);
    machine.on(&mut h.ctx, check).await.unwrap();

    assert_eq!(machine.current_kind(), WatchKind::Error);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_is_fatal() {
    let mut process = MockProcessControl::new();
    process
        .expect_run()
        .times(1)
        .returning(|| Err(monitor::MonitorError::process("spawn failed")));
    process.expect_stop().times(1).returning(|| ());

    let mut h = Harness::new(process, MockControlChannel::new(), MockProber::new(), MockAlerter::new());
    let mut machine = h.start(Box::new(DeadState::new())).await;

    machine.on(&mut h.ctx, Event::new(EventKind::Initialize)).await.unwrap();
    assert_eq!(machine.current_kind(), WatchKind::Error);
}

#[tokio::test(start_paused = true)]
async fn test_worker_exit_during_startup_is_fatal() {
    let mut process = MockProcessControl::new();
    process.expect_run().times(1).returning(|| Ok(()));
    process.expect_is_alive().returning(|| false);
    process.expect_stop().times(1).returning(|| ());

    let mut h = Harness::new(process, MockControlChannel::new(), MockProber::new(), MockAlerter::new());
    let mut machine = h.start(Box::new(DeadState::new())).await;

    machine.on(&mut h.ctx, Event::new(EventKind::Initialize)).await.unwrap();
    machine.on(&mut h.ctx, Event::new(EventKind::Alive)).await.unwrap();
    assert_eq!(machine.current_kind(), WatchKind::Error);
}

#[tokio::test(start_paused = true)]
async fn test_two_probe_failures_then_success_keeps_worker_alive() {
    let mut prober = MockProber::new();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    prober
        .expect_check()
        .returning(move || counter.fetch_add(1, Ordering::SeqCst) >= 2);

    let mut h = Harness::new(
        MockProcessControl::new(),
        MockControlChannel::new(),
        prober,
        MockAlerter::new(),
    );
    let mut machine = h.start(Box::new(AliveState::new())).await;

    for expected in [EventKind::WebTestFailure, EventKind::WebTestFailure, EventKind::WebTestSuccess] {
        let result = h.next_event().await;
        assert_eq!(result.kind, expected);
        machine.on(&mut h.ctx, result).await.unwrap();
        assert_eq!(machine.current_kind(), WatchKind::Alive);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_three_probe_failures_trigger_restart_cycle() {
    let mut prober = MockProber::new();
    prober.expect_check().returning(|| false);

    let mut process = MockProcessControl::new();
    process.expect_stop().times(1).returning(|| ());
    process.expect_wait_for_exit().times(1).returning(|| ());
    process.expect_run().times(1).returning(|| Ok(()));

    let mut h = Harness::new(process, MockControlChannel::new(), prober, MockAlerter::new());
    let mut machine = h.start(Box::new(AliveState::new())).await;

    for _ in 0..3 {
        let result = h.next_event().await;
        assert_eq!(result.kind, EventKind::WebTestFailure);
        machine.on(&mut h.ctx, result).await.unwrap();
    }
    // the third failure stopped the worker and kicked off the wait
    assert_eq!(machine.current_kind(), WatchKind::Restarting);

    let exited = h.next_event().await;
    assert_eq!(exited.kind, EventKind::ProcessDead);
    machine.on(&mut h.ctx, exited).await.unwrap();

    // back in Dead with the worker respawned, waiting for its heartbeat
    assert_eq!(machine.current_kind(), WatchKind::Dead);
}

#[tokio::test(start_paused = true)]
async fn test_restart_command_stops_the_worker() {
    let mut process = MockProcessControl::new();
    process.expect_stop().times(1).returning(|| ());
    process.expect_wait_for_exit().returning(|| ());

    let mut h = Harness::new(process, MockControlChannel::new(), quiet_prober(), MockAlerter::new());
    let mut machine = h.start(Box::new(AliveState::new())).await;

    machine.on(&mut h.ctx, Event::new(EventKind::Restart)).await.unwrap();
    assert_eq!(machine.current_kind(), WatchKind::Restarting);
}

#[tokio::test(start_paused = true)]
async fn test_error_state_is_sticky() {
    let mut process = MockProcessControl::new();
    process.expect_stop().times(1).returning(|| ());

    let mut h = Harness::new(process, MockControlChannel::new(), MockProber::new(), MockAlerter::new());
    let mut machine = h.start(Box::new(ErrorState::new())).await;

    for kind in [EventKind::Initialize, EventKind::Alive, EventKind::Restart] {
        assert!(machine.on(&mut h.ctx, Event::new(kind)).await.is_err());
        assert_eq!(machine.current_kind(), WatchKind::Error);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stale_probe_results_are_ignored_in_dead() {
    let mut process = MockProcessControl::new();
    process.expect_run().times(1).returning(|| Ok(()));

    let mut h = Harness::new(process, MockControlChannel::new(), MockProber::new(), MockAlerter::new());
    let mut machine = h.start(Box::new(DeadState::new())).await;
    machine.on(&mut h.ctx, Event::new(EventKind::Initialize)).await.unwrap();

    for kind in [EventKind::WebTestSuccess, EventKind::WebTestFailure, EventKind::ProcessDead] {
        machine.on(&mut h.ctx, Event::new(kind)).await.unwrap();
        assert_eq!(machine.current_kind(), WatchKind::Dead);
    }
}
