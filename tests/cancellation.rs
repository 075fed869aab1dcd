use fifobridge::bridge::WorkerExit;
use fifobridge::cancel::{token_interrupt, CancelToken};
use fifobridge::config::StreamConfig;
use fifobridge::error::BridgeError;
use fifobridge::harness::{CountingSource, ReadStep, ScriptedSource, StalledSource};
use fifobridge::session::{Session, SessionState};
use fifobridge::source::ChannelId;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn stop_joins_within_one_read_timeout() {
    init_logging();
    let timeout = Duration::from_millis(50);
    let config = StreamConfig::new(16, timeout).with_buffer_capacity(1024);
    let mut session = Session::new(config);
    session
        .start([StalledSource::new(ChannelId(2)), StalledSource::new(ChannelId(3))])
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    let report = session.stop().unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.exit, WorkerExit::Stopped);
    assert!(elapsed < timeout * 2, "stop took {:?}", elapsed);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn stop_is_bounded_while_push_is_blocked() {
    init_logging();
    let config = StreamConfig::new(8, Duration::from_millis(10))
        .with_buffer_capacity(8)
        .with_backpressure_poll(Duration::from_millis(1));
    let mut session = Session::new(config);
    session
        .start([
            CountingSource::new(ChannelId(2), 1_000),
            CountingSource::new(ChannelId(3), 1_000),
        ])
        .unwrap();
    assert!(wait_until(|| session.available(ChannelId(2)).unwrap() == 8));
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    let report = session.stop().unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(report.exit, WorkerExit::Stopped);
    assert_eq!(report.stats.channels[0].elements_dropped, 8);
}

#[test]
fn interrupt_terminates_worker_without_stop() {
    init_logging();
    let abort = CancelToken::new();
    let config = StreamConfig::new(4, Duration::from_millis(5)).with_buffer_capacity(64);
    let mut session = Session::new(config).with_interrupt(token_interrupt(abort.clone()));
    session
        .start([
            ScriptedSource::new(ChannelId(2), vec![ReadStep::data(vec![1u32, 2, 3], 0)]),
            ScriptedSource::new(ChannelId(3), vec![]),
        ])
        .unwrap();
    assert!(wait_until(|| session.available(ChannelId(2)).unwrap() == 3));

    abort.cancel();
    assert!(wait_until(|| session.worker_finished()));
    assert_eq!(session.state(), SessionState::Running);

    // Buffered data outlives the worker until the session is stopped.
    assert_eq!(session.read_channel(ChannelId(2), 10).unwrap(), vec![1, 2, 3]);

    let report = session.stop().unwrap();
    assert_eq!(report.exit, WorkerExit::Interrupted);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn second_stop_is_rejected_without_side_effects() {
    init_logging();
    let config = StreamConfig::new(4, Duration::from_millis(5)).with_buffer_capacity(64);
    let mut session = Session::new(config);
    session
        .start([
            CountingSource::new(ChannelId(2), 0),
            CountingSource::new(ChannelId(3), 0),
        ])
        .unwrap();
    session.stop().unwrap();

    assert!(matches!(
        session.stop(),
        Err(BridgeError::NotRunning(SessionState::Idle))
    ));
    assert!(matches!(
        session.read_channel(ChannelId(2), 1),
        Err(BridgeError::NotRunning(SessionState::Idle))
    ));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn independent_sessions_run_side_by_side() {
    init_logging();
    let config = StreamConfig::new(4, Duration::from_millis(5)).with_buffer_capacity(64);
    let mut first = Session::new(config.clone());
    let mut second = Session::new(config);
    first
        .start([
            ScriptedSource::new(ChannelId(2), vec![ReadStep::data(vec![1u32], 0)]),
            ScriptedSource::new(ChannelId(3), vec![]),
        ])
        .unwrap();
    second
        .start([
            ScriptedSource::new(ChannelId(2), vec![ReadStep::data(vec![2u32], 0)]),
            ScriptedSource::new(ChannelId(3), vec![]),
        ])
        .unwrap();

    assert!(wait_until(|| first.available(ChannelId(2)).unwrap() == 1));
    assert!(wait_until(|| second.available(ChannelId(2)).unwrap() == 1));
    assert_eq!(first.read_channel(ChannelId(2), 4).unwrap(), vec![1]);
    assert_eq!(second.read_channel(ChannelId(2), 4).unwrap(), vec![2]);

    first.stop().unwrap();
    assert!(second.is_running());
    second.stop().unwrap();
}
