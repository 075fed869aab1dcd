//! Contract tests for the two-tier invariant system.
//!
//! These drive deterministic sessions and verify that the required
//! invariants fired, both on the session side (PPT log) and on the worker
//! side (signal queue).

use fifobridge::cancel::{token_interrupt, CancelToken};
use fifobridge::config::StreamConfig;
use fifobridge::harness::{CountingSource, ReadStep, ScriptedSource};
use fifobridge::invariant_ppt::{
    contract_test, BUFFER_CAPACITY_BOUND, CHANNEL_MAPPING_UNIQUE, CONFIG_VALIDATION,
    EAGER_POP_BOUND, SESSION_TRANSITION, SINK_VERBATIM,
};
use fifobridge::invariant_rt::{
    contract_test_rt, INV_BACKPRESSURE_STALL, INV_BATCH_PUSHED, INV_INTERRUPT_HONORED,
    INV_READ_ERROR_TOLERATED, INV_REQUEST_WITHIN_BATCH, INV_STOP_HONORED,
};
use fifobridge::session::Session;
use fifobridge::sink::SinkConfig;
use fifobridge::source::ChannelId;
use std::time::{Duration, Instant};

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn contract_session_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::new(StreamConfig::new(4, Duration::from_millis(5)));
    session
        .start_with_sink(
            [
                ScriptedSource::new(ChannelId(2), vec![ReadStep::data(vec![1u32, 2], 0)]),
                ScriptedSource::new(ChannelId(3), vec![]),
            ],
            &SinkConfig::in_dir(dir.path()),
        )
        .unwrap();
    wait_until(|| session.available(ChannelId(2)).unwrap() == 2);
    assert_eq!(session.read_channel_to_file(ChannelId(2), 8).unwrap(), vec![1, 2]);
    let report = session.stop().unwrap();

    contract_test(
        "session lifecycle",
        &[
            CONFIG_VALIDATION,
            SESSION_TRANSITION,
            CHANNEL_MAPPING_UNIQUE,
            BUFFER_CAPACITY_BOUND,
            SINK_VERBATIM,
        ],
    );
    contract_test_rt(
        "drain and stop",
        &report.signals,
        &[
            INV_BATCH_PUSHED,
            INV_REQUEST_WITHIN_BATCH,
            INV_READ_ERROR_TOLERATED,
            INV_STOP_HONORED,
        ],
    );
}

#[test]
fn contract_eager_pop_bound() {
    let mut session = Session::new(StreamConfig::new(4, Duration::from_millis(5)));
    session
        .start([
            CountingSource::new(ChannelId(2), 0),
            CountingSource::new(ChannelId(3), 0),
        ])
        .unwrap();
    wait_until(|| session.available(ChannelId(2)).unwrap() == 4);
    assert_eq!(session.read_channel(ChannelId(2), 3).unwrap(), vec![0, 1, 2]);
    session.stop().unwrap();

    contract_test("eager pop", &[EAGER_POP_BOUND]);
}

#[test]
fn contract_interrupt_and_backpressure() {
    let abort = CancelToken::new();
    let config = StreamConfig::new(4, Duration::from_millis(5))
        .with_buffer_capacity(4)
        .with_backpressure_poll(Duration::from_millis(1));
    let mut session = Session::new(config).with_interrupt(token_interrupt(abort.clone()));
    session
        .start([
            CountingSource::new(ChannelId(2), 100),
            CountingSource::new(ChannelId(3), 0),
        ])
        .unwrap();

    // Free room once so a stalled push completes.
    wait_until(|| session.available(ChannelId(2)).unwrap() == 4);
    std::thread::sleep(Duration::from_millis(10));
    session.read_channel(ChannelId(2), 4).unwrap();
    wait_until(|| session.available(ChannelId(2)).unwrap() == 4);

    let mut signals = session.drain_invariant_signals();
    abort.cancel();
    wait_until(|| session.worker_finished());
    let report = session.stop().unwrap();
    signals.extend(report.signals);

    contract_test_rt(
        "interrupt under backpressure",
        &signals,
        &[INV_BACKPRESSURE_STALL, INV_INTERRUPT_HONORED],
    );
}
