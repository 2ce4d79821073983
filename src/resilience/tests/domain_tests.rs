//! Tests for circuit state, error classification and the restart policy.

use crate::clock::ManualClock;
use crate::resilience::domain::{
    CircuitState, CircuitStatus, DisableReason, Endpoint, ErrorClass, PermanentKind,
    RestartDecision, RestartPolicy,
};
use crate::stream::domain::{RelayTarget, Stream};
use crate::test_support::sample_stream;
use mockable::Clock;
use rstest::{fixture, rstest};
use std::time::Duration;

const OPEN_FOR: Duration = Duration::from_secs(60);

#[fixture]
fn clock() -> ManualClock {
    ManualClock::starting_now()
}

#[fixture]
fn endpoint() -> Endpoint {
    Endpoint::of(&RelayTarget::parse("rtmp://a.rtmp.example.com/live2/key-1").expect("target"))
}

#[fixture]
fn policy() -> RestartPolicy {
    RestartPolicy::new(3, Duration::from_secs(300))
}

#[rstest]
fn endpoint_identity_ignores_the_stream_key(endpoint: Endpoint) {
    let other = Endpoint::of(&RelayTarget::parse("rtmp://a.rtmp.example.com/live2/key-9").expect("target"));

    assert_eq!(endpoint, other);
    assert_eq!(endpoint.to_string(), "rtmp://a.rtmp.example.com:1935");
}

#[rstest]
fn circuit_trips_at_the_threshold(clock: ManualClock, endpoint: Endpoint) {
    let mut state = CircuitState::closed(endpoint);

    assert!(!state.record_failure(2, OPEN_FOR, clock.utc()));
    assert!(state.allows());
    assert!(state.record_failure(2, OPEN_FOR, clock.utc()));

    assert_eq!(state.status(), CircuitStatus::Open);
    assert!(!state.allows());
    assert!(!state.probe_due(clock.utc()));
    clock.advance(OPEN_FOR);
    assert!(state.probe_due(clock.utc()));
}

#[rstest]
fn half_open_failure_reopens_and_success_closes(clock: ManualClock, endpoint: Endpoint) {
    let mut state = CircuitState::closed(endpoint);
    state.record_failure(1, OPEN_FOR, clock.utc());
    state.begin_probe();
    assert_eq!(state.status(), CircuitStatus::HalfOpen);

    assert!(state.record_failure(1, OPEN_FOR, clock.utc()));
    assert_eq!(state.status(), CircuitStatus::Open);

    state.begin_probe();
    state.record_success();
    assert_eq!(state.status(), CircuitStatus::Closed);
    assert_eq!(state.failures(), 0);
    assert!(state.retry_at().is_none());
}

#[rstest]
#[case::missing("Error opening input: No such file or directory", ErrorClass::Permanent(PermanentKind::MissingFile))]
#[case::http_404("Server returned 404 Not Found", ErrorClass::Permanent(PermanentKind::MissingFile))]
#[case::denied("Permission denied", ErrorClass::Permanent(PermanentKind::Permission))]
#[case::forbidden_ingest("rtmp server returned 403 Forbidden", ErrorClass::Permanent(PermanentKind::Permission))]
#[case::corrupt("Invalid data found when processing input", ErrorClass::Permanent(PermanentKind::Corrupt))]
#[case::oom("relay killed by oom-kill", ErrorClass::Permanent(PermanentKind::OutOfMemory))]
#[case::refused("Connection refused", ErrorClass::Endpoint)]
#[case::pipe("av_interleaved_write_frame(): Broken pipe", ErrorClass::Endpoint)]
#[case::handshake("RTMP handshake failed", ErrorClass::Endpoint)]
#[case::other("relay exited with status 1", ErrorClass::Transient)]
#[case::empty("", ErrorClass::Transient)]
fn errors_are_classified(#[case] message: &str, #[case] expected: ErrorClass) {
    assert_eq!(ErrorClass::classify(message), expected);
}

fn crashed(clock: &ManualClock, crashes: usize) -> Stream {
    let mut stream = sample_stream("Show", clock);
    for _ in 0..crashes {
        stream.record_crash(clock.utc(), Duration::from_secs(300));
    }
    stream
}

#[rstest]
fn restart_is_the_default(clock: ManualClock, policy: RestartPolicy) {
    let stream = crashed(&clock, 1);

    assert_eq!(
        policy.decide(&stream, ErrorClass::Transient, true, clock.utc()),
        RestartDecision::Restart
    );
}

#[rstest]
fn crashes_above_the_cap_disable(clock: ManualClock, policy: RestartPolicy) {
    let at_cap = crashed(&clock, 3);
    let above = crashed(&clock, 4);

    assert_eq!(
        policy.decide(&at_cap, ErrorClass::Transient, true, clock.utc()),
        RestartDecision::Restart
    );
    assert_eq!(
        policy.decide(&above, ErrorClass::Transient, true, clock.utc()),
        RestartDecision::Disable(DisableReason::CrashLoop { crashes: 4 })
    );
}

#[rstest]
fn crashes_outside_the_window_are_forgiven(clock: ManualClock, policy: RestartPolicy) {
    let stream = crashed(&clock, 4);
    clock.advance(Duration::from_secs(301));

    assert_eq!(
        policy.decide(&stream, ErrorClass::Transient, true, clock.utc()),
        RestartDecision::Restart
    );
}

#[rstest]
fn disabled_schedule_holds_before_anything_else(clock: ManualClock, policy: RestartPolicy) {
    let mut stream = crashed(&clock, 5);
    stream.set_schedule_enabled(false, clock.utc());

    assert_eq!(
        policy.decide(
            &stream,
            ErrorClass::Permanent(PermanentKind::Corrupt),
            false,
            clock.utc()
        ),
        RestartDecision::Hold
    );
}

#[rstest]
fn permanent_errors_and_missing_entitlement_disable(clock: ManualClock, policy: RestartPolicy) {
    let stream = crashed(&clock, 1);

    assert_eq!(
        policy.decide(
            &stream,
            ErrorClass::Permanent(PermanentKind::Permission),
            true,
            clock.utc()
        ),
        RestartDecision::Disable(DisableReason::Permanent(PermanentKind::Permission))
    );
    assert_eq!(
        policy.decide(&stream, ErrorClass::Endpoint, false, clock.utc()),
        RestartDecision::Disable(DisableReason::NotEntitled)
    );
}
