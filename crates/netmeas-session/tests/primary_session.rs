//! Primary exchange tests against a scripted in-memory server
//!
//! Tests verify the exact request order, the state history on success and
//! failure, interval publication and measurement fallback.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use common::{Reply, StubMeter, happy_reply, kinds, serve, test_config, wrong_reply_at};
use netmeas_session::{
    MeasurementError, PrimarySession, SessionConfig, SessionError, SessionFailure, SessionReport,
    SessionState, ThroughputMeter, interval_channel,
};
use netmeas_wire::{Envelope, FrameTransport, MessageKind, TransportError, WireError};

struct Run {
    result: Result<SessionReport, SessionFailure>,
    received: Vec<Envelope>,
    interval: Option<Duration>,
}

async fn run_session<F>(
    session: PrimarySession,
    read_timeout: Option<Duration>,
    respond: F,
) -> Run
where
    F: Fn(&Envelope) -> Reply + Send + 'static,
{
    let (client, server) = tokio::io::duplex(common::DUPLEX_CAPACITY);
    let server = tokio::spawn(serve(FrameTransport::new(server), respond));

    let mut transport = FrameTransport::new(client);
    if let Some(after) = read_timeout {
        transport = transport.with_read_timeout(after);
    }

    let (publisher, subscription) = interval_channel();
    let result = session.run(&mut transport, publisher).await;
    drop(transport);

    Run {
        result,
        received: server.await.unwrap(),
        interval: subscription.wait().await,
    }
}

fn session_with(config: SessionConfig, meter: StubMeter) -> PrimarySession {
    let meter: Arc<dyn ThroughputMeter> = Arc::new(meter);
    PrimarySession::new(Arc::new(config), meter)
}

fn failure(run: Run) -> SessionFailure {
    match run.result {
        Ok(report) => panic!("expected failure, session closed with {report:?}"),
        Err(failure) => failure,
    }
}

#[tokio::test]
async fn test_full_exchange_reaches_closed() {
    common::init_tracing();

    // GIVEN: a server negotiating a 7s interval and a 5s measurement on port 5201
    let meter = StubMeter::returning(123.4);
    let session = session_with(test_config(), meter.clone())
        .with_local_address(IpAddr::V4(Ipv4Addr::new(10, 64, 45, 9)));

    // WHEN: the exchange runs to completion
    let run = run_session(session, None, |e| happy_reply(e, 7, 5201, 5)).await;

    // THEN: the session closed after visiting every step once
    let report = run.result.unwrap();
    assert_eq!(report.history, SessionState::SUCCESS_PATH.to_vec());
    assert_eq!(report.interval, Duration::from_secs(7));
    assert_eq!(report.stats_state, 1);
    assert_eq!(report.measurement.port, 5201);
    assert_eq!(report.measurement.duration, Duration::from_secs(5));
    assert!(!report.used_fallback);
    assert_eq!(run.interval, Some(Duration::from_secs(7)));

    // AND: the server saw the requests in order
    assert_eq!(
        kinds(&run.received),
        vec![
            MessageKind::ConnectionRequest,
            MessageKind::StatsRequest,
            MessageKind::StatsReport,
            MessageKind::MeasurementRequest,
            MessageKind::MeasurementReport,
        ]
    );
    assert!(run.received.iter().all(|e| e.sender_id() == Some(5)));

    match &run.received[0] {
        Envelope::ConnectionRequest(request) => {
            assert_eq!(request.participants.len(), 1);
            assert_eq!(request.participants[0].id, 2572);
            assert_eq!(request.participants[0].email, "ada@example.com");
        }
        other => panic!("unexpected first request {other:?}"),
    }
    match &run.received[2] {
        Envelope::StatsReport(report) => {
            assert_eq!(report.ip_address, "10.64.45.9");
            assert_eq!(report.mac_address, "02:42:ac:11:00:02");
        }
        other => panic!("unexpected statistics push {other:?}"),
    }
    match &run.received[4] {
        Envelope::MeasurementReport(report) => assert_eq!(report.report, 123.4),
        other => panic!("unexpected report {other:?}"),
    }

    // AND: the meter ran once with the negotiated parameters
    let calls = meter.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, "127.0.0.1");
    assert_eq!(calls[0].port, 5201);
    assert_eq!(calls[0].duration, Duration::from_secs(5));
}

#[tokio::test]
async fn test_configured_network_address_wins_over_local_address() {
    let config = test_config().with_network_address("192.0.2.10");
    let session = session_with(config, StubMeter::returning(1.0))
        .with_local_address(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let run = run_session(session, None, |e| happy_reply(e, 7, 5201, 5)).await;

    assert!(run.result.is_ok());
    match &run.received[2] {
        Envelope::StatsReport(report) => assert_eq!(report.ip_address, "192.0.2.10"),
        other => panic!("unexpected statistics push {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_local_address_reports_unspecified() {
    let session = session_with(test_config(), StubMeter::returning(1.0));

    let run = run_session(session, None, |e| happy_reply(e, 7, 5201, 5)).await;

    match &run.received[2] {
        Envelope::StatsReport(report) => assert_eq!(report.ip_address, "0.0.0.0"),
        other => panic!("unexpected statistics push {other:?}"),
    }
}

#[tokio::test]
async fn test_measurement_failure_reports_fallback() {
    // GIVEN: a meter that cannot start the tool
    let meter = StubMeter::failing(MeasurementError::Spawn {
        program: "iperf3".to_string(),
        reason: "No such file or directory".to_string(),
    });
    let session = session_with(test_config(), meter);

    // WHEN: the exchange runs
    let run = run_session(session, None, |e| happy_reply(e, 7, 5201, 5)).await;

    // THEN: the session still closes and reports zero
    let report = run.result.unwrap();
    assert!(report.used_fallback);
    assert_eq!(report.throughput_mbps, 0.0);
    assert_eq!(report.history.last(), Some(&SessionState::Closed));
    match run.received.last() {
        Some(Envelope::MeasurementReport(report)) => assert_eq!(report.report, 0.0),
        other => panic!("unexpected last request {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_measurement_overrun_reports_fallback() {
    // GIVEN: a meter that hangs far beyond duration plus grace
    let meter = StubMeter::returning(999.0).with_delay(Duration::from_secs(3600));
    let session = session_with(test_config(), meter);

    // WHEN: the server asks for a 2s measurement
    let run = run_session(session, None, |e| happy_reply(e, 7, 5201, 2)).await;

    // THEN: the measurement is abandoned and zero is reported
    let report = run.result.unwrap();
    assert!(report.used_fallback);
    assert_eq!(report.throughput_mbps, 0.0);
}

#[tokio::test]
async fn test_wrong_variant_fails_at_each_awaiting_step() {
    let cases = [
        (MessageKind::ConnectionRequest, SessionState::AwaitingConnResp, MessageKind::ConnectionResponse, 1),
        (MessageKind::StatsRequest, SessionState::AwaitingStatsResp, MessageKind::StatsResponse, 2),
        (MessageKind::MeasurementRequest, SessionState::AwaitingMeasureResp, MessageKind::MeasurementResponse, 4),
        (MessageKind::MeasurementReport, SessionState::AwaitingAck, MessageKind::MeasurementAck, 5),
    ];

    for (trigger, failed_at, expected, requests_sent) in cases {
        // GIVEN: a server answering `trigger` with a heartbeat
        let session = session_with(test_config(), StubMeter::returning(10.0));

        // WHEN: the exchange runs
        let run = run_session(session, None, wrong_reply_at(trigger)).await;
        let received = run.received.len();
        let failure = failure(run);

        // THEN: it fails at the awaiting step and sends nothing further
        assert_eq!(failure.state, failed_at, "trigger {trigger}");
        assert_eq!(
            failure.error,
            SessionError::unexpected_variant(expected, MessageKind::Heartbeat)
        );
        assert_eq!(failure.history.last(), Some(&SessionState::Failed));
        assert_eq!(failure.history[failure.history.len() - 2], failed_at);
        assert_eq!(received, requests_sent, "trigger {trigger}");
    }
}

#[tokio::test]
async fn test_wrong_connection_response_publishes_no_interval() {
    let session = session_with(test_config(), StubMeter::returning(10.0));

    let run = run_session(session, None, wrong_reply_at(MessageKind::ConnectionRequest)).await;

    assert_eq!(run.interval, None);
    assert!(run.result.is_err());
}

#[tokio::test]
async fn test_peer_close_after_connection_request() {
    // GIVEN: a server that closes right after the first request
    let session = session_with(test_config(), StubMeter::returning(10.0));

    // WHEN: the exchange runs
    let run = run_session(session, None, |_| Reply::Close).await;
    let received = run.received.clone();
    let interval = run.interval;
    let failure = failure(run);

    // THEN: the failure is a transport error while awaiting the response
    assert_eq!(failure.state, SessionState::AwaitingConnResp);
    assert!(failure.error.is_transport());
    assert_eq!(
        failure.error,
        SessionError::from(TransportError::unexpected_eof(0, 4))
    );
    assert_eq!(kinds(&received), vec![MessageKind::ConnectionRequest]);
    assert_eq!(interval, None);
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let session = session_with(test_config(), StubMeter::returning(10.0));

    let run = run_session(session, None, |e| happy_reply(e, 0, 5201, 5)).await;
    let interval = run.interval;
    let received = run.received.len();
    let failure = failure(run);

    assert_eq!(failure.state, SessionState::AwaitingConnResp);
    assert_eq!(failure.error, SessionError::InvalidInterval { interval: 0 });
    assert_eq!(interval, None);
    assert_eq!(received, 1);
}

#[tokio::test]
async fn test_out_of_range_port_is_rejected() {
    let meter = StubMeter::returning(10.0);
    let session = session_with(test_config(), meter.clone());

    let run = run_session(session, None, |e| happy_reply(e, 7, 70_000, 5)).await;
    let failure = failure(run);

    assert_eq!(failure.state, SessionState::AwaitingMeasureResp);
    assert!(matches!(
        failure.error,
        SessionError::InvalidMeasurementParameters { .. }
    ));
    assert!(meter.calls().is_empty());
}

#[tokio::test]
async fn test_zero_duration_is_rejected() {
    // GIVEN: a server asking for a measurement of no length
    let meter = StubMeter::returning(10.0);
    let session = session_with(test_config(), meter.clone());

    // WHEN: the exchange reaches the measurement response
    let run = run_session(session, None, |e| happy_reply(e, 7, 5201, 0)).await;
    let failure = failure(run);

    // THEN: it fails there and the meter never runs
    assert_eq!(failure.state, SessionState::AwaitingMeasureResp);
    assert!(matches!(
        failure.error,
        SessionError::InvalidMeasurementParameters { .. }
    ));
    assert!(meter.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out() {
    // GIVEN: a server that never answers and a 5s read timeout
    let session = session_with(test_config(), StubMeter::returning(10.0));

    // WHEN: the exchange waits for the connection response
    let run = run_session(session, Some(Duration::from_secs(5)), |_| Reply::Silent).await;
    let failure = failure(run);

    // THEN: the read times out
    assert_eq!(failure.state, SessionState::AwaitingConnResp);
    assert_eq!(
        failure.error,
        SessionError::Wire(WireError::Transport(TransportError::timeout(
            Duration::from_secs(5)
        )))
    );
}

#[tokio::test]
async fn test_failure_display_names_state() {
    let session = session_with(test_config(), StubMeter::returning(10.0));

    let run = run_session(session, None, wrong_reply_at(MessageKind::StatsRequest)).await;
    let failure = failure(run);

    assert_eq!(
        failure.to_string(),
        "primary session failed while awaiting_stats_resp: expected STATS_RESPONSE, received HEARTBEAT"
    );
}
