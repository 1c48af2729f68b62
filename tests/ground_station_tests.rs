use chrono::{NaiveDateTime, TimeDelta};
use satlink::ground::*;
use satlink::log_store::GroundRecord;
use satlink::protocol::*;
use satlink::{GroundConfig, GroundStation};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;

fn reading(source: Source, device: &str, sensor: &str, value: &str) -> Reading {
    Reading::new("2025-08-26", "13:28:40", source, device, sensor, value)
}

fn telemetry_line(at: NaiveDateTime, device: &str, value: &str) -> String {
    GroundRecord::telemetry(&Reading::at(at, Source::Log, device, "temperature", value)).to_line()
}

async fn ground_station(dir: &TempDir, spacecraft_addr: SocketAddr) -> GroundStation {
    let config = GroundConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        spacecraft_addr,
        log_path: dir.path().join("ground.log"),
        recv_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(10),
        dispatch_interval: Duration::ZERO,
    };
    GroundStation::bind(config).await.unwrap()
}

#[test]
fn test_log_failures_reported_as_failure() {
    let cases = [
        ("ERROR:sensor_fail", Observation::Failure("ERROR:sensor_fail".to_string())),
        ("WARNING:overheat", Observation::Failure("WARNING:overheat".to_string())),
        ("warning", Observation::Failure("warning".to_string())),
        ("1.656", Observation::Value("1.656".to_string())),
    ];

    for (value, expected) in cases {
        let view = classify(&reading(Source::Log, "3", "temperature", value)).unwrap();
        assert_eq!(view.device, "3");
        assert_eq!(view.sensor, "temperature");
        assert_eq!(view.observation, expected, "value {}", value);
    }
}

#[test]
fn test_online_always_reported_as_value() {
    for value in ["5", "10", "ERROR"] {
        let view = classify(&reading(Source::Online, "3", "temp", value)).unwrap();
        assert_eq!(
            view,
            TelemetryView {
                device: "3".to_string(),
                sensor: "temp".to_string(),
                observation: Observation::Value(value.to_string()),
            }
        );
    }
}

#[test]
fn test_system_readings_ignored() {
    assert!(classify(&reading(Source::System, "3", "system", "log_start")).is_none());
}

#[test]
fn test_view_serializes_with_value_or_failure_key() {
    let failure = classify(&reading(Source::Log, "3", "temperature", "ERROR:sensor_fail")).unwrap();
    assert_eq!(
        serde_json::to_value(&failure).unwrap(),
        serde_json::json!({"device": "3", "sensor": "temperature", "failure": "ERROR:sensor_fail"})
    );

    let value = classify(&reading(Source::Online, "2", "voltage", "5")).unwrap();
    assert_eq!(
        serde_json::to_value(&value).unwrap(),
        serde_json::json!({"device": "2", "sensor": "voltage", "value": "5"})
    );
}

#[test]
fn test_console_grammar() {
    assert_eq!(
        ConsoleCommand::parse("5 3 temperature"),
        Some(ConsoleCommand::RequestLog(LogRequest::new(5, 3, "temperature")))
    );
    assert_eq!(ConsoleCommand::parse("3"), Some(ConsoleCommand::FailureCount { device: 3 }));
    assert_eq!(
        ConsoleCommand::parse("  100   3 temperature\n"),
        Some(ConsoleCommand::RequestLog(LogRequest::new(100, 3, "temperature")))
    );

    assert_eq!(ConsoleCommand::parse(""), None);
    assert_eq!(ConsoleCommand::parse("5 3"), None);
    assert_eq!(ConsoleCommand::parse("5 3 temperature extra"), None);
    assert_eq!(ConsoleCommand::parse("five 3 temperature"), None);
    assert_eq!(ConsoleCommand::parse("5 -3 temperature"), None);
    assert_eq!(ConsoleCommand::parse("abc"), None);
}

#[test]
fn test_count_failures_only_counts_session() {
    let session_start = NaiveDateTime::parse_from_str("2025-08-26 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    let before = session_start - TimeDelta::minutes(5);
    let after = session_start + TimeDelta::minutes(5);

    let lines = vec![
        telemetry_line(before, "3", "ERROR:sensor_fail"),
        telemetry_line(after, "3", "ERROR:sensor_fail"),
        telemetry_line(after, "3", "WARNING:overheat"),
        telemetry_line(after, "3", "error_and_warning"),
        telemetry_line(after, "3", "17"),
        telemetry_line(after, "4", "ERROR:sensor_fail"),
        "datetime=2025-08-26T12:10:00.000000 command=getlog interval=5 device=3 sensor=temperature".to_string(),
        "not a record".to_string(),
    ];

    let count = count_failures(&lines, 3, session_start);
    assert_eq!(count, FailureCount { errors: 2, warnings: 1 });
    assert_eq!(count.to_string(), "Session errors: 2 || Session warnings: 1");
}

#[test]
fn test_rate_limiter_window() {
    let start = Instant::now();
    let mut limiter = RateLimiter::new(Duration::from_secs(3), start);

    assert!(!limiter.is_ready(start));
    assert!(!limiter.is_ready(start + Duration::from_millis(2999)));
    assert!(limiter.is_ready(start + Duration::from_secs(3)));

    limiter.mark(start + Duration::from_secs(3));
    assert!(!limiter.is_ready(start + Duration::from_secs(4)));
    assert!(limiter.is_ready(start + Duration::from_secs(6)));

    assert!(RateLimiter::ready(Duration::from_secs(3)).is_ready(start));
}

#[tokio::test]
async fn test_console_line_enqueues_request() {
    let dir = tempfile::tempdir().unwrap();
    let station = ground_station(&dir, "127.0.0.1:9".parse().unwrap()).await;

    let before = station.requests().len();
    assert_eq!(station.handle_console_line("5 3 temperature").unwrap(), None);
    assert_eq!(station.requests().len(), before + 1);
    assert_eq!(station.requests().pop(), Some(LogRequest::new(5, 3, "temperature")));

    // Invalid lines are ignored without error
    assert_eq!(station.handle_console_line("5 3").unwrap(), None);
    assert_eq!(station.handle_console_line("x 3 temperature").unwrap(), None);
    assert!(station.requests().is_empty());
}

#[tokio::test]
async fn test_console_failure_count_excludes_previous_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let station = ground_station(&dir, "127.0.0.1:9".parse().unwrap()).await;
    let start = station.session_start();

    let log = station.log();
    log.append(&telemetry_line(start - TimeDelta::hours(1), "3", "ERROR:sensor_fail")).unwrap();
    log.append(&telemetry_line(start + TimeDelta::seconds(1), "3", "ERROR:sensor_fail")).unwrap();
    log.append(&telemetry_line(start + TimeDelta::seconds(2), "3", "ERROR:sensor_fail")).unwrap();
    log.append(&telemetry_line(start + TimeDelta::seconds(3), "3", "WARNING:overheat")).unwrap();

    let before = std::fs::read_to_string(log.path()).unwrap();
    let count = station.handle_console_line("3").unwrap();
    assert_eq!(count, Some(FailureCount { errors: 2, warnings: 1 }));

    // The query never touches the store
    assert_eq!(std::fs::read_to_string(log.path()).unwrap(), before);
    assert!(station.requests().is_empty());
}

#[tokio::test]
async fn test_handle_reading_persists_accepted_readings() {
    let dir = tempfile::tempdir().unwrap();
    let station = ground_station(&dir, "127.0.0.1:9".parse().unwrap()).await;

    let failure = reading(Source::Log, "3", "temperature", "ERROR:sensor_fail");
    let view = station.handle_reading(&failure).unwrap().unwrap();
    assert_eq!(view.observation, Observation::Failure("ERROR:sensor_fail".to_string()));

    let marker = reading(Source::System, "3", "system", "log_start");
    assert_eq!(station.handle_reading(&marker).unwrap(), None);

    let lines = station.log().lines().unwrap();
    assert_eq!(
        lines,
        vec!["dt=2025-08-26 tm=13:28:40 src=log device=3 sensor=temperature val=ERROR:sensor_fail".to_string()]
    );
}

#[tokio::test]
async fn test_receive_drops_corrupt_and_malformed_datagrams() {
    let dir = tempfile::tempdir().unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let station = ground_station(&dir, peer.local_addr().unwrap()).await;
    let ground_addr = station.local_addr().unwrap();

    let valid = Reading::new("2025-08-26", "13:33:32.321327", Source::Online, "2", "voltage", "9.123");
    let corrupt = format!("{} {}", valid.to_line(), valid.checksum().wrapping_add(7));

    peer.send_to(br#"{"recv_time": 1}"#, ground_addr).await.unwrap();
    peer.send_to(b"garbage", ground_addr).await.unwrap();
    peer.send_to(serde_json::json!({ "message": corrupt }).to_string().as_bytes(), ground_addr)
        .await
        .unwrap();
    let datagram = OutboundEnvelope::new(&valid, 1756204412).encode().unwrap();
    peer.send_to(datagram.as_bytes(), ground_addr).await.unwrap();

    assert_eq!(station.receive_once().await, None);
    assert_eq!(station.receive_once().await, None);
    assert_eq!(station.receive_once().await, None);
    assert_eq!(station.receive_once().await, Some(valid));

    // Nothing was persisted by the receive path itself
    assert!(station.log().lines().unwrap().is_empty());
}

#[tokio::test]
async fn test_receive_times_out_quietly() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = GroundConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_path: dir.path().join("ground.log"),
        ..GroundConfig::default()
    };
    config.recv_timeout = Duration::from_millis(20);
    let station = GroundStation::bind(config).await.unwrap();

    let started = Instant::now();
    assert_eq!(station.receive_once().await, None);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_dispatch_sends_oldest_request_and_logs_it() {
    let dir = tempfile::tempdir().unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let station = ground_station(&dir, peer.local_addr().unwrap()).await;

    station.handle_console_line("5 3 temperature").unwrap();
    station.handle_console_line("60 3 temperature").unwrap();

    let mut limiter = RateLimiter::new(Duration::ZERO, Instant::now());
    let sent = station.dispatch_pending(&mut limiter).await.unwrap().unwrap();
    assert_eq!(sent, CommandRequest::from(LogRequest::new(5, 3, "temperature")));

    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let (len, _) = peer.recv_from(&mut buf).await.unwrap();
    assert_eq!(CommandRequest::decode(&buf[..len]).unwrap(), sent);

    assert_eq!(station.requests().len(), 1);

    let lines = station.log().lines().unwrap();
    assert_eq!(lines.len(), 1);
    match GroundRecord::parse(&lines[0]).unwrap() {
        GroundRecord::CommandSent { command, interval, device, sensor, .. } => {
            assert_eq!(command, "getlog");
            assert_eq!(interval, 5);
            assert_eq!(device, 3);
            assert_eq!(sensor, "temperature");
        }
        other => panic!("Expected CommandSent, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dispatch_respects_rate_limit() {
    let dir = tempfile::tempdir().unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let station = ground_station(&dir, peer.local_addr().unwrap()).await;

    for _ in 0..3 {
        station.handle_console_line("5 3 temperature").unwrap();
    }

    let mut limiter = RateLimiter::ready(Duration::from_secs(3));
    assert!(station.dispatch_pending(&mut limiter).await.unwrap().is_some());

    // The burst stays queued until the window passes
    assert!(station.dispatch_pending(&mut limiter).await.unwrap().is_none());
    assert!(station.dispatch_pending(&mut limiter).await.unwrap().is_none());
    assert_eq!(station.requests().len(), 2);
}

#[tokio::test]
async fn test_dispatch_with_empty_queue_keeps_timer() {
    let dir = tempfile::tempdir().unwrap();
    let station = ground_station(&dir, "127.0.0.1:9".parse().unwrap()).await;

    let mut limiter = RateLimiter::ready(Duration::from_secs(3));
    assert!(station.dispatch_pending(&mut limiter).await.unwrap().is_none());
    assert!(limiter.is_ready(Instant::now()));
}

#[tokio::test]
async fn test_receiver_paces_dispatch_and_stops_on_signal() {
    let dir = tempfile::tempdir().unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = GroundConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        spacecraft_addr: peer.local_addr().unwrap(),
        log_path: dir.path().join("ground.log"),
        recv_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
        dispatch_interval: Duration::from_millis(400),
    };
    let station = Arc::new(GroundStation::bind(config).await.unwrap());
    station.handle_console_line("5 3 temperature").unwrap();
    station.handle_console_line("7 3 temperature").unwrap();

    let (stop_tx, stop_rx) = watch::channel(false);
    let started = Instant::now();
    let receiver = tokio::spawn(Arc::clone(&station).run_receiver(stop_rx));

    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf)).await.unwrap().unwrap();
    let first_at = Instant::now();
    assert_eq!(CommandRequest::decode(&buf[..len]).unwrap().interval, 5);
    // The first window opens when the receiver starts
    assert!(first_at - started >= Duration::from_millis(350));

    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf)).await.unwrap().unwrap();
    let second_at = Instant::now();
    assert_eq!(CommandRequest::decode(&buf[..len]).unwrap().interval, 7);
    assert!(second_at - first_at >= Duration::from_millis(350));
    assert!(station.requests().is_empty());

    stop_tx.send(true).unwrap();
    timeout(Duration::from_millis(500), receiver).await.unwrap().unwrap();
}
