use satlink::checksum::checksum;
use satlink::{GroundConfig, GroundStation};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::Level;

/// Shared buffer the fmt subscriber writes into.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_unknown_source_ignored_quietly_but_malformed_warns() {
    let captured = CapturedLogs::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let station = GroundStation::bind(GroundConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        spacecraft_addr: peer.local_addr().unwrap(),
        log_path: dir.path().join("ground.log"),
        recv_timeout: Duration::from_secs(1),
        ..GroundConfig::default()
    })
    .await
    .unwrap();
    let ground_addr = station.local_addr().unwrap();

    let fields = ["2025-08-26", "13:28:40", "radio", "2", "voltage", "1"];
    let sum = checksum(fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]);
    let foreign = serde_json::json!({ "message": format!("{} {}", fields.join(" "), sum) });
    peer.send_to(foreign.to_string().as_bytes(), ground_addr).await.unwrap();
    peer.send_to(b"garbage", ground_addr).await.unwrap();

    assert_eq!(station.receive_once().await, None);
    assert_eq!(station.receive_once().await, None);

    let lines = captured.lines();
    let foreign_line = lines.iter().find(|l| l.contains("\"radio\"")).unwrap();
    assert!(foreign_line.contains("DEBUG"), "{}", foreign_line);

    let malformed_line = lines.iter().find(|l| l.contains("Dropping datagram")).unwrap();
    assert!(malformed_line.contains("WARN"), "{}", malformed_line);
    assert!(!lines.iter().any(|l| l.contains("WARN") && l.contains("radio")));
}
