//! End-to-end tests: a real hub on 127.0.0.1 with TCP clients playing
//! effects and the button.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use xc_hub::{Config, Hub};

const WAIT: Duration = Duration::from_secs(3);

fn test_config() -> Config {
    Config {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..Config::default()
    }
}

async fn start_hub(config: Config) -> SocketAddr {
    let hub = Hub::bind(config).await.unwrap();
    let addr = hub.local_addr();
    tokio::spawn(hub.run());
    addr
}

/// Give the hub a moment to process what was just sent.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

struct TestClient {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(WAIT, TcpStream::connect(addr)).await.unwrap().unwrap();
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Connect and announce `name`.
    async fn effect(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(name).await;
        client
    }

    async fn send(&mut self, record: &str) {
        self.send_raw(format!("{record}\0").as_bytes()).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Next NUL-terminated record from the hub.
    async fn recv(&mut self) -> String {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == 0) {
                let record: Vec<u8> = self.pending.drain(..=pos).collect();
                return String::from_utf8_lossy(&record[..pos]).into_owned();
            }
            let mut buf = [0u8; 256];
            let n = timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for hub")
                .unwrap();
            assert!(n > 0, "hub closed the connection");
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    async fn assert_silent(&mut self, wait: Duration) {
        assert!(self.pending.is_empty(), "unexpected buffered data");
        let mut buf = [0u8; 64];
        let result = timeout(wait, self.stream.read(&mut buf)).await;
        match result {
            Err(_) => {}
            Ok(read) => panic!("expected silence, got {read:?} {:?}", &buf[..8]),
        }
    }

    async fn assert_closed(&mut self) {
        let mut buf = [0u8; 64];
        let result = timeout(WAIT, self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for close");
        assert!(matches!(result, Ok(0) | Err(_)), "expected close, got {result:?}");
    }
}

#[tokio::test]
async fn test_button_one_reaches_every_effect_but_the_button() {
    let addr = start_hub(test_config()).await;
    let mut dragon = TestClient::effect(addr, "DRAGON").await;
    let mut loki = TestClient::effect(addr, "LOKI").await;
    let mut button = TestClient::effect(addr, "B").await;
    settle().await;

    button.send("B:1:1").await;
    assert_eq!(dragon.recv().await, "$p1%");
    assert_eq!(loki.recv().await, "$p1%");

    button.send("B:1:0").await;
    assert_eq!(dragon.recv().await, "$p0%");
    assert_eq!(loki.recv().await, "$p0%");

    button.assert_silent(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_record_split_across_writes() {
    let addr = start_hub(test_config()).await;
    let mut dragon = TestClient::connect(addr).await;
    dragon.send_raw(b"DRAGO").await;
    settle().await;
    dragon.send_raw(b"N\r\n").await;

    let mut button = TestClient::effect(addr, "B").await;
    settle().await;

    button.send("B:3:1").await;
    assert_eq!(dragon.recv().await, "$p2%");
}

#[tokio::test]
async fn test_reconnect_from_same_address_replaces_old_connection() {
    let addr = start_hub(test_config()).await;
    let mut first = TestClient::effect(addr, "LOKI").await;
    settle().await;

    let mut second = TestClient::effect(addr, "LOKI").await;
    first.assert_closed().await;

    let mut button = TestClient::effect(addr, "B").await;
    settle().await;
    button.send("B:1:1").await;
    assert_eq!(second.recv().await, "$p1%");
}

#[tokio::test]
async fn test_collection_broadcast() {
    let addr = start_hub(test_config()).await;
    let mut organ = TestClient::effect(addr, "ORGAN").await;
    let mut lulu = TestClient::effect(addr, "LULU").await;
    let mut betty = TestClient::effect(addr, "BIGBETTY").await;
    let mut loki = TestClient::effect(addr, "LOKI").await;
    settle().await;

    organ.send("ORGAN:*:CC:LULU,BIGBETTY").await;
    organ.send("ORGAN:fire").await;

    assert_eq!(lulu.recv().await, "fire");
    assert_eq!(betty.recv().await, "fire");
    loki.assert_silent(Duration::from_millis(150)).await;
    organ.assert_silent(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_do_not_send_and_kill_all() {
    let addr = start_hub(test_config()).await;
    let mut button = TestClient::effect(addr, "B").await;
    button.send("B:*:DS:1").await;
    let mut dragon = TestClient::effect(addr, "DRAGON").await;
    let mut loki = TestClient::effect(addr, "LOKI").await;
    settle().await;

    dragon.send("DRAGON:*:XX").await;
    assert_eq!(loki.recv().await, "$p0%");
    assert_eq!(dragon.recv().await, "$p0%");
    button.assert_silent(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_two_names_on_one_connection_get_one_command() {
    let addr = start_hub(test_config()).await;
    let mut shared = TestClient::connect(addr).await;
    shared.send_raw(b"LOKI\0DRAGON\0").await;
    let mut button = TestClient::effect(addr, "B").await;
    settle().await;

    button.send("B:1:1").await;
    assert_eq!(shared.recv().await, "$p1%");
    shared.assert_silent(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_overlong_record_tail_is_not_bound() {
    let addr = start_hub(test_config()).await;
    let mut noisy = TestClient::connect(addr).await;
    let mut flood = vec![b'A'; 8192];
    flood.extend_from_slice(b"KL:fire");
    noisy.send_raw(&flood).await;
    settle().await;
    noisy.send_raw(b"\0").await;
    let mut button = TestClient::effect(addr, "B").await;
    settle().await;

    // The tail of the rejected record never registered a "KL" effect, so
    // the connection has no name and receives nothing.
    button.send("B:1:1").await;
    noisy.assert_silent(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_round_fires_without_other_traffic() {
    let addr = start_hub(test_config()).await;
    let mut dragon = TestClient::effect(addr, "DRAGON").await;
    let mut button = TestClient::effect(addr, "B").await;
    settle().await;

    button.send("B:2:1").await;
    for _ in 0..7 {
        assert_eq!(dragon.recv().await, "$p1%");
        assert_eq!(dragon.recv().await, "$p0%");
    }
    dragon.assert_silent(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_kill_all_cancels_pending_round() {
    let config = Config {
        pass_delays_ms: vec![400],
        ..test_config()
    };
    let addr = start_hub(config).await;
    let mut dragon = TestClient::effect(addr, "DRAGON").await;
    let mut button = TestClient::effect(addr, "B").await;
    settle().await;

    button.send("B:2:1").await;
    assert_eq!(dragon.recv().await, "$p1%");

    button.send("B:*:XX").await;
    assert_eq!(dragon.recv().await, "$p0%");
    dragon.assert_silent(Duration::from_millis(600)).await;
}

#[tokio::test]
async fn test_garbage_does_not_disturb_the_hub() {
    let addr = start_hub(test_config()).await;
    let mut dragon = TestClient::effect(addr, "DRAGON").await;
    let mut noisy = TestClient::connect(addr).await;
    noisy
        .send_raw(b":::\0\x01\x02\0NOISY:*:ZZ\0NOISY:*:DS:maybe\0")
        .await;
    let mut button = TestClient::effect(addr, "B").await;
    settle().await;

    button.send("B:1:1").await;
    assert_eq!(dragon.recv().await, "$p1%");
    assert_eq!(noisy.recv().await, "$p1%");
}
