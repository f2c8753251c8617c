//! Test utilities & fixtures.
//! Spins up a real server on an ephemeral port and drives it with line-oriented clients.
#![allow(dead_code)] // Each test binary uses a different subset.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rpgchat::server::RpgServer;
use rpgchat::travel::{JwtTravelIssuer, DEFAULT_TOKEN_TTL};
use rpgchat::world::{Grid, World, WorldSettings};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

pub const TRAVEL_SECRET: &str = "integration-secret";
const READ_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestServer {
    pub addr: SocketAddr,
    pub world: Arc<World>,
}

/// Settings with a short walk delay so walk tests finish quickly.
pub fn fast_settings() -> WorldSettings {
    WorldSettings {
        step_delay: Duration::from_millis(20),
        ..WorldSettings::default()
    }
}

pub async fn spawn_server(settings: WorldSettings, grid: Grid) -> TestServer {
    let travel = Arc::new(JwtTravelIssuer::new(TRAVEL_SECRET, DEFAULT_TOKEN_TTL));
    let world = Arc::new(World::new(settings, grid, travel));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let server = RpgServer::from_parts(listener, Arc::clone(&world));
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    TestServer { addr, world }
}

pub async fn default_server() -> TestServer {
    spawn_server(fast_settings(), Grid::new(25, 25)).await
}

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect and send `handshake` as the first line, without reading anything.
    pub async fn connect(addr: SocketAddr, handshake: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        client.send(handshake).await;
        client
    }

    /// Connect as `username` and consume the grid snapshot.
    pub async fn login(addr: SocketAddr, username: &str) -> (Self, Value) {
        let mut client = Self::connect(addr, username).await;
        let snapshot = client.recv_json().await;
        assert!(snapshot.is_array(), "first line must be the grid snapshot, got {snapshot}");
        (client, snapshot)
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write");
    }

    /// Write bytes as-is, without appending a newline.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
    }

    /// Next line without its newline, or `None` on EOF.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .expect("read");
        if n == 0 {
            None
        } else {
            Some(line.trim_end_matches(['\r', '\n']).to_string())
        }
    }

    pub async fn recv_text(&mut self) -> String {
        self.recv_line().await.expect("unexpected EOF")
    }

    pub async fn recv_json(&mut self) -> Value {
        let line = self.recv_text().await;
        serde_json::from_str(&line).unwrap_or_else(|e| panic!("not JSON ({e}): {line}"))
    }

    pub async fn expect_text(&mut self, expected: &str) {
        assert_eq!(self.recv_text().await, expected);
    }

    pub async fn expect_eof(&mut self) {
        assert_eq!(self.recv_line().await, None, "expected the server to close");
    }

    /// Assert nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        let mut line = String::new();
        if let Ok(read) = tokio::time::timeout(wait, self.reader.read_line(&mut line)).await {
            panic!("expected silence, got {:?} ({:?})", line, read.map(|_| ()));
        }
    }
}

/// Log in `a` then `b`, consuming `a`'s copy of `b`'s join announcement.
pub async fn pair(addr: SocketAddr, a: &str, b: &str) -> (TestClient, TestClient) {
    let (mut first, _) = TestClient::login(addr, a).await;
    let (second, _) = TestClient::login(addr, b).await;
    first.expect_text(&format!("{b} joined the chat!")).await;
    (first, second)
}
