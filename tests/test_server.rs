//! End-to-end tests: bytes in, bytes out, through the accept loop.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use plainhttp::config::Config;
use plainhttp::fs::{MemFs, OsFs};
use plainhttp::http::connection::MAX_HEADER_BYTES;
use plainhttp::server::{
    self, memory_listener, Listener, MemoryConnector, ServerContext, ACCEPT_ERROR_BACKOFF,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const TEST_DIR: &str = "/home/projects/testfiles";

struct TestServer {
    connector: MemoryConnector,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
}

fn start(config: Config, fs: MemFs) -> TestServer {
    let (listener, connector) = memory_listener();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let ctx = Arc::new(ServerContext::new(config, fs));
    let handle = tokio::spawn(server::serve(listener, ctx, shutdown_rx));

    TestServer {
        connector,
        shutdown,
        handle,
    }
}

fn default_config() -> Config {
    Config::default().with_directory(TEST_DIR)
}

impl TestServer {
    async fn exchange(&self, request: &[u8]) -> Vec<u8> {
        let mut client = self.connector.connect().unwrap();
        client.write_all(request).await.unwrap();

        let mut out = Vec::new();
        timeout(Duration::from_secs(3), client.read_to_end(&mut out))
            .await
            .expect("timed out waiting for response")
            .unwrap();
        out
    }
}

#[tokio::test]
async fn test_root_probe() {
    let srv = start(default_config(), MemFs::new());

    let out = srv.exchange(b"GET / HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 200 OK\r\n\r\n");
}

#[tokio::test]
async fn test_echo_with_slashes() {
    let srv = start(default_config(), MemFs::new());

    let out = srv
        .exchange(b"GET /echo/yikes/dooby-Coo HTTP/1.1\r\nHost: localhost:4221\r\nUser-Agent: curl/7.64.1\r\n\r\n")
        .await;
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 15\r\n\r\nyikes/dooby-Coo"
    );
}

#[tokio::test]
async fn test_user_agent() {
    let srv = start(default_config(), MemFs::new());

    let out = srv
        .exchange(b"GET /user-agent HTTP/1.1\r\nHost: localhost:4221\r\nUser-Agent: curl/7.64.1\r\n\r\n")
        .await;
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 11\r\n\r\ncurl/7.64.1"
    );
}

#[tokio::test]
async fn test_user_agent_absent() {
    let srv = start(default_config(), MemFs::new());

    let out = srv.exchange(b"GET /user-agent HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 0\r\n\r\n"
    );
}

#[tokio::test]
async fn test_file_served_with_actual_length() {
    let fs = MemFs::new();
    fs.insert(format!("{}/testfile.txt", TEST_DIR), "Hello, test data!").await;
    fs.insert(format!("{}/longer.txt", TEST_DIR), "a considerably longer file body").await;
    let srv = start(default_config(), fs);

    let out = srv
        .exchange(b"GET /files/testfile.txt HTTP/1.1\r\nHost: localhost:4221\r\n\r\n")
        .await;
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 17\r\n\r\nHello, test data!"
    );

    let out = srv.exchange(b"GET /files/longer.txt HTTP/1.1\r\n\r\n").await;
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 31\r\n\r\na considerably longer file body"
    );
}

#[tokio::test]
async fn test_file_not_found() {
    let srv = start(default_config(), MemFs::new());

    let out = srv.exchange(b"GET /files/testfile.txt HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 404 Not Found\r\n\r\n");
}

#[tokio::test]
async fn test_file_without_directory() {
    let fs = MemFs::new();
    fs.insert("/testfile.txt", "x").await;
    let srv = start(Config::default(), fs);

    let out = srv.exchange(b"GET /files/testfile.txt HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 404 Not Found\r\n\r\n");
}

#[tokio::test]
async fn test_unknown_path() {
    let srv = start(default_config(), MemFs::new());

    let out = srv.exchange(b"GET /somewhere HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 404 Not Found\r\n\r\n");
}

#[tokio::test]
async fn test_non_get_method() {
    let srv = start(default_config(), MemFs::new());

    let out = srv
        .exchange(b"POST /echo/x HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc")
        .await;
    assert_eq!(out, b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
}

#[tokio::test]
async fn test_short_method_is_bad_request() {
    let srv = start(default_config(), MemFs::new());

    let out = srv.exchange(b"G / HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 400 Bad Request\r\n\r\n");
}

#[tokio::test]
async fn test_missing_path_is_bad_request() {
    let srv = start(default_config(), MemFs::new());

    let out = srv.exchange(b"GET\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 400 Bad Request\r\n\r\n");
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let srv = start(default_config(), MemFs::new());

    let mut client = srv.connector.connect().unwrap();
    client.write_all(b"GET /echo/pi").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(b"eces HTTP/1.1\r\nHost: x\r").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(b"\n\r\n").await.unwrap();

    let mut out = Vec::new();
    timeout(Duration::from_secs(3), client.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    assert!(out.ends_with(b"Content-Length: 6\r\n\r\npieces"));
}

#[tokio::test]
async fn test_eof_before_terminator_gets_no_response() {
    let srv = start(default_config(), MemFs::new());

    let mut client = srv.connector.connect().unwrap();
    client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();
    client.shutdown().await.unwrap();

    let mut out = Vec::new();
    timeout(Duration::from_secs(3), client.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let config = default_config().with_read_timeout(Duration::from_millis(50));
    let srv = start(config, MemFs::new());

    let mut client = srv.connector.connect().unwrap();
    let mut out = Vec::new();
    timeout(Duration::from_secs(3), client.read_to_end(&mut out))
        .await
        .expect("server should drop the idle connection")
        .unwrap();
    assert!(out.is_empty());

    // The server keeps accepting after a timed-out connection.
    let out = srv.exchange(b"GET / HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 200 OK\r\n\r\n");
}

#[tokio::test]
async fn test_keep_alive_serves_multiple_requests() {
    let srv = start(default_config(), MemFs::new());

    let mut client = srv.connector.connect().unwrap();
    client
        .write_all(
            b"GET /echo/one HTTP/1.1\r\nConnection: keep-alive\r\n\r\nGET /echo/two HTTP/1.1\r\n\r\n",
        )
        .await
        .unwrap();

    let mut out = Vec::new();
    timeout(Duration::from_secs(3), client.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();

    let expected = [
        &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\none"[..],
        &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\ntwo"[..],
    ]
    .concat();
    assert_eq!(out, expected);
}

#[tokio::test]
async fn test_identical_requests_identical_responses() {
    let fs = MemFs::new();
    fs.insert(format!("{}/f", TEST_DIR), "same bytes").await;
    let srv = start(default_config(), fs);

    for request in [
        &b"GET /echo/abc HTTP/1.1\r\n\r\n"[..],
        &b"GET /files/f HTTP/1.1\r\n\r\n"[..],
        &b"GET /user-agent HTTP/1.1\r\nUser-Agent: t\r\n\r\n"[..],
    ] {
        let first = srv.exchange(request).await;
        let second = srv.exchange(request).await;
        assert_eq!(first, second);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connections() {
    let srv = Arc::new(start(default_config(), MemFs::new()));

    let mut tasks = Vec::new();
    for i in 0..32 {
        let srv = Arc::clone(&srv);
        tasks.push(tokio::spawn(async move {
            let request = format!("GET /echo/{} HTTP/1.1\r\n\r\n", i);
            let out = srv.exchange(request.as_bytes()).await;
            let body = i.to_string();
            let expected = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            assert_eq!(String::from_utf8(out).unwrap(), expected);
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_shutdown_after_blocked_accept() {
    let srv = start(default_config(), MemFs::new());

    // Let the loop reach accept before signalling.
    tokio::time::sleep(Duration::from_millis(50)).await;
    srv.shutdown.send(true).unwrap();

    // The accept already in flight still delivers this connection.
    let out = srv.exchange(b"GET / HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 200 OK\r\n\r\n");

    let result = timeout(Duration::from_secs(3), srv.handle)
        .await
        .expect("serve did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_closed_listener_ends_serve() {
    let (mut listener, connector) = memory_listener();
    listener.close();
    assert!(connector.connect().is_err());

    let (_tx, rx) = watch::channel(false);
    let ctx = Arc::new(ServerContext::new(Config::default(), MemFs::new()));
    let result = timeout(Duration::from_secs(3), server::serve(listener, ctx, rx))
        .await
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_over_tcp_with_os_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"over the wire").unwrap();

    let listener = server::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_tx, rx) = watch::channel(false);
    let ctx = Arc::new(ServerContext::new(
        Config::default().with_directory(dir.path()),
        OsFs,
    ));
    tokio::spawn(server::serve(listener, ctx, rx));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /files/hello.txt HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut out = Vec::new();
    timeout(Duration::from_secs(3), stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 13\r\n\r\nover the wire"
    );
}

#[tokio::test]
async fn test_bind_failure_is_error() {
    let taken = server::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let err = server::bind(&addr).await.unwrap_err();
    assert!(err.to_string().contains("failed to bind"));
}

#[tokio::test]
async fn test_oversized_head_drops_connection() {
    let srv = start(default_config(), MemFs::new());

    let mut client = srv.connector.connect().unwrap();
    let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
    request.resize(MAX_HEADER_BYTES + 6 * 1024, b'a');

    // The server may hang up before the whole head is written.
    let _ = client.write_all(&request).await;

    let mut out = Vec::new();
    let read = timeout(Duration::from_secs(3), client.read_to_end(&mut out))
        .await
        .expect("server should drop the oversized request");
    assert!(read.is_ok());
    assert!(out.is_empty());

    let out = srv.exchange(b"GET / HTTP/1.1\r\n\r\n").await;
    assert_eq!(out, b"HTTP/1.1 200 OK\r\n\r\n");
}

#[tokio::test]
async fn test_serve_until_shutdown_interrupts_blocked_accept() {
    let (listener, _connector) = memory_listener();
    let (tx, rx) = watch::channel(false);
    let ctx = Arc::new(ServerContext::new(Config::default(), MemFs::new()));
    let handle = tokio::spawn(server::serve_until_shutdown(listener, ctx, rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    // No further connection arrives, yet the server still stops.
    let result = timeout(Duration::from_secs(3), handle)
        .await
        .expect("serve_until_shutdown did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_serve_until_shutdown_ignores_dropped_sender() {
    let srv_ctx = Arc::new(ServerContext::new(Config::default(), MemFs::new()));
    let (listener, connector) = memory_listener();
    let (tx, rx) = watch::channel(false);
    drop(tx);
    tokio::spawn(server::serve_until_shutdown(listener, srv_ctx, rx));

    let mut client = connector.connect().unwrap();
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    let mut out = Vec::new();
    timeout(Duration::from_secs(3), client.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out, b"HTTP/1.1 200 OK\r\n\r\n");
}

/// Fails every accept a fixed number of times, then reports itself closed.
struct FailingListener {
    failures_left: u32,
    attempts: Arc<std::sync::atomic::AtomicU32>,
}

impl Listener for FailingListener {
    type Conn = DuplexStream;

    async fn accept(&mut self) -> io::Result<Option<(DuplexStream, String)>> {
        self.attempts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.failures_left == 0 {
            return Ok(None);
        }
        self.failures_left -= 1;
        Err(io::Error::other("too many open files"))
    }
}

#[tokio::test]
async fn test_accept_errors_back_off_and_continue() {
    let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let listener = FailingListener {
        failures_left: 3,
        attempts: Arc::clone(&attempts),
    };
    let (_tx, rx) = watch::channel(false);
    let ctx = Arc::new(ServerContext::new(Config::default(), MemFs::new()));

    let started = Instant::now();
    let result = timeout(Duration::from_secs(3), server::serve(listener, ctx, rx))
        .await
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 4);
    assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF * 3);
}
