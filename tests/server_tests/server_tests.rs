//! Server Tests
//!
//! End-to-end tests over real sockets:
//! - PUT/GET round trips and NO_DATA for missing keys
//! - Protocol errors isolated to the offending connection
//! - Connections queue behind busy workers instead of being dropped
//! - Shutdown drains in-flight requests and closes storage
//! - Startup failures map to their exit codes

use std::io::{Read, Write};
use std::net::{Shutdown as NetShutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use quillkv::protocol::{read_response, write_request, Request, RequestOptions, ResponseCode};
use quillkv::{
    Client, Config, QuillError, Result, RunningServer, Server, ServerState, StorageHandle, Store,
    StoredValue,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(temp: &TempDir, workers: usize) -> Config {
    Config::builder()
        .data_dir(temp.path())
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(5)
        .workers(workers)
        .build()
}

fn start_server(workers: usize) -> (TempDir, RunningServer, Client) {
    let temp = TempDir::new().unwrap();
    let server = Server::open(test_config(&temp, workers)).unwrap();
    let running = server.start().unwrap();
    let client = Client::new(running.local_addr().to_string());
    (temp, running, client)
}

/// Poll until `condition` holds or fail after a few seconds
fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Storage whose every operation fails
struct FailingStorage;

impl StorageHandle for FailingStorage {
    fn get(&self, _db: Option<&str>, _key: &[u8]) -> Result<Option<StoredValue>> {
        Err(QuillError::Storage("disk on fire".to_string()))
    }

    fn put(&self, _db: Option<&str>, _key: &[u8], _value: StoredValue, _sync: bool) -> Result<()> {
        Err(QuillError::Storage("disk on fire".to_string()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Request/Response Tests
// =============================================================================

#[test]
fn test_put_then_get() {
    let (_temp, server, client) = start_server(4);

    assert_eq!(client.put("a", "1").unwrap().code, ResponseCode::Ok);

    let response = client.get("a").unwrap();
    assert_eq!(response.code, ResponseCode::Ok);
    assert_eq!(response.value, Some(b"1".to_vec()));

    assert_eq!(client.get("b").unwrap().code, ResponseCode::NoData);

    server.shutdown().unwrap();
}

#[test]
fn test_read_after_ack() {
    let (_temp, server, client) = start_server(4);

    for i in 0..50 {
        let value = format!("v{}", i);
        assert_eq!(client.put("counter", value.clone()).unwrap().code, ResponseCode::Ok);
        assert_eq!(client.get("counter").unwrap().value, Some(value.into_bytes()));
    }

    server.shutdown().unwrap();
}

#[test]
fn test_named_databases_and_compression() {
    let (_temp, server, client) = start_server(2);

    let options = RequestOptions::default().compress(true).sync(true);
    let response = client.put_with(Some("blobs"), "k", vec![0x1f_u8, 0x8b], options).unwrap();
    assert_eq!(response.code, ResponseCode::Ok);

    let response = client.get_from("blobs", "k").unwrap();
    assert_eq!(response.code, ResponseCode::Ok);
    assert!(response.compressed);
    assert_eq!(response.value, Some(vec![0x1f, 0x8b]));

    assert_eq!(client.get("k").unwrap().code, ResponseCode::NoData);

    server.shutdown().unwrap();
}

#[test]
fn test_get_ignores_value_field() {
    let (_temp, server, client) = start_server(2);
    client.put("k", "stored").unwrap();

    let mut request = Request::get("k");
    request.value = Some(b"ignored".to_vec());
    let response = client.send(&request).unwrap();

    assert_eq!(response.value, Some(b"stored".to_vec()));
    server.shutdown().unwrap();
}

#[test]
fn test_keep_alive_serves_multiple_frames() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(5)
        .workers(1)
        .keep_alive(true)
        .build();
    let server = Server::open(config).unwrap().start().unwrap();

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    write_request(&mut stream, &Request::put("x", "1")).unwrap();
    assert_eq!(read_response(&mut stream).unwrap().code, ResponseCode::Ok);
    write_request(&mut stream, &Request::get("x")).unwrap();
    assert_eq!(read_response(&mut stream).unwrap().value, Some(b"1".to_vec()));
    drop(stream);

    server.shutdown().unwrap();
}

// =============================================================================
// Protocol Error Tests
// =============================================================================

#[test]
fn test_malformed_frame_is_isolated() {
    let (_temp, server, client) = start_server(2);

    // PUT|DATA, key "a", value length cut after two bytes; the socket stays open.
    let mut raw = TcpStream::connect(server.local_addr()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&[0x41, 0x00, 0x01, b'a', 0x00, 0x00]).unwrap();
    wait_for(|| server.busy_workers() == 1);

    // Served by the other worker while the broken frame is still pending.
    assert_eq!(client.put("b", "1").unwrap().code, ResponseCode::Ok);
    assert_eq!(client.get("b").unwrap().value, Some(b"1".to_vec()));
    wait_for(|| server.busy_workers() == 1);

    raw.shutdown(NetShutdown::Write).unwrap();
    let mut reply = Vec::new();
    raw.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, vec![0x01]);

    assert_eq!(client.get("a").unwrap().code, ResponseCode::NoData);
    server.shutdown().unwrap();
}

#[test]
fn test_stalled_frame_times_out_with_proto_error() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(5)
        .read_timeout_ms(300)
        .workers(1)
        .build();
    let server = Server::open(config).unwrap().start().unwrap();

    let mut raw = TcpStream::connect(server.local_addr()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&[0x41, 0x00, 0x01, b'a', 0x00, 0x00]).unwrap();

    // No half-close: the server's read timeout ends the frame.
    let mut reply = Vec::new();
    raw.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, vec![0x01]);

    server.shutdown().unwrap();
}

#[test]
fn test_idle_connection_times_out_silently() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(5)
        .read_timeout_ms(100)
        .workers(1)
        .build();
    let server = Server::open(config).unwrap().start().unwrap();

    let mut raw = TcpStream::connect(server.local_addr()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut reply = Vec::new();
    raw.read_to_end(&mut reply).unwrap();
    assert!(reply.is_empty());

    server.shutdown().unwrap();
}

#[test]
fn test_put_without_data_is_proto_error() {
    let (_temp, server, _client) = start_server(1);

    let mut raw = TcpStream::connect(server.local_addr()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    // Rejected on the control byte alone
    raw.write_all(&[0x01]).unwrap();
    raw.shutdown(NetShutdown::Write).unwrap();

    let mut reply = Vec::new();
    raw.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, vec![0x01]);

    server.shutdown().unwrap();
}

#[test]
fn test_silent_close_gets_no_response() {
    let (_temp, server, client) = start_server(1);

    drop(TcpStream::connect(server.local_addr()).unwrap());

    // The worker survives and serves the next connection.
    assert_eq!(client.put("k", "v").unwrap().code, ResponseCode::Ok);
    server.shutdown().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_connections_queue_behind_busy_workers() {
    let (_temp, server, client) = start_server(1);

    // Occupy the only worker with a connection that sends nothing yet.
    let idle = TcpStream::connect(server.local_addr()).unwrap();
    wait_for(|| server.busy_workers() == 1);

    let mut waiting = vec![];
    for i in 0..3 {
        let client = client.clone();
        waiting.push(thread::spawn(move || client.put(format!("k{}", i), "v").unwrap().code));
    }

    thread::sleep(Duration::from_millis(50));
    drop(idle);

    for handle in waiting {
        assert_eq!(handle.join().unwrap(), ResponseCode::Ok);
    }
    server.shutdown().unwrap();
}

#[test]
fn test_parallel_clients() {
    let (_temp, server, client) = start_server(4);

    let mut handles = vec![];
    for t in 0..8 {
        let client = client.clone();
        handles.push(thread::spawn(move || {
            for i in 0..20 {
                let key = format!("t{}-{}", t, i);
                assert_eq!(client.put(key.clone(), "v").unwrap().code, ResponseCode::Ok);
                assert_eq!(client.get(key).unwrap().code, ResponseCode::Ok);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // One connection per request
    wait_for(|| server.connections_served() == 320);

    let stats = server.shutdown().unwrap();
    assert_eq!(stats.applied, 160);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_state_transitions() {
    let temp = TempDir::new().unwrap();
    let server = Server::open(test_config(&temp, 1)).unwrap();
    assert_eq!(server.state(), ServerState::Initializing);

    let running = server.start().unwrap();
    assert_eq!(running.state(), ServerState::Running);
    assert_eq!(running.live_workers(), 1);

    running.shutdown().unwrap();
}

#[test]
fn test_shutdown_drains_in_flight_put() {
    let temp = TempDir::new().unwrap();
    let server = Server::open(test_config(&temp, 1)).unwrap().start().unwrap();
    let shutdown = server.shutdown_handle();

    let frame = quillkv::protocol::encode_request(&Request::put("late", "write")).unwrap();
    let mut raw = TcpStream::connect(server.local_addr()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&frame[..1]).unwrap();
    wait_for(|| server.busy_workers() == 1);

    shutdown.trigger();
    let waiter = thread::spawn(move || server.wait());

    raw.write_all(&frame[1..]).unwrap();
    assert_eq!(read_response(&mut raw).unwrap().code, ResponseCode::Ok);

    let stats = waiter.join().unwrap().unwrap();
    assert_eq!(stats.applied, 1);

    let store = Store::open_path(temp.path()).unwrap();
    assert_eq!(
        store.get(None, b"late").unwrap(),
        Some(StoredValue::new("write", false))
    );
}

#[test]
fn test_shutdown_closes_storage() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open_path(temp.path()).unwrap());
    let server = Server::with_storage(test_config(&temp, 1), store.clone() as Arc<dyn StorageHandle>);

    server.start().unwrap().shutdown().unwrap();

    assert!(store.is_closed());
}

#[test]
fn test_storage_failure_is_server_error() {
    let temp = TempDir::new().unwrap();
    let server = Server::with_storage(test_config(&temp, 1), Arc::new(FailingStorage))
        .start()
        .unwrap();
    let client = Client::new(server.local_addr().to_string());

    assert_eq!(client.put("k", "v").unwrap().code, ResponseCode::ServerError);
    assert_eq!(client.get("k").unwrap().code, ResponseCode::ServerError);

    let stats = server.shutdown().unwrap();
    assert_eq!(stats.failed, 1);
}

// =============================================================================
// Startup Failure Tests
// =============================================================================

#[test]
fn test_bind_failure_exit_code() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap().to_string();

    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open_path(temp.path()).unwrap());
    let config = Config::builder()
        .data_dir(temp.path())
        .listen_addr(addr)
        .workers(2)
        .build();

    let err = match Server::with_storage(config, store.clone()).start() {
        Err(e) => e,
        Ok(_) => panic!("bind on an occupied port should fail"),
    };

    assert!(matches!(err, QuillError::Bind { .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(store.is_closed());
}

#[test]
fn test_zero_workers_exit_code() {
    let temp = TempDir::new().unwrap();
    let err = match Server::open(test_config(&temp, 0)).unwrap().start() {
        Err(e) => e,
        Ok(_) => panic!("a pool without workers should not start"),
    };

    assert!(matches!(err, QuillError::NoWorkers));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_storage_open_failure_exit_code() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    std::fs::write(&file_path, b"x").unwrap();

    let config = Config::builder().data_dir(&file_path).build();
    let err = match Server::open(config) {
        Err(e) => e,
        Ok(_) => panic!("opening storage under a file should fail"),
    };

    assert!(matches!(err, QuillError::StorageOpen(_)));
    assert_eq!(err.exit_code(), 1);
}
