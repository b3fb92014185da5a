//! End-to-end JSON server tests: framing on worker threads, replies routed
//! back through the pool.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use netpool::{NetworkPool, WorkQueue};
use netpool_json::{JsonHandler, JsonServer};

struct WrapHandler;

impl JsonHandler for WrapHandler {
    fn on_message(&self, message: &[u8]) -> Option<Vec<u8>> {
        let mut reply = b"ack:".to_vec();
        reply.extend_from_slice(message);
        Some(reply)
    }
}

fn start_server(pool: &NetworkPool, queue: Arc<WorkQueue>) -> SocketAddr {
    let (bound_tx, bound_rx) = mpsc::channel();
    let server = JsonServer::new(pool.handle(), queue, Arc::new(WrapHandler)).on_bound(
        move |_, local| {
            let _ = bound_tx.send(local);
        },
    );
    pool.bind_tcp("127.0.0.1:0".parse().unwrap(), Box::new(server));
    bound_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("server did not bind")
}

fn read_exact_len(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    let mut total = 0;
    while total < len {
        match stream.read(&mut buf[total..]) {
            Ok(0) => panic!("connection closed after {total} bytes"),
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => panic!("read error: {e}"),
        }
    }
    buf
}

#[test]
fn message_round_trip() {
    let pool = NetworkPool::new().expect("pool");
    let queue = Arc::new(WorkQueue::new(2).unwrap());
    let addr = start_server(&pool, queue.clone());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(b"{\"op\":\"ping\"}").unwrap();

    let expected = b"ack:{\"op\":\"ping\"}";
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);
}

#[test]
fn message_split_across_writes() {
    let pool = NetworkPool::new().expect("pool");
    let queue = Arc::new(WorkQueue::new(2).unwrap());
    let addr = start_server(&pool, queue.clone());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(b"{\"a\":").unwrap();
    stream.flush().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    stream.write_all(b"1,\"b\":[2,3]}").unwrap();

    let expected = b"ack:{\"a\":1,\"b\":[2,3]}";
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);
}

#[test]
fn back_to_back_messages_on_one_connection() {
    let pool = NetworkPool::new().expect("pool");
    let queue = Arc::new(WorkQueue::new(2).unwrap());
    let addr = start_server(&pool, queue.clone());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    for i in 0..3 {
        let msg = format!("{{\"seq\":{i}}}");
        stream.write_all(msg.as_bytes()).unwrap();
        let expected = format!("ack:{msg}");
        assert_eq!(
            read_exact_len(&mut stream, expected.len()),
            expected.as_bytes()
        );
    }
}

#[test]
fn non_json_input_closes_connection() {
    let pool = NetworkPool::new().expect("pool");
    let queue = Arc::new(WorkQueue::new(2).unwrap());
    let addr = start_server(&pool, queue.clone());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(b"definitely not json").unwrap();

    let mut buf = [0u8; 16];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break, // closed, as expected
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => panic!("read error: {e}"),
        }
    }
}
