//! Integration tests: echo servers over real TCP connections.
//!
//! Each test spins up a pool, binds an echo server, connects with std TCP,
//! and verifies the bytes that come back.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use netpool::{
    NetworkPool, PoolHandle, SlabBlock, SocketId, TcpCallback, TcpServerCallback, WorkQueue,
};

// ── Echo session ────────────────────────────────────────────────────

struct EchoSession {
    pool: PoolHandle,
    id: Option<SocketId>,
    shutdowns: Arc<AtomicU32>,
}

impl TcpCallback for EchoSession {
    fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
        self.id = Some(id);
    }

    fn on_data(&mut self, chunk: SlabBlock) {
        if let Some(id) = self.id {
            self.pool.send_tcp(id, chunk.as_slice());
        }
    }

    fn on_shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct EchoServer {
    pool: PoolHandle,
    bound_tx: mpsc::Sender<SocketAddr>,
    shutdowns: Arc<AtomicU32>,
}

impl TcpServerCallback for EchoServer {
    fn new_session(&mut self) -> Box<dyn TcpCallback> {
        Box::new(EchoSession {
            pool: self.pool.clone(),
            id: None,
            shutdowns: self.shutdowns.clone(),
        })
    }

    fn on_startup(&mut self, _id: SocketId, local: SocketAddr) {
        let _ = self.bound_tx.send(local);
    }

    fn on_shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn start_echo_server(pool: &NetworkPool, shutdowns: Arc<AtomicU32>) -> SocketAddr {
    let (bound_tx, bound_rx) = mpsc::channel();
    pool.bind_tcp(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(EchoServer {
            pool: pool.handle(),
            bound_tx,
            shutdowns,
        }),
    );
    bound_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("server did not bind")
}

fn echo_round_trip(addr: SocketAddr, msg: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(msg).unwrap();
    stream.flush().unwrap();

    let mut buf = vec![0u8; msg.len()];
    let mut total = 0;
    while total < msg.len() {
        match stream.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => panic!("read error: {e}"),
        }
    }
    buf.truncate(total);
    buf
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn echo_small_message() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_echo_server(&pool, Arc::new(AtomicU32::new(0)));

    let msg = b"Hello, netpool!";
    assert_eq!(echo_round_trip(addr, msg), msg);
}

#[test]
fn echo_large_message() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_echo_server(&pool, Arc::new(AtomicU32::new(0)));

    // 64 KiB, far larger than one receive chunk: exercises chunked reads
    // and in-order write queueing.
    let msg: Vec<u8> = (0..65536).map(|i| (i % 251) as u8).collect();
    assert_eq!(echo_round_trip(addr, &msg), msg);
}

#[test]
fn echo_multiple_connections() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_echo_server(&pool, Arc::new(AtomicU32::new(0)));

    let mut handles = Vec::new();
    for i in 0..4 {
        handles.push(std::thread::spawn(move || {
            let msg = format!("connection {i}");
            assert_eq!(echo_round_trip(addr, msg.as_bytes()), msg.as_bytes());
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn echo_sequential_sends() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_echo_server(&pool, Arc::new(AtomicU32::new(0)));

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    for round in 0..5 {
        let msg = format!("round {round}");
        stream.write_all(msg.as_bytes()).unwrap();
        let mut buf = vec![0u8; msg.len()];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, msg.as_bytes());
    }
}

#[test]
fn pool_drop_fires_server_shutdown() {
    let shutdowns = Arc::new(AtomicU32::new(0));
    let pool = NetworkPool::new().expect("pool");
    let _addr = start_echo_server(&pool, shutdowns.clone());

    drop(pool);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn unbind_fires_server_shutdown_once() {
    struct Server {
        bound_tx: mpsc::Sender<(SocketId, SocketAddr)>,
        shutdowns: Arc<AtomicU32>,
    }
    impl TcpServerCallback for Server {
        fn new_session(&mut self) -> Box<dyn TcpCallback> {
            unreachable!("no connections in this test")
        }
        fn on_startup(&mut self, id: SocketId, local: SocketAddr) {
            let _ = self.bound_tx.send((id, local));
        }
        fn on_shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    let shutdowns = Arc::new(AtomicU32::new(0));
    let pool = NetworkPool::new().expect("pool");
    let (bound_tx, bound_rx) = mpsc::channel();
    pool.bind_tcp(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(Server {
            bound_tx,
            shutdowns: shutdowns.clone(),
        }),
    );
    let (id, _) = bound_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    pool.unbind_tcp(id);
    pool.unbind_tcp(id); // second unbind is a no-op
    drop(pool); // teardown must not fire it again
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn close_is_idempotent() {
    // The session closes itself three times on first data; exactly one
    // shutdown must fire.
    struct CloseHappy {
        pool: PoolHandle,
        id: Option<SocketId>,
        shutdowns: Arc<AtomicU32>,
    }
    impl TcpCallback for CloseHappy {
        fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
            self.id = Some(id);
        }
        fn on_data(&mut self, _chunk: SlabBlock) {
            let id = self.id.unwrap();
            self.pool.close(id, false);
            self.pool.close(id, false);
            self.pool.close(id, true);
        }
        fn on_shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }
    struct Factory {
        pool: PoolHandle,
        bound_tx: mpsc::Sender<SocketAddr>,
        shutdowns: Arc<AtomicU32>,
    }
    impl TcpServerCallback for Factory {
        fn new_session(&mut self) -> Box<dyn TcpCallback> {
            Box::new(CloseHappy {
                pool: self.pool.clone(),
                id: None,
                shutdowns: self.shutdowns.clone(),
            })
        }
        fn on_startup(&mut self, _id: SocketId, local: SocketAddr) {
            let _ = self.bound_tx.send(local);
        }
        fn on_shutdown(&mut self) {}
    }

    let shutdowns = Arc::new(AtomicU32::new(0));
    let pool = NetworkPool::new().expect("pool");
    let (bound_tx, bound_rx) = mpsc::channel();
    pool.bind_tcp(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(Factory {
            pool: pool.handle(),
            bound_tx,
            shutdowns: shutdowns.clone(),
        }),
    );
    let addr = bound_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(b"trigger").unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buf = [0u8; 16];
    // Server closes; we observe EOF.
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => panic!("read error: {e}"),
        }
    }
    // Give the reactor a beat to run the remaining close commands.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn outbound_connect_round_trip() {
    struct Client {
        pool: PoolHandle,
        id: Option<SocketId>,
        received: Vec<u8>,
        done_tx: mpsc::Sender<Vec<u8>>,
    }
    impl TcpCallback for Client {
        fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
            self.id = Some(id);
            self.pool.send_tcp(id, b"greetings");
        }
        fn on_data(&mut self, chunk: SlabBlock) {
            self.received.extend_from_slice(chunk.as_slice());
            if self.received.len() >= 9 {
                let _ = self.done_tx.send(std::mem::take(&mut self.received));
            }
        }
        fn on_shutdown(&mut self) {}
    }

    let pool = NetworkPool::new().expect("pool");
    let addr = start_echo_server(&pool, Arc::new(AtomicU32::new(0)));

    let (done_tx, done_rx) = mpsc::channel();
    pool.connect(
        addr,
        Box::new(Client {
            pool: pool.handle(),
            id: None,
            received: Vec::new(),
            done_tx,
        }),
    );
    let echoed = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(echoed, b"greetings");
}

#[test]
fn send_from_worker_thread() {
    // Scenario: a parse task on a worker thread replies through the pool.
    struct WorkerEcho {
        pool: PoolHandle,
        queue: Arc<WorkQueue>,
        id: Option<SocketId>,
    }
    impl TcpCallback for WorkerEcho {
        fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
            self.id = Some(id);
        }
        fn on_data(&mut self, chunk: SlabBlock) {
            let id = self.id.unwrap();
            let pool = self.pool.clone();
            let data = chunk.as_slice().to_vec();
            self.queue.push_fn(move || {
                pool.send_tcp(id, &data);
            });
        }
        fn on_shutdown(&mut self) {}
    }
    struct Factory {
        pool: PoolHandle,
        queue: Arc<WorkQueue>,
        bound_tx: mpsc::Sender<SocketAddr>,
    }
    impl TcpServerCallback for Factory {
        fn new_session(&mut self) -> Box<dyn TcpCallback> {
            Box::new(WorkerEcho {
                pool: self.pool.clone(),
                queue: self.queue.clone(),
                id: None,
            })
        }
        fn on_startup(&mut self, _id: SocketId, local: SocketAddr) {
            let _ = self.bound_tx.send(local);
        }
        fn on_shutdown(&mut self) {}
    }

    let pool = NetworkPool::new().expect("pool");
    let queue = Arc::new(WorkQueue::new(2).unwrap());
    let (bound_tx, bound_rx) = mpsc::channel();
    pool.bind_tcp(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(Factory {
            pool: pool.handle(),
            queue: queue.clone(),
            bound_tx,
        }),
    );
    let addr = bound_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let msg = b"routed via worker";
    assert_eq!(echo_round_trip(addr, msg), msg);
}
