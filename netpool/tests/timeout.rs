//! Timeout and graceful-close behaviour over real connections.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use netpool::{
    PoolHandle, NetworkPool, SlabBlock, SocketId, TcpCallback, TcpServerCallback,
    TcpTimeoutSettings,
};

struct IdleSession {
    timeouts: TcpTimeoutSettings,
    shutdowns: Arc<AtomicU32>,
}

impl TcpCallback for IdleSession {
    fn on_startup(&mut self, _id: SocketId, _peer: SocketAddr) {}
    fn on_data(&mut self, _chunk: SlabBlock) {}
    fn on_shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
    fn timeouts(&self) -> TcpTimeoutSettings {
        self.timeouts
    }
}

struct IdleServer {
    timeouts: TcpTimeoutSettings,
    bound_tx: mpsc::Sender<SocketAddr>,
    shutdowns: Arc<AtomicU32>,
}

impl TcpServerCallback for IdleServer {
    fn new_session(&mut self) -> Box<dyn TcpCallback> {
        Box::new(IdleSession {
            timeouts: self.timeouts,
            shutdowns: self.shutdowns.clone(),
        })
    }
    fn on_startup(&mut self, _id: SocketId, local: SocketAddr) {
        let _ = self.bound_tx.send(local);
    }
    fn on_shutdown(&mut self) {}
}

fn bind_idle_server(
    pool: &NetworkPool,
    timeouts: TcpTimeoutSettings,
    shutdowns: Arc<AtomicU32>,
) -> SocketAddr {
    let (bound_tx, bound_rx) = mpsc::channel();
    pool.bind_tcp(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(IdleServer {
            timeouts,
            bound_tx,
            shutdowns,
        }),
    );
    bound_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("server did not bind")
}

#[test]
fn idle_timeout_closes_silent_connection() {
    let shutdowns = Arc::new(AtomicU32::new(0));
    let pool = NetworkPool::new().expect("pool");
    let timeouts = TcpTimeoutSettings {
        connect_secs: 10,
        idle_secs: 1,
        send_secs: 10,
    };
    let addr = bind_idle_server(&pool, timeouts, shutdowns.clone());

    let start = Instant::now();
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    // Send nothing; the idle timer should close the connection.
    let mut buf = [0u8; 8];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => panic!("read error: {e}"),
        }
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "closed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(8), "closed too late: {elapsed:?}");
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn activity_defers_idle_timeout() {
    let shutdowns = Arc::new(AtomicU32::new(0));
    let pool = NetworkPool::new().expect("pool");
    let timeouts = TcpTimeoutSettings {
        connect_secs: 10,
        idle_secs: 1,
        send_secs: 10,
    };
    let addr = bind_idle_server(&pool, timeouts, shutdowns.clone());

    let mut stream = TcpStream::connect(addr).unwrap();
    // Keep the connection busy past the idle window.
    for _ in 0..4 {
        std::thread::sleep(Duration::from_millis(400));
        stream.write_all(b"ping").unwrap();
    }
    // 1.6 s of traffic against a 1 s idle timeout: still open.
    assert_eq!(shutdowns.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_idle_timeout_disables_it() {
    let shutdowns = Arc::new(AtomicU32::new(0));
    let pool = NetworkPool::new().expect("pool");
    let timeouts = TcpTimeoutSettings {
        connect_secs: 10,
        idle_secs: 0,
        send_secs: 10,
    };
    let addr = bind_idle_server(&pool, timeouts, shutdowns.clone());

    let _stream = TcpStream::connect(addr).unwrap();
    std::thread::sleep(Duration::from_millis(1500));
    assert_eq!(shutdowns.load(Ordering::SeqCst), 0);
}

#[test]
fn graceful_close_flushes_queued_writes() {
    // The session responds with a large payload and immediately requests a
    // graceful close; the client must still receive every byte, then EOF.
    const RESPONSE_LEN: usize = 256 * 1024;

    struct FlushSession {
        pool: PoolHandle,
        id: Option<SocketId>,
    }
    impl TcpCallback for FlushSession {
        fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
            self.id = Some(id);
        }
        fn on_data(&mut self, _chunk: SlabBlock) {
            let id = self.id.unwrap();
            let payload: Vec<u8> = (0..RESPONSE_LEN).map(|i| (i % 239) as u8).collect();
            self.pool.send_tcp(id, &payload);
            self.pool.close(id, false);
        }
        fn on_shutdown(&mut self) {}
    }
    struct FlushServer {
        pool: PoolHandle,
        bound_tx: mpsc::Sender<SocketAddr>,
    }
    impl TcpServerCallback for FlushServer {
        fn new_session(&mut self) -> Box<dyn TcpCallback> {
            Box::new(FlushSession {
                pool: self.pool.clone(),
                id: None,
            })
        }
        fn on_startup(&mut self, _id: SocketId, local: SocketAddr) {
            let _ = self.bound_tx.send(local);
        }
        fn on_shutdown(&mut self) {}
    }

    let pool = NetworkPool::new().expect("pool");
    let (bound_tx, bound_rx) = mpsc::channel();
    pool.bind_tcp(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(FlushServer {
            pool: pool.handle(),
            bound_tx,
        }),
    );
    let addr = bound_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream.write_all(b"go").unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => panic!("read error: {e}"),
        }
    }
    assert_eq!(received.len(), RESPONSE_LEN);
    let expected: Vec<u8> = (0..RESPONSE_LEN).map(|i| (i % 239) as u8).collect();
    assert_eq!(received, expected);
}
