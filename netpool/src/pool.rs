//! The public pool façade.
//!
//! [`NetworkPool`] owns the reactor thread. Every mutating method — on the
//! pool itself or on a cloned [`PoolHandle`] — appends a pending command
//! under the command mutex and signals the async-wake handle; the reactor
//! drains the queues and performs the socket work. Methods are
//! fire-and-forget: outcomes surface through the callback traits.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use crate::callback::{TcpCallback, TcpServerCallback, UdpCallback};
use crate::command::{
    PendingBind, PendingClose, PendingConnect, PendingQueues, PendingSendTcp, PendingSendUdp,
};
use crate::driver::Driver;
use crate::error::Error;
use crate::poller::WakeFd;

/// Largest UDP payload accepted at the API boundary (65 535 minus IP and
/// UDP headers).
pub const UDP_MAX_PAYLOAD: usize = 65_507;

/// Identifies one socket for the lifetime of the pool. Minted monotonically
/// by the reactor; treated as unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    pub(crate) fn from_raw(raw: u64) -> SocketId {
        SocketId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct PoolShared {
    pub pending: Mutex<PendingQueues>,
    pub wake: WakeFd,
    pub want_exit: AtomicBool,
    loop_thread: OnceLock<thread::ThreadId>,
}

impl PoolShared {
    pub fn mark_loop_thread(&self) {
        let _ = self.loop_thread.set(thread::current().id());
    }

    pub fn on_loop_thread(&self) -> bool {
        self.loop_thread.get() == Some(&thread::current().id())
    }

    /// Append a command; wake the loop unless we already are the loop (in
    /// which case the driver drains the queue before sleeping again).
    fn enqueue(&self, push: impl FnOnce(&mut PendingQueues)) {
        {
            let mut queues = self.pending.lock().unwrap();
            push(&mut queues);
        }
        if !self.on_loop_thread() {
            self.wake.notify();
        }
    }

    pub fn bind_tcp(&self, local: SocketAddr, factory: Box<dyn TcpServerCallback>) {
        self.enqueue(|q| q.binds.push_back(PendingBind::Tcp { local, factory }));
    }

    pub fn unbind_tcp(&self, id: SocketId) {
        self.enqueue(|q| q.binds.push_back(PendingBind::UnbindTcp { id }));
    }

    pub fn bind_udp(&self, local: SocketAddr, callback: Box<dyn UdpCallback>) {
        self.enqueue(|q| q.binds.push_back(PendingBind::Udp { local, callback }));
    }

    pub fn unbind_udp(&self, id: SocketId) {
        self.enqueue(|q| q.binds.push_back(PendingBind::UnbindUdp { id }));
    }

    pub fn connect(&self, remote: SocketAddr, callback: Box<dyn TcpCallback>) {
        self.enqueue(|q| q.connects.push_back(PendingConnect { remote, callback }));
    }

    pub fn send_tcp(&self, id: SocketId, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let data = data.to_vec();
        self.enqueue(|q| q.tcp_sends.push_back(PendingSendTcp { id, data }));
    }

    pub fn send_udp(&self, id: SocketId, remote: SocketAddr, data: &[u8]) {
        if data.is_empty() || data.len() > UDP_MAX_PAYLOAD {
            return;
        }
        let data = data.to_vec();
        self.enqueue(|q| q.udp_sends.push_back(PendingSendUdp { id, remote, data }));
    }

    pub fn close(&self, id: SocketId, force: bool) {
        self.enqueue(|q| q.closes.push_back(PendingClose { id, force }));
    }
}

/// A single-reactor TCP/UDP pool.
///
/// Dropping the pool requests exit, wakes the reactor, and joins it; every
/// live server, socket, and connection sees its `on_shutdown` before the
/// drop returns, and no callback fires afterwards.
pub struct NetworkPool {
    shared: Arc<PoolShared>,
    thread: Option<thread::JoinHandle<()>>,
}

impl NetworkPool {
    /// Spawn the reactor thread. Fails if the event loop cannot be set up.
    pub fn new() -> Result<NetworkPool, Error> {
        let shared = Arc::new(PoolShared {
            pending: Mutex::new(PendingQueues::default()),
            wake: WakeFd::new()?,
            want_exit: AtomicBool::new(false),
            loop_thread: OnceLock::new(),
        });

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), std::io::Error>>(1);
        let loop_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("netpool-reactor".to_string())
            .spawn(move || {
                loop_shared.mark_loop_thread();
                let driver = match Driver::new(loop_shared) {
                    Ok(driver) => {
                        let _ = ready_tx.send(Ok(()));
                        driver
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                driver.run();
            })
            .map_err(Error::Io)?;

        let mut pool = NetworkPool {
            shared,
            thread: Some(thread),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(pool),
            Ok(Err(err)) => {
                if let Some(thread) = pool.thread.take() {
                    let _ = thread.join();
                }
                Err(Error::Io(err))
            }
            Err(_) => {
                if let Some(thread) = pool.thread.take() {
                    let _ = thread.join();
                }
                Err(Error::ReactorSetup("reactor thread died during startup".into()))
            }
        }
    }

    /// A cheap clonable command surface for sessions and worker threads.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: self.shared.clone(),
        }
    }

    /// Listen on `local`; each accepted connection gets a session from the
    /// factory.
    pub fn bind_tcp(&self, local: SocketAddr, factory: Box<dyn TcpServerCallback>) {
        self.shared.bind_tcp(local, factory);
    }

    pub fn unbind_tcp(&self, id: SocketId) {
        self.shared.unbind_tcp(id);
    }

    pub fn bind_udp(&self, local: SocketAddr, callback: Box<dyn UdpCallback>) {
        self.shared.bind_udp(local, callback);
    }

    pub fn unbind_udp(&self, id: SocketId) {
        self.shared.unbind_udp(id);
    }

    /// Outbound TCP. `callback.on_startup` fires on success; on failure the
    /// callback is dropped without ever firing.
    pub fn connect(&self, remote: SocketAddr, callback: Box<dyn TcpCallback>) {
        self.shared.connect(remote, callback);
    }

    /// Queue bytes on a TCP connection. Unknown ids are silent no-ops.
    pub fn send_tcp(&self, id: SocketId, data: &[u8]) {
        self.shared.send_tcp(id, data);
    }

    /// Send one datagram. Payloads above [`UDP_MAX_PAYLOAD`] are rejected
    /// at this boundary.
    pub fn send_udp(&self, id: SocketId, remote: SocketAddr, data: &[u8]) {
        self.shared.send_udp(id, remote, data);
    }

    /// Close a connection. `force` closes immediately; otherwise queued
    /// writes are flushed first, bounded by the send timeout.
    pub fn close(&self, id: SocketId, force: bool) {
        self.shared.close(id, force);
    }
}

impl Drop for NetworkPool {
    fn drop(&mut self) {
        self.shared.want_exit.store(true, Ordering::Release);
        self.shared.wake.notify();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Clonable handle to a pool's command queue. All methods mirror
/// [`NetworkPool`]; after the pool is dropped they become no-ops.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<PoolShared>,
}

impl PoolHandle {
    pub fn bind_tcp(&self, local: SocketAddr, factory: Box<dyn TcpServerCallback>) {
        self.shared.bind_tcp(local, factory);
    }

    pub fn unbind_tcp(&self, id: SocketId) {
        self.shared.unbind_tcp(id);
    }

    pub fn bind_udp(&self, local: SocketAddr, callback: Box<dyn UdpCallback>) {
        self.shared.bind_udp(local, callback);
    }

    pub fn unbind_udp(&self, id: SocketId) {
        self.shared.unbind_udp(id);
    }

    pub fn connect(&self, remote: SocketAddr, callback: Box<dyn TcpCallback>) {
        self.shared.connect(remote, callback);
    }

    pub fn send_tcp(&self, id: SocketId, data: &[u8]) {
        self.shared.send_tcp(id, data);
    }

    pub fn send_udp(&self, id: SocketId, remote: SocketAddr, data: &[u8]) {
        self.shared.send_udp(id, remote, data);
    }

    pub fn close(&self, id: SocketId, force: bool) {
        self.shared.close(id, force);
    }
}
