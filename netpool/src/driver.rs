//! The reactor: a single thread owning every socket, timer, and map.
//!
//! The loop waits on epoll with a timeout derived from the timer heap,
//! dispatches readiness events by their encoded token, fires expired
//! timers, and finally drains any commands that callbacks pushed from this
//! thread during the iteration (the direct-dispatch path — no wake syscall
//! needed when the producer is the reactor itself).
//!
//! Callbacks never alias reactor state: a connection is taken out of its
//! map while its callback runs and put back afterwards, so re-entrant pool
//! calls always go through the command queue.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alloc::{self, RECV_CHUNK_SIZE};
use crate::callback::{TcpCallback, TcpServerCallback, UdpCallback};
use crate::command::{PendingBind, PendingQueues};
use crate::conn::{FlushOutcome, TcpConn, TcpServer, UdpSocketState, WriteBuf};
use crate::metrics;
use crate::net;
use crate::poller::{Interest, Poller};
use crate::pool::{PoolShared, SocketId};
use crate::timer::TimerQueue;

// ── Token encoding ──────────────────────────────────────────────────
//
// epoll events carry a u64; the top bits say what kind of handle fired
// and the low bits carry the socket id.

const KIND_SHIFT: u32 = 60;
const ID_MASK: u64 = (1 << KIND_SHIFT) - 1;

const KIND_WAKE: u64 = 0;
const KIND_SERVER: u64 = 1;
const KIND_CONN: u64 = 2;
const KIND_CONNECTING: u64 = 3;
const KIND_UDP: u64 = 4;

fn encode(kind: u64, id: u64) -> u64 {
    (kind << KIND_SHIFT) | (id & ID_MASK)
}

fn decode(token: u64) -> (u64, u64) {
    (token >> KIND_SHIFT, token & ID_MASK)
}

#[derive(PartialEq)]
enum Fate {
    Alive,
    Dead,
}

pub(crate) struct Driver {
    shared: Arc<PoolShared>,
    poller: Poller,
    next_id: u64,
    next_timer_seq: u64,
    servers: HashMap<u64, TcpServer>,
    udp: HashMap<u64, UdpSocketState>,
    conns: HashMap<u64, TcpConn>,
    connecting: HashMap<u64, TcpConn>,
    timers: TimerQueue,
}

impl Driver {
    pub fn new(shared: Arc<PoolShared>) -> io::Result<Driver> {
        let poller = Poller::new()?;
        poller.register(shared.wake.fd(), encode(KIND_WAKE, 0), Interest::READ)?;
        Ok(Driver {
            shared,
            poller,
            next_id: 0,
            next_timer_seq: 0,
            servers: HashMap::new(),
            udp: HashMap::new(),
            conns: HashMap::new(),
            connecting: HashMap::new(),
            timers: TimerQueue::new(),
        })
    }

    pub fn run(mut self) {
        let mut events: Vec<libc::epoll_event> = Vec::with_capacity(256);
        loop {
            let timeout = self.timers.next_timeout_ms(Instant::now());
            if let Err(err) = self.poller.wait(&mut events, timeout) {
                log::warn!("epoll wait failed: {err}");
                return;
            }

            for event in &events {
                let (kind, id) = decode(event.u64);
                match kind {
                    KIND_WAKE => {
                        self.shared.wake.drain();
                        if self.handle_wake() {
                            self.teardown();
                            return;
                        }
                    }
                    KIND_SERVER => self.handle_accept(id),
                    KIND_CONN => self.handle_conn_event(id, event.events),
                    KIND_CONNECTING => self.handle_connect_ready(id),
                    KIND_UDP => self.handle_udp_event(id, event.events),
                    _ => {}
                }
            }

            self.fire_timers();
            self.drain_local();
        }
    }

    fn next_id(&mut self) -> SocketId {
        self.next_id += 1;
        SocketId::from_raw(self.next_id)
    }

    // ── Command ingestion ───────────────────────────────────────────

    /// Returns true when the pool asked the loop to exit.
    fn handle_wake(&mut self) -> bool {
        let taken = match self.shared.pending.try_lock() {
            Ok(mut queues) => queues.take(),
            Err(std::sync::TryLockError::WouldBlock) => {
                // A producer holds the mutex; try again next iteration
                // rather than blocking the loop.
                self.shared.wake.notify();
                return false;
            }
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
        };
        if self.shared.want_exit.load(Ordering::Acquire) {
            // Commands taken with the exit signal are dropped unexecuted;
            // their payloads (and callbacks that never started) free here.
            return true;
        }
        self.execute(taken);
        false
    }

    /// Commands pushed by callbacks on this thread skip the wake syscall;
    /// pick them up before sleeping so they run in the same iteration.
    fn drain_local(&mut self) {
        loop {
            let taken = match self.shared.pending.try_lock() {
                Ok(mut queues) => {
                    if queues.is_empty() {
                        return;
                    }
                    queues.take()
                }
                // Contended means an off-thread producer, and they wake us.
                Err(_) => return,
            };
            if self.shared.want_exit.load(Ordering::Acquire) {
                return;
            }
            self.execute(taken);
        }
    }

    fn execute(&mut self, queues: PendingQueues) {
        metrics::COMMANDS_EXECUTED.add(queues.len() as u64);
        for bind in queues.binds {
            match bind {
                PendingBind::Tcp { local, factory } => self.exec_bind_tcp(local, factory),
                PendingBind::Udp { local, callback } => self.exec_bind_udp(local, callback),
                PendingBind::UnbindTcp { id } => self.exec_unbind_tcp(id),
                PendingBind::UnbindUdp { id } => self.exec_unbind_udp(id),
            }
        }
        for send in queues.tcp_sends {
            self.exec_send_tcp(send.id, send.data);
        }
        for send in queues.udp_sends {
            self.exec_send_udp(send.id, send.remote, send.data);
        }
        for connect in queues.connects {
            self.exec_connect(connect.remote, connect.callback);
        }
        for close in queues.closes {
            self.exec_close(close.id, close.force);
        }
    }

    // ── Bind / unbind ───────────────────────────────────────────────

    fn exec_bind_tcp(&mut self, local: SocketAddr, mut factory: Box<dyn TcpServerCallback>) {
        let settings = factory.settings();
        let fd = match net::new_socket(local, libc::SOCK_STREAM) {
            Ok(fd) => fd,
            Err(err) => {
                factory.on_listen_error(err);
                return;
            }
        };
        let id = self.next_id();
        let setup = net::set_reuseaddr(fd)
            .and_then(|_| net::bind_fd(fd, local))
            .and_then(|_| net::listen_fd(fd, settings.backlog))
            .and_then(|_| net::local_addr(fd))
            .and_then(|bound| {
                self.poller
                    .register(fd, encode(KIND_SERVER, id.raw()), Interest::READ)?;
                Ok(bound)
            });
        match setup {
            Ok(bound) => {
                factory.on_startup(id, bound);
                self.servers.insert(
                    id.raw(),
                    TcpServer {
                        id,
                        fd,
                        factory,
                        simultaneous_accepts: settings.simultaneous_accepts,
                    },
                );
            }
            Err(err) => {
                log::warn!("tcp bind {local} failed: {err}");
                factory.on_listen_error(err);
                net::close_fd(fd);
            }
        }
    }

    fn exec_unbind_tcp(&mut self, id: SocketId) {
        if let Some(mut server) = self.servers.remove(&id.raw()) {
            log::debug!("unbinding tcp server {}", server.id);
            self.poller.deregister(server.fd);
            server.factory.on_shutdown();
        }
    }

    fn exec_bind_udp(&mut self, local: SocketAddr, mut callback: Box<dyn UdpCallback>) {
        let settings = callback.settings();
        let fd = match net::new_socket(local, libc::SOCK_DGRAM) {
            Ok(fd) => fd,
            Err(err) => {
                log::warn!("udp socket for {local} failed: {err}");
                return;
            }
        };
        let id = self.next_id();
        let setup = net::bind_fd(fd, local)
            .and_then(|_| {
                // TTL is a preference; ignore failure.
                let _ = net::set_ttl(fd, local.is_ipv4(), settings.ttl);
                net::local_addr(fd)
            })
            .and_then(|bound| {
                self.poller
                    .register(fd, encode(KIND_UDP, id.raw()), Interest::READ)?;
                Ok(bound)
            });
        match setup {
            Ok(bound) => {
                callback.on_startup(id, bound);
                self.udp.insert(
                    id.raw(),
                    UdpSocketState {
                        id,
                        fd,
                        cb: callback,
                        send_queue: Default::default(),
                        want_write: false,
                    },
                );
            }
            Err(err) => {
                log::warn!("udp bind {local} failed: {err}");
                net::close_fd(fd);
            }
        }
    }

    fn exec_unbind_udp(&mut self, id: SocketId) {
        if let Some(mut udp) = self.udp.remove(&id.raw()) {
            log::debug!("unbinding udp socket {}", udp.id);
            self.poller.deregister(udp.fd);
            udp.cb.on_shutdown();
        }
    }

    // ── Accept path ─────────────────────────────────────────────────

    fn handle_accept(&mut self, raw_id: u64) {
        let Some(mut server) = self.servers.remove(&raw_id) else {
            return;
        };
        loop {
            let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
            let mut addr_len =
                std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            let fd = unsafe {
                libc::accept4(
                    server.fd,
                    &mut storage as *mut _ as *mut libc::sockaddr,
                    &mut addr_len,
                    libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                )
            };
            if fd < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::EAGAIN) => break,
                    Some(libc::EMFILE) | Some(libc::ENFILE) => {
                        log::warn!("accept: out of file descriptors");
                        break;
                    }
                    _ => {
                        server.factory.on_listen_error(err);
                        break;
                    }
                }
            }

            let session = server.factory.new_session();
            let peer = net::sockaddr_to_socket_addr(&storage)
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
            // Per-connection setup failure drops the socket silently; the
            // connection owns the fd either way.
            let _ = self.register_accepted(fd, session, peer);

            if !server.simultaneous_accepts {
                break;
            }
        }
        self.servers.insert(raw_id, server);
    }

    fn register_accepted(
        &mut self,
        fd: RawFd,
        session: Box<dyn TcpCallback>,
        peer: SocketAddr,
    ) -> io::Result<()> {
        let id = self.next_id();
        let settings = session.settings();
        let timeouts = session.timeouts();
        let mut conn = TcpConn::new(id, fd, session, timeouts, peer);
        conn.apply_settings(&settings)?;
        self.poller
            .register(fd, encode(KIND_CONN, id.raw()), Interest::READ)?;

        metrics::CONNECTIONS_ACCEPTED.increment();
        metrics::CONNECTIONS_ACTIVE.increment();
        let idle = conn.timeouts.idle_secs;
        self.arm_conn_timer(&mut conn, idle);
        conn.cb.on_startup(id, peer);
        self.conns.insert(id.raw(), conn);
        Ok(())
    }

    // ── Connect path ────────────────────────────────────────────────

    fn exec_connect(&mut self, remote: SocketAddr, callback: Box<dyn TcpCallback>) {
        let fd = match net::new_socket(remote, libc::SOCK_STREAM) {
            Ok(fd) => fd,
            Err(err) => {
                log::warn!("connect socket for {remote} failed: {err}");
                return; // callback dropped, no startup
            }
        };
        match net::connect_fd(fd, remote) {
            Ok(_in_progress_or_done) => {
                let id = self.next_id();
                let timeouts = callback.timeouts();
                let mut conn = TcpConn::new(id, fd, callback, timeouts, remote);
                if self
                    .poller
                    .register(fd, encode(KIND_CONNECTING, id.raw()), Interest::WRITE)
                    .is_err()
                {
                    return; // conn drop closes the fd
                }
                // A connected socket is immediately writable, so the
                // already-done case resolves on the next wait.
                self.arm_conn_timer(&mut conn, timeouts.connect_secs);
                self.connecting.insert(id.raw(), conn);
            }
            Err(err) => {
                log::debug!("connect to {remote} failed: {err}");
                net::close_fd(fd);
            }
        }
    }

    fn handle_connect_ready(&mut self, raw_id: u64) {
        let Some(mut conn) = self.connecting.remove(&raw_id) else {
            return;
        };
        if let Err(err) = net::take_socket_error(conn.fd) {
            log::debug!("connect to {} failed: {err}", conn.peer);
            self.abandon_connecting(conn);
            return;
        }
        let settings = conn.cb.settings();
        if conn.apply_settings(&settings).is_err() {
            self.abandon_connecting(conn);
            return;
        }
        let peer = net::peer_addr(conn.fd).unwrap_or(conn.peer);
        if self
            .poller
            .rearm(conn.fd, encode(KIND_CONN, raw_id), Interest::READ)
            .is_err()
        {
            self.abandon_connecting(conn);
            return;
        }

        metrics::CONNECTIONS_CONNECTED.increment();
        metrics::CONNECTIONS_ACTIVE.increment();
        conn.peer = peer;
        let idle = conn.timeouts.idle_secs;
        self.arm_conn_timer(&mut conn, idle);
        conn.cb.on_startup(conn.id, peer);
        self.conns.insert(raw_id, conn);
    }

    /// A connection that never started up: close it without callbacks.
    fn abandon_connecting(&mut self, mut conn: TcpConn) {
        self.disarm_timer(&mut conn);
        self.poller.deregister(conn.fd);
        // conn drop closes the fd; on_startup never fired, so neither does
        // on_shutdown.
    }

    // ── Established-connection events ───────────────────────────────

    fn handle_conn_event(&mut self, raw_id: u64, events: u32) {
        let readable =
            events & (libc::EPOLLIN | libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0;
        let writable = events & libc::EPOLLOUT as u32 != 0;
        let errored = events & (libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0;

        let Some(mut conn) = self.conns.remove(&raw_id) else {
            return;
        };
        let mut fate = Fate::Alive;
        // While closing, reads are off; an error event must reach the write
        // path or a dead peer would never resolve the graceful close.
        if writable || (conn.closing && errored) {
            fate = self.conn_writable(&mut conn);
        }
        if fate == Fate::Alive && readable && !conn.closing {
            fate = self.conn_readable(&mut conn);
        }
        match fate {
            Fate::Alive => {
                self.conns.insert(raw_id, conn);
            }
            Fate::Dead => self.destroy_conn(conn),
        }
    }

    fn conn_readable(&mut self, conn: &mut TcpConn) -> Fate {
        let mut any_read = false;
        loop {
            let mut chunk = match alloc::alloc(RECV_CHUNK_SIZE) {
                Some(chunk) => chunk,
                None => {
                    log::warn!("recv chunk allocation failed; dropping {}", conn.id);
                    return Fate::Dead;
                }
            };
            let capacity = chunk.capacity();
            let n = unsafe {
                libc::read(
                    conn.fd,
                    chunk.as_mut_ptr() as *mut libc::c_void,
                    capacity,
                )
            };
            if n > 0 {
                let n = n as usize;
                unsafe { chunk.set_len(n) };
                metrics::BYTES_RECEIVED.add(n as u64);
                any_read = true;
                conn.cb.on_data(chunk);
                if n < capacity {
                    break; // kernel buffer likely drained
                }
            } else if n == 0 {
                return Fate::Dead; // peer EOF
            } else {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::EAGAIN) => break,
                    _ => {
                        log::debug!("read error on {}: {err}", conn.id);
                        return Fate::Dead;
                    }
                }
            }
        }
        if any_read && !conn.closing && !conn.shutdown_issued && conn.write_queue.is_empty() {
            let idle = conn.timeouts.idle_secs;
            self.arm_conn_timer(conn, idle);
        }
        Fate::Alive
    }

    fn conn_writable(&mut self, conn: &mut TcpConn) -> Fate {
        match conn.flush() {
            Ok(FlushOutcome::Drained) => {
                if conn.closing {
                    // Graceful close: everything flushed, half-close and go.
                    let _ = net::shutdown_write(conn.fd);
                    conn.shutdown_issued = true;
                    return Fate::Dead;
                }
                if conn.want_write {
                    conn.want_write = false;
                    if self
                        .poller
                        .rearm(conn.fd, encode(KIND_CONN, conn.id.raw()), Interest::READ)
                        .is_err()
                    {
                        return Fate::Dead;
                    }
                }
                let idle = conn.timeouts.idle_secs;
                self.arm_conn_timer(conn, idle);
                Fate::Alive
            }
            Ok(FlushOutcome::Blocked) => Fate::Alive,
            Err(err) => {
                log::debug!("write error on {}: {err}", conn.id);
                Fate::Dead
            }
        }
    }

    // ── Sends ───────────────────────────────────────────────────────

    fn exec_send_tcp(&mut self, id: SocketId, data: Vec<u8>) {
        let Some(mut conn) = self.conns.remove(&id.raw()) else {
            return; // unknown id: silent no-op
        };
        if conn.closing || conn.shutdown_issued {
            conn.cb.on_drop(&data);
            self.conns.insert(id.raw(), conn);
            return;
        }
        conn.write_queue.push_back(WriteBuf { data, written: 0 });
        let send_secs = conn.timeouts.send_secs;
        self.arm_conn_timer(&mut conn, send_secs);
        match conn.flush() {
            Ok(FlushOutcome::Drained) => {
                if conn.want_write {
                    conn.want_write = false;
                    if self
                        .poller
                        .rearm(conn.fd, encode(KIND_CONN, id.raw()), Interest::READ)
                        .is_err()
                    {
                        self.destroy_conn(conn);
                        return;
                    }
                }
                let idle = conn.timeouts.idle_secs;
                self.arm_conn_timer(&mut conn, idle);
                self.conns.insert(id.raw(), conn);
            }
            Ok(FlushOutcome::Blocked) => {
                if !conn.want_write {
                    conn.want_write = true;
                    if self
                        .poller
                        .rearm(conn.fd, encode(KIND_CONN, id.raw()), Interest::BOTH)
                        .is_err()
                    {
                        self.destroy_conn(conn);
                        return;
                    }
                }
                self.conns.insert(id.raw(), conn);
            }
            Err(err) => {
                log::debug!("write error on {id}: {err}");
                self.destroy_conn(conn);
            }
        }
    }

    fn exec_send_udp(&mut self, id: SocketId, remote: SocketAddr, data: Vec<u8>) {
        let (became_writable, fd) = {
            let Some(udp) = self.udp.get_mut(&id.raw()) else {
                return; // unknown id: silent no-op
            };
            let was_writable = udp.want_write;
            udp.send_or_queue(remote, data);
            (udp.want_write && !was_writable, udp.fd)
        };
        if became_writable {
            let _ = self
                .poller
                .rearm(fd, encode(KIND_UDP, id.raw()), Interest::BOTH);
        }
    }

    // ── UDP events ──────────────────────────────────────────────────

    fn handle_udp_event(&mut self, raw_id: u64, events: u32) {
        let readable = events & libc::EPOLLIN as u32 != 0;
        let writable = events & libc::EPOLLOUT as u32 != 0;

        if writable {
            let (drained, fd) = {
                let Some(udp) = self.udp.get_mut(&raw_id) else {
                    return;
                };
                (udp.flush(), udp.fd)
            };
            if drained {
                if let Some(udp) = self.udp.get_mut(&raw_id) {
                    if udp.want_write {
                        udp.want_write = false;
                        let _ = self
                            .poller
                            .rearm(fd, encode(KIND_UDP, raw_id), Interest::READ);
                    }
                }
            }
        }

        if readable {
            self.udp_readable(raw_id);
        }
    }

    fn udp_readable(&mut self, raw_id: u64) {
        let Some(udp) = self.udp.get_mut(&raw_id) else {
            return;
        };
        loop {
            let mut chunk = match alloc::alloc(RECV_CHUNK_SIZE) {
                Some(chunk) => chunk,
                None => {
                    udp.cb
                        .on_recv_error(io::Error::from_raw_os_error(libc::ENOMEM));
                    return;
                }
            };
            let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
            let mut addr_len =
                std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            let n = unsafe {
                libc::recvfrom(
                    udp.fd,
                    chunk.as_mut_ptr() as *mut libc::c_void,
                    chunk.capacity(),
                    0,
                    &mut storage as *mut _ as *mut libc::sockaddr,
                    &mut addr_len,
                )
            };
            if n >= 0 {
                unsafe { chunk.set_len(n as usize) };
                metrics::UDP_DATAGRAMS_RECEIVED.increment();
                metrics::BYTES_RECEIVED.add(n as u64);
                if let Some(peer) = net::sockaddr_to_socket_addr(&storage) {
                    udp.cb.on_datagram(peer, chunk);
                }
            } else {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::EAGAIN) => return,
                    _ => {
                        udp.cb.on_recv_error(err);
                        return;
                    }
                }
            }
        }
    }

    // ── Close / timers / teardown ───────────────────────────────────

    fn exec_close(&mut self, id: SocketId, force: bool) {
        let Some(mut conn) = self.conns.remove(&id.raw()) else {
            return; // unknown or already closed: no-op
        };
        if force {
            self.destroy_conn(conn);
        } else if conn.closing {
            // Graceful close already in progress.
            self.conns.insert(id.raw(), conn);
        } else if conn.write_queue.is_empty() {
            let _ = net::shutdown_write(conn.fd);
            conn.shutdown_issued = true;
            self.destroy_conn(conn);
        } else {
            // Flush what is queued, bounded by the send timeout, then
            // half-close and destroy from the writable path.
            conn.closing = true;
            let send_secs = conn.timeouts.send_secs;
            self.arm_conn_timer(&mut conn, send_secs);
            conn.want_write = true;
            if self
                .poller
                .rearm(conn.fd, encode(KIND_CONN, id.raw()), Interest::WRITE)
                .is_err()
            {
                self.destroy_conn(conn);
                return;
            }
            self.conns.insert(id.raw(), conn);
        }
    }

    /// One timer per connection: bumping the sequence disarms whatever role
    /// was active, then a fresh entry is pushed for the new role.
    fn arm_conn_timer(&mut self, conn: &mut TcpConn, secs: u64) {
        self.next_timer_seq += 1;
        conn.timer_seq = self.next_timer_seq;
        if secs == 0 {
            conn.timer_armed = false;
            return;
        }
        conn.timer_armed = true;
        self.timers
            .arm(conn.id, conn.timer_seq, Duration::from_secs(secs));
    }

    fn disarm_timer(&mut self, conn: &mut TcpConn) {
        self.next_timer_seq += 1;
        conn.timer_seq = self.next_timer_seq;
        conn.timer_armed = false;
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();
        while let Some((id, seq)) = self.timers.pop_expired(now) {
            let raw = id.raw();
            let live = self
                .conns
                .get(&raw)
                .map(|c| c.timer_armed && c.timer_seq == seq)
                .unwrap_or(false);
            if live {
                let conn = self.conns.remove(&raw).unwrap();
                metrics::TIMEOUTS_FIRED.increment();
                log::debug!("timeout fired on {id}");
                self.destroy_conn(conn);
                continue;
            }
            let pending = self
                .connecting
                .get(&raw)
                .map(|c| c.timer_armed && c.timer_seq == seq)
                .unwrap_or(false);
            if pending {
                let conn = self.connecting.remove(&raw).unwrap();
                metrics::TIMEOUTS_FIRED.increment();
                log::debug!("connect timeout on {id}");
                self.abandon_connecting(conn);
            }
        }
    }

    /// Remove every trace of a connection and fire its shutdown exactly
    /// once. The fd closes when `conn` drops.
    fn destroy_conn(&mut self, mut conn: TcpConn) {
        self.disarm_timer(&mut conn);
        self.poller.deregister(conn.fd);
        conn.drop_pending_writes();
        conn.cb.on_shutdown();
        metrics::CONNECTIONS_CLOSED.increment();
        metrics::CONNECTIONS_ACTIVE.decrement();
    }

    fn teardown(&mut self) {
        for (_, mut server) in std::mem::take(&mut self.servers) {
            self.poller.deregister(server.fd);
            server.factory.on_shutdown();
        }
        for (_, mut udp) in std::mem::take(&mut self.udp) {
            self.poller.deregister(udp.fd);
            udp.cb.on_shutdown();
        }
        for (_, conn) in std::mem::take(&mut self.conns) {
            self.destroy_conn(conn);
        }
        for (_, conn) in std::mem::take(&mut self.connecting) {
            self.abandon_connecting(conn);
        }
        self.poller.deregister(self.shared.wake.fd());
    }
}
