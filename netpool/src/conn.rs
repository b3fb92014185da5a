//! Reactor-side socket state: listeners, connections, UDP sockets.
//!
//! These structs are owned exclusively by the reactor thread. A connection
//! owns its fd, its callback, its write queue, and its timer sequence; it
//! is destroyed exactly once, when it leaves the driver's maps.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

use crate::callback::{TcpCallback, TcpServerCallback, UdpCallback};
use crate::net;
use crate::pool::SocketId;
use crate::settings::{TcpSettings, TcpTimeoutSettings};

/// Most iovecs handed to one `writev`.
pub(crate) const MAX_IOVECS: usize = 8;

pub(crate) struct TcpServer {
    pub id: SocketId,
    pub fd: RawFd,
    pub factory: Box<dyn TcpServerCallback>,
    pub simultaneous_accepts: bool,
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        net::close_fd(self.fd);
    }
}

/// One queued write: the bytes plus how much of them already reached the
/// kernel.
pub(crate) struct WriteBuf {
    pub data: Vec<u8>,
    pub written: usize,
}

impl WriteBuf {
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.written..]
    }
}

/// Outcome of flushing a connection's write queue.
pub(crate) enum FlushOutcome {
    /// Everything queued reached the kernel.
    Drained,
    /// The kernel pushed back; writable interest is needed.
    Blocked,
}

pub(crate) struct TcpConn {
    pub id: SocketId,
    pub fd: RawFd,
    pub cb: Box<dyn TcpCallback>,
    pub timeouts: TcpTimeoutSettings,
    pub write_queue: VecDeque<WriteBuf>,
    /// Graceful close requested: flush, half-close, then destroy.
    pub closing: bool,
    pub shutdown_issued: bool,
    /// Current epoll registration wants writable events.
    pub want_write: bool,
    /// Sequence of the one live timer entry; bumping it disarms.
    pub timer_seq: u64,
    pub timer_armed: bool,
    pub peer: SocketAddr,
}

impl TcpConn {
    pub fn new(
        id: SocketId,
        fd: RawFd,
        cb: Box<dyn TcpCallback>,
        timeouts: TcpTimeoutSettings,
        peer: SocketAddr,
    ) -> TcpConn {
        TcpConn {
            id,
            fd,
            cb,
            timeouts,
            write_queue: VecDeque::new(),
            closing: false,
            shutdown_issued: false,
            want_write: false,
            timer_seq: 0,
            timer_armed: false,
            peer,
        }
    }

    /// Push queued bytes into the kernel with vectored writes.
    pub fn flush(&mut self) -> io::Result<FlushOutcome> {
        while !self.write_queue.is_empty() {
            let mut iovecs = [libc::iovec {
                iov_base: std::ptr::null_mut(),
                iov_len: 0,
            }; MAX_IOVECS];
            let mut count = 0;
            for buf in self.write_queue.iter().take(MAX_IOVECS) {
                let remaining = buf.remaining();
                iovecs[count] = libc::iovec {
                    iov_base: remaining.as_ptr() as *mut libc::c_void,
                    iov_len: remaining.len(),
                };
                count += 1;
            }

            let n = unsafe { libc::writev(self.fd, iovecs.as_ptr(), count as libc::c_int) };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::EAGAIN) => return Ok(FlushOutcome::Blocked),
                    _ => return Err(err),
                }
            }

            let mut advanced = n as usize;
            crate::metrics::BYTES_SENT.add(advanced as u64);
            while advanced > 0 {
                let front = self.write_queue.front_mut().unwrap();
                let left = front.data.len() - front.written;
                if advanced >= left {
                    advanced -= left;
                    self.write_queue.pop_front();
                } else {
                    front.written += advanced;
                    advanced = 0;
                }
            }
        }
        Ok(FlushOutcome::Drained)
    }

    /// Hand every undelivered buffer back to the callback.
    pub fn drop_pending_writes(&mut self) {
        let pending: Vec<WriteBuf> = self.write_queue.drain(..).collect();
        for buf in &pending {
            self.cb.on_drop(buf.remaining());
        }
    }

    /// Apply the callback's preferred socket options.
    pub fn apply_settings(&self, settings: &TcpSettings) -> io::Result<()> {
        net::set_nodelay(self.fd, settings.nodelay)?;
        net::set_keepalive(self.fd, settings.keepalive, settings.keepalive_secs)?;
        // Buffer sizes are a preference; ignore failure.
        let _ = net::set_buffer_sizes(
            self.fd,
            settings.send_buffer_size,
            settings.recv_buffer_size,
        );
        Ok(())
    }
}

impl Drop for TcpConn {
    fn drop(&mut self) {
        net::close_fd(self.fd);
    }
}

pub(crate) struct UdpSocketState {
    pub id: SocketId,
    pub fd: RawFd,
    pub cb: Box<dyn UdpCallback>,
    pub send_queue: VecDeque<(SocketAddr, Vec<u8>)>,
    pub want_write: bool,
}

impl UdpSocketState {
    /// Send one datagram, or queue it on kernel pushback.
    pub fn send_or_queue(&mut self, remote: SocketAddr, data: Vec<u8>) {
        if self.want_write {
            self.send_queue.push_back((remote, data));
            return;
        }
        match send_datagram(self.fd, remote, &data) {
            Ok(true) => {
                crate::metrics::UDP_DATAGRAMS_SENT.increment();
            }
            Ok(false) => {
                self.send_queue.push_back((remote, data));
                self.want_write = true;
            }
            Err(err) => self.cb.on_send_error(err),
        }
    }

    /// Flush the overflow queue. Returns true when it drained.
    pub fn flush(&mut self) -> bool {
        while let Some((remote, data)) = self.send_queue.front() {
            match send_datagram(self.fd, *remote, data) {
                Ok(true) => {
                    crate::metrics::UDP_DATAGRAMS_SENT.increment();
                    self.send_queue.pop_front();
                }
                Ok(false) => return false,
                Err(err) => {
                    self.cb.on_send_error(err);
                    self.send_queue.pop_front();
                }
            }
        }
        true
    }
}

impl Drop for UdpSocketState {
    fn drop(&mut self) {
        net::close_fd(self.fd);
    }
}

/// `Ok(true)` sent, `Ok(false)` kernel pushback.
fn send_datagram(fd: RawFd, remote: SocketAddr, data: &[u8]) -> io::Result<bool> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = net::socket_addr_to_sockaddr(remote, &mut storage);
    loop {
        let n = unsafe {
            libc::sendto(
                fd,
                data.as_ptr() as *const libc::c_void,
                data.len(),
                0,
                &storage as *const _ as *const libc::sockaddr,
                len,
            )
        };
        if n >= 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) => return Ok(false),
            _ => return Err(err),
        }
    }
}
