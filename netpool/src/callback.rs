//! User-facing callback surfaces.
//!
//! All callbacks run on the reactor thread. They may call back into the
//! pool through a [`PoolHandle`](crate::pool::PoolHandle) — those commands
//! are executed after the callback returns, in issue order.
//!
//! Receive chunks arrive as owned [`SlabBlock`]s: a session that wants the
//! bytes keeps the block (typically by staging it into a
//! [`RecvBuffer`](crate::recv::RecvBuffer)); dropping the block returns it
//! to the slab allocator.

use std::io;
use std::net::SocketAddr;

use crate::alloc::SlabBlock;
use crate::pool::SocketId;
use crate::settings::{TcpServerSettings, TcpSettings, TcpTimeoutSettings, UdpSettings};

/// Callback surface of one TCP connection (inbound or outbound).
pub trait TcpCallback: Send {
    /// The connection is registered and readable. For outbound connections
    /// this fires only after the handshake succeeds; a failed connect drops
    /// the callback without ever calling it.
    fn on_startup(&mut self, id: SocketId, peer: SocketAddr);

    /// Bytes arrived. Keep the chunk to take ownership; drop it to free it.
    fn on_data(&mut self, chunk: SlabBlock);

    /// A queued write could not be delivered; `data` is the undelivered
    /// remainder.
    fn on_drop(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// The connection left the pool. Fires exactly once per registered
    /// connection, whatever the cause (close command, timeout, peer EOF,
    /// error, pool teardown).
    fn on_shutdown(&mut self);

    fn settings(&self) -> TcpSettings {
        TcpSettings::default()
    }

    fn timeouts(&self) -> TcpTimeoutSettings {
        TcpTimeoutSettings::default()
    }
}

/// Callback surface of a TCP listener. Produces one [`TcpCallback`] per
/// accepted connection.
pub trait TcpServerCallback: Send {
    /// Build the session for a freshly accepted connection.
    fn new_session(&mut self) -> Box<dyn TcpCallback>;

    /// The listener is bound; `local` is the actual bound address.
    fn on_startup(&mut self, id: SocketId, local: SocketAddr);

    /// The listener was unbound (or the pool tore down).
    fn on_shutdown(&mut self);

    /// Bind, listen, or accept failed.
    fn on_listen_error(&mut self, err: io::Error) {
        let _ = err;
    }

    fn settings(&self) -> TcpServerSettings {
        TcpServerSettings::default()
    }
}

/// Callback surface of a UDP socket.
pub trait UdpCallback: Send {
    /// The socket is bound; `local` is the actual bound address.
    fn on_startup(&mut self, id: SocketId, local: SocketAddr);

    /// A datagram arrived from `peer`.
    fn on_datagram(&mut self, peer: SocketAddr, chunk: SlabBlock);

    /// The socket was unbound (or the pool tore down).
    fn on_shutdown(&mut self);

    fn on_send_error(&mut self, err: io::Error) {
        let _ = err;
    }

    fn on_recv_error(&mut self, err: io::Error) {
        let _ = err;
    }

    fn settings(&self) -> UdpSettings {
        UdpSettings::default()
    }
}
