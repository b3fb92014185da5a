//! Per-socket settings consulted when a socket is set up.
//!
//! Callbacks report their preferred settings through
//! [`TcpServerCallback::settings`](crate::callback::TcpServerCallback::settings)
//! and friends; the reactor applies them at bind/accept/connect time.

/// Settings for a TCP listener.
#[derive(Debug, Clone, Copy)]
pub struct TcpServerSettings {
    /// Accept every ready connection per readiness event instead of one.
    pub simultaneous_accepts: bool,
    /// Listen backlog.
    pub backlog: i32,
}

impl Default for TcpServerSettings {
    fn default() -> Self {
        TcpServerSettings {
            simultaneous_accepts: true,
            backlog: 128,
        }
    }
}

/// Settings for an individual TCP connection.
#[derive(Debug, Clone, Copy)]
pub struct TcpSettings {
    pub nodelay: bool,
    pub keepalive: bool,
    pub keepalive_secs: u32,
    /// 0 = system default.
    pub send_buffer_size: usize,
    /// 0 = system default.
    pub recv_buffer_size: usize,
}

impl Default for TcpSettings {
    fn default() -> Self {
        TcpSettings {
            nodelay: true,
            keepalive: true,
            keepalive_secs: 30,
            send_buffer_size: 0,
            recv_buffer_size: 0,
        }
    }
}

/// Timeouts for an individual TCP connection, in seconds. 0 disables the
/// corresponding timeout.
#[derive(Debug, Clone, Copy)]
pub struct TcpTimeoutSettings {
    pub connect_secs: u64,
    pub idle_secs: u64,
    pub send_secs: u64,
}

impl Default for TcpTimeoutSettings {
    fn default() -> Self {
        TcpTimeoutSettings {
            connect_secs: 10,
            idle_secs: 30,
            send_secs: 30,
        }
    }
}

/// Settings for a UDP socket.
#[derive(Debug, Clone, Copy)]
pub struct UdpSettings {
    pub ttl: u32,
}

impl Default for UdpSettings {
    fn default() -> Self {
        UdpSettings { ttl: 64 }
    }
}
