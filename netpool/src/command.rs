//! Pending commands exchanged between producer threads and the reactor.
//!
//! Every mutating pool method appends one of these under the command mutex
//! and signals the wake handle. The reactor drains all queues by move and
//! executes them in a fixed order: binds, TCP sends, UDP sends, connects,
//! closes. Each variant owns whatever heap memory it carries.

use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::callback::{TcpCallback, TcpServerCallback, UdpCallback};
use crate::pool::SocketId;

pub(crate) enum PendingBind {
    Tcp {
        local: SocketAddr,
        factory: Box<dyn TcpServerCallback>,
    },
    Udp {
        local: SocketAddr,
        callback: Box<dyn UdpCallback>,
    },
    UnbindTcp {
        id: SocketId,
    },
    UnbindUdp {
        id: SocketId,
    },
}

pub(crate) struct PendingSendTcp {
    pub id: SocketId,
    pub data: Vec<u8>,
}

pub(crate) struct PendingSendUdp {
    pub id: SocketId,
    pub remote: SocketAddr,
    pub data: Vec<u8>,
}

pub(crate) struct PendingConnect {
    pub remote: SocketAddr,
    pub callback: Box<dyn TcpCallback>,
}

pub(crate) struct PendingClose {
    pub id: SocketId,
    pub force: bool,
}

#[derive(Default)]
pub(crate) struct PendingQueues {
    pub binds: VecDeque<PendingBind>,
    pub tcp_sends: VecDeque<PendingSendTcp>,
    pub udp_sends: VecDeque<PendingSendUdp>,
    pub connects: VecDeque<PendingConnect>,
    pub closes: VecDeque<PendingClose>,
}

impl PendingQueues {
    pub fn take(&mut self) -> PendingQueues {
        std::mem::take(self)
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
            && self.tcp_sends.is_empty()
            && self.udp_sends.is_empty()
            && self.connects.is_empty()
            && self.closes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.binds.len()
            + self.tcp_sends.len()
            + self.udp_sends.len()
            + self.connects.len()
            + self.closes.len()
    }
}
