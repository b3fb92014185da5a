//! netpool — single-reactor TCP/UDP network pool.
//!
//! One dedicated reactor thread owns every socket, timer, and connection
//! map. Any thread may hand it work — bind, connect, send, close — through
//! a mutex-guarded command queue and an eventfd wake; received bytes and
//! lifecycle events come back through per-socket callback traits, always on
//! the reactor thread. Horizontal scale is a matter of running several
//! pools.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use netpool::{NetworkPool, PoolHandle, SlabBlock, SocketId, TcpCallback, TcpServerCallback};
//! use std::net::SocketAddr;
//!
//! struct Echo {
//!     pool: PoolHandle,
//!     id: Option<SocketId>,
//! }
//!
//! impl TcpCallback for Echo {
//!     fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
//!         self.id = Some(id);
//!     }
//!     fn on_data(&mut self, chunk: SlabBlock) {
//!         if let Some(id) = self.id {
//!             self.pool.send_tcp(id, chunk.as_slice());
//!         }
//!     }
//!     fn on_shutdown(&mut self) {}
//! }
//!
//! struct EchoServer {
//!     pool: PoolHandle,
//! }
//!
//! impl TcpServerCallback for EchoServer {
//!     fn new_session(&mut self) -> Box<dyn TcpCallback> {
//!         Box::new(Echo { pool: self.pool.clone(), id: None })
//!     }
//!     fn on_startup(&mut self, _id: SocketId, _local: SocketAddr) {}
//!     fn on_shutdown(&mut self) {}
//! }
//!
//! fn main() -> Result<(), netpool::Error> {
//!     let pool = NetworkPool::new()?;
//!     let server = EchoServer { pool: pool.handle() };
//!     pool.bind_tcp("127.0.0.1:7878".parse().unwrap(), Box::new(server));
//!     std::thread::park();
//!     Ok(())
//! }
//! ```
//!
//! # Platform
//!
//! Linux only: the reactor is built on epoll and eventfd.

pub mod alloc;
pub mod buffer;
pub mod callback;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod recv;
pub mod settings;
pub mod shared;

pub(crate) mod command;
pub(crate) mod conn;
pub(crate) mod driver;
pub(crate) mod net;
pub(crate) mod poller;
pub(crate) mod timer;

/// A leased receive chunk; drop it to return it to the slab cache.
pub use alloc::SlabBlock;
/// Owned resizable byte region with transfer-out semantics.
pub use buffer::ByteBuffer;
/// Per-connection TCP callback surface.
pub use callback::TcpCallback;
/// TCP listener callback surface and session factory.
pub use callback::TcpServerCallback;
/// UDP socket callback surface.
pub use callback::UdpCallback;
/// Pool construction errors.
pub use error::Error;
/// The pool façade owning the reactor thread.
pub use pool::NetworkPool;
/// Clonable command surface for sessions and workers.
pub use pool::PoolHandle;
/// Opaque socket identifier minted by the reactor.
pub use pool::SocketId;
/// Largest accepted UDP payload.
pub use pool::UDP_MAX_PAYLOAD;
/// Thread-safe staging queue for raw receive chunks.
pub use recv::ChunkStage;
/// Raw-chunk staging merged into a contiguous scan window.
pub use recv::RecvBuffer;
/// Task trait for the work queue.
pub use queue::Task;
/// Bounded-thread task queue for offloading parse work.
pub use queue::WorkQueue;
/// Settings for TCP listeners.
pub use settings::TcpServerSettings;
/// Settings for TCP connections.
pub use settings::TcpSettings;
/// Per-connection timeout settings.
pub use settings::TcpTimeoutSettings;
/// Settings for UDP sockets.
pub use settings::UdpSettings;
/// Reference-counted cell shared between reactor and workers.
pub use shared::SharedCtx;
