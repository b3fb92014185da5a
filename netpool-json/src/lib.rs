//! JSON message server sessions on top of netpool.
//!
//! Unlike the HTTP sessions, parsing happens off the reactor: the session
//! stages raw chunks and queues one parse task per packet onto a
//! [`WorkQueue`]. The framer context is shared between the reactor and the
//! workers through a [`SharedCtx`]; when the session shuts down the
//! reactor drops its reference, and a worker that observes `unique()`
//! abandons the context instead of parsing for a dead connection. Replies
//! produced by the handler travel back through the pool's command queue —
//! the send-from-worker-thread path.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use netpool::{
    ChunkStage, PoolHandle, SharedCtx, SlabBlock, SocketId, TcpCallback, TcpServerCallback,
    WorkQueue,
};
use protocol_json::JsonContext;

/// Handles one framed JSON message. Runs on a worker thread; returning
/// `Some(bytes)` sends them back on the connection.
pub trait JsonHandler: Send + Sync {
    fn on_message(&self, message: &[u8]) -> Option<Vec<u8>>;
}

impl<F> JsonHandler for F
where
    F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync,
{
    fn on_message(&self, message: &[u8]) -> Option<Vec<u8>> {
        self(message)
    }
}

/// Framer context plus its staging queue, shared reactor ⇄ workers. The
/// stage is feedable without the context mutex, so the reactor never waits
/// behind a parse in progress.
struct JsonShared {
    stage: ChunkStage,
    ctx: Mutex<JsonContext>,
}

type BoundFn = Box<dyn FnMut(SocketId, SocketAddr) + Send>;

/// Session factory for a JSON message listener.
pub struct JsonServer {
    pool: PoolHandle,
    queue: Arc<WorkQueue>,
    handler: Arc<dyn JsonHandler>,
    on_bound: Option<BoundFn>,
}

impl JsonServer {
    pub fn new(
        pool: PoolHandle,
        queue: Arc<WorkQueue>,
        handler: Arc<dyn JsonHandler>,
    ) -> JsonServer {
        // JSON sessions chew through receive chunks; widen that class.
        netpool::alloc::set_cache(netpool::alloc::RECV_CHUNK_SIZE, 16384);
        JsonServer {
            pool,
            queue,
            handler,
            on_bound: None,
        }
    }

    /// Observe the listener's socket id and bound address.
    pub fn on_bound(mut self, f: impl FnMut(SocketId, SocketAddr) + Send + 'static) -> JsonServer {
        self.on_bound = Some(Box::new(f));
        self
    }
}

impl TcpServerCallback for JsonServer {
    fn new_session(&mut self) -> Box<dyn TcpCallback> {
        Box::new(JsonSession {
            pool: self.pool.clone(),
            queue: self.queue.clone(),
            handler: self.handler.clone(),
            id: None,
            cell: SharedCtx::empty(),
        })
    }

    fn on_startup(&mut self, id: SocketId, local: SocketAddr) {
        if let Some(on_bound) = &mut self.on_bound {
            on_bound(id, local);
        }
    }

    fn on_shutdown(&mut self) {}
}

struct JsonSession {
    pool: PoolHandle,
    queue: Arc<WorkQueue>,
    handler: Arc<dyn JsonHandler>,
    id: Option<SocketId>,
    cell: SharedCtx<JsonShared>,
}

impl TcpCallback for JsonSession {
    fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
        self.id = Some(id);
        self.cell.replace(JsonShared {
            stage: ChunkStage::new(),
            ctx: Mutex::new(JsonContext::new()),
        });
    }

    fn on_data(&mut self, chunk: SlabBlock) {
        let Some(id) = self.id else {
            return;
        };
        let Some(shared) = self.cell.get() else {
            return;
        };
        shared.stage.push(chunk);

        let pool = self.pool.clone();
        let handler = self.handler.clone();
        let cell = self.cell.clone();
        self.queue.push_fn(move || {
            run_parse_task(pool, id, handler, cell);
        });
    }

    fn on_shutdown(&mut self) {
        // Drop the reactor's reference; in-flight tasks observe unique()
        // and abandon the context.
        self.cell.reset();
    }
}

fn run_parse_task(
    pool: PoolHandle,
    id: SocketId,
    handler: Arc<dyn JsonHandler>,
    cell: SharedCtx<JsonShared>,
) {
    if cell.unique() {
        return;
    }
    let Some(shared) = cell.get() else {
        return;
    };
    let mut ctx = shared.ctx.lock().unwrap();
    let mut need_clear = false;
    loop {
        ctx.merge_from(&shared.stage);
        if cell.unique() {
            break;
        }
        if !ctx.analyse() {
            break;
        }
        if !ctx.is_done() {
            pool.close(id, false);
            break;
        }
        if cell.unique() {
            break;
        }
        let reply = ctx.content().and_then(|message| handler.on_message(message));
        if let Some(bytes) = reply {
            pool.send_tcp(id, &bytes);
        }
        ctx.restart();
        need_clear = true;
    }
    if need_clear {
        ctx.clear();
    }
}
