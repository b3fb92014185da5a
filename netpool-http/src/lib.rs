//! HTTP/1.1 server sessions on top of netpool.
//!
//! [`HttpServer`] is a [`TcpServerCallback`] factory: each accepted
//! connection gets a session owning one [`HttpContext`], parsed inline on
//! the reactor thread. Completed requests go to the user's
//! [`HttpHandler`]; the response is serialised and sent back through the
//! pool. Keep-alive connections parse pipelined requests in a loop; a
//! parse error closes the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use netpool::{PoolHandle, SlabBlock, SocketId, TcpCallback, TcpServerCallback};
use protocol_http::HttpContext;

/// A fully parsed request handed to the handler.
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub keep_alive: bool,
}

/// The handler's reply, serialised by the session.
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, reason: &str) -> HttpResponse {
        HttpResponse {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> HttpResponse {
        let mut response = HttpResponse::new(200, "OK");
        response.body = body.into();
        response
    }

    pub fn header(mut self, name: &str, value: &str) -> HttpResponse {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn serialize(&self, keep_alive: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(self.status.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.reason.as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"connection: ");
        out.extend_from_slice(if keep_alive {
            b"keep-alive".as_slice()
        } else {
            b"close".as_slice()
        });
        out.extend_from_slice(b"\r\ncontent-length: ");
        out.extend_from_slice(self.body.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Produces a response for each parsed request. Runs on the reactor
/// thread; keep it quick or offload to a work queue.
pub trait HttpHandler: Send + Sync {
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

impl<F> HttpHandler for F
where
    F: Fn(&HttpRequest) -> HttpResponse + Send + Sync,
{
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self(request)
    }
}

type BoundFn = Box<dyn FnMut(SocketId, SocketAddr) + Send>;

/// Session factory for an HTTP listener.
pub struct HttpServer {
    pool: PoolHandle,
    handler: Arc<dyn HttpHandler>,
    on_bound: Option<BoundFn>,
}

impl HttpServer {
    pub fn new(pool: PoolHandle, handler: Arc<dyn HttpHandler>) -> HttpServer {
        HttpServer {
            pool,
            handler,
            on_bound: None,
        }
    }

    /// Observe the listener's socket id and bound address.
    pub fn on_bound(mut self, f: impl FnMut(SocketId, SocketAddr) + Send + 'static) -> HttpServer {
        self.on_bound = Some(Box::new(f));
        self
    }
}

impl TcpServerCallback for HttpServer {
    fn new_session(&mut self) -> Box<dyn TcpCallback> {
        Box::new(HttpSession {
            pool: self.pool.clone(),
            handler: self.handler.clone(),
            id: None,
            ctx: HttpContext::new(),
        })
    }

    fn on_startup(&mut self, id: SocketId, local: SocketAddr) {
        if let Some(on_bound) = &mut self.on_bound {
            on_bound(id, local);
        }
    }

    fn on_shutdown(&mut self) {}

    fn on_listen_error(&mut self, err: std::io::Error) {
        log::warn!("http listen error: {err}");
    }
}

struct HttpSession {
    pool: PoolHandle,
    handler: Arc<dyn HttpHandler>,
    id: Option<SocketId>,
    ctx: HttpContext,
}

impl HttpSession {
    fn build_request(ready: &HttpContext) -> Option<HttpRequest> {
        let (method, uri, version) = ready.request_line().ok()?;
        Some(HttpRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers: ready.headers().ok()?,
            body: ready.body().ok()?.as_slice().to_vec(),
            keep_alive: ready.is_keep_alive(),
        })
    }
}

impl TcpCallback for HttpSession {
    fn on_startup(&mut self, id: SocketId, _peer: SocketAddr) {
        self.id = Some(id);
    }

    fn on_data(&mut self, chunk: SlabBlock) {
        let Some(id) = self.id else {
            return;
        };
        self.ctx.push_raw(chunk);
        self.ctx.merge();
        loop {
            if !self.ctx.analyse() {
                break;
            }
            if !self.ctx.is_done() {
                self.pool.close(id, false);
                break;
            }
            let mut ready = HttpContext::new();
            if self.ctx.reinit_for_next(&mut ready).is_err() {
                break;
            }
            match HttpSession::build_request(&ready) {
                Some(request) => {
                    let response = self.handler.handle(&request);
                    self.pool
                        .send_tcp(id, &response.serialize(request.keep_alive));
                    if !request.keep_alive {
                        self.pool.close(id, false);
                        break;
                    }
                    // Keep-alive: loop for a pipelined next request.
                }
                None => {
                    self.pool.close(id, false);
                    break;
                }
            }
        }
    }

    fn on_shutdown(&mut self) {}
}
