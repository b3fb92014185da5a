//! End-to-end HTTP server tests over real sockets.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use netpool::NetworkPool;
use netpool_http::{HttpHandler, HttpRequest, HttpResponse, HttpServer};

struct EchoHandler;

impl HttpHandler for EchoHandler {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let mut body = format!("{} {}|", request.method, request.uri).into_bytes();
        body.extend_from_slice(&request.body);
        HttpResponse::ok(body)
    }
}

fn start_server(pool: &NetworkPool) -> SocketAddr {
    let (bound_tx, bound_rx) = mpsc::channel();
    let server = HttpServer::new(pool.handle(), Arc::new(EchoHandler)).on_bound(move |_, local| {
        let _ = bound_tx.send(local);
    });
    pool.bind_tcp("127.0.0.1:0".parse().unwrap(), Box::new(server));
    bound_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("server did not bind")
}

fn read_until_eof(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => panic!("read error: {e}"),
        }
    }
    out
}

fn response_body(response: &[u8]) -> &[u8] {
    let text = std::str::from_utf8(response).unwrap();
    let header_end = text.find("\r\n\r\n").expect("header terminator") + 4;
    &response[header_end..]
}

#[test]
fn simple_request_response() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_server(&pool);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\nHost: test\r\n\r\n")
        .unwrap();

    let response = read_until_eof(&mut stream);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("connection: close"));
    assert_eq!(response_body(&response), b"GET /hello|");
}

#[test]
fn body_is_delivered_to_handler() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_server(&pool);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(b"POST /submit HTTP/1.1\r\nContent-Length: 7\r\n\r\npayload")
        .unwrap();

    let response = read_until_eof(&mut stream);
    assert_eq!(response_body(&response), b"POST /submit|payload");
}

#[test]
fn chunked_request_body() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_server(&pool);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(
            b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n",
        )
        .unwrap();

    let response = read_until_eof(&mut stream);
    assert_eq!(response_body(&response), b"POST /up|Hello World");
}

#[test]
fn keep_alive_pipelining() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_server(&pool);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    // Two pipelined requests; only the second closes the connection.
    stream
        .write_all(
            b"GET /a HTTP/1.1\r\nConnection: Keep-Alive\r\n\r\nGET /b HTTP/1.1\r\n\r\n",
        )
        .unwrap();

    let response = read_until_eof(&mut stream);
    let text = String::from_utf8_lossy(&response);
    let first = text.find("GET /a|").expect("first response body");
    let second = text.find("GET /b|").expect("second response body");
    assert!(first < second);
    assert!(text.contains("connection: keep-alive"));
    assert!(text.contains("connection: close"));
}

#[test]
fn malformed_request_closes_connection() {
    let pool = NetworkPool::new().expect("pool");
    let addr = start_server(&pool);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    // Bare LF after the request line: a parse error.
    stream.write_all(b"GET / HTTP/1.1\nHost: x\r\n\r\n").unwrap();

    let response = read_until_eof(&mut stream);
    assert!(response.is_empty(), "no response expected, got {response:?}");
}
