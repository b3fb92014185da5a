//! Pool runtime metrics.
//!
//! Static counters and gauges for connections, bytes, datagrams, commands,
//! and failure modes. Exposed through metriken's registry for scraping by
//! the embedding process.

use metriken::{metric, Counter, Gauge};

// ── Connection lifecycle ─────────────────────────────────────────

#[metric(
    name = "netpool/connections/accepted",
    description = "Total inbound connections accepted"
)]
pub static CONNECTIONS_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "netpool/connections/connected",
    description = "Total outbound connections established"
)]
pub static CONNECTIONS_CONNECTED: Counter = Counter::new();

#[metric(
    name = "netpool/connections/closed",
    description = "Total connections closed"
)]
pub static CONNECTIONS_CLOSED: Counter = Counter::new();

#[metric(
    name = "netpool/connections/active",
    description = "Currently active connections"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "netpool/timeouts/fired",
    description = "Connection timeouts that closed a connection"
)]
pub static TIMEOUTS_FIRED: Counter = Counter::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(name = "netpool/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(name = "netpool/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

// ── UDP ──────────────────────────────────────────────────────────

#[metric(
    name = "netpool/udp/datagrams_received",
    description = "Total UDP datagrams received"
)]
pub static UDP_DATAGRAMS_RECEIVED: Counter = Counter::new();

#[metric(
    name = "netpool/udp/datagrams_sent",
    description = "Total UDP datagrams sent"
)]
pub static UDP_DATAGRAMS_SENT: Counter = Counter::new();

// ── Command queue ────────────────────────────────────────────────

#[metric(
    name = "netpool/commands/executed",
    description = "Pending commands drained and executed by the reactor"
)]
pub static COMMANDS_EXECUTED: Counter = Counter::new();

// ── Receive buffer ───────────────────────────────────────────────

#[metric(
    name = "netpool/recv/overflows",
    description = "Receive buffers poisoned by capacity overflow"
)]
pub static RECV_OVERFLOWS: Counter = Counter::new();
