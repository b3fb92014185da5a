//! Incremental HTTP/1.1 request framer.
//!
//! [`HttpContext`] owns a receive buffer and turns its growing byte window
//! into one well-formed HTTP/1.1 message at a time, without copying. Feed
//! it raw chunks, `merge()`, then call [`HttpContext::analyse`] until it
//! reports a terminal state; on success the message is described by the
//! request-line, header, and body accessors. `reinit_for_next` shifts any
//! pipelined remainder to the front and resets the state machine for the
//! next message on the same connection.

mod context;
mod error;

pub use context::{HttpContext, HttpState};
pub use error::HttpError;
