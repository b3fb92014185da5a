use thiserror::Error;

/// Errors from [`HttpContext`](crate::HttpContext) accessors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HttpError {
    /// The accessor needs a completed message (`state == Done`).
    #[error("message is not complete")]
    NotReady,
    /// The request line does not have the `METHOD URI VERSION` shape.
    #[error("malformed request line")]
    BadRequestLine,
}
