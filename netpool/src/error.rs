use std::io;

use thiserror::Error;

/// Errors surfaced while constructing a pool. Command methods themselves are
/// fire-and-forget; their outcomes arrive through the callback surface.
#[derive(Debug, Error)]
pub enum Error {
    /// A syscall failed while setting up the reactor.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The reactor thread could not be initialised.
    #[error("reactor setup: {0}")]
    ReactorSetup(String),
}
