//! Mapping from redis client errors to storage errors

use kvstore_core::KvError;
use redis::{ErrorKind, RedisError};

/// How a failed command affects the connection it ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionFate {
    /// The server answered coherently; the connection can be reused
    Reuse,
    /// The stream is in an unknown state and must be closed
    Discard,
}

fn is_transport(err: &RedisError) -> bool {
    err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
}

/// Classify an error raised while running commands
pub(crate) fn command_error(err: RedisError) -> (KvError, ConnectionFate) {
    if is_transport(&err) {
        return (KvError::Transport(err.to_string()), ConnectionFate::Discard);
    }
    match err.kind() {
        // Error replies (WRONGTYPE, EXECABORT, ...) arrive as well-formed frames.
        ErrorKind::ResponseError | ErrorKind::ExecAbortError => {
            (KvError::Protocol(err.to_string()), ConnectionFate::Reuse)
        }
        _ => (KvError::Protocol(err.to_string()), ConnectionFate::Discard),
    }
}

/// Any failure while opening a connection is a transport failure
pub(crate) fn dial_error(address: &str, err: RedisError) -> KvError {
    KvError::Transport(format!("connecting to {}: {}", address, err))
}
