use thiserror::Error;

/// Host-layer failures. Protocol-level problems never surface here;
/// the state machine answers those with HTTP status codes instead.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
