//! vhostd serves static files over HTTP/1.1, one document tree per
//! virtual host.
//!
//! The crate is split along the line between protocol and I/O. The
//! protocol side is synchronous and deterministic: RFC 2616 grammar
//! primitives ([`rfc2616`]), the request parsers built on them
//! ([`parser`]), the input and output buffers ([`input`], [`output`]),
//! and the connection state machine ([`conn`]) that ties them to the
//! filesystem ([`resolve`], [`mime`]) and to the access log
//! ([`access`]). The I/O side ([`server`]) is a thin tokio driver that
//! owns the sockets and the timeouts and feeds bytes through the
//! state machine's driver contract.

pub mod access;
pub mod config;
pub mod conn;
pub mod error;
pub mod input;
pub mod mime;
pub mod output;
pub mod parser;
pub mod request;
pub mod resolve;
pub mod rfc2616;
pub mod server;

pub use access::{AccessRecord, AccessSink, DiscardSink, FileSink};
pub use config::Config;
pub use conn::{Connection, State};
pub use error::{ServerError, ServerResult};
pub use input::InputBuffer;
pub use output::OutputBuffer;
pub use request::{Request, Url};
pub use server::Server;
