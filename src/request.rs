//! The request record filled in by the parsers and consumed by the
//! connection state machine.

use std::time::SystemTime;

/// The relevant parts of an HTTP URL. The path is kept exactly as it
/// appeared on the wire; percent-decoding happens during file
/// resolution so redirects can echo the original spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: String,
}

/// Everything this server cares about in one HTTP request.
///
/// `method`, `url` and the version fields are frozen once header reading
/// begins. `host` is lowercase by the time a reply is being set up.
/// `status_code` is set before the response is written; `object_size` is
/// the payload size for success responses and zero for error pages.
#[derive(Debug, Clone)]
pub struct Request {
    pub start_up_time: SystemTime,
    pub method: String,
    pub url: Url,
    pub major_version: u32,
    pub minor_version: u32,
    pub host: String,
    pub port: Option<u16>,
    pub connection: String,
    pub keep_alive: String,
    pub if_modified_since: Option<i64>,
    pub user_agent: String,
    pub referer: String,
    pub status_code: Option<u16>,
    pub object_size: Option<u64>,
}

impl Request {
    pub fn new() -> Self {
        Request {
            start_up_time: SystemTime::now(),
            method: String::new(),
            url: Url::default(),
            major_version: 0,
            minor_version: 0,
            host: String::new(),
            port: None,
            connection: String::new(),
            keep_alive: String::new(),
            if_modified_since: None,
            user_agent: String::new(),
            referer: String::new(),
            status_code: None,
            object_size: None,
        }
    }

    /// Whether this request allows the connection to be reused. An
    /// explicit `Connection: close` wins, an explicit `keep-alive` wins
    /// next, otherwise HTTP/1.1 and later default to persistent. The
    /// comparison is against the whole header value, so a list like
    /// `close, keep-alive` matches neither branch and falls through to
    /// the version default.
    pub fn supports_persistent_connection(&self) -> bool {
        if self.connection.eq_ignore_ascii_case("close") {
            return false;
        }
        if self.connection.eq_ignore_ascii_case("keep-alive") {
            return true;
        }
        self.major_version >= 1 && self.minor_version >= 1
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}
