//! The per-connection HTTP protocol driver.
//!
//! A [`Connection`] turns bytes fed in by an external I/O driver into
//! parsed requests and queues response bytes for the driver to write
//! out. It owns all per-transaction state: the request record, both
//! buffers, and the payload file handle. The driver's obligations are
//! small: read into [`Connection::input_window`], report the count via
//! [`Connection::append_input`], write out [`Connection::output_view`],
//! report progress via [`Connection::drop_output`], and close once
//! [`Connection::is_terminated`] and the output has drained.
//!
//! The state machine is re-entrant at every byte boundary: any split of
//! the request stream into chunks produces the same transitions and the
//! same response bytes.

use std::fs::File;
use std::io::{ErrorKind, IoSlice, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, error, info, trace};

use crate::access::{AccessRecord, AccessSink};
use crate::config::Config;
use crate::parser;
use crate::request::Request;
use crate::resolve::{self, escape_html};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadRequestLine,
    ReadRequestHeader,
    ReadRequestBody,
    SetupReply,
    WriteResponse,
    Terminate,
}

const HTML_400_HEAD: &[u8] = b"<html>\r\n<head>\r\n  <title>Bad HTTP Request</title>\r\n</head>\r\n<body>\r\n<h1>Bad HTTP Request</h1>\r\n<p>The HTTP request received by this server was incorrect:</p>\r\n<blockquote>\r\n";
const HTML_400_TAIL: &[u8] = b"</blockquote>\r\n</body>\r\n</html>\r\n";
const HTML_404_HEAD: &[u8] = b"<html>\r\n<head>\r\n  <title>Page Not Found</title>\r\n</head>\r\n<body>\r\n<h1>Page Not Found</h1>\r\n<p>The requested page <tt>";
const HTML_404_TAIL: &[u8] = b"</tt> does not exist on this server.</p>\r\n</body>\r\n</html>\r\n";
const HTML_301_HEAD: &[u8] = b"<html>\r\n<head>\r\n  <title>Page has moved permanently</title>\r\n</head>\r\n<body>\r\n<h1>Document Has Moved</h1>\r\n<p>The document has moved <a href=\"";
const HTML_301_TAIL: &[u8] = b"\">here</a>.\r\n</body>\r\n</html>\r\n";

pub struct Connection {
    config: Arc<Config>,
    sink: Arc<dyn AccessSink>,
    peer: Option<SocketAddr>,
    request: Request,
    inbuf: crate::input::InputBuffer,
    outbuf: crate::output::OutputBuffer,
    payload: Option<File>,
    scratch: Vec<u8>,
    use_persistent_connection: bool,
    state: State,
}

impl Connection {
    pub fn new(config: Arc<Config>, sink: Arc<dyn AccessSink>, peer: Option<SocketAddr>) -> Self {
        trace!("accepting new connection");
        Connection {
            config,
            sink,
            peer,
            request: Request::new(),
            inbuf: crate::input::InputBuffer::new(crate::input::MIN_BUF_SIZE),
            outbuf: crate::output::OutputBuffer::new(),
            payload: None,
            scratch: Vec::new(),
            use_persistent_connection: false,
            state: State::ReadRequestLine,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == State::Terminate
    }

    // ----- driver contract --------------------------------------------------

    /// Writable tail of the input buffer, grown or compacted as needed.
    /// Empty exactly when the connection has terminated.
    pub fn input_window(&mut self) -> &mut [u8] {
        if self.state == State::Terminate {
            return &mut [];
        }
        self.inbuf.flush();
        self.inbuf.space_mut()
    }

    /// The driver wrote `n` bytes into the input window.
    pub fn append_input(&mut self, n: usize) {
        self.inbuf.append(n);
        if self.state != State::Terminate {
            self.drive();
        }
    }

    /// Byte ranges to write out, in emission order. Borrowed; invalid
    /// after the next call that feeds or steps the machine.
    pub fn output_view(&self) -> Vec<IoSlice<'_>> {
        self.outbuf.scatter()
    }

    pub fn has_output(&self) -> bool {
        !self.outbuf.is_empty()
    }

    /// The driver sent the first `n` output bytes.
    pub fn drop_output(&mut self, n: usize) {
        debug_assert!(n > 0);
        self.outbuf.consume(n);
        if self.state != State::Terminate {
            self.drive();
            if self.outbuf.is_empty() {
                self.inbuf.flush();
            }
        }
    }

    /// The peer closed its end. Returns true when that happened between
    /// requests with nothing buffered, which is a routine end of a
    /// persistent connection rather than an aborted transaction.
    pub fn peer_closed(&mut self) -> bool {
        let idle = self.state == State::ReadRequestLine && self.inbuf.is_empty();
        if !idle {
            debug!("connection terminated by peer");
        }
        self.state = State::Terminate;
        idle
    }

    // ----- state machine ----------------------------------------------------

    /// Run handlers until one reports that it needs more input or has
    /// queued output that must drain first, which it signals by
    /// returning its own state.
    fn drive(&mut self) {
        loop {
            let entry = self.state;
            let next = match entry {
                State::ReadRequestLine => self.read_request_line(),
                State::ReadRequestHeader => self.read_request_header(),
                State::ReadRequestBody => self.read_request_body(),
                State::SetupReply => self.setup_reply(),
                State::WriteResponse => self.write_response(),
                State::Terminate => break,
            };
            self.state = next;
            if next == entry {
                break;
            }
        }
    }

    fn read_request_line(&mut self) -> State {
        match memchr::memmem::find(self.inbuf.data(), b"\r\n") {
            Some(i) => {
                let line_end = i + 2;
                let len =
                    parser::parse_request_line(&mut self.request, &self.inbuf.data()[..line_end]);
                debug_assert!(len == 0 || len == line_end);
                if len == 0 {
                    return self.protocol_error("Invalid HTTP request line.\r\n");
                }
                trace!(
                    "read request line: method = {}, version = {}.{}, path = '{}', query = '{}'",
                    self.request.method,
                    self.request.major_version,
                    self.request.minor_version,
                    self.request.url.path,
                    self.request.url.query
                );
                self.inbuf.consume(len);
                State::ReadRequestHeader
            }
            None => {
                if self.inbuf.len() > self.config.max_line_length {
                    return self
                        .protocol_error("Aborting because of excessively long header lines.\r\n");
                }
                State::ReadRequestLine
            }
        }
    }

    fn read_request_header(&mut self) -> State {
        loop {
            // An empty line terminates the request header.
            let data = self.inbuf.data();
            if data.len() >= 2 && data[0] == b'\r' && data[1] == b'\n' {
                self.inbuf.consume(2);
                return State::ReadRequestBody;
            }

            let p = parser::find_next_line(data);
            if p == data.len() {
                if self.inbuf.len() > self.config.max_line_length {
                    return self
                        .protocol_error("Aborting because of excessively long header lines.\r\n");
                }
                return State::ReadRequestHeader;
            }

            let parsed = parser::parse_header(&self.inbuf.data()[..p]);
            self.inbuf.consume(p);
            let (name, value) = match parsed {
                Some((_, name, value)) => (name, value),
                None => return self.protocol_error("Invalid HTTP request.\r\n"),
            };
            if let Some(next) = self.dispatch_header(&name, &value) {
                return next;
            }
        }
    }

    fn dispatch_header(&mut self, name: &str, value: &str) -> Option<State> {
        if name.eq_ignore_ascii_case("Host") {
            if parser::parse_host_header(&mut self.request, value.as_bytes()) == 0 {
                return Some(self.protocol_error("Malformed <tt>Host</tt> header.\r\n"));
            }
            trace!(host = %self.request.host, port = ?self.request.port, "read Host header");
        } else if name.eq_ignore_ascii_case("If-Modified-Since") {
            if parser::parse_if_modified_since_header(&mut self.request, value.as_bytes()) == 0 {
                info!("ignoring malformed If-Modified-Since header '{}'", value);
            } else {
                trace!(timestamp = ?self.request.if_modified_since, "read If-Modified-Since header");
            }
        } else if name.eq_ignore_ascii_case("Connection") {
            self.request.connection = value.to_string();
        } else if name.eq_ignore_ascii_case("Keep-Alive") {
            self.request.keep_alive = value.to_string();
        } else if name.eq_ignore_ascii_case("User-Agent") {
            self.request.user_agent = value.to_string();
        } else if name.eq_ignore_ascii_case("Referer") {
            self.request.referer = value.to_string();
        } else {
            trace!("ignoring unknown header '{}'", name);
        }
        None
    }

    // Bodies are not ingested.
    fn read_request_body(&mut self) -> State {
        State::SetupReply
    }

    fn setup_reply(&mut self) -> State {
        if self.request.method != "GET" && self.request.method != "HEAD" {
            let message = format!(
                "<p>This server does not support an HTTP request called <tt>{}</tt>.</p>\r\n",
                escape_html(&self.request.method)
            );
            return self.protocol_error(&message);
        }

        // Settle on a hostname, lowercased.
        if self.request.host.is_empty() {
            if !self.request.url.host.is_empty() {
                self.request.host = self.request.url.host.clone();
            } else if !self.config.default_hostname.is_empty()
                && (self.request.major_version == 0
                    || (self.request.major_version == 1 && self.request.minor_version == 0))
            {
                self.request.host = self.config.default_hostname.clone();
            } else {
                return self.protocol_error(
                    "<p>Your HTTP request did not contain a <tt>Host</tt> header.</p>\r\n",
                );
            }
        }
        self.request.host.make_ascii_lowercase();

        if self.request.port.is_none() {
            self.request.port = self.request.url.port;
        }

        // Map the hostname and URL onto the filesystem.
        let decoded = match resolve::urldecode(self.request.url.path.as_bytes()) {
            Some(decoded) => decoded,
            None => {
                return self.protocol_error(
                    "<p>The requested URL contained an invalid encoded character.</p>\r\n",
                )
            }
        };
        let document_root =
            PathBuf::from(format!("{}/{}", self.config.document_root, self.request.host));
        let mut filename_bytes = Vec::new();
        filename_bytes.extend_from_slice(path_bytes(&document_root));
        filename_bytes.extend_from_slice(&decoded);
        let mut filename = resolve::bytes_to_path(filename_bytes);

        match resolve::path_in_hierarchy(&document_root, &filename) {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    "peer requested URL 'http://{}:{}{}' ('{}'), which fails the hierarchy check",
                    self.request.host,
                    self.request.port.unwrap_or(80),
                    self.request.url.path,
                    filename.display()
                );
                return self.file_not_found();
            }
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    info!(
                        "peer requested URL 'http://{}:{}{}' ('{}'), which fails the hierarchy check: {}",
                        self.request.host,
                        self.request.port.unwrap_or(80),
                        self.request.url.path,
                        filename.display(),
                        e
                    );
                }
                return self.file_not_found();
            }
        }

        let metadata = loop {
            let md = match std::fs::metadata(&filename) {
                Ok(md) => md,
                Err(e) => {
                    if e.kind() != ErrorKind::NotFound {
                        info!(
                            "peer requested URL 'http://{}:{}{}' ('{}'), which fails stat: {}",
                            self.request.host,
                            self.request.port.unwrap_or(80),
                            self.request.url.path,
                            filename.display(),
                            e
                        );
                    }
                    return self.file_not_found();
                }
            };
            if md.is_dir() {
                if self.request.url.path.ends_with('/') {
                    let mut with_page = filename.into_os_string();
                    with_page.push(&self.config.default_page);
                    filename = PathBuf::from(with_page);
                    continue;
                } else {
                    let location = format!("{}/", self.request.url.path);
                    return self.moved_permanently(&location);
                }
            }
            break md;
        };

        self.use_persistent_connection = self.request.supports_persistent_connection();

        // A matching If-Modified-Since saves the transfer.
        if let Some(if_modified_since) = self.request.if_modified_since {
            let mtime = file_mtime(&metadata);
            if mtime <= if_modified_since {
                trace!(
                    "requested file ('{}') has mtime {} and if-modified-since was {}: not modified",
                    filename.display(),
                    mtime,
                    if_modified_since
                );
                self.not_modified();
                return self.restart();
            }
        }

        // Open the payload before committing to a 200 so an open failure
        // can still turn into a clean 404.
        if self.request.method == "GET" {
            match File::open(&filename) {
                Ok(file) => self.payload = Some(file),
                Err(e) => {
                    error!("cannot open requested file {}: {}", filename.display(), e);
                    return self.file_not_found();
                }
            }
            let block = self.config.io_block_size.max(1024).min(metadata.len() as usize);
            self.scratch.resize(block, 0);
        }

        let mut head = String::with_capacity(256);
        head.push_str("HTTP/1.1 200 OK\r\n");
        if !self.config.server_string.is_empty() {
            head.push_str(&format!("Server: {}\r\n", self.config.server_string));
        }
        head.push_str(&format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now())));
        head.push_str(&format!(
            "Content-Type: {}\r\n",
            self.config.get_content_type(filename.as_os_str())
        ));
        head.push_str(&format!("Content-Length: {}\r\n", metadata.len()));
        if let Ok(modified) = metadata.modified() {
            head.push_str(&format!("Last-Modified: {}\r\n", httpdate::fmt_http_date(modified)));
        }
        self.push_connection_header(&mut head);
        head.push_str("\r\n");
        self.request.status_code = Some(200);
        self.request.object_size = Some(metadata.len());
        self.outbuf.push_back(head.as_bytes());

        if self.request.method == "HEAD" {
            trace!("answering HEAD, no payload");
            self.log_access();
            return self.restart();
        }
        State::WriteResponse
    }

    fn write_response(&mut self) -> State {
        let file = match self.payload.as_mut() {
            Some(file) => file,
            None => {
                error!("payload file handle vanished while writing the response");
                return State::Terminate;
            }
        };
        match file.read(&mut self.scratch) {
            Ok(0) => {
                self.payload = None;
                self.log_access();
                self.restart()
            }
            Ok(n) => {
                self.outbuf.push_back(&self.scratch[..n]);
                State::WriteResponse
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => State::WriteResponse,
            Err(e) => {
                error!("read from payload file failed: {}", e);
                State::Terminate
            }
        }
    }

    /// Either rearm for the next request on this connection or wind it
    /// down. Bytes already received past the previous request stay in
    /// the input buffer untouched.
    fn restart(&mut self) -> State {
        trace!(
            "{}",
            if self.use_persistent_connection { "keep alive" } else { "shut down" }
        );
        if self.use_persistent_connection {
            self.request = Request::new();
            self.payload = None;
            self.scratch.clear();
            self.use_persistent_connection = false;
            self.inbuf.flush_gap();
            State::ReadRequestLine
        } else {
            State::Terminate
        }
    }

    fn push_connection_header(&self, head: &mut String) {
        if self.use_persistent_connection {
            head.push_str(&format!(
                "Connection: keep-alive\r\nKeep-Alive: timeout={}, max=100\r\n",
                self.config.network_read_timeout
            ));
        } else {
            head.push_str("Connection: close\r\n");
        }
    }

    fn common_error_head(&self, status_line: &str) -> String {
        let mut head = String::with_capacity(256);
        head.push_str(status_line);
        if !self.config.server_string.is_empty() {
            head.push_str(&format!("Server: {}\r\n", self.config.server_string));
        }
        head.push_str(&format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now())));
        head.push_str("Content-Type: text/html\r\n");
        head
    }

    // ----- standard replies -------------------------------------------------

    fn protocol_error(&mut self, message: &str) -> State {
        info!("protocol error: {}", message.trim_end());
        let mut head = self.common_error_head("HTTP/1.1 400 Bad Request\r\n");
        if !self.request.connection.is_empty() {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");
        self.request.status_code = Some(400);
        self.request.object_size = Some(0);
        self.use_persistent_connection = false;
        self.outbuf.reset();
        self.outbuf.push_back(head.as_bytes());
        self.outbuf.append_static(HTML_400_HEAD);
        self.outbuf.push_back(message.as_bytes());
        self.outbuf.append_static(HTML_400_TAIL);
        self.log_access();
        State::Terminate
    }

    fn file_not_found(&mut self) -> State {
        info!("not found: URL '{}'", self.request.url.path);
        let mut head = self.common_error_head("HTTP/1.1 404 Not Found\r\n");
        if !self.request.connection.is_empty() {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");
        self.request.status_code = Some(404);
        self.request.object_size = Some(0);
        self.use_persistent_connection = false;
        self.outbuf.reset();
        self.outbuf.push_back(head.as_bytes());
        self.outbuf.append_static(HTML_404_HEAD);
        self.outbuf
            .push_back(escape_html(&self.request.url.path).as_bytes());
        self.outbuf.append_static(HTML_404_TAIL);
        self.log_access();
        State::Terminate
    }

    fn moved_permanently(&mut self, path: &str) -> State {
        info!("requested page {} has moved to '{}'", self.request.url.path, path);
        let mut location = format!("http://{}", self.request.host);
        match self.request.port {
            Some(port) if port != 80 => location.push_str(&format!(":{}", port)),
            _ => {}
        }
        location.push_str(path);

        let mut head = self.common_error_head("HTTP/1.1 301 Moved Permanently\r\n");
        head.push_str(&format!("Location: {}\r\n", location));
        if !self.request.connection.is_empty() {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");
        self.request.status_code = Some(301);
        self.request.object_size = Some(0);
        self.use_persistent_connection = false;
        self.outbuf.reset();
        self.outbuf.push_back(head.as_bytes());
        self.outbuf.append_static(HTML_301_HEAD);
        self.outbuf.push_back(location.as_bytes());
        self.outbuf.append_static(HTML_301_TAIL);
        self.log_access();
        State::Terminate
    }

    /// Unlike the other standard replies this one keeps the connection's
    /// persistence decision; the caller follows it with `restart()`.
    fn not_modified(&mut self) {
        trace!("requested page not modified");
        let mut head = String::with_capacity(128);
        head.push_str("HTTP/1.1 304 Not Modified\r\n");
        if !self.config.server_string.is_empty() {
            head.push_str(&format!("Server: {}\r\n", self.config.server_string));
        }
        head.push_str(&format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now())));
        self.push_connection_header(&mut head);
        head.push_str("\r\n");
        self.request.status_code = Some(304);
        self.outbuf.push_back(head.as_bytes());
        self.log_access();
    }

    // ----- access log -------------------------------------------------------

    fn log_access(&mut self) {
        let status_code = match self.request.status_code {
            Some(code) => code,
            None => {
                error!("can't write access log entry because there is no status code");
                return;
            }
        };
        let record = AccessRecord {
            peer: self.peer.map(|addr| addr.ip()),
            host: self.request.host.clone(),
            start_up_time: self.request.start_up_time,
            method: self.request.method.clone(),
            path: self.request.url.path.clone(),
            major_version: self.request.major_version,
            minor_version: self.request.minor_version,
            status_code,
            object_size: self.request.object_size,
            referer: self.request.referer.clone(),
            user_agent: self.request.user_agent.clone(),
        };
        self.sink.append(&record);
    }
}

fn file_mtime(metadata: &std::fs::Metadata) -> i64 {
    match metadata.modified() {
        Ok(t) => match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> &[u8] {
    std::os::unix::ffi::OsStrExt::as_bytes(path.as_os_str())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> &[u8] {
    path.to_str().map(str::as_bytes).unwrap_or(b"")
}
