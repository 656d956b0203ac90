//! Server configuration. Built once at startup, immutable afterwards,
//! and shared by reference with every connection.

use std::ffi::OsStr;

use crate::mime;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the acceptor binds to.
    pub listen_addr: String,
    /// Base directory; each virtual host lives in `<root>/<hostname>`.
    pub document_root: String,
    /// File served when a directory is requested with a trailing slash.
    pub default_page: String,
    /// Hostname assumed for pre-HTTP/1.1 requests without a Host header.
    /// Empty disables the fallback and such requests get a 400.
    pub default_hostname: String,
    /// Value of the Server response header. Empty suppresses the header.
    pub server_string: String,
    /// Directory for per-host access logs. Empty disables access logging.
    pub logfile_root: String,
    /// Chunk size for streaming file payloads.
    pub io_block_size: usize,
    /// Longest request or header line accepted before answering 400.
    pub max_line_length: usize,
    /// Seconds to wait for request bytes; also advertised as the
    /// keep-alive timeout.
    pub network_read_timeout: u64,
    /// Seconds to wait for the peer to accept response bytes.
    pub network_write_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            document_root: "./htdocs".to_string(),
            default_page: "index.html".to_string(),
            default_hostname: String::new(),
            server_string: concat!("vhostd/", env!("CARGO_PKG_VERSION")).to_string(),
            logfile_root: String::new(),
            io_block_size: 4096,
            max_line_length: 4096,
            network_read_timeout: 30,
            network_write_timeout: 30,
        }
    }
}

impl Config {
    /// Load configuration from `VHOSTD_*` environment variables, falling
    /// back to the defaults above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            listen_addr: env_str("VHOSTD_LISTEN_ADDR", defaults.listen_addr),
            document_root: env_str("VHOSTD_DOCUMENT_ROOT", defaults.document_root),
            default_page: env_str("VHOSTD_DEFAULT_PAGE", defaults.default_page),
            default_hostname: env_str("VHOSTD_DEFAULT_HOSTNAME", defaults.default_hostname),
            server_string: env_str("VHOSTD_SERVER_STRING", defaults.server_string),
            logfile_root: env_str("VHOSTD_LOGFILE_ROOT", defaults.logfile_root),
            io_block_size: env_parse("VHOSTD_IO_BLOCK_SIZE", defaults.io_block_size),
            max_line_length: env_parse("VHOSTD_MAX_LINE_LENGTH", defaults.max_line_length),
            network_read_timeout: env_parse("VHOSTD_READ_TIMEOUT", defaults.network_read_timeout),
            network_write_timeout: env_parse("VHOSTD_WRITE_TIMEOUT", defaults.network_write_timeout),
        }
    }

    /// MIME type for a resolved filename.
    pub fn get_content_type(&self, filename: &OsStr) -> &'static str {
        mime::content_type(os_str_bytes(filename))
    }
}

fn env_str(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(unix)]
fn os_str_bytes(s: &OsStr) -> &[u8] {
    std::os::unix::ffi::OsStrExt::as_bytes(s)
}

#[cfg(not(unix))]
fn os_str_bytes(s: &OsStr) -> &[u8] {
    s.to_str().map(str::as_bytes).unwrap_or(b"")
}
