//! Shared harness for driving the connection state machine the way the
//! I/O driver would, minus the sockets.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use vhostd::{AccessRecord, AccessSink, Config, Connection};

/// Sink that keeps every record in memory for assertions.
#[derive(Default)]
pub struct CaptureSink {
    pub records: Mutex<Vec<AccessRecord>>,
}

impl AccessSink for CaptureSink {
    fn append(&self, record: &AccessRecord) {
        self.records.lock().push(record.clone());
    }
}

/// A throwaway document tree with one virtual host directory.
pub struct TestSite {
    pub dir: TempDir,
}

impl TestSite {
    pub fn new(host: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp docroot");
        std::fs::create_dir(dir.path().join(host)).expect("create host dir");
        TestSite { dir }
    }

    pub fn docroot(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, host: &str, relative: &str, contents: &[u8]) {
        let path = self.dir.path().join(host).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(path, contents).expect("write site file");
    }

    pub fn mkdir(&self, host: &str, relative: &str) {
        std::fs::create_dir_all(self.dir.path().join(host).join(relative))
            .expect("create site dir");
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.document_root = self.docroot().to_str().unwrap().to_string();
        config
    }
}

pub fn connection(config: Config) -> (Connection, Arc<CaptureSink>) {
    let sink = Arc::new(CaptureSink::default());
    let conn = Connection::new(Arc::new(config), sink.clone(), None);
    (conn, sink)
}

/// Copy bytes into the machine's input window, honoring whatever window
/// size it offers. Stops early if the connection terminates mid-feed.
pub fn feed(conn: &mut Connection, bytes: &[u8]) {
    let mut offset = 0;
    while offset < bytes.len() {
        let window = conn.input_window();
        if window.is_empty() {
            break;
        }
        let n = window.len().min(bytes.len() - offset);
        window[..n].copy_from_slice(&bytes[offset..offset + n]);
        conn.append_input(n);
        offset += n;
    }
}

/// Pull everything the machine wants written, reporting full drains the
/// way a well-behaved driver would.
pub fn drain(conn: &mut Connection) -> Vec<u8> {
    let mut out = Vec::new();
    while conn.has_output() {
        let total = {
            let view = conn.output_view();
            for slice in &view {
                out.extend_from_slice(slice);
            }
            view.iter().map(|s| s.len()).sum()
        };
        conn.drop_output(total);
    }
    out
}

pub fn run_request(conn: &mut Connection, request: &[u8]) -> Vec<u8> {
    feed(conn, request);
    drain(conn)
}

/// Split a raw response into (head, body) at the blank line.
pub fn split_response(response: &[u8]) -> (String, Vec<u8>) {
    let pos = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    (
        String::from_utf8_lossy(&response[..pos + 4]).into_owned(),
        response[pos + 4..].to_vec(),
    )
}

/// Drop the Date header so responses generated at different instants
/// compare equal.
pub fn strip_date(response: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(response);
    let mut out = String::new();
    for part in text.split_inclusive("\r\n") {
        if !part.starts_with("Date: ") {
            out.push_str(part);
        }
    }
    out.into_bytes()
}
