//! Access-log records and their sinks.
//!
//! The connection state machine assembles one [`AccessRecord`] per
//! completed transaction and hands it to whatever [`AccessSink`] it was
//! constructed with. Where the records end up is the host's business:
//! the server writes per-virtual-host files, tests capture them in
//! memory, and a server without a log directory discards them.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// One completed transaction, ready for formatting.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub peer: Option<IpAddr>,
    pub host: String,
    pub start_up_time: SystemTime,
    pub method: String,
    pub path: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub status_code: u16,
    pub object_size: Option<u64>,
    pub referer: String,
    pub user_agent: String,
}

pub trait AccessSink: Send + Sync {
    fn append(&self, record: &AccessRecord);
}

/// Drops every record. Used when no log directory is configured.
pub struct DiscardSink;

impl AccessSink for DiscardSink {
    fn append(&self, _record: &AccessRecord) {}
}

/// Writes one line per record to `<root>/<host>-access` (or
/// `no-hostname-access` for requests that never produced a hostname),
/// keeping the append-mode handles open across records.
pub struct FileSink {
    root: PathBuf,
    files: Mutex<FxHashMap<String, File>>,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSink { root: root.into(), files: Mutex::new(FxHashMap::default()) }
    }

    fn logfile_name(host: &str) -> String {
        if host.is_empty() {
            "no-hostname-access".to_string()
        } else {
            format!("{}-access", host)
        }
    }
}

impl AccessSink for FileSink {
    fn append(&self, record: &AccessRecord) {
        let name = Self::logfile_name(&record.host);
        let mut files = self.files.lock();
        let file = match files.entry(name.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = self.root.join(&name);
                match OpenOptions::new().create(true).append(true).open(&path) {
                    Ok(file) => entry.insert(file),
                    Err(e) => {
                        tracing::error!("can't open logfile '{}': {}", path.display(), e);
                        return;
                    }
                }
            }
        };
        let line = format_record(record);
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::error!("can't write access log entry for {}: {}", name, e);
        }
    }
}

/// Common-log-style line:
/// `peer - - [dd/Mon/YYYY:HH:MM:SS +ZZZZ] "METHOD PATH HTTP/M.m" status size "referer" "user-agent"`
pub fn format_record(record: &AccessRecord) -> String {
    let peer = match record.peer {
        Some(ip) => ip.to_string(),
        None => "-".to_string(),
    };
    let size = match record.object_size {
        Some(n) => n.to_string(),
        None => "-".to_string(),
    };
    format!(
        "{} - - [{}] \"{} {} HTTP/{}.{}\" {} {} \"{}\" \"{}\"",
        peer,
        to_logdate(record.start_up_time),
        record.method,
        crate::resolve::escape_quotes(&record.path),
        record.major_version,
        record.minor_version,
        record.status_code,
        size,
        crate::resolve::escape_quotes(&record.referer),
        crate::resolve::escape_quotes(&record.user_agent),
    )
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Local-time timestamp in the `dd/Mon/YYYY:HH:MM:SS +ZZZZ` shape the
/// log format wants.
fn to_logdate(t: SystemTime) -> String {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as libc::time_t)
        .unwrap_or(0);
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    unsafe {
        libc::localtime_r(&secs, &mut tm);
    }
    let offset_secs = tm.tm_gmtoff;
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let offset = offset_secs.unsigned_abs();
    let month = MONTHS
        .get(tm.tm_mon as usize)
        .copied()
        .unwrap_or("Jan");
    format!(
        "{:02}/{}/{}:{:02}:{:02}:{:02} {}{:02}{:02}",
        tm.tm_mday,
        month,
        tm.tm_year + 1900,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec,
        sign,
        offset / 3600,
        (offset % 3600) / 60,
    )
}
