//! URL decoding, HTML escaping, and the document-root containment check.

use std::io;
use std::path::{Path, PathBuf};

fn from_hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Percent-decode a URL path: `%HH` becomes the encoded octet and `+`
/// becomes a space. A truncated or non-hex escape yields `None`; the
/// request parser should have rejected such paths already, so callers
/// treat this as a protocol error.
pub fn urldecode(input: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hi = from_hex(*input.get(i + 1)?)?;
                let lo = from_hex(*input.get(i + 2)?)?;
                out.push(hi << 4 | lo);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Some(out)
}

/// Replace `<`, `>` and `&` so untrusted request fragments can be echoed
/// into error pages.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape embedded double quotes for the quoted access-log fields.
pub fn escape_quotes(input: &str) -> String {
    input.replace('"', "\\\"")
}

/// Turn raw path bytes (document root plus a decoded URL path) into a
/// filesystem path.
#[cfg(unix)]
pub fn bytes_to_path(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

#[cfg(not(unix))]
pub fn bytes_to_path(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Decide whether `path` resolves to a location inside `hierarchy`.
///
/// Both sides are canonicalized, which collapses `..` segments and
/// resolves symlinks, so a link pointing out of the document tree fails
/// the check the same way a literal `../` does. Canonicalization errors
/// (missing files included) are reported to the caller, who maps them to
/// 404 either way.
pub fn path_in_hierarchy(hierarchy: &Path, path: &Path) -> io::Result<bool> {
    let resolved_hierarchy = hierarchy.canonicalize()?;
    let resolved_path = path.canonicalize()?;
    Ok(resolved_path.starts_with(&resolved_hierarchy))
}
