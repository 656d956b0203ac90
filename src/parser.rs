//! Composite request parsers built on the rfc2616 primitives.
//!
//! Each parser consumes a prefix of its input and reports the number of
//! bytes it used, with 0 meaning the input is not a valid (or not yet a
//! complete) instance of the construct. On failure the request record is
//! left untouched, so the caller is free to retry with more input.

use crate::request::Request;
use crate::rfc2616::{
    abs_path, asctime_date, crlf, field_value, host, lws, query, rfc1123_date, rfc850_date, token,
    uint,
};

/// Find the end of an RFC-style header line, respecting continuation
/// lines (a folded line begins with SP or HT). Returns the position just
/// past the terminating CRLF, or `input.len()` to signal an incomplete
/// line that needs more bytes.
pub fn find_next_line(input: &[u8]) -> usize {
    for i in memchr::memchr_iter(b'\r', input) {
        match input.get(i + 1) {
            None => return input.len(),
            Some(&b'\n') => match input.get(i + 2) {
                None => return input.len(),
                Some(&b' ') | Some(&b'\t') => continue,
                Some(_) => return i + 2,
            },
            Some(_) => continue,
        }
    }
    input.len()
}

fn starts_with_ignore_case(input: &[u8], prefix: &[u8]) -> bool {
    input.len() >= prefix.len() && input[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Recognize `METHOD SP URI SP HTTP/DIGITS.DIGITS CRLF` and populate the
/// request. The URI is either an absolute `http://` URL or an abs_path
/// with optional query. Returns 0 unless the whole input matched.
///
/// Quirk carried over from the previous implementation of this server:
/// when the URI is an absolute URL, the method field is overwritten with
/// the literal string "HTTP", so such requests are later rejected as an
/// unsupported method.
pub fn parse_request_line(request: &mut Request, input: &[u8]) -> usize {
    let mut pos = 0;

    let method_len = token(input);
    if method_len == 0 {
        return 0;
    }
    let mut method = String::from_utf8_lossy(&input[..method_len]).into_owned();
    pos += method_len;

    if input.get(pos) != Some(&b' ') {
        return 0;
    }
    pos += 1;

    let mut url_host = String::new();
    let mut url_port = None;
    let mut url_path = String::new();
    let mut url_query = String::new();

    if starts_with_ignore_case(&input[pos..], b"http://") {
        method = "HTTP".to_string();
        pos += 7;
        let host_len = host(&input[pos..]);
        if host_len == 0 {
            return 0;
        }
        url_host = String::from_utf8_lossy(&input[pos..pos + host_len]).into_owned();
        pos += host_len;
        if input.get(pos) == Some(&b':') {
            let (n, port) = match uint(&input[pos + 1..]) {
                Some(r) => r,
                None => return 0,
            };
            url_port = Some(port as u16);
            pos += 1 + n;
        }
        let path_len = abs_path(&input[pos..]);
        if path_len > 0 {
            url_path = String::from_utf8_lossy(&input[pos..pos + path_len]).into_owned();
            pos += path_len;
            if input.get(pos) == Some(&b'?') {
                pos += 1;
                let query_len = query(&input[pos..]);
                url_query = String::from_utf8_lossy(&input[pos..pos + query_len]).into_owned();
                pos += query_len;
            }
        }
    } else {
        let path_len = abs_path(&input[pos..]);
        if path_len == 0 {
            return 0;
        }
        url_path = String::from_utf8_lossy(&input[pos..pos + path_len]).into_owned();
        pos += path_len;
        if input.get(pos) == Some(&b'?') {
            pos += 1;
            let query_len = query(&input[pos..]);
            url_query = String::from_utf8_lossy(&input[pos..pos + query_len]).into_owned();
            pos += query_len;
        }
    }

    if input.get(pos) != Some(&b' ') {
        return 0;
    }
    pos += 1;

    if !starts_with_ignore_case(&input[pos..], b"http/") {
        return 0;
    }
    pos += 5;
    let (n, major) = match uint(&input[pos..]) {
        Some(r) => r,
        None => return 0,
    };
    pos += n;
    if input.get(pos) != Some(&b'.') {
        return 0;
    }
    pos += 1;
    let (n, minor) = match uint(&input[pos..]) {
        Some(r) => r,
        None => return 0,
    };
    pos += n;

    let eol = crlf(&input[pos..]);
    if eol == 0 {
        return 0;
    }
    pos += eol;

    if pos != input.len() {
        return 0;
    }

    request.method = method;
    request.url.host = url_host;
    request.url.port = url_port;
    request.url.path = url_path;
    request.url.query = url_query;
    request.major_version = major;
    request.minor_version = minor;
    pos
}

/// Split a header line into its name and value. The input must be one
/// complete logical line as delimited by [`find_next_line`], including
/// the final CRLF; folded continuations stay embedded in the value, the
/// way they arrived. Returns `None` on a syntax error.
pub fn parse_header(input: &[u8]) -> Option<(usize, String, String)> {
    let name_len = token(input);
    if name_len == 0 {
        return None;
    }
    let name = String::from_utf8_lossy(&input[..name_len]).into_owned();
    let mut pos = name_len;

    loop {
        let n = lws(&input[pos..]);
        if n == 0 {
            break;
        }
        pos += n;
    }
    if input.get(pos) != Some(&b':') {
        return None;
    }
    pos += 1;
    loop {
        let n = lws(&input[pos..]);
        if n == 0 {
            break;
        }
        pos += n;
    }

    let value_len = field_value(&input[pos..]);
    let value = String::from_utf8_lossy(&input[pos..pos + value_len]).into_owned();
    pos += value_len;

    let eol = crlf(&input[pos..]);
    if eol == 0 || pos + eol != input.len() {
        return None;
    }
    Some((input.len(), name, value))
}

/// Recognize `host [ ":" port ]` from a Host header value.
pub fn parse_host_header(request: &mut Request, input: &[u8]) -> usize {
    let host_len = host(input);
    if host_len == 0 {
        return 0;
    }
    let mut pos = host_len;
    let mut port = None;
    if input.get(pos) == Some(&b':') {
        let (n, p) = match uint(&input[pos + 1..]) {
            Some(r) => r,
            None => return 0,
        };
        port = Some(p as u16);
        pos += 1 + n;
    }
    if pos != input.len() {
        return 0;
    }
    request.host = String::from_utf8_lossy(&input[..host_len]).into_owned();
    request.port = port;
    pos
}

/// Parse an If-Modified-Since value in any of the three RFC 2616 date
/// formats, then sanity-check the calendar fields before converting to
/// seconds since the epoch (the formats are all GMT). Returns 0 and
/// leaves the request unchanged when the date is malformed or nonsense.
pub fn parse_if_modified_since_header(request: &mut Request, input: &[u8]) -> usize {
    let (len, date) = match rfc1123_date(input)
        .or_else(|| rfc850_date(input))
        .or_else(|| asctime_date(input))
    {
        Some(r) => r,
        None => return 0,
    };
    if len != input.len() {
        return 0;
    }

    if date.year < 1970 || date.hour > 23 || date.min > 59 || date.sec > 59 {
        return 0;
    }
    let mday_max = match date.month {
        0 | 2 | 4 | 6 | 7 | 9 | 11 => 31,
        3 | 5 | 8 | 10 => 30,
        1 => {
            // Leap rule without the 400-year exception, as this server
            // has always computed it. Wrong for 2000, irrelevant until
            // 2100.
            if date.year % 4 == 0 && date.year % 100 != 0 {
                29
            } else {
                28
            }
        }
        _ => return 0,
    };
    if date.mday > mday_max {
        return 0;
    }

    request.if_modified_since = Some(date.to_epoch());
    len
}
