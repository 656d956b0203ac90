//! The content-type lookup table: filename extension to MIME string.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

static CONTENT_TYPES: Lazy<FxHashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    for (ext, mime) in [
        ("ai", "application/postscript"),
        ("aif", "audio/x-aiff"),
        ("aiff", "audio/x-aiff"),
        ("asc", "text/plain"),
        ("au", "audio/basic"),
        ("avi", "video/x-msvideo"),
        ("bmp", "image/bmp"),
        ("css", "text/css"),
        ("doc", "application/msword"),
        ("dvi", "application/x-dvi"),
        ("eps", "application/postscript"),
        ("gif", "image/gif"),
        ("gtar", "application/x-gtar"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("ico", "image/x-icon"),
        ("jpe", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("jpg", "image/jpeg"),
        ("js", "application/x-javascript"),
        ("json", "application/json"),
        ("latex", "application/x-latex"),
        ("mid", "audio/midi"),
        ("midi", "audio/midi"),
        ("mov", "video/quicktime"),
        ("mp2", "audio/mpeg"),
        ("mp3", "audio/mpeg"),
        ("mpe", "video/mpeg"),
        ("mpeg", "video/mpeg"),
        ("mpg", "video/mpeg"),
        ("pbm", "image/x-portable-bitmap"),
        ("pdf", "application/pdf"),
        ("pgm", "image/x-portable-graymap"),
        ("png", "image/png"),
        ("pnm", "image/x-portable-anymap"),
        ("ppm", "image/x-portable-pixmap"),
        ("ps", "application/postscript"),
        ("qt", "video/quicktime"),
        ("rtf", "text/rtf"),
        ("rtx", "text/richtext"),
        ("sgm", "text/sgml"),
        ("sgml", "text/sgml"),
        ("sh", "application/x-sh"),
        ("snd", "audio/basic"),
        ("svg", "image/svg+xml"),
        ("swf", "application/x-shockwave-flash"),
        ("tar", "application/x-tar"),
        ("tex", "application/x-tex"),
        ("texi", "application/x-texinfo"),
        ("texinfo", "application/x-texinfo"),
        ("tif", "image/tiff"),
        ("tiff", "image/tiff"),
        ("tsv", "text/tab-separated-values"),
        ("txt", "text/plain"),
        ("wav", "audio/x-wav"),
        ("xbm", "image/x-xbitmap"),
        ("xml", "text/xml"),
        ("xpm", "image/x-xpixmap"),
        ("zip", "application/zip"),
    ] {
        map.insert(ext, mime);
    }
    map
});

/// Look up the MIME type for a filename by the extension after its last
/// dot, case-insensitively. Unknown and missing extensions map to
/// `application/octet-stream`.
pub fn content_type(filename: &[u8]) -> &'static str {
    let dot = match memchr::memrchr(b'.', filename) {
        Some(i) => i,
        None => return DEFAULT_CONTENT_TYPE,
    };
    let ext = &filename[dot + 1..];
    if ext.len() > 16 {
        return DEFAULT_CONTENT_TYPE;
    }
    let lowered: Vec<u8> = ext.iter().map(|b| b.to_ascii_lowercase()).collect();
    match std::str::from_utf8(&lowered) {
        Ok(ext) => CONTENT_TYPES.get(ext).copied().unwrap_or(DEFAULT_CONTENT_TYPE),
        Err(_) => DEFAULT_CONTENT_TYPE,
    }
}
