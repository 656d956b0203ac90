//! A scatter/gather output buffer.
//!
//! Response bytes are queued as an ordered list of segments and handed
//! to the driver as one vectored write. Short dynamic pieces (headers,
//! error-page fragments) are copied into an owned staging area and the
//! segment stores its offset there; fixed boilerplate is referenced
//! directly with no copy. Because segments hold offsets rather than
//! pointers, the staging area may reallocate freely and the scatter view
//! is simply rebuilt against the current base on every call.

use std::io::IoSlice;

#[derive(Debug)]
enum Segment {
    /// A range of the staging area.
    Staged { off: usize, len: usize },
    /// Borrowed bytes with static lifetime, appended without copying.
    Static(&'static [u8]),
}

impl Segment {
    fn len(&self) -> usize {
        match self {
            Segment::Staged { len, .. } => *len,
            Segment::Static(bytes) => bytes.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct OutputBuffer {
    segments: Vec<Segment>,
    buf: Vec<u8>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        OutputBuffer::default()
    }

    /// Invariant: no segments means no staged bytes either.
    pub fn is_empty(&self) -> bool {
        debug_assert!(!self.segments.is_empty() || self.buf.is_empty());
        self.segments.is_empty()
    }

    /// Total unsent bytes across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Copy `bytes` into the staging area and queue them.
    pub fn push_back(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let off = self.buf.len();
        self.buf.extend_from_slice(bytes);
        self.segments.push(Segment::Staged { off, len: bytes.len() });
    }

    /// Queue a reference to `bytes` without copying.
    pub fn append_static(&mut self, bytes: &'static [u8]) {
        if bytes.is_empty() {
            return;
        }
        self.segments.push(Segment::Static(bytes));
    }

    /// Build the scatter view for a vectored write. The slices borrow
    /// this buffer and are invalidated by any mutating call.
    pub fn scatter(&self) -> Vec<IoSlice<'_>> {
        self.segments
            .iter()
            .map(|seg| match seg {
                Segment::Staged { off, len } => IoSlice::new(&self.buf[*off..off + len]),
                Segment::Static(bytes) => IoSlice::new(bytes),
            })
            .collect()
    }

    /// Drop the first `n` bytes, trimming or removing segments from the
    /// front. Once everything is drained the staging area is released.
    pub fn consume(&mut self, mut n: usize) {
        let mut drained = 0;
        while n > 0 {
            debug_assert!(drained < self.segments.len());
            let seg_len = self.segments[drained].len();
            debug_assert!(seg_len > 0);
            if seg_len <= n {
                n -= seg_len;
                drained += 1;
            } else {
                match &mut self.segments[drained] {
                    Segment::Staged { off, len } => {
                        *off += n;
                        *len -= n;
                    }
                    Segment::Static(bytes) => {
                        let rest = *bytes;
                        *bytes = &rest[n..];
                    }
                }
                n = 0;
            }
        }
        self.segments.drain(..drained);
        if self.segments.is_empty() {
            self.buf.clear();
        }
    }

    /// Discard everything, sent or not.
    pub fn reset(&mut self) {
        self.segments.clear();
        self.buf.clear();
    }
}
