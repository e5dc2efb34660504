//! Single byte-range requests.

use std::fmt;

/// Parsed `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end`, both inclusive.
    StartEnd(u64, u64),
    /// `bytes=start-`.
    StartOpen(u64),
    /// `bytes=-n`, the last `n` bytes.
    Suffix(u64),
}

/// A range resolved against an object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// First byte, inclusive.
    pub start: u64,
    /// Last byte, inclusive.
    pub end: u64,
    /// Object size.
    pub total: u64,
}

impl ResolvedRange {
    /// Number of bytes in the range.
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Never true; a resolved range holds at least one byte.
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ResolvedRange {
    /// `Content-Range` value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

impl ByteRange {
    /// Parses `bytes=a-b`, `bytes=a-` or `bytes=-n`.
    ///
    /// Multiple ranges, other units and malformed values return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let expr = value.trim().strip_prefix("bytes=")?.trim();
        if expr.contains(',') {
            return None;
        }

        let (start, end) = expr.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());
        let number = |s: &str| {
            if s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse::<u64>().ok()
            } else {
                None
            }
        };

        match (start.is_empty(), end.is_empty()) {
            (true, true) => None,
            (true, false) => number(end).filter(|n| *n > 0).map(Self::Suffix),
            (false, true) => number(start).map(Self::StartOpen),
            (false, false) => {
                let (start, end) = (number(start)?, number(end)?);
                (start <= end).then_some(Self::StartEnd(start, end))
            }
        }
    }

    /// Resolves against an object of `total` bytes.
    ///
    /// Returns `None` when no byte of the object is selected.
    pub fn resolve(self, total: u64) -> Option<ResolvedRange> {
        if total == 0 {
            return None;
        }
        let last = total - 1;
        let (start, end) = match self {
            Self::StartEnd(start, end) => (start, end.min(last)),
            Self::StartOpen(start) => (start, last),
            Self::Suffix(n) => (total.saturating_sub(n), last),
        };
        (start <= last).then_some(ResolvedRange { start, end, total })
    }
}
