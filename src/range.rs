//! Byte range helpers
//!
//! Parsing of client `Range` headers, clamping against a known resource
//! size, and formatting / parsing of `Content-Range` values.

use std::fmt;

/// Why a `Range` header could not be honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// Not of the form `bytes=<start>-[<end>]`, or `start > end`.
    Malformed,
    /// Well formed, but `start` lies past the end of the resource.
    Unsatisfiable,
}

/// A single client-requested byte range. `end` is inclusive; `None` means
/// "to the end of the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRangeRequest {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRangeRequest {
    /// Parse a `Range` header value. Only the single-range form
    /// `bytes=<start>-[<end>]` is accepted; suffix ranges and multi-ranges
    /// are rejected as malformed.
    pub fn parse(header: &str) -> Result<Self, RangeError> {
        let caps = regex!(r"^bytes=(\d+)-(\d*)$")
            .captures(header.trim())
            .ok_or(RangeError::Malformed)?;

        let start: u64 = caps[1].parse().map_err(|_| RangeError::Malformed)?;
        let end = match &caps[2] {
            "" => None,
            s => Some(s.parse::<u64>().map_err(|_| RangeError::Malformed)?),
        };

        if matches!(end, Some(end) if end < start) {
            return Err(RangeError::Malformed);
        }

        Ok(ByteRangeRequest { start, end })
    }

    /// Compute the effective range to request upstream.
    ///
    /// With a known size the end is clamped to `size - 1` and a `start` past
    /// the end is unsatisfiable. With an unknown size the client's bounds are
    /// passed through untouched.
    pub fn resolve(&self, size: Option<u64>) -> Result<ResolvedRange, RangeError> {
        match size {
            Some(size) => {
                if self.start >= size {
                    return Err(RangeError::Unsatisfiable);
                }
                let last = size - 1;
                let end = self.end.map_or(last, |end| end.min(last));
                Ok(ResolvedRange {
                    start: self.start,
                    end: Some(end),
                    size: Some(size),
                })
            }
            None => Ok(ResolvedRange {
                start: self.start,
                end: self.end,
                size: None,
            }),
        }
    }
}

/// A range after negotiation: what the client will be told it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: Option<u64>,
    pub size: Option<u64>,
}

impl ResolvedRange {
    /// Value for the upstream `Range` request header.
    pub fn upstream_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }

    /// Number of bytes in the range, when the end is known.
    pub fn byte_count(&self) -> Option<u64> {
        self.end.map(|end| end - self.start + 1)
    }

    /// `Content-Length` for a 206 response. Only emitted when both bounds
    /// and the total size are known.
    pub fn content_length(&self) -> Option<u64> {
        self.size.and(self.byte_count())
    }
}

impl fmt::Display for ResolvedRange {
    /// Formats as a `Content-Range` value: `bytes <start>-<end>/<size>`,
    /// using `*` for unknown parts.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bytes {}-", self.start)?;
        match self.end {
            Some(end) => write!(f, "{}", end)?,
            None => write!(f, "*")?,
        }
        match self.size {
            Some(size) => write!(f, "/{}", size),
            None => write!(f, "/*"),
        }
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfied_content_range(size: Option<u64>) -> String {
    match size {
        Some(size) => format!("bytes */{}", size),
        None => "bytes */*".to_string(),
    }
}

/// Parse a `Content-Range` value as sent by an upstream in a 206 response
/// (`bytes <start>-<end>/<size|*>`).
pub fn parse_content_range(header: &str) -> Option<ResolvedRange> {
    let caps = regex!(r"^bytes (\d+)-(\d+)/(\d+|\*)$").captures(header.trim())?;
    let start: u64 = caps[1].parse().ok()?;
    let end: u64 = caps[2].parse().ok()?;
    let size = match &caps[3] {
        "*" => None,
        s => Some(s.parse::<u64>().ok()?),
    };
    if end < start || matches!(size, Some(size) if end >= size) {
        return None;
    }
    Some(ResolvedRange {
        start,
        end: Some(end),
        size,
    })
}
