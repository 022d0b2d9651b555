//! Error types for wire format operations.
//!
//! Every failure while reading or writing a frame body is reported as a
//! [`ProtocolError`]. Decode errors are handled at the dispatch boundary and
//! never reach packet handler code.

/// Result type for wire format operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised by the wire buffer, frame envelope and packet codecs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A read needed more bytes than the frame had left.
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    TruncatedFrame { needed: usize, available: usize },

    /// A field was present but its value is not valid for its type.
    #[error("malformed field `{field}`: {reason}")]
    MalformedField { field: &'static str, reason: String },

    /// A string or nested block does not fit its `u16` length prefix.
    #[error("value of {len} bytes exceeds the {max} byte length prefix")]
    LengthOverflow { len: usize, max: usize },

    /// A frame payload is larger than the configured limit.
    #[error("frame payload of {len} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { len: usize, limit: usize },
}

impl ProtocolError {
    /// Builds a [`ProtocolError::MalformedField`].
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            reason: reason.into(),
        }
    }
}
