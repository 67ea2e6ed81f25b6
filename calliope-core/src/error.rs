//! Error types for the Calliope decoder stack.
//!
//! The hierarchy separates bit-level parsing failures, container-level
//! failures and codec-level failures so callers can tell a damaged page
//! apart from a damaged packet.

use thiserror::Error;

/// Top-level error type shared across the Calliope crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Bit-level parsing errors.
    #[error("Bitstream error: {0}")]
    Bitstream(#[from] BitstreamError),

    /// Container (Ogg) structure errors.
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Codec (Vorbis) errors.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O errors from the underlying byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request exceeded the bounds of the stream or of an operation.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Unsupported feature or format variant.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The operation was cancelled through a [`CancelToken`].
    ///
    /// [`CancelToken`]: crate::io::CancelToken
    #[error("Operation cancelled")]
    Cancelled,

    /// The source ended cleanly at a structure boundary.
    #[error("End of stream")]
    EndOfStream,
}

/// Bit-level parsing errors.
#[derive(Error, Debug)]
pub enum BitstreamError {
    /// The source ended in the middle of a value.
    #[error("Unexpected end of bitstream")]
    UnexpectedEnd,

    /// A syntax element held a value the format does not allow.
    #[error("Invalid syntax element: {element} = {value}")]
    InvalidSyntax {
        /// Name of the offending element.
        element: &'static str,
        /// The decoded value.
        value: i64,
    },
}

/// Container structure errors.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Page checksum did not match its contents.
    #[error("corrupt page at offset {offset}: CRC {expected:#010x} in header, {actual:#010x} computed")]
    CorruptPage {
        /// Byte offset of the page capture pattern.
        offset: u64,
        /// CRC stored in the page header.
        expected: u32,
        /// CRC computed over the page.
        actual: u32,
    },

    /// A structural field held an invalid value.
    #[error("invalid page structure at offset {offset}: {message}")]
    InvalidStructure {
        /// Byte offset of the page capture pattern.
        offset: u64,
        /// What was wrong.
        message: String,
    },

    /// The source ended inside a page.
    #[error("truncated page at offset {offset}")]
    TruncatedPage {
        /// Byte offset of the page capture pattern.
        offset: u64,
    },

    /// A page requested by index does not exist in the stream.
    #[error("page {index} not found")]
    PageNotFound {
        /// The requested page index.
        index: u32,
    },

    /// A seek could not be carried out.
    #[error("seek failed: {0}")]
    SeekFailed(String),
}

/// Codec-level errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Decoder used before its headers were supplied.
    #[error("decoder not initialized")]
    NotInitialized,

    /// The packet violated a codec invariant.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Generic codec error message.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using the Calliope [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an out-of-range error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Error::OutOfRange(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Check whether this error marks the clean end of the stream.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }

    /// Check whether this error is recoverable by skipping to the next
    /// page or packet.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Container(ContainerError::CorruptPage { .. })
                | Error::Codec(CodecError::InvalidData(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = Error::Container(ContainerError::CorruptPage {
            offset: 42,
            expected: 0xdead_beef,
            actual: 0x1234_5678,
        });
        let text = err.to_string();
        assert!(text.contains("42"));
        assert!(text.contains("0xdeadbeef"));
    }

    #[test]
    fn bitstream_error_converts() {
        let err: Error = BitstreamError::UnexpectedEnd.into();
        assert!(matches!(err, Error::Bitstream(BitstreamError::UnexpectedEnd)));
    }

    #[test]
    fn end_of_stream_predicate() {
        assert!(Error::EndOfStream.is_end_of_stream());
        assert!(!Error::Cancelled.is_end_of_stream());
    }

    #[test]
    fn corrupt_page_is_recoverable() {
        let err = Error::Container(ContainerError::CorruptPage {
            offset: 0,
            expected: 0,
            actual: 1,
        });
        assert!(err.is_recoverable());
        assert!(!Error::EndOfStream.is_recoverable());
    }
}
