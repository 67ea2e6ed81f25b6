//! Vorbis error types.

use thiserror::Error;

/// Vorbis decoding errors.
#[derive(Error, Debug)]
pub enum VorbisError {
    /// A header packet arrived out of order, twice, or malformed.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A setup-time codebook could not be parsed or built.
    #[error("Invalid codebook: {0}")]
    InvalidCodebook(String),

    /// A floor configuration violated the specification.
    #[error("Invalid floor configuration: {0}")]
    InvalidFloor(String),

    /// A residue configuration violated the specification.
    #[error("Invalid residue configuration: {0}")]
    InvalidResidue(String),

    /// A mapping configuration violated the specification.
    #[error("Invalid mapping configuration: {0}")]
    InvalidMapping(String),

    /// A mode configuration violated the specification.
    #[error("Invalid mode configuration: {0}")]
    InvalidMode(String),

    /// An audio packet violated the specification.
    #[error("Invalid audio packet: {0}")]
    InvalidPacket(String),

    /// A feature outside Vorbis I, or a reserved variant.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Audio was submitted before all three headers.
    #[error("Decoder not initialized")]
    NotInitialized,

    /// Seek attempted on a non-seekable source or outside the stream.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Cooperative cancellation tripped.
    #[error("Operation cancelled")]
    Cancelled,

    /// The stream ended.
    #[error("End of stream")]
    EndOfStream,

    /// An error surfaced by the core or container layers.
    #[error(transparent)]
    Core(calliope_core::Error),
}

/// Vorbis result type.
pub type Result<T> = std::result::Result<T, VorbisError>;

impl From<calliope_core::Error> for VorbisError {
    fn from(err: calliope_core::Error) -> Self {
        match err {
            calliope_core::Error::Cancelled => VorbisError::Cancelled,
            calliope_core::Error::EndOfStream => VorbisError::EndOfStream,
            calliope_core::Error::OutOfRange(msg) => VorbisError::OutOfRange(msg),
            other => VorbisError::Core(other),
        }
    }
}

impl From<VorbisError> for calliope_core::Error {
    fn from(err: VorbisError) -> Self {
        match err {
            VorbisError::Cancelled => calliope_core::Error::Cancelled,
            VorbisError::EndOfStream => calliope_core::Error::EndOfStream,
            VorbisError::OutOfRange(msg) => calliope_core::Error::OutOfRange(msg),
            VorbisError::Unsupported(msg) => calliope_core::Error::Unsupported(msg),
            VorbisError::Core(inner) => inner,
            other => calliope_core::Error::Codec(calliope_core::error::CodecError::Other(
                other.to_string(),
            )),
        }
    }
}

impl VorbisError {
    /// Whether the error marks the clean end of the stream.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, VorbisError::EndOfStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_detail() {
        let err = VorbisError::InvalidCodebook("bad sync pattern".into());
        assert!(err.to_string().contains("bad sync pattern"));
    }

    #[test]
    fn core_round_trip_preserves_kind() {
        let err: VorbisError = calliope_core::Error::Cancelled.into();
        assert!(matches!(err, VorbisError::Cancelled));
        let back: calliope_core::Error = err.into();
        assert!(matches!(back, calliope_core::Error::Cancelled));
    }
}
