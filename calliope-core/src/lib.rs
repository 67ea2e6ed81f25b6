//! # Calliope Core
//!
//! Core building blocks shared by the Calliope streaming decoder crates:
//!
//! - Error hierarchy
//! - LSb-first bitstream reader and writer
//! - Byte buffer pooling for page payloads
//! - Byte-source and sample-sink seams, cooperative cancellation

pub mod bitstream;
pub mod error;
pub mod io;
pub mod pool;

pub use bitstream::{BitReader, BitWriter};
pub use error::{BitstreamError, CodecError, ContainerError, Error, Result};
pub use io::{ByteSource, CancelToken, RandomAccessSource, SampleSink, StreamSource, VecSink};
pub use pool::{BufferPool, PooledBuffer};
