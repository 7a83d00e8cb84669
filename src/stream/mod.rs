//! Streaming pipeline: wire protocol, producer-side encoder, consumer-side
//! ingest with bounded per-channel ring buffers.

pub mod buffer;
pub mod encoder;
pub mod ingest;
pub mod protocol;

pub use buffer::ChannelBuffer;
pub use encoder::StreamEncoder;
pub use ingest::{start as start_ingest, IngestBuffers, IngestHandle};
pub use protocol::{parse_line, StreamLine, StreamMeta, WireSample};
