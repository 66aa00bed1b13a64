//! Agent-to-wire streaming transcoder.
//!
//! Turns the runner's node stream into an OpenAI-compatible response,
//! in four layers: the adapter flattens nodes into canonical stream
//! events, the assembler turns those into chunk records with the
//! required ordering (role first, exactly one terminal, optional
//! trailing usage), the SSE module frames records as `data:` lines and
//! owns the error boundary, and the aggregator collects the same event
//! stream into a single non-streaming body.

pub mod adapter;
pub mod aggregate;
pub mod assembler;
pub mod sse;

pub use adapter::EventSource;
pub use aggregate::{aggregate, AggregatedRun};
pub use assembler::{ChunkAssembler, StreamIdentity};
pub use sse::stream_body;
