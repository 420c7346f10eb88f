//! Streaming answer generation against an SSE-style chat endpoint.

mod client;
mod stream;

pub use client::GenerationClient;
pub use stream::{fragment_stream, parse_event_line, EventLine, DONE_SENTINEL, EVENT_MARKER};
