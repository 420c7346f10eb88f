use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use postchat_core::traits::FragmentStream;
use postchat_core::types::Fragment;
use postchat_core::Error;
use serde::Deserialize;
use tracing::{debug, warn};

pub const EVENT_MARKER: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// What one line of the event stream means for the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLine {
    Fragment(Fragment),
    /// End-of-stream sentinel; produces nothing and reading continues.
    Done,
    Skip,
}

#[derive(Deserialize)]
struct EventPayload {
    message: Option<EventMessage>,
}

#[derive(Deserialize)]
struct EventMessage {
    content: Option<String>,
}

pub fn parse_event_line(line: &[u8]) -> EventLine {
    let line = String::from_utf8_lossy(line);
    let Some(raw) = line.trim().strip_prefix(EVENT_MARKER) else {
        return EventLine::Skip;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return EventLine::Skip;
    }
    if raw == DONE_SENTINEL {
        return EventLine::Done;
    }
    match serde_json::from_str::<EventPayload>(raw) {
        Ok(payload) => match payload.message.and_then(|m| m.content) {
            Some(text) if !text.is_empty() => EventLine::Fragment(Fragment::new(text)),
            _ => EventLine::Skip,
        },
        Err(e) => {
            warn!(error = %e, "skipping malformed event payload");
            EventLine::Skip
        }
    }
}

struct LineDecoder<S> {
    body: Pin<Box<S>>,
    buf: Vec<u8>,
    ready: VecDeque<Fragment>,
    yielded: usize,
    finished: bool,
}

impl<S> LineDecoder<S> {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.handle(&line[..pos]);
        }
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            self.handle(&line);
        }
    }

    fn handle(&mut self, line: &[u8]) {
        match parse_event_line(line) {
            EventLine::Fragment(fragment) => self.ready.push_back(fragment),
            EventLine::Done => debug!("end-of-stream sentinel received"),
            EventLine::Skip => {}
        }
    }
}

/// Turn a raw response body into a stream of fragments in arrival order.
///
/// A read error before the first fragment is yielded once as
/// `Error::Upstream`; after that the stream just ends.
pub fn fragment_stream<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = LineDecoder { body: Box::pin(body), buf: Vec::new(), ready: VecDeque::new(), yielded: 0, finished: false };
    futures::stream::unfold(decoder, |mut d| async move {
        loop {
            if let Some(fragment) = d.ready.pop_front() {
                d.yielded += 1;
                return Some((Ok(fragment), d));
            }
            if d.finished {
                return None;
            }
            match d.body.next().await {
                Some(Ok(bytes)) => d.feed(bytes.as_ref()),
                Some(Err(e)) => {
                    d.finished = true;
                    if d.yielded == 0 {
                        return Some((Err(Error::Upstream(format!("generation stream read failed: {}", e))), d));
                    }
                    warn!(fragments = d.yielded, error = %e, "generation stream truncated");
                    return None;
                }
                None => {
                    d.flush();
                    d.finished = true;
                }
            }
        }
    })
    .boxed()
}
