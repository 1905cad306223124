//! Server-Sent Events wire decoding.
//!
//! Turns an HTTP body (a stream of byte chunks) into a stream of
//! [`SseEvent`]s following the
//! [HTML Living Standard](https://html.spec.whatwg.org/multipage/server-sent-events.html).

mod decoder;
mod event;

use futures_util::{Stream, StreamExt, stream};

use self::decoder::FrameDecoder;
pub use self::event::{DEFAULT_EVENT_TYPE, SseEvent};
use crate::error::StreamError;

/// Decode a byte-chunk stream into server-sent events.
///
/// Transport errors from `body` are converted with `map_err` and end the
/// stream after being yielded. Complete events that were already buffered are
/// still delivered first. Invalid UTF-8 is replaced with U+FFFD and never ends
/// the stream.
pub fn event_stream<S, B, E>(
    body: S,
    map_err: fn(E) -> StreamError,
) -> impl Stream<Item = Result<SseEvent, StreamError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: FrameDecoder::new(),
        done: false,
        map_err,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.decoder.next_event() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.decoder.feed(chunk.as_ref()),
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err((state.map_err)(err)), state));
                }
                None => {
                    state.done = true;
                    state.decoder.finish();
                }
            }
        }
    })
}

struct DecodeState<S, E> {
    body: std::pin::Pin<Box<S>>,
    decoder: FrameDecoder,
    done: bool,
    map_err: fn(E) -> StreamError,
}
