//! Incremental line decoder for `text/event-stream` bodies.
//!
//! Bytes are fed in arbitrary chunks; complete events are pulled out with
//! [`FrameDecoder::next_event`]. Lines may end in LF, CR or CRLF. A CR at the
//! very end of the buffer is held back until the next chunk shows whether it
//! starts a CRLF pair, or until [`FrameDecoder::finish`] marks end of input.
//! Lines are decoded as UTF-8 with replacement, so stray bytes surface as
//! U+FFFD in the event rather than as a stream error.

use bytes::{Buf, BufMut, BytesMut};

use super::event::{DEFAULT_EVENT_TYPE, SseEvent};

const LF: u8 = b'\n';
const CR: u8 = b'\r';
const BOM: &[u8] = "\u{FEFF}".as_bytes();

#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    buffer: BytesMut,
    started: bool,
    finished: bool,
    event: String,
    data: Option<String>,
    last_id: String,
}

impl FrameDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Mark end of input. A trailing lone CR becomes a line end; an event with
    /// no terminating blank line is never dispatched.
    pub(crate) fn finish(&mut self) {
        self.finished = true;
        if self.buffer.last() == Some(&CR) {
            self.buffer.put_u8(LF);
        }
    }

    pub(crate) fn next_event(&mut self) -> Option<SseEvent> {
        if !self.skip_bom() {
            return None;
        }

        while let Some(line) = self.next_line() {
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        None
    }

    /// Strips a leading byte order mark. Returns `false` while the buffer is
    /// still too short to tell.
    fn skip_bom(&mut self) -> bool {
        if self.started {
            return true;
        }
        let len = self.buffer.len().min(BOM.len());
        if self.buffer[..len] != BOM[..len] {
            self.started = true;
            return true;
        }
        if len < BOM.len() {
            if self.finished {
                self.started = true;
            }
            return self.started;
        }
        self.buffer.advance(BOM.len());
        self.started = true;
        true
    }

    fn next_line(&mut self) -> Option<BytesMut> {
        let pos = memchr::memchr2(CR, LF, &self.buffer)?;
        let terminator = match self.buffer[pos] {
            CR => match self.buffer.get(pos + 1) {
                Some(&LF) => 2,
                Some(_) => 1,
                None => return None,
            },
            _ => 1,
        };
        let line = self.buffer.split_to(pos);
        self.buffer.advance(terminator);
        Some(line)
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = value.to_string(),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.last_id = value.to_string(),
            // `retry` is ignored: reconnect timing belongs to the backoff policy.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        let data = self.data.take()?;
        Some(SseEvent {
            event: if event.is_empty() {
                DEFAULT_EVENT_TYPE.to_string()
            } else {
                event
            },
            data,
            id: self.last_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<SseEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            decoder.feed(chunk);
            while let Some(event) = decoder.next_event() {
                events.push(event);
            }
        }
        decoder.finish();
        while let Some(event) = decoder.next_event() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_named_event_with_id() {
        let events = decode_all(&[b"event: fleet-health\ndata: {\"a\":1}\nid: 7\n\n"]);
        assert_eq!(
            events,
            vec![SseEvent::new("fleet-health", "{\"a\":1}").with_id("7")]
        );
    }

    #[test]
    fn test_unnamed_event_defaults_to_message() {
        let events = decode_all(&[b"data: hello\n\n"]);
        assert_eq!(events, vec![SseEvent::new("message", "hello")]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let events = decode_all(&[b"data: one\ndata:two\ndata\n\n"]);
        assert_eq!(events[0].data, "one\ntwo\n");
    }

    #[test]
    fn test_line_endings() {
        let events = decode_all(&[b"data: a\r\n\r\ndata: b\r\rdata: c\n\n"]);
        let data: Vec<_> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let events = decode_all(&[b"data: a\r", b"\n\r", b"\n"]);
        assert_eq!(events, vec![SseEvent::new("message", "a")]);
    }

    #[test]
    fn test_trailing_cr_at_end_of_input() {
        let events = decode_all(&[b"data: a\r\r"]);
        assert_eq!(events, vec![SseEvent::new("message", "a")]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let events = decode_all(&[b"eve", b"nt: err", b"or\nda", b"ta: {\"message\":\"x\"}\n", b"\n"]);
        assert_eq!(events, vec![SseEvent::new("error", "{\"message\":\"x\"}")]);
    }

    #[test]
    fn test_comments_and_unknown_fields_ignored() {
        let events = decode_all(&[b": keep-alive\nfoo: bar\nretry: 1000\ndata: x\n\n"]);
        assert_eq!(events, vec![SseEvent::new("message", "x")]);
    }

    #[test]
    fn test_event_without_data_is_dropped() {
        let events = decode_all(&[b"event: ping\n\ndata: after\n\n"]);
        assert_eq!(events, vec![SseEvent::new("message", "after")]);
    }

    #[test]
    fn test_id_persists_and_rejects_nul() {
        let events = decode_all(&[b"id: 1\ndata: a\n\ndata: b\n\nid: x\0y\ndata: c\n\n"]);
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "1", "1"]);
    }

    #[test]
    fn test_bom_stripped() {
        let events = decode_all(&[&BOM[..1], &BOM[1..], b"data: x\n\n"]);
        assert_eq!(events, vec![SseEvent::new("message", "x")]);
    }

    #[test]
    fn test_incomplete_event_not_dispatched() {
        let events = decode_all(&[b"data: complete\n\ndata: partial\n"]);
        assert_eq!(events, vec![SseEvent::new("message", "complete")]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let events = decode_all(&[b"event: fleet-health\ndata: {\"a\":\xff}\n\ndata: ok\n\n"]);
        assert_eq!(
            events,
            vec![
                SseEvent::new("fleet-health", "{\"a\":\u{FFFD}}"),
                SseEvent::new("message", "ok"),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_split_across_chunks() {
        let events = decode_all(&[b"data: caf\xc3", b"\xa9 \xc3\n\n"]);
        assert_eq!(events, vec![SseEvent::new("message", "caf\u{e9} \u{FFFD}")]);
    }
}
