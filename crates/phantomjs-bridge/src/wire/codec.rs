//! Line framing and classification for the stdio channel.
//!
//! Incoming lines are told apart purely by prefix: `>NOOP` is a heartbeat
//! ack, any other `>` line is a response, `<event>` lines are events, and
//! everything else is passed through as a log line. A log line that happens
//! to begin with `>` is therefore misclassified; the framing gives us no way
//! to tell, so the ambiguity is inherited from the wire format.
//!
//! Outgoing lines get the platform terminator appended, matching what the
//! remote's line splitter expects.

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::protocol::{self, Event, Response};

/// One classified line from the remote's stdout.
#[derive(Debug)]
pub enum Frame {
    /// `>NOOP`: the heartbeat round-trip completed.
    HeartbeatAck,
    /// `>` + JSON: settles one pending command.
    Response(Response),
    /// `<event>` + JSON: notification from a remote object.
    Event(Event),
    /// Anything unrecognized, destined for the log collaborator.
    Log(String),
}

/// Terminator appended to every outgoing line.
#[cfg(windows)]
pub const LINE_TERMINATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_TERMINATOR: &str = "\n";

/// Splits remote stdout into lines and classifies each one.
///
/// Also the encoder for outgoing lines; the session uses one instance per
/// direction.
#[derive(Debug, Default)]
pub struct LineCodec {
    inner: LinesCodec,
}

impl LineCodec {
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new(),
        }
    }

    fn classify(line: String) -> Frame {
        if let Some(rest) = line.strip_prefix(protocol::RESPONSE_PREFIX) {
            if rest == protocol::HEARTBEAT {
                return Frame::HeartbeatAck;
            }
            return match serde_json::from_str::<Response>(rest) {
                Ok(response) => Frame::Response(response),
                // Not a parseable response; let the log sink have the line.
                Err(_) => Frame::Log(line),
            };
        }
        if let Some(rest) = line.strip_prefix(protocol::EVENT_PREFIX) {
            return match serde_json::from_str::<Event>(rest) {
                Ok(event) => Frame::Event(event),
                Err(_) => Frame::Log(line),
            };
        }
        Frame::Log(line)
    }
}

fn into_io_error(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line length limit exceeded")
        }
        LinesCodecError::Io(e) => e,
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        match self.inner.decode(src) {
            Ok(Some(line)) => Ok(Some(Self::classify(line))),
            Ok(None) => Ok(None),
            Err(e) => Err(into_io_error(e)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        match self.inner.decode_eof(src) {
            Ok(Some(line)) => Ok(Some(Self::classify(line))),
            Ok(None) => Ok(None),
            Err(e) => Err(into_io_error(e)),
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(line.len() + LINE_TERMINATOR.len());
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(LINE_TERMINATOR.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(codec: &mut LineCodec, bytes: &[u8]) -> Option<Frame> {
        let mut buf = BytesMut::from(bytes);
        codec.decode(&mut buf).unwrap()
    }

    #[test]
    fn heartbeat_ack_line_is_recognized_exactly() {
        let mut codec = LineCodec::new();
        let frame = decode_one(&mut codec, b">NOOP\n").unwrap();
        assert!(matches!(frame, Frame::HeartbeatAck));
    }

    #[test]
    fn response_line_is_parsed() {
        let mut codec = LineCodec::new();
        let frame = decode_one(&mut codec, b">{\"id\":\"abc\",\"response\":42}\n").unwrap();
        match frame {
            Frame::Response(response) => {
                assert_eq!(response.id, "abc");
                assert_eq!(response.response, Some(serde_json::json!(42)));
            }
            other => panic!("expected response frame, got {other:?}"),
        }
    }

    #[test]
    fn response_line_with_error_is_parsed() {
        let mut codec = LineCodec::new();
        let frame = decode_one(&mut codec, b">{\"id\":\"abc\",\"error\":\"boom\"}\n").unwrap();
        match frame {
            Frame::Response(response) => assert_eq!(response.error.as_deref(), Some("boom")),
            other => panic!("expected response frame, got {other:?}"),
        }
    }

    #[test]
    fn event_line_is_parsed() {
        let mut codec = LineCodec::new();
        let frame = decode_one(
            &mut codec,
            b"<event>{\"target\":\"p1\",\"type\":\"onLoadFinished\",\"args\":[\"success\"]}\n",
        )
        .unwrap();
        match frame {
            Frame::Event(event) => {
                assert_eq!(event.target, "p1");
                assert_eq!(event.event_type, "onLoadFinished");
            }
            other => panic!("expected event frame, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_becomes_a_log_frame() {
        let mut codec = LineCodec::new();
        let frame = decode_one(&mut codec, b"ReferenceError: foo is not defined\n").unwrap();
        match frame {
            Frame::Log(line) => assert_eq!(line, "ReferenceError: foo is not defined"),
            other => panic!("expected log frame, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_response_degrades_to_log() {
        let mut codec = LineCodec::new();
        let frame = decode_one(&mut codec, b"> also not json\n").unwrap();
        match frame {
            Frame::Log(line) => assert_eq!(line, "> also not json"),
            other => panic!("expected log frame, got {other:?}"),
        }
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b">{\"id\":"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\"abc\"}\nrest");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame, Frame::Response(_)));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_eof_flushes_unterminated_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"last words"[..]);
        let frame = codec.decode_eof(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Log(line) => assert_eq!(line, "last words"),
            other => panic!("expected log frame, got {other:?}"),
        }
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn carriage_returns_are_stripped_from_incoming_lines() {
        let mut codec = LineCodec::new();
        let frame = decode_one(&mut codec, b">NOOP\r\n").unwrap();
        assert!(matches!(frame, Frame::HeartbeatAck));
    }

    #[test]
    fn encoder_appends_platform_terminator() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("NOOP".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], format!("NOOP{LINE_TERMINATOR}").as_bytes());
    }
}
