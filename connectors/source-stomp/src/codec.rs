//! `tokio_util` codec for STOMP frames.
//!
//! Handles EOL heart-beats between frames, `content-length` and
//! NUL-terminated bodies, CRLF line endings and STOMP 1.1+ header escaping.

use crate::frame::{Command, Frame};
use bytes::{Buf, BufMut, BytesMut};
use stomp_connect_core::ConnectorError;
use tokio_util::codec::{Decoder, Encoder};

/// Frames larger than this are rejected
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StompCodec {
    max_frame_size: usize,
    escaping: bool,
    /// Progress on the frame at the front of the buffer, kept across calls
    partial: Partial,
}

impl Default for StompCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
enum Partial {
    /// No bytes of the next frame consumed yet
    #[default]
    Idle,
    /// Inside the command and header lines
    Head(HeadScan),
    /// Headers complete, waiting for the body
    Body(Head),
}

/// Header lines parsed so far; `pos` is where scanning resumes
#[derive(Debug, Clone, Default)]
struct HeadScan {
    pos: usize,
    command: Option<Command>,
    headers: Vec<(String, String)>,
}

/// Parsed command and headers plus the position of the body in the buffer
#[derive(Debug, Clone)]
struct Head {
    command: Command,
    headers: Vec<(String, String)>,
    body_start: usize,
    content_length: Option<usize>,
    /// Body bytes already searched for the NUL terminator
    scanned: usize,
}

impl StompCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            escaping: true,
            partial: Partial::Idle,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Enable or disable header escaping; STOMP 1.0 has none
    pub fn set_escaping(&mut self, escaping: bool) {
        self.escaping = escaping;
    }

    fn too_large(&self, size: usize) -> ConnectorError {
        ConnectorError::invalid_data(
            format!(
                "stomp frame exceeds {} bytes ({} buffered)",
                self.max_frame_size, size
            ),
            &[],
        )
    }

    /// Continue parsing command and headers; `None` until the blank line arrived
    fn parse_head(&self, scan: &mut HeadScan, src: &[u8]) -> Result<Option<Head>, ConnectorError> {
        loop {
            let Some(offset) = src[scan.pos..].iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };

            let mut line = &src[scan.pos..scan.pos + offset];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            scan.pos += offset + 1;

            let Some(cmd) = scan.command else {
                scan.command = Some(utf8(line)?.parse::<Command>()?);
                continue;
            };

            if line.is_empty() {
                let headers = std::mem::take(&mut scan.headers);
                let content_length = content_length(&headers)?;
                return Ok(Some(Head {
                    command: cmd,
                    headers,
                    body_start: scan.pos,
                    content_length,
                    scanned: 0,
                }));
            }

            let text = utf8(line)?;
            let Some((key, value)) = text.split_once(':') else {
                return Err(ConnectorError::invalid_data(
                    format!("malformed stomp header: {}", text),
                    line,
                ));
            };

            if self.escaping && cmd.escapes_headers() {
                scan.headers.push((unescape(key)?, unescape(value)?));
            } else {
                scan.headers.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Locate the NUL that ends the body; `None` until it is buffered
    fn body_end(&self, head: &mut Head, src: &BytesMut) -> Result<Option<usize>, ConnectorError> {
        match head.content_length {
            Some(len) => {
                let end = head
                    .body_start
                    .checked_add(len)
                    .filter(|end| *end < self.max_frame_size)
                    .ok_or_else(|| {
                        ConnectorError::invalid_data(
                            format!(
                                "stomp content-length {} exceeds {} bytes",
                                len, self.max_frame_size
                            ),
                            &[],
                        )
                    })?;
                if src.len() <= end {
                    return Ok(None);
                }
                if src[end] != 0 {
                    return Err(ConnectorError::invalid_data(
                        "stomp frame body is not NUL terminated",
                        &src[head.body_start..=end],
                    ));
                }
                Ok(Some(end))
            }
            None => {
                let from = head.body_start + head.scanned;
                match src[from..].iter().position(|b| *b == 0) {
                    Some(offset) => Ok(Some(from + offset)),
                    None => {
                        if src.len() > self.max_frame_size {
                            return Err(self.too_large(src.len()));
                        }
                        head.scanned = src.len() - head.body_start;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Scan more header lines; stashes the progress when the head is incomplete
    fn resume_head(
        &mut self,
        mut scan: HeadScan,
        src: &BytesMut,
    ) -> Result<Option<Head>, ConnectorError> {
        match self.parse_head(&mut scan, src)? {
            Some(head) => Ok(Some(head)),
            None => {
                if src.len() > self.max_frame_size {
                    return Err(self.too_large(src.len()));
                }
                self.partial = Partial::Head(scan);
                Ok(None)
            }
        }
    }
}

impl Decoder for StompCodec {
    type Item = Frame;
    type Error = ConnectorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ConnectorError> {
        let mut head = match std::mem::take(&mut self.partial) {
            Partial::Body(head) => head,
            Partial::Idle => {
                // Heart-beats
                loop {
                    match src.first().copied() {
                        Some(b'\n') => src.advance(1),
                        Some(b'\r') if src.len() == 1 => return Ok(None),
                        Some(b'\r') if src[1] == b'\n' => src.advance(2),
                        _ => break,
                    }
                }
                if src.is_empty() {
                    return Ok(None);
                }
                match self.resume_head(HeadScan::default(), src)? {
                    Some(head) => head,
                    None => return Ok(None),
                }
            }
            Partial::Head(scan) => match self.resume_head(scan, src)? {
                Some(head) => head,
                None => return Ok(None),
            },
        };

        let Some(body_end) = self.body_end(&mut head, src)? else {
            if let Some(len) = head.content_length {
                src.reserve((head.body_start + len + 1).saturating_sub(src.len()));
            }
            self.partial = Partial::Body(head);
            return Ok(None);
        };

        let frame_bytes = src.split_to(body_end + 1);
        let body = frame_bytes[head.body_start..body_end].to_vec();

        Ok(Some(Frame {
            command: head.command,
            headers: head.headers,
            body,
        }))
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = ConnectorError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ConnectorError> {
        let escape_headers = self.escaping && frame.command.escapes_headers();

        dst.put_slice(frame.command.as_str().as_bytes());
        dst.put_u8(b'\n');

        for (key, value) in &frame.headers {
            if escape_headers {
                dst.put_slice(escape(key).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                dst.put_slice(key.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }

        if !frame.body.is_empty() && frame.header("content-length").is_none() {
            dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }

        dst.put_u8(b'\n');
        dst.put_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}

fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, ConnectorError> {
    headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim().parse::<usize>().map_err(|_| {
                ConnectorError::invalid_data(format!("invalid content-length: {}", v), v.as_bytes())
            })
        })
        .transpose()
}

fn utf8(line: &[u8]) -> Result<&str, ConnectorError> {
    std::str::from_utf8(line)
        .map_err(|_| ConnectorError::invalid_data("stomp frame header is not valid UTF-8", line))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, ConnectorError> {
    if !value.contains('\\') {
        return Ok(value.to_string());
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => {
                return Err(ConnectorError::invalid_data(
                    format!("invalid escape sequence in stomp header: {}", value),
                    value.as_bytes(),
                ))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut StompCodec, bytes: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_decode_message_frame() {
        let mut codec = StompCodec::new();
        let frames = decode_all(
            &mut codec,
            b"MESSAGE\nsubscription:sub-1\nmessage-id:136\ndestination:/topic/logstash\n\nhello world\0",
        );

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-1"));
        assert_eq!(frame.header("message-id"), Some("136"));
        assert_eq!(frame.body, b"hello world");
    }

    #[test]
    fn test_decode_skips_heartbeats_and_crlf() {
        let mut codec = StompCodec::new();
        let frames = decode_all(
            &mut codec,
            b"\n\r\nRECEIPT\r\nreceipt-id:r-1\r\n\r\n\0\n\nRECEIPT\nreceipt-id:r-2\n\n\0\n",
        );

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header("receipt-id"), Some("r-1"));
        assert_eq!(frames[1].header("receipt-id"), Some("r-2"));
    }

    #[test]
    fn test_decode_partial_input() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"MESSAGE\nsubscription:sub-1\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\npart");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ial\0");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.body, b"partial");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_content_length_allows_nul_in_body() {
        let mut codec = StompCodec::new();
        let frames = decode_all(&mut codec, b"MESSAGE\ncontent-length:5\n\na\0b\0c\0");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, b"a\0b\0c");
    }

    #[test]
    fn test_decode_content_length_without_terminator() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:2\n\nabX"[..]);
        assert!(codec.decode(&mut buf).unwrap_err().is_invalid_data());
    }

    #[test]
    fn test_decode_unescapes_headers() {
        let mut codec = StompCodec::new();
        let frames = decode_all(&mut codec, b"MESSAGE\nkey\\cname:a\\nb\\\\c\n\n\0");
        assert_eq!(frames[0].header("key:name"), Some("a\nb\\c"));
    }

    #[test]
    fn test_connected_headers_are_not_unescaped() {
        let mut codec = StompCodec::new();
        let frames = decode_all(&mut codec, b"CONNECTED\nserver:a\\cb\nversion:1.2\n\n\0");
        assert_eq!(frames[0].header("server"), Some("a\\cb"));
    }

    #[test]
    fn test_decode_rejects_bad_escape() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"MESSAGE\nkey:a\\tb\n\n\0"[..]);
        assert!(codec.decode(&mut buf).is_err());

        let mut legacy = StompCodec::new();
        legacy.set_escaping(false);
        let frames = decode_all(&mut legacy, b"MESSAGE\nkey:a\\tb\n\n\0");
        assert_eq!(frames[0].header("key"), Some("a\\tb"));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let mut codec = StompCodec::new().with_max_frame_size(16);
        let mut buf = BytesMut::from(&b"MESSAGE\n\nthis body never ends"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_decode_rejects_overflowing_content_length() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:18446744073709551615\n\nx\0"[..]);
        assert!(codec.decode(&mut buf).unwrap_err().is_invalid_data());

        let mut codec = StompCodec::new().with_max_frame_size(64);
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:100\n\nx"[..]);
        assert!(codec.decode(&mut buf).unwrap_err().is_invalid_data());
    }

    #[test]
    fn test_decode_resumes_header_scan() {
        let mut codec = StompCodec::new();
        let input = b"\nMESSAGE\nsubscription:sub-1\nmessage-id:136\n\nhello\0";
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();

        for (i, byte) in input.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            if let Some(frame) = codec.decode(&mut buf).unwrap() {
                frames.push(frame);
                continue;
            }
            // Completed lines are never scanned twice
            if let Partial::Head(scan) = &codec.partial {
                assert!(scan.pos <= buf.len(), "byte {}", i);
                assert_eq!(buf[..scan.pos].last().copied().unwrap_or(b'\n'), b'\n');
            }
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header("message-id"), Some("136"));
        assert_eq!(frames[0].body, b"hello");
        assert!(buf.is_empty());
        assert!(matches!(codec.partial, Partial::Idle));
    }

    #[test]
    fn test_decode_error_resets_progress() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"MESSAGE\nsubscription:sub-1\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(codec.partial, Partial::Head(_)));

        buf.extend_from_slice(b"broken\n");
        assert!(codec.decode(&mut buf).is_err());
        assert!(matches!(codec.partial, Partial::Idle));
    }

    #[test]
    fn test_decode_unknown_command() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"HELLO\n\n\0"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encode_subscribe_frame() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::subscribe("/queue/a:b", "sub-1", "r-1"), &mut buf)
            .unwrap();

        assert_eq!(
            &buf[..],
            &b"SUBSCRIBE\ndestination:/queue/a\\cb\nid:sub-1\nack:auto\nreceipt:r-1\n\n\0"[..]
        );
    }

    #[test]
    fn test_encode_adds_content_length() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::new();
        let frame = Frame::new(Command::Send)
            .with_header("destination", "/queue/a")
            .with_body("a\0b");
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.body, frame.body);
        assert_eq!(decoded.header("content-length"), Some("3"));
    }
}
