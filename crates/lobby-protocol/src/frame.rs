use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use lobby_types::MessageType;
use lobby_types::limits::{INFOS_LEN, NICK_LEN, SERVER_NICK};

/// Header size in bytes.
pub const HEADER_LEN: usize = 4 + NICK_LEN + 4 + INFOS_LEN;

const NICK_OFFSET: usize = 4;
const TYPE_OFFSET: usize = NICK_OFFSET + NICK_LEN;
const INFOS_OFFSET: usize = TYPE_OFFSET + 4;

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MessageType,
    pub nick_sender: String,
    pub infos: String,
    pub pld_len: u32,
}

impl Header {
    /// Append the 264-byte wire form to `dst`.
    ///
    /// Strings longer than their field are truncated (on a char boundary) so
    /// that the last byte of each field is always NUL.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN);
        dst.put_u32(self.pld_len);
        put_fixed(dst, &self.nick_sender, NICK_LEN);
        dst.put_u32(self.msg_type.tag());
        put_fixed(dst, &self.infos, INFOS_LEN);
    }

    /// Parse a header from exactly `HEADER_LEN` bytes.
    ///
    /// An unrecognised type tag decodes as `UnknownCommand`; the caller
    /// answers it like any other unknown command.
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let pld_len = read_u32(raw, 0);
        let tag = read_u32(raw, TYPE_OFFSET);
        let msg_type = MessageType::from_tag(tag).unwrap_or_else(|| {
            tracing::debug!(tag, "unknown message type tag");
            MessageType::UnknownCommand
        });
        Self {
            msg_type,
            nick_sender: get_fixed(&raw[NICK_OFFSET..TYPE_OFFSET]),
            infos: get_fixed(&raw[INFOS_OFFSET..HEADER_LEN]),
            pld_len,
        }
    }
}

fn read_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

/// Largest prefix of `s` that fits in `cap - 1` bytes without splitting a char.
fn truncated(s: &str, cap: usize) -> &str {
    let max = cap.saturating_sub(1);
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn put_fixed(dst: &mut BytesMut, s: &str, cap: usize) {
    let s = truncated(s, cap);
    dst.put_slice(s.as_bytes());
    dst.put_bytes(0, cap - s.len());
}

fn get_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// A framed message: header fields plus the payload that follows them.
///
/// Sending a `Frame` writes header and payload as one unit, so two frames can
/// never interleave on the same connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MessageType,
    pub nick_sender: String,
    pub infos: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            nick_sender: String::new(),
            infos: String::new(),
            payload: Bytes::new(),
        }
    }

    /// A frame sent on behalf of the server.
    pub fn from_server(msg_type: MessageType) -> Self {
        Self::new(msg_type).sender(SERVER_NICK)
    }

    pub fn sender(mut self, nick: impl Into<String>) -> Self {
        self.nick_sender = nick.into();
        self
    }

    pub fn info(mut self, infos: impl Into<String>) -> Self {
        self.infos = infos.into();
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn from_parts(header: Header, payload: Bytes) -> Self {
        Self {
            msg_type: header.msg_type,
            nick_sender: header.nick_sender,
            infos: header.infos,
            payload,
        }
    }

    pub fn header(&self) -> Header {
        Header {
            msg_type: self.msg_type,
            nick_sender: self.nick_sender.clone(),
            infos: self.infos.clone(),
            pld_len: self.payload.len() as u32,
        }
    }

    /// Payload as text, with any trailing NUL or line terminator removed.
    pub fn text(&self) -> Cow<'_, str> {
        let mut end = self.payload.len();
        while end > 0 && matches!(self.payload[end - 1], b'\0' | b'\n' | b'\r') {
            end -= 1;
        }
        String::from_utf8_lossy(&self.payload[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed() {
        let header = Header {
            msg_type: MessageType::UnicastSend,
            nick_sender: "alice".into(),
            infos: "bob".into(),
            pld_len: 5,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[0..4], &5u32.to_be_bytes());
        assert_eq!(&buf[4..9], b"alice");
        assert!(buf[9..132].iter().all(|&b| b == 0));
        assert_eq!(&buf[132..136], &MessageType::UnicastSend.tag().to_be_bytes());
        assert_eq!(&buf[136..139], b"bob");
    }

    #[test]
    fn long_strings_are_truncated_and_nul_terminated() {
        let header = Header {
            msg_type: MessageType::EchoSend,
            nick_sender: "n".repeat(NICK_LEN + 10),
            infos: "é".repeat(INFOS_LEN),
            pld_len: 0,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(buf[TYPE_OFFSET - 1], 0);
        assert_eq!(buf[HEADER_LEN - 1], 0);

        let raw: &[u8; HEADER_LEN] = buf[..].try_into().unwrap();
        let decoded = Header::decode(raw);
        assert_eq!(decoded.nick_sender.len(), NICK_LEN - 1);
        // 2-byte chars: 63 fit in 127 bytes.
        assert_eq!(decoded.infos.chars().count(), 63);
    }

    #[test]
    fn unknown_tag_decodes_as_unknown_command() {
        let mut buf = BytesMut::new();
        Header {
            msg_type: MessageType::EchoSend,
            nick_sender: String::new(),
            infos: String::new(),
            pld_len: 0,
        }
        .encode(&mut buf);
        buf[TYPE_OFFSET..INFOS_OFFSET].copy_from_slice(&999u32.to_be_bytes());

        let raw: &[u8; HEADER_LEN] = buf[..].try_into().unwrap();
        assert_eq!(Header::decode(raw).msg_type, MessageType::UnknownCommand);
    }

    #[test]
    fn text_strips_terminators() {
        let frame = Frame::new(MessageType::EchoSend).payload(&b"hello\n\0"[..]);
        assert_eq!(frame.text(), "hello");
    }
}
