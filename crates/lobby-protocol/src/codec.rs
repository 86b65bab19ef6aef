//! Frame codec: splits a TCP byte stream into header and payload frames.
//!
//! Decoding is two-step: wait for a full header, then for exactly the number of
//! payload bytes it declares. A header that declares more than the configured
//! maximum is not fatal: its payload is discarded and the header is surfaced as
//! [`Inbound::Oversized`] so the caller can answer with a typed error.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use lobby_types::limits::MSG_LEN;

use crate::frame::{Frame, HEADER_LEN, Header};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("connection closed in the middle of a frame")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One decoded unit from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(Frame),
    /// The header declared a payload above the limit; the payload was skipped.
    Oversized(Header),
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Header,
    Payload(Header),
    Discard { header: Header, remaining: usize },
}

#[derive(Debug)]
pub struct FrameCodec {
    max_payload: usize,
    state: DecodeState,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_payload(MSG_LEN)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload,
            state: DecodeState::Header,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Inbound;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::take(&mut self.state) {
                DecodeState::Header => {
                    if src.len() < HEADER_LEN {
                        src.reserve(HEADER_LEN - src.len());
                        return Ok(None);
                    }
                    let mut raw = [0u8; HEADER_LEN];
                    src.copy_to_slice(&mut raw);
                    let header = Header::decode(&raw);
                    let len = header.pld_len as usize;

                    self.state = if len > self.max_payload {
                        DecodeState::Discard {
                            header,
                            remaining: len,
                        }
                    } else {
                        DecodeState::Payload(header)
                    };
                }
                DecodeState::Payload(header) => {
                    let len = header.pld_len as usize;
                    if src.len() < len {
                        src.reserve(len - src.len());
                        self.state = DecodeState::Payload(header);
                        return Ok(None);
                    }
                    let payload = src.split_to(len).freeze();
                    return Ok(Some(Inbound::Frame(Frame::from_parts(header, payload))));
                }
                DecodeState::Discard {
                    header,
                    mut remaining,
                } => {
                    let n = remaining.min(src.len());
                    src.advance(n);
                    remaining -= n;
                    if remaining > 0 {
                        self.state = DecodeState::Discard { header, remaining };
                        return Ok(None);
                    }
                    return Ok(Some(Inbound::Oversized(header)));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() && matches!(self.state, DecodeState::Header) => Ok(None),
            None => Err(CodecError::Truncated),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.payload.len();
        if len > self.max_payload {
            return Err(CodecError::PayloadTooLarge {
                len,
                max: self.max_payload,
            });
        }
        dst.reserve(HEADER_LEN + len);
        item.header().encode(dst);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
