//! Lobby wire protocol.
//!
//! Every exchange is a fixed 264-byte header followed by a payload of the
//! length the header declares:
//!
//! ```text
//! [0..4]     payload length  (u32 BE)
//! [4..132]   sender nickname (NUL-padded)
//! [132..136] type tag        (u32 BE)
//! [136..264] info            (NUL-padded, meaning depends on the type)
//! [264..]    payload         (exactly `payload length` bytes)
//! ```

pub mod codec;
pub mod frame;

pub use codec::{CodecError, FrameCodec, Inbound};
pub use frame::{Frame, HEADER_LEN, Header};
