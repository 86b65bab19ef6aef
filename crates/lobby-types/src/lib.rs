pub mod limits;
pub mod message_type;
pub mod names;

pub use message_type::MessageType;
pub use names::{ChannelName, ChannelNameError, Nickname, NicknameError};
