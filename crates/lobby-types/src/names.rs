use std::fmt;

use crate::limits::{CHAN_LEN, NICK_LEN, SERVER_NICK};

/// Why a nickname was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NicknameError {
    #[error("nickname must be between 1 and {} characters", NICK_LEN - 1)]
    InvalidLength,
    #[error("nickname '{SERVER_NICK}' is reserved")]
    Reserved,
    #[error("nickname is already in use")]
    Duplicate,
    #[error("nickname may only contain letters and numbers")]
    InvalidChars,
}

/// Why a channel name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelNameError {
    #[error("channel name must be between 1 and {} characters", CHAN_LEN - 1)]
    InvalidLength,
    #[error("channel name may only contain letters and numbers")]
    InvalidChars,
}

fn is_alnum(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// A session identity: 1..NICK_LEN ASCII alphanumerics, never `Server`.
///
/// Uniqueness is not a property of the value itself; the session registry
/// enforces it (case-insensitively) on assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nickname(String);

impl Nickname {
    pub fn parse(raw: &str) -> Result<Self, NicknameError> {
        if raw.is_empty() || raw.len() >= NICK_LEN {
            return Err(NicknameError::InvalidLength);
        }
        if raw.eq_ignore_ascii_case(SERVER_NICK) {
            return Err(NicknameError::Reserved);
        }
        if !is_alnum(raw) {
            return Err(NicknameError::InvalidChars);
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded key used for uniqueness checks.
    pub fn folded(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Nickname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Nickname {
    type Error = NicknameError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

/// A channel name: 1..CHAN_LEN ASCII alphanumerics. Compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn parse(raw: &str) -> Result<Self, ChannelNameError> {
        if raw.is_empty() || raw.len() >= CHAN_LEN {
            return Err(ChannelNameError::InvalidLength);
        }
        if !is_alnum(raw) {
            return Err(ChannelNameError::InvalidChars);
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = ChannelNameError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}
