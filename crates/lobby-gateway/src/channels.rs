use std::collections::BTreeMap;

use tracing::info;

use lobby_types::{ChannelName, ChannelNameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    InvalidName(#[from] ChannelNameError),
    #[error("channel already exists")]
    AlreadyExists,
    #[error("channel does not exist")]
    NotFound,
}

/// Channel metadata. `members` always equals the number of sessions whose
/// channel field names this channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: ChannelName,
    pub members: usize,
}

/// What happened to a channel when a member left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    Remaining(usize),
    /// The last member left and the channel was destroyed.
    Closed,
}

/// Named channels, listed in name order.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelName, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty channel. The creator joins it separately.
    pub fn create(&mut self, raw: &str) -> Result<ChannelName, ChannelError> {
        let name = ChannelName::parse(raw)?;
        if self.channels.contains_key(&name) {
            return Err(ChannelError::AlreadyExists);
        }
        self.channels.insert(
            name.clone(),
            Channel {
                name: name.clone(),
                members: 0,
            },
        );
        info!(channel = %name, "channel created");
        Ok(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&Channel> {
        let name = ChannelName::parse(name).ok()?;
        self.channels.get(&name)
    }

    /// Count one more member. The caller has already checked that the session
    /// is not a member.
    pub fn join(&mut self, name: &ChannelName) -> Result<usize, ChannelError> {
        let channel = self.channels.get_mut(name).ok_or(ChannelError::NotFound)?;
        channel.members += 1;
        Ok(channel.members)
    }

    /// Count one member out, destroying the channel when nobody is left.
    pub fn leave(&mut self, name: &ChannelName) -> Result<Departure, ChannelError> {
        let channel = self.channels.get_mut(name).ok_or(ChannelError::NotFound)?;
        if channel.members <= 1 {
            self.channels.remove(name);
            info!(channel = %name, "channel closed");
            return Ok(Departure::Closed);
        }
        channel.members -= 1;
        Ok(Departure::Remaining(channel.members))
    }

    pub fn list_active(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
