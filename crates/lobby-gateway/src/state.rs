use lobby_protocol::Frame;
use lobby_types::ChannelName;

use crate::channels::ChannelRegistry;
use crate::sessions::{SessionId, SessionRegistry};

/// Everything the multiplexer owns: both registries, mutated only from its task.
#[derive(Debug)]
pub struct ChatState {
    pub sessions: SessionRegistry,
    pub channels: ChannelRegistry,
}

impl ChatState {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: SessionRegistry::new(max_sessions),
            channels: ChannelRegistry::new(),
        }
    }

    /// Queue a frame for one session. Returns `false` if it is gone.
    pub fn send_to(&self, id: SessionId, frame: Frame) -> bool {
        self.sessions
            .find_by_handle(id)
            .is_some_and(|session| session.send(frame))
    }

    /// Send to every connected session except `except`, with or without a nickname.
    ///
    /// Returns `true` only if every individual send succeeded (vacuously true
    /// when there is nobody else).
    pub fn broadcast(&self, except: SessionId, frame: &Frame) -> bool {
        self.sessions
            .iter()
            .filter(|s| s.id != except)
            .fold(true, |ok, s| s.send(frame.clone()) && ok)
    }

    /// Send to every member of `channel`, optionally skipping one session.
    /// Same success rule as [`broadcast`](Self::broadcast).
    pub fn multicast(&self, channel: &ChannelName, except: Option<SessionId>, frame: &Frame) -> bool {
        self.sessions
            .members_of(channel)
            .filter(|s| Some(s.id) != except)
            .fold(true, |ok, s| s.send(frame.clone()) && ok)
    }
}
