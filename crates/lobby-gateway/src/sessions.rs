use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lobby_protocol::Frame;
use lobby_types::{ChannelName, Nickname, NicknameError};

/// Frames a session's writer may have queued before the session counts as stalled.
pub const SESSION_QUEUE_CAPACITY: usize = 256;

/// Connection handle. Allocated monotonically, never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("server is full ({0} sessions)")]
    AtCapacity(usize),
}

/// Server-side record of one connected client.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// `None` until the first successful identity assignment.
    pub nickname: Option<Nickname>,
    pub connected_at: DateTime<Utc>,
    pub addr: SocketAddr,
    /// At most one channel per session.
    pub channel: Option<ChannelName>,
    tx: mpsc::Sender<Frame>,
    /// Cancelled when the writer queue overflows; the writer then closes the connection.
    stalled: CancellationToken,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.nickname.is_some()
    }

    /// Nickname, or an empty string while unauthenticated.
    pub fn nick(&self) -> &str {
        self.nickname.as_ref().map_or("", Nickname::as_str)
    }

    /// Queue a frame for this session's writer. Returns `false` if the
    /// writer has gone away or its queue is full. A full queue marks the
    /// session stalled so the connection gets dropped instead of buffered.
    pub fn send(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if !self.stalled.is_cancelled() {
                    warn!(session = %self.id, nick = self.nick(), "writer queue full, dropping session");
                    self.stalled.cancel();
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Token the writer task watches; cancelled once the session stalls.
    pub fn stall_signal(&self) -> CancellationToken {
        self.stalled.clone()
    }

    pub fn in_channel(&self, channel: &ChannelName) -> bool {
        self.channel.as_ref() == Some(channel)
    }
}

/// Authoritative list of connected sessions.
///
/// Sessions iterate in connection order. Nicknames are unique ignoring case;
/// `by_nick` is keyed by the case-folded nickname.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    by_nick: HashMap<String, SessionId>,
    next_id: u64,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            by_nick: HashMap::new(),
            next_id: 1,
            max_sessions,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    /// Register a freshly accepted connection. Frames for it are delivered to `tx`.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        tx: mpsc::Sender<Frame>,
    ) -> Result<&Session, RegistryError> {
        if self.is_full() {
            return Err(RegistryError::AtCapacity(self.max_sessions));
        }
        let id = SessionId(self.next_id);
        self.next_id += 1;

        let session = Session {
            id,
            nickname: None,
            connected_at: Utc::now(),
            addr,
            channel: None,
            tx,
            stalled: CancellationToken::new(),
        };
        Ok(self.sessions.entry(id).or_insert(session))
    }

    pub fn find_by_handle(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Exact, case-sensitive nickname lookup.
    pub fn find_by_nickname(&self, nick: &str) -> Option<&Session> {
        let id = self.by_nick.get(&nick.to_ascii_lowercase())?;
        self.sessions
            .get(id)
            .filter(|s| s.nickname.as_ref().is_some_and(|n| n.as_str() == nick))
    }

    /// Assign or change a session's nickname.
    ///
    /// Returns the previous nickname (`None` on first assignment). On error the
    /// session keeps its current nickname.
    pub fn rename(&mut self, id: SessionId, raw: &str) -> Result<Option<Nickname>, NicknameError> {
        let nick = Nickname::parse(raw)?;
        let key = nick.folded();
        if self.by_nick.get(&key).is_some_and(|owner| *owner != id) {
            return Err(NicknameError::Duplicate);
        }

        // Unknown handles are treated like a lost race with a disconnect.
        let Some(session) = self.sessions.get_mut(&id) else {
            return Err(NicknameError::Duplicate);
        };
        let old = session.nickname.replace(nick);
        if let Some(old) = &old {
            self.by_nick.remove(&old.folded());
        }
        self.by_nick.insert(key, id);
        Ok(old)
    }

    pub fn set_channel(&mut self, id: SessionId, channel: Option<ChannelName>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.channel = channel;
        }
    }

    /// Drop a session, releasing its nickname.
    ///
    /// Channel membership is not touched here: the caller runs the channel
    /// leave lifecycle first.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        if let Some(nick) = &session.nickname {
            self.by_nick.remove(&nick.folded());
        }
        info!(session = %id, nick = session.nick(), addr = %session.addr, "session removed");
        Some(session)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn members_of<'a>(&'a self, channel: &'a ChannelName) -> impl Iterator<Item = &'a Session> {
        self.iter().filter(move |s| s.in_channel(channel))
    }
}
