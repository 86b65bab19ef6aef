//! Protocol-wide sizes and well-known values shared by server and client.

/// Maximum payload length carried by a single chat frame.
pub const MSG_LEN: usize = 1024;

/// Capacity of the sender-nickname header field (including the NUL terminator).
pub const NICK_LEN: usize = 128;

/// Capacity of the info header field (including the NUL terminator).
pub const INFOS_LEN: usize = 128;

/// Channel names must be strictly shorter than this.
pub const CHAN_LEN: usize = 128;

/// Default cap on concurrently connected sessions.
pub const MAX_CLIENTS: usize = 15;

/// A payload equal to this keyword disconnects the session instead of being dispatched.
pub const QUIT_KEYWORD: &str = "/quit";

/// Sender name used on every server-originated frame. Never valid as a nickname.
pub const SERVER_NICK: &str = "Server";

/// Port an accepting recipient listens on for the file-transfer data connection.
pub const FILE_TRANSFER_PORT: u16 = 8181;
