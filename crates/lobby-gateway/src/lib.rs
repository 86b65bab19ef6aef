//! Chat server core: session and channel registries, the command dispatcher,
//! the file transfer relay and the connection multiplexer that drives them.

pub mod channels;
pub mod connection;
pub mod dispatcher;
pub mod sessions;
pub mod state;
pub mod transfer;

pub use connection::Server;
