use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

use lobby_types::limits::MAX_CLIENTS;

/// Lobby multi-user chat server.
///
/// Every option can also come from the environment (or a `.env` file).
#[derive(Debug, Parser)]
#[command(name = "lobby", version)]
pub struct Config {
    /// TCP port to listen on.
    #[arg(env = "LOBBY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "LOBBY_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Maximum number of concurrently connected sessions.
    #[arg(long, env = "LOBBY_MAX_SESSIONS", default_value_t = MAX_CLIENTS, value_parser = parse_max_sessions)]
    pub max_sessions: usize,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_max_sessions(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn positional_port_and_flags() {
        let config =
            Config::try_parse_from(["lobby", "9000", "--host", "127.0.0.1", "--max-sessions", "3"])
                .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.max_sessions, 3);
    }

    #[test]
    fn zero_sessions_is_rejected() {
        assert!(Config::try_parse_from(["lobby", "9000", "--max-sessions", "0"]).is_err());
    }

    #[test]
    fn port_must_be_numeric() {
        assert!(Config::try_parse_from(["lobby", "http"]).is_err());
    }
}
