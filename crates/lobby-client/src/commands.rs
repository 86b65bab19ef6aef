//! User input vocabulary and its translation into wire frames.

use lobby_protocol::Frame;
use lobby_types::MessageType;

/// A line the user typed, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Nick(String),
    Who,
    Whois(String),
    Whoami,
    Msg { to: String, text: String },
    MsgAll(String),
    Create(String),
    ChannelList,
    Join(String),
    SendFile { to: String, path: String },
    Quit,
    /// A `/word` the client does not know; the server answers with help.
    Unknown(String),
    /// Anything not starting with `/`.
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("usage: {usage}")]
pub struct UsageError {
    usage: &'static str,
}

fn usage(usage: &'static str) -> UsageError {
    UsageError { usage }
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn one_arg(rest: &str, form: &'static str) -> Result<String, UsageError> {
    let (arg, extra) = split_word(rest);
    if arg.is_empty() || !extra.is_empty() {
        return Err(usage(form));
    }
    Ok(arg.to_owned())
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, UsageError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Command::Text(line.to_owned())));
    }

    let (word, rest) = split_word(line);
    let command = match word {
        "/nick" => Command::Nick(one_arg(rest, "/nick <nickname>")?),
        "/who" => Command::Who,
        "/whois" => Command::Whois(one_arg(rest, "/whois <nickname>")?),
        "/whoami" => Command::Whoami,
        "/msg" => {
            let (to, text) = split_word(rest);
            if to.is_empty() || text.is_empty() {
                return Err(usage("/msg <nickname> <message>"));
            }
            Command::Msg {
                to: to.to_owned(),
                text: text.to_owned(),
            }
        }
        "/msgall" => {
            if rest.is_empty() {
                return Err(usage("/msgall <message>"));
            }
            Command::MsgAll(rest.to_owned())
        }
        "/create" => Command::Create(one_arg(rest, "/create <channel>")?),
        "/channel_list" => Command::ChannelList,
        "/join" => Command::Join(one_arg(rest, "/join <channel>")?),
        "/send" => {
            let (to, path) = split_word(rest);
            if to.is_empty() || path.is_empty() {
                return Err(usage("/send <nickname> <file>"));
            }
            Command::SendFile {
                to: to.to_owned(),
                path: path.to_owned(),
            }
        }
        "/quit" => Command::Quit,
        _ => Command::Unknown(line.to_owned()),
    };
    Ok(Some(command))
}

/// Build the frame for `command`. `nick` and `channel` are the client's
/// current identity and channel, if any.
pub fn to_frame(command: Command, nick: &str, channel: Option<&str>) -> Frame {
    let frame = |ty| Frame::new(ty).sender(nick);
    match command {
        Command::Nick(n) => frame(MessageType::NicknameNew).info(n),
        Command::Who => frame(MessageType::NicknameList),
        Command::Whois(n) => frame(MessageType::NicknameInfos).info(n),
        Command::Whoami => frame(MessageType::Whoami),
        Command::Msg { to, text } => frame(MessageType::UnicastSend).info(to).payload(text),
        Command::MsgAll(text) => frame(MessageType::BroadcastSend).payload(text),
        Command::Create(c) => frame(MessageType::MulticastCreate).info(c),
        Command::ChannelList => frame(MessageType::MulticastList),
        Command::Join(c) => frame(MessageType::MulticastJoin).info(c),
        Command::SendFile { to, path } => frame(MessageType::FileRequest).info(to).payload(path),
        Command::Quit => match channel {
            Some(c) => frame(MessageType::MulticastQuit).info(c),
            None => frame(MessageType::ServerQuit),
        },
        Command::Unknown(raw) => frame(MessageType::UnknownCommand).payload(raw),
        Command::Text(text) => match channel {
            Some(c) => frame(MessageType::MulticastSend).info(c).payload(text),
            None => frame(MessageType::EchoSend).payload(text),
        },
    }
}
