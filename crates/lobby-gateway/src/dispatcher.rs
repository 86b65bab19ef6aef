use std::fmt::Write as _;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lobby_protocol::{Frame, Header, Inbound};
use lobby_types::limits::MSG_LEN;
use lobby_types::{ChannelName, MessageType};

use crate::channels::{ChannelError, Departure};
use crate::connection::Event;
use crate::sessions::{Session, SessionId};
use crate::state::ChatState;
use crate::transfer;

/// Sent with every `UnknownCommand` reply.
pub const HELP: &str = "\
Available commands:
  /nick <nickname>        set or change your nickname
  /who                    list online users
  /whois <nickname>       show details about a user
  /whoami                 show details about yourself
  /msg <nickname> <text>  send a private message
  /msgall <text>          send a message to everyone
  /create <channel>       create and join a channel
  /channel_list           list active channels
  /join <channel>         join an existing channel
  /send <nickname> <file> offer a file to a user
  /quit                   leave your channel, or disconnect
Anything else is echoed back, or sent to your channel.
";

/// What the multiplexer should do with the session after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Disconnect,
}

/// Executes chat commands against the registries.
///
/// Every handler runs to completion on the caller's task; the only work it
/// hands off is the file-existence check of a transfer request, whose result
/// comes back through `events`.
pub struct Dispatcher {
    events: mpsc::Sender<Event>,
}

impl Dispatcher {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self { events }
    }

    pub fn dispatch(&self, state: &mut ChatState, from: SessionId, inbound: Inbound) -> Outcome {
        let frame = match inbound {
            Inbound::Frame(frame) => frame,
            Inbound::Oversized(header) => {
                reject_oversized(state, from, &header);
                return Outcome::Continue;
            }
        };

        let Some(session) = state.sessions.find_by_handle(from) else {
            debug!(session = %from, "command from unknown session dropped");
            return Outcome::Continue;
        };

        match frame.msg_type {
            MessageType::ServerQuit | MessageType::QuitRequest => return Outcome::Disconnect,
            MessageType::NicknameNew => {}
            ty if !session.is_authenticated() => {
                debug!(session = %from, %ty, "command before nickname");
                reply(
                    state,
                    from,
                    MessageType::NicknameError,
                    "",
                    "Please set a nickname first with /nick <nickname>.",
                );
                return Outcome::Continue;
            }
            _ => {}
        }

        match frame.msg_type {
            MessageType::NicknameNew => set_nickname(state, from, &frame),
            MessageType::NicknameList => who(state, from),
            MessageType::NicknameInfos => whois(state, from, &frame.infos),
            MessageType::Whoami => whoami(state, from),
            MessageType::EchoSend => echo(state, from, frame.payload),
            MessageType::UnicastSend => unicast(state, from, &frame),
            MessageType::BroadcastSend => broadcast(state, from, frame.payload),
            MessageType::MulticastCreate => create_channel(state, from, &frame.infos),
            MessageType::MulticastList => list_channels(state, from),
            MessageType::MulticastJoin => join_channel(state, from, &frame.infos),
            MessageType::MulticastSend => channel_send(state, from, frame.payload),
            MessageType::MulticastQuit => quit_channel(state, from, &frame.infos),
            MessageType::FileRequest => transfer::request(state, &self.events, from, &frame),
            MessageType::FileAccept | MessageType::FileReject => {
                transfer::respond(state, from, &frame)
            }
            ty => unknown(state, from, ty),
        }
        Outcome::Continue
    }

    /// Tear a session down: leave its channel (running the normal departure
    /// notices), then drop it from the registry.
    pub fn disconnect(&self, state: &mut ChatState, id: SessionId) -> Option<Session> {
        let channel = state.sessions.find_by_handle(id)?.channel.clone();
        if let Some(channel) = channel {
            depart(state, id, &channel);
        }
        state.sessions.remove(id)
    }
}

/// Cut `text` to at most `MSG_LEN` bytes without splitting a char.
pub(crate) fn clamp(mut text: String) -> String {
    if text.len() > MSG_LEN {
        let mut end = MSG_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// Send a server-originated frame to one session.
pub(crate) fn reply(
    state: &ChatState,
    to: SessionId,
    msg_type: MessageType,
    info: &str,
    text: impl Into<String>,
) -> bool {
    let frame = Frame::from_server(msg_type)
        .info(info)
        .payload(clamp(text.into()));
    state.send_to(to, frame)
}

/// A server notice addressed to a channel.
fn channel_notice(channel: &ChannelName, text: String) -> Frame {
    Frame::from_server(MessageType::MulticastSend)
        .info(channel.as_str())
        .payload(clamp(text))
}

fn reject_oversized(state: &ChatState, from: SessionId, header: &Header) {
    warn!(
        session = %from,
        ty = %header.msg_type,
        len = header.pld_len,
        "payload over {} bytes discarded",
        MSG_LEN
    );
    reply(
        state,
        from,
        header.msg_type.error_reply(),
        &header.infos,
        format!("Message too long (limit is {MSG_LEN} bytes)."),
    );
}

fn set_nickname(state: &mut ChatState, from: SessionId, frame: &Frame) {
    let requested = frame.infos.as_str();
    match state.sessions.rename(from, requested) {
        Ok(previous) => {
            let Some(session) = state.sessions.find_by_handle(from) else {
                return;
            };
            let nick = session.nick().to_owned();
            let channel = session.channel.clone();

            match &previous {
                Some(old) => info!("{} is now known as {}", old, nick),
                None => info!(session = %from, addr = %session.addr, "{} identified", nick),
            }

            if let (Some(old), Some(channel)) = (&previous, &channel) {
                let notice =
                    channel_notice(channel, format!("{old} has changed their nickname to {nick}."));
                state.multicast(channel, Some(from), &notice);
            }

            let ack = Frame::new(MessageType::NicknameSuccess)
                .sender(nick.as_str())
                .info(nick.as_str())
                .payload("Nickname changed successfully.");
            state.send_to(from, ack);
        }
        Err(e) => {
            debug!(session = %from, requested, "nickname rejected: {}", e);
            reply(state, from, MessageType::NicknameError, requested, e.to_string());
        }
    }
}

fn who(state: &ChatState, from: SessionId) {
    let mut list = format!(" Online users ({}):", state.sessions.len());
    for session in state.sessions.iter() {
        match &session.nickname {
            Some(nick) => {
                let _ = write!(list, "\n  - {nick}");
            }
            None => list.push_str("\n  - (no nickname)"),
        }
        if session.id == from {
            list.push_str(" (me)");
        }
    }
    reply(state, from, MessageType::NicknameList, "", list);
}

fn describe(session: &Session) -> String {
    format!(
        "{} connected since {} with IP address {} and port number {}",
        session.nick(),
        session.connected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        session.addr.ip(),
        session.addr.port()
    )
}

fn whois(state: &ChatState, from: SessionId, target: &str) {
    match state.sessions.find_by_nickname(target) {
        Some(session) => {
            let text = describe(session);
            reply(state, from, MessageType::NicknameInfos, target, text);
        }
        None => {
            reply(
                state,
                from,
                MessageType::NicknameInfosError,
                target,
                format!("User {target} not found."),
            );
        }
    }
}

fn whoami(state: &ChatState, from: SessionId) {
    let Some(session) = state.sessions.find_by_handle(from) else {
        return;
    };
    let text = format!("You are {}", describe(session));
    let nick = session.nick().to_owned();
    reply(state, from, MessageType::NicknameInfos, &nick, text);
}

fn echo(state: &ChatState, from: SessionId, payload: Bytes) {
    if let Some(channel) = state.sessions.find_by_handle(from).and_then(|s| s.channel.as_ref()) {
        reply(
            state,
            from,
            MessageType::EchoSend.error_reply(),
            channel.as_str(),
            format!("Echo is not available inside a channel. Leave {channel} first."),
        );
        return;
    }
    let frame = Frame::from_server(MessageType::EchoSend).payload(payload);
    state.send_to(from, frame);
}

fn unicast(state: &ChatState, from: SessionId, frame: &Frame) {
    let target = frame.infos.as_str();
    let Some(sender) = state.sessions.find_by_handle(from) else {
        return;
    };
    let Some(recipient) = state.sessions.find_by_nickname(target) else {
        reply(
            state,
            from,
            MessageType::UnicastError,
            target,
            format!("Recipient {target} not found."),
        );
        return;
    };

    let forwarded = Frame::new(MessageType::UnicastSend)
        .sender(sender.nick())
        .info(recipient.nick())
        .payload(frame.payload.clone());

    if recipient.send(forwarded) {
        debug!("{} -> {}: unicast", sender.nick(), recipient.nick());
        reply(
            state,
            from,
            MessageType::UnicastSuccess,
            target,
            "Message sent successfully.",
        );
    } else {
        reply(
            state,
            from,
            MessageType::UnicastError,
            target,
            format!("Could not deliver your message to {target}."),
        );
    }
}

fn broadcast(state: &ChatState, from: SessionId, payload: Bytes) {
    let Some(sender) = state.sessions.find_by_handle(from) else {
        return;
    };
    let frame = Frame::new(MessageType::BroadcastSend)
        .sender(sender.nick())
        .payload(payload);

    if state.broadcast(from, &frame) {
        debug!("{} broadcast a message", sender.nick());
        reply(state, from, MessageType::BroadcastSuccess, "", "Broadcast successful.");
    } else {
        reply(
            state,
            from,
            MessageType::BroadcastError,
            "",
            "Your message could not be delivered to every user.",
        );
    }
}

/// Run the leave lifecycle for `id` on `channel`: tell the others, close the
/// channel if `id` was the last member, then clear the session's channel.
///
/// When the last member leaves, the closing notice goes to the channel's
/// membership at that moment, which is the leaver itself.
fn depart(state: &mut ChatState, id: SessionId, channel: &ChannelName) {
    let nick = state
        .sessions
        .find_by_handle(id)
        .map(|s| s.nick().to_owned())
        .unwrap_or_default();

    let last = state
        .channels
        .lookup(channel.as_str())
        .is_some_and(|c| c.members <= 1);

    if last {
        let notice = channel_notice(
            channel,
            format!("You were the last user in channel {channel}. Channel closed."),
        );
        state.multicast(channel, None, &notice);
    } else {
        let notice = channel_notice(channel, format!("{nick} left the channel."));
        state.multicast(channel, Some(id), &notice);
    }

    match state.channels.leave(channel) {
        Ok(Departure::Closed) => info!("{} closed channel {}", nick, channel),
        Ok(Departure::Remaining(n)) => debug!("{} left {} ({} remaining)", nick, channel, n),
        Err(e) => warn!(channel = %channel, "leaving channel: {}", e),
    }
    state.sessions.set_channel(id, None);
}

/// Put `id` into `channel` (already existing) and announce the arrival.
fn enter(state: &mut ChatState, id: SessionId, channel: &ChannelName) -> Result<usize, ChannelError> {
    let members = state.channels.join(channel)?;
    state.sessions.set_channel(id, Some(channel.clone()));

    let nick = state
        .sessions
        .find_by_handle(id)
        .map(|s| s.nick().to_owned())
        .unwrap_or_default();
    let notice = channel_notice(channel, format!("{nick} joined the channel."));
    state.multicast(channel, Some(id), &notice);
    Ok(members)
}

fn current_channel(state: &ChatState, id: SessionId) -> Option<ChannelName> {
    state.sessions.find_by_handle(id)?.channel.clone()
}

fn create_channel(state: &mut ChatState, from: SessionId, raw: &str) {
    let name = match state.channels.create(raw) {
        Ok(name) => name,
        Err(e) => {
            reply(state, from, MessageType::MulticastCreateError, raw, e.to_string());
            return;
        }
    };

    if let Some(previous) = current_channel(state, from) {
        depart(state, from, &previous);
    }
    if let Err(e) = enter(state, from, &name) {
        reply(state, from, MessageType::MulticastCreateError, raw, e.to_string());
        return;
    }

    reply(
        state,
        from,
        MessageType::MulticastCreateSuccess,
        name.as_str(),
        format!("You have created channel {name}."),
    );
}

fn join_channel(state: &mut ChatState, from: SessionId, raw: &str) {
    let Some(name) = state.channels.lookup(raw).map(|c| c.name.clone()) else {
        reply(
            state,
            from,
            MessageType::MulticastJoinError,
            raw,
            format!("Channel {raw} does not exist."),
        );
        return;
    };

    let previous = current_channel(state, from);
    if previous.as_ref() == Some(&name) {
        reply(
            state,
            from,
            MessageType::MulticastJoinError,
            raw,
            format!("You are already in channel {name}."),
        );
        return;
    }
    if let Some(previous) = previous {
        depart(state, from, &previous);
    }

    match enter(state, from, &name) {
        Ok(_) => {
            reply(
                state,
                from,
                MessageType::MulticastJoinSuccess,
                name.as_str(),
                format!("You have joined channel {name}."),
            );
        }
        Err(e) => {
            reply(state, from, MessageType::MulticastJoinError, raw, e.to_string());
        }
    }
}

fn list_channels(state: &ChatState, from: SessionId) {
    let mine = current_channel(state, from);
    let mut list = format!(" Active channels ({}):\n", state.channels.len());
    if state.channels.is_empty() {
        list.push_str(" - no active channels.\n");
    }
    for channel in state.channels.list_active() {
        let me = if mine.as_ref() == Some(&channel.name) { ", me" } else { "" };
        let _ = writeln!(list, "  - {} ({} online{})", channel.name, channel.members, me);
    }
    reply(state, from, MessageType::MulticastList, "", list);
}

fn channel_send(state: &ChatState, from: SessionId, payload: Bytes) {
    let Some(sender) = state.sessions.find_by_handle(from) else {
        return;
    };
    let Some(channel) = sender.channel.as_ref() else {
        reply(
            state,
            from,
            MessageType::MulticastSendError,
            "",
            "You are not in a channel.",
        );
        return;
    };

    let frame = Frame::new(MessageType::MulticastSend)
        .sender(sender.nick())
        .info(channel.as_str())
        .payload(payload);

    if state.multicast(channel, Some(from), &frame) {
        reply(
            state,
            from,
            MessageType::MulticastSendSuccess,
            channel.as_str(),
            "Your message was sent successfully.",
        );
    } else {
        reply(
            state,
            from,
            MessageType::MulticastSendError,
            channel.as_str(),
            "There was an error sending your message.",
        );
    }
}

fn quit_channel(state: &mut ChatState, from: SessionId, raw: &str) {
    let channel = current_channel(state, from).filter(|c| c.as_str() == raw);
    let Some(channel) = channel else {
        reply(
            state,
            from,
            MessageType::MulticastQuitError,
            raw,
            format!("You are not in channel {raw}."),
        );
        return;
    };

    depart(state, from, &channel);
    reply(
        state,
        from,
        MessageType::MulticastQuitSuccess,
        channel.as_str(),
        format!("You left channel {channel}."),
    );
}

fn unknown(state: &ChatState, from: SessionId, ty: MessageType) {
    debug!(session = %from, %ty, "unknown command");
    reply(
        state,
        from,
        MessageType::UnknownCommand,
        "",
        format!("Unknown command.\n{HELP}"),
    );
}
