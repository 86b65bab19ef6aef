//! Client-side session state: what the user is called, which channel they
//! are in, and which file offers are open. Input lines and server frames go
//! in, [`Effect`]s come out for the I/O loop to carry out.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use lobby_protocol::Frame;
use lobby_types::MessageType;
use lobby_types::limits::FILE_TRANSFER_PORT;

use crate::commands::{self, Command};
use crate::render::render;

/// A file someone wants to send us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub from: String,
    pub filename: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Effect {
    Send(Frame),
    Print(String),
    /// Open the data listener, then answer the offer.
    Accept(Offer),
    /// Connect to an accepting peer and stream the file.
    Upload { peer: SocketAddr, path: PathBuf },
    Exit,
}

#[derive(Debug, Default)]
pub struct App {
    nick: Option<String>,
    channel: Option<String>,
    pending: Option<Offer>,
    /// Files we offered, keyed by recipient.
    outgoing: HashMap<String, PathBuf>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nick(&self) -> &str {
        self.nick.as_deref().unwrap_or_default()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn accept_frame(&self, offer: &Offer) -> Frame {
        Frame::new(MessageType::FileAccept)
            .sender(self.nick())
            .info(offer.from.as_str())
            .payload(offer.filename.clone())
    }

    pub fn reject_frame(&self, offer: &Offer) -> Frame {
        Frame::new(MessageType::FileReject)
            .sender(self.nick())
            .info(offer.from.as_str())
            .payload(offer.filename.clone())
    }

    pub fn on_input(&mut self, line: &str) -> Vec<Effect> {
        if let Some(offer) = self.pending.take() {
            return self.answer_offer(offer, line);
        }

        let command = match commands::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Vec::new(),
            Err(e) => return vec![Effect::Print(e.to_string())],
        };

        match command {
            Command::SendFile { ref to, ref path } => {
                self.outgoing.insert(to.clone(), PathBuf::from(path));
            }
            Command::Quit if self.channel.is_none() => {
                let frame = commands::to_frame(command, self.nick(), None);
                return vec![Effect::Send(frame), Effect::Exit];
            }
            _ => {}
        }
        vec![Effect::Send(commands::to_frame(
            command,
            self.nick(),
            self.channel(),
        ))]
    }

    fn answer_offer(&mut self, offer: Offer, line: &str) -> Vec<Effect> {
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => vec![Effect::Accept(offer)],
            "n" | "no" => {
                let frame = self.reject_frame(&offer);
                vec![
                    Effect::Send(frame),
                    Effect::Print(format!("You declined {} from {}.", offer.filename, offer.from)),
                ]
            }
            _ => {
                self.pending = Some(offer);
                vec![Effect::Print(render(&Frame::new(MessageType::TryAgainYN)))]
            }
        }
    }

    pub fn on_frame(&mut self, frame: Frame) -> Vec<Effect> {
        let mut effects = Vec::new();
        match frame.msg_type {
            MessageType::NicknameSuccess => self.nick = Some(frame.infos.clone()),
            MessageType::MulticastCreateSuccess | MessageType::MulticastJoinSuccess => {
                self.channel = Some(frame.infos.clone());
            }
            MessageType::MulticastQuitSuccess => self.channel = None,
            MessageType::FileRequest => {
                let offer = Offer {
                    from: frame.nick_sender.clone(),
                    filename: frame.text().into_owned(),
                };
                if self.pending.is_some() {
                    effects.push(Effect::Send(self.reject_frame(&offer)));
                    effects.push(Effect::Print(format!(
                        "Declined {} from {}: another offer is waiting for an answer.",
                        offer.filename, offer.from
                    )));
                    return effects;
                }
                self.pending = Some(offer);
            }
            MessageType::FileAccept => {
                let path = self.outgoing.remove(&frame.nick_sender);
                match (path, frame.infos.parse::<IpAddr>()) {
                    (Some(path), Ok(ip)) => effects.push(Effect::Upload {
                        peer: SocketAddr::new(ip, FILE_TRANSFER_PORT),
                        path,
                    }),
                    (None, _) => effects.push(Effect::Print(format!(
                        "{} accepted a file we did not offer.",
                        frame.nick_sender
                    ))),
                    (Some(_), Err(_)) => effects.push(Effect::Print(format!(
                        "{} accepted but sent no usable address ({:?}).",
                        frame.nick_sender, frame.infos
                    ))),
                }
            }
            MessageType::FileReject => {
                self.outgoing.remove(&frame.nick_sender);
            }
            _ => {}
        }
        effects.insert(0, Effect::Print(render(&frame)));
        effects
    }
}
