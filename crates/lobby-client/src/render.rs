use lobby_protocol::Frame;
use lobby_types::MessageType;

/// Printable form of a frame received from the server.
pub fn render(frame: &Frame) -> String {
    let text = frame.text();
    let from = frame.nick_sender.as_str();
    match frame.msg_type {
        MessageType::UnicastSend => format!("[{from}] (private): {text}"),
        MessageType::BroadcastSend => format!("[{from}] (all): {text}"),
        MessageType::MulticastSend => format!("[{}] {from}: {text}", frame.infos),
        MessageType::EchoSend => format!("[echo]: {text}"),
        MessageType::FileRequest => format!(
            "{from} wants to send you the file {text}. Do you accept? [Y/N]"
        ),
        MessageType::FileAccept => format!("{from} accepted the transfer of {text}."),
        MessageType::FileReject => format!("{from} declined the transfer of {text}."),
        MessageType::TryAgainYN => "Please answer Y or N.".to_owned(),
        _ => format!("[{from}]: {text}"),
    }
}
