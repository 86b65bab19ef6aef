//! File transfer handshake relay.
//!
//! The server only brokers the control exchange: it checks the request,
//! forwards it to the recipient and relays the recipient's answer. The data
//! connection is opened directly between the two clients on
//! [`FILE_TRANSFER_PORT`](lobby_types::limits::FILE_TRANSFER_PORT).
//!
//! ```text
//! requester                 server                  recipient
//!    | FileRequest(info=bob)   |                         |
//!    |------------------------>| exists? (spawned task)  |
//!    |                         |------------------------>| FileRequest(sender=alice)
//!    |                         |<------------------------| FileAccept(info=alice)
//!    |<------------------------|                         |
//!    |  FileAccept(info=ip)    |                         |
//! ```

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, info};

use lobby_protocol::Frame;
use lobby_types::MessageType;

use crate::connection::Event;
use crate::dispatcher::reply;
use crate::sessions::SessionId;
use crate::state::ChatState;

/// Result of the file-existence check, posted back to the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub requester: SessionId,
    pub recipient: String,
    pub filename: String,
    pub exists: bool,
}

async fn is_readable_file(path: PathBuf) -> bool {
    let is_file = tokio::fs::metadata(&path)
        .await
        .is_ok_and(|meta| meta.is_file());
    is_file && tokio::fs::File::open(&path).await.is_ok()
}

/// Handle a FileRequest: `info` names the recipient, the payload the file.
///
/// The recipient is checked immediately. The filesystem check runs on its own
/// task so the multiplexer never waits on disk I/O; its result arrives later
/// as [`Event::FileChecked`].
pub(crate) fn request(
    state: &ChatState,
    events: &mpsc::Sender<Event>,
    from: SessionId,
    frame: &Frame,
) {
    let recipient = frame.infos.clone();
    if state.sessions.find_by_nickname(&recipient).is_none() {
        reply(
            state,
            from,
            MessageType::ReceiverExistenceError,
            &recipient,
            format!("Receiver {recipient} not found."),
        );
        return;
    }

    let filename = frame.text().into_owned();
    if filename.is_empty() {
        reply(
            state,
            from,
            MessageType::FileExistenceError,
            "",
            "No file name given.",
        );
        return;
    }

    let events = events.clone();
    tokio::spawn(async move {
        let exists = is_readable_file(PathBuf::from(&filename)).await;
        let _ = events
            .send(Event::FileChecked(FileCheck {
                requester: from,
                recipient,
                filename,
                exists,
            }))
            .await;
    });
}

/// Finish a FileRequest once the filesystem check is back.
///
/// Both sessions are looked up again since either may have left meanwhile.
pub fn on_checked(state: &ChatState, check: FileCheck) {
    let Some(requester) = state.sessions.find_by_handle(check.requester) else {
        debug!(session = %check.requester, "file request from departed session dropped");
        return;
    };

    if !check.exists {
        reply(
            state,
            check.requester,
            MessageType::FileExistenceError,
            &check.filename,
            format!("File {} not found.", check.filename),
        );
        return;
    }

    let Some(recipient) = state.sessions.find_by_nickname(&check.recipient) else {
        reply(
            state,
            check.requester,
            MessageType::ReceiverExistenceError,
            &check.recipient,
            format!("Receiver {} not found.", check.recipient),
        );
        return;
    };

    let forwarded = Frame::new(MessageType::FileRequest)
        .sender(requester.nick())
        .info(recipient.nick())
        .payload(check.filename.clone());
    if recipient.send(forwarded) {
        info!(
            "{} offered {} to {}",
            requester.nick(),
            check.filename,
            recipient.nick()
        );
    }
}

/// Relay a FileAccept or FileReject back to the requester named in `info`.
///
/// An accept carries the accepting peer's IP address in `info`, which is
/// where the requester connects for the data phase.
pub(crate) fn respond(state: &ChatState, from: SessionId, frame: &Frame) {
    let Some(responder) = state.sessions.find_by_handle(from) else {
        return;
    };
    let target = frame.infos.as_str();
    let Some(requester) = state.sessions.find_by_nickname(target) else {
        reply(
            state,
            from,
            MessageType::ReceiverExistenceError,
            target,
            format!("Receiver {target} not found."),
        );
        return;
    };

    let info = match frame.msg_type {
        MessageType::FileAccept => responder.addr.ip().to_string(),
        _ => responder.nick().to_owned(),
    };
    let relayed = Frame::new(frame.msg_type)
        .sender(responder.nick())
        .info(info)
        .payload(frame.payload.clone());
    requester.send(relayed);

    debug!(
        "{} -> {}: {}",
        responder.nick(),
        requester.nick(),
        frame.msg_type
    );
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::sync::mpsc::{Receiver, channel};

    use lobby_protocol::Inbound;

    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::sessions::SESSION_QUEUE_CAPACITY;

    struct Setup {
        state: ChatState,
        dispatcher: Dispatcher,
        events: Receiver<Event>,
    }

    fn setup() -> Setup {
        let (tx, rx) = channel(16);
        Setup {
            state: ChatState::new(4),
            dispatcher: Dispatcher::new(tx),
            events: rx,
        }
    }

    fn login(s: &mut Setup, nick: &str, ip: [u8; 4]) -> (SessionId, Receiver<Frame>) {
        let (tx, rx) = channel(SESSION_QUEUE_CAPACITY);
        let id = s
            .state
            .sessions
            .register(SocketAddr::from((ip, 6000)), tx)
            .unwrap()
            .id;
        s.state.sessions.rename(id, nick).unwrap();
        (id, rx)
    }

    fn send(s: &mut Setup, from: SessionId, frame: Frame) {
        s.dispatcher
            .dispatch(&mut s.state, from, Inbound::Frame(frame));
    }

    async fn next_check(s: &mut Setup) -> FileCheck {
        let event = tokio::time::timeout(Duration::from_secs(5), s.events.recv())
            .await
            .expect("check timed out")
            .expect("event channel closed");
        match event {
            Event::FileChecked(check) => check,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_to_missing_recipient_is_not_forwarded() {
        let mut s = setup();
        let (alice, mut alice_rx) = login(&mut s, "alice", [10, 0, 0, 1]);

        send(
            &mut s,
            alice,
            Frame::new(MessageType::FileRequest).info("bob").payload("notes.txt"),
        );
        let frame = alice_rx.try_recv().unwrap();
        assert_eq!(frame.msg_type, MessageType::ReceiverExistenceError);
        assert!(s.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn request_for_missing_file_is_not_forwarded() {
        let mut s = setup();
        let (alice, mut alice_rx) = login(&mut s, "alice", [10, 0, 0, 1]);
        let (_bob, mut bob_rx) = login(&mut s, "bob", [10, 0, 0, 2]);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.bin");

        send(
            &mut s,
            alice,
            Frame::new(MessageType::FileRequest)
                .info("bob")
                .payload(missing.display().to_string()),
        );
        let check = next_check(&mut s).await;
        assert!(!check.exists);
        on_checked(&s.state, check);

        assert_eq!(
            alice_rx.try_recv().unwrap().msg_type,
            MessageType::FileExistenceError
        );
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn directories_are_not_offered() {
        let mut s = setup();
        let (alice, _alice_rx) = login(&mut s, "alice", [10, 0, 0, 1]);
        let (_bob, _bob_rx) = login(&mut s, "bob", [10, 0, 0, 2]);
        let dir = tempfile::tempdir().unwrap();

        send(
            &mut s,
            alice,
            Frame::new(MessageType::FileRequest)
                .info("bob")
                .payload(dir.path().display().to_string()),
        );
        assert!(!next_check(&mut s).await.exists);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_file_is_not_offered() {
        use std::os::unix::fs::PermissionsExt;

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        assert!(is_readable_file(path.clone()).await);

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users can still open it; the check must agree with open(2).
        let openable = std::fs::File::open(&path).is_ok();
        assert_eq!(is_readable_file(path).await, openable);
    }

    #[tokio::test]
    async fn existing_file_is_forwarded_and_accept_relayed() {
        let mut s = setup();
        let (alice, mut alice_rx) = login(&mut s, "alice", [10, 0, 0, 1]);
        let (bob, mut bob_rx) = login(&mut s, "bob", [10, 0, 0, 2]);
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();

        send(
            &mut s,
            alice,
            Frame::new(MessageType::FileRequest).info("bob").payload(path.clone()),
        );
        let check = next_check(&mut s).await;
        assert!(check.exists);
        on_checked(&s.state, check);

        let offer = bob_rx.try_recv().unwrap();
        assert_eq!(offer.msg_type, MessageType::FileRequest);
        assert_eq!(offer.nick_sender, "alice");
        assert_eq!(offer.text(), path);

        send(
            &mut s,
            bob,
            Frame::new(MessageType::FileAccept).info("alice").payload(path.clone()),
        );
        let accepted = alice_rx.try_recv().unwrap();
        assert_eq!(accepted.msg_type, MessageType::FileAccept);
        assert_eq!(accepted.nick_sender, "bob");
        assert_eq!(accepted.infos, "10.0.0.2");
    }

    #[tokio::test]
    async fn reject_is_relayed() {
        let mut s = setup();
        let (_alice, mut alice_rx) = login(&mut s, "alice", [10, 0, 0, 1]);
        let (bob, _bob_rx) = login(&mut s, "bob", [10, 0, 0, 2]);

        send(
            &mut s,
            bob,
            Frame::new(MessageType::FileReject).info("alice").payload("x.txt"),
        );
        let rejected = alice_rx.try_recv().unwrap();
        assert_eq!(rejected.msg_type, MessageType::FileReject);
        assert_eq!(rejected.nick_sender, "bob");
    }

    #[tokio::test]
    async fn answer_to_departed_requester() {
        let mut s = setup();
        let (bob, mut bob_rx) = login(&mut s, "bob", [10, 0, 0, 2]);
        send(
            &mut s,
            bob,
            Frame::new(MessageType::FileAccept).info("alice").payload("x.txt"),
        );
        assert_eq!(
            bob_rx.try_recv().unwrap().msg_type,
            MessageType::ReceiverExistenceError
        );
    }

    #[tokio::test]
    async fn recipient_leaving_during_check() {
        let mut s = setup();
        let (alice, mut alice_rx) = login(&mut s, "alice", [10, 0, 0, 1]);
        let (bob, _bob_rx) = login(&mut s, "bob", [10, 0, 0, 2]);
        let file = tempfile::NamedTempFile::new().unwrap();

        send(
            &mut s,
            alice,
            Frame::new(MessageType::FileRequest)
                .info("bob")
                .payload(file.path().display().to_string()),
        );
        let check = next_check(&mut s).await;
        s.dispatcher.disconnect(&mut s.state, bob);
        on_checked(&s.state, check);

        assert_eq!(
            alice_rx.try_recv().unwrap().msg_type,
            MessageType::ReceiverExistenceError
        );
    }
}
