/// Integration tests: run a real server on loopback and talk to it over TCP
/// with the same codec the client uses.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use lobby_gateway::Server;
use lobby_protocol::{Frame, FrameCodec, Inbound};
use lobby_types::MessageType;
use lobby_types::limits::MSG_LEN;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start(max_sessions: usize) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), max_sessions)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

struct Peer {
    framed: Framed<TcpStream, FrameCodec>,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }

    async fn login(addr: SocketAddr, nick: &str) -> Self {
        let mut peer = Self::connect(addr).await;
        peer.send(Frame::new(MessageType::NicknameNew).info(nick)).await;
        peer.expect(MessageType::NicknameSuccess).await;
        peer
    }

    async fn send(&mut self, frame: Frame) {
        self.framed.send(frame).await.unwrap();
    }

    async fn recv(&mut self) -> Frame {
        match tokio::time::timeout(TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(Inbound::Frame(frame)))) => frame,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    async fn expect(&mut self, ty: MessageType) -> Frame {
        let frame = self.recv().await;
        assert_eq!(frame.msg_type, ty, "payload: {}", frame.text());
        frame
    }

    /// Wait for the server to close this connection.
    async fn expect_closed(&mut self) {
        match tokio::time::timeout(TIMEOUT, self.framed.next()).await {
            Ok(None) | Ok(Some(Err(_))) => {}
            other => panic!("expected the connection to close, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn who_lists_every_session_once() {
    let addr = start(15).await;
    let _alice = Peer::login(addr, "alice").await;
    let mut bob = Peer::login(addr, "bob").await;
    let _carol = Peer::login(addr, "carol").await;

    bob.send(Frame::new(MessageType::NicknameList)).await;
    let list = bob.expect(MessageType::NicknameList).await;
    let text = list.text();
    let entries: Vec<&str> = text.lines().skip(1).collect();
    assert_eq!(entries, ["  - alice", "  - bob (me)", "  - carol"]);
}

#[tokio::test]
async fn who_counts_connections_without_nickname() {
    let addr = start(15).await;
    let _anon = Peer::connect(addr).await;
    let mut alice = Peer::login(addr, "alice").await;
    let _bob = Peer::login(addr, "bob").await;

    alice.send(Frame::new(MessageType::NicknameList)).await;
    let list = alice.expect(MessageType::NicknameList).await;
    let text = list.text();
    let entries: Vec<&str> = text.lines().skip(1).collect();
    assert_eq!(entries, ["  - (no nickname)", "  - alice (me)", "  - bob"]);
}

#[tokio::test]
async fn nicknames_are_unique_ignoring_case() {
    let addr = start(15).await;
    let _first = Peer::login(addr, "Dave").await;
    let mut second = Peer::connect(addr).await;

    second.send(Frame::new(MessageType::NicknameNew).info("dAVE")).await;
    second.expect(MessageType::NicknameError).await;

    second.send(Frame::new(MessageType::NicknameNew).info("server")).await;
    second.expect(MessageType::NicknameError).await;

    second.send(Frame::new(MessageType::NicknameNew).info("dave2")).await;
    second.expect(MessageType::NicknameSuccess).await;
}

#[tokio::test]
async fn channel_lifecycle_over_the_wire() {
    let addr = start(15).await;
    let mut alice = Peer::login(addr, "alice").await;
    let mut bob = Peer::login(addr, "bob").await;

    alice.send(Frame::new(MessageType::MulticastCreate).info("abc123")).await;
    alice.expect(MessageType::MulticastCreateSuccess).await;

    bob.send(Frame::new(MessageType::MulticastCreate).info("abc123")).await;
    bob.expect(MessageType::MulticastCreateError).await;

    bob.send(Frame::new(MessageType::MulticastJoin).info("abc123")).await;
    bob.expect(MessageType::MulticastJoinSuccess).await;
    let joined = alice.expect(MessageType::MulticastSend).await;
    assert_eq!(joined.text(), "bob joined the channel.");

    bob.send(Frame::new(MessageType::MulticastSend).payload("hello room")).await;
    bob.expect(MessageType::MulticastSendSuccess).await;
    let msg = alice.expect(MessageType::MulticastSend).await;
    assert_eq!(msg.nick_sender, "bob");
    assert_eq!(msg.text(), "hello room");

    bob.send(Frame::new(MessageType::MulticastQuit).info("abc123")).await;
    bob.expect(MessageType::MulticastQuitSuccess).await;
    alice.expect(MessageType::MulticastSend).await;

    alice.send(Frame::new(MessageType::MulticastQuit).info("abc123")).await;
    let closing = alice.expect(MessageType::MulticastSend).await;
    assert!(closing.text().contains("Channel closed"));
    alice.expect(MessageType::MulticastQuitSuccess).await;

    bob.send(Frame::new(MessageType::MulticastList)).await;
    let list = bob.expect(MessageType::MulticastList).await;
    assert!(!list.text().contains("abc123"));
}

#[tokio::test]
async fn disconnect_frees_nickname() {
    let addr = start(15).await;
    let mut alice = Peer::login(addr, "alice").await;
    let mut bob = Peer::login(addr, "bob").await;

    alice.send(Frame::new(MessageType::MulticastCreate).info("room")).await;
    alice.expect(MessageType::MulticastCreateSuccess).await;
    bob.send(Frame::new(MessageType::MulticastJoin).info("room")).await;
    bob.expect(MessageType::MulticastJoinSuccess).await;
    alice.expect(MessageType::MulticastSend).await;

    drop(bob);
    let left = alice.expect(MessageType::MulticastSend).await;
    assert_eq!(left.text(), "bob left the channel.");

    alice
        .send(Frame::new(MessageType::UnicastSend).info("bob").payload("still there?"))
        .await;
    alice.expect(MessageType::UnicastError).await;

    alice.send(Frame::new(MessageType::NicknameList)).await;
    let list = alice.expect(MessageType::NicknameList).await;
    assert!(!list.text().contains("bob"));
}

#[tokio::test]
async fn broadcast_and_unicast() {
    let addr = start(15).await;
    let mut alice = Peer::login(addr, "alice").await;

    alice.send(Frame::new(MessageType::BroadcastSend).payload("anyone?")).await;
    alice.expect(MessageType::BroadcastSuccess).await;

    let mut bob = Peer::login(addr, "bob").await;
    alice.send(Frame::new(MessageType::BroadcastSend).payload("hi all")).await;
    alice.expect(MessageType::BroadcastSuccess).await;
    assert_eq!(bob.expect(MessageType::BroadcastSend).await.text(), "hi all");

    bob.send(Frame::new(MessageType::UnicastSend).info("alice").payload("hi you")).await;
    bob.expect(MessageType::UnicastSuccess).await;
    let direct = alice.expect(MessageType::UnicastSend).await;
    assert_eq!(direct.nick_sender, "bob");
    assert_eq!(direct.text(), "hi you");
}

#[tokio::test]
async fn quit_keyword_closes_connection() {
    let addr = start(15).await;
    let mut alice = Peer::login(addr, "alice").await;
    alice.send(Frame::new(MessageType::EchoSend).payload("/quit")).await;
    alice.expect_closed().await;

    // The nickname is free again.
    let _again = Peer::login(addr, "alice").await;
}

#[tokio::test]
async fn connections_beyond_capacity_are_refused() {
    let addr = start(1).await;
    let mut alice = Peer::login(addr, "alice").await;

    let mut extra = Peer::connect(addr).await;
    extra.expect_closed().await;

    alice.send(Frame::new(MessageType::EchoSend).payload("still here")).await;
    assert_eq!(alice.expect(MessageType::EchoSend).await.text(), "still here");
}

#[tokio::test]
async fn oversized_payload_is_answered_and_stream_stays_usable() {
    let addr = start(15).await;
    let mut alice = Peer::login(addr, "alice").await;

    let stream = alice.framed.into_inner();
    let mut raw = Framed::new(stream, FrameCodec::with_max_payload(usize::MAX));
    raw.send(Frame::new(MessageType::BroadcastSend).payload(vec![b'x'; MSG_LEN * 2]))
        .await
        .unwrap();
    raw.send(Frame::new(MessageType::EchoSend).payload("after")).await.unwrap();

    let mut alice = Peer { framed: raw };
    let error = alice.expect(MessageType::BroadcastError).await;
    assert!(error.text().starts_with("Message too long"));
    assert_eq!(alice.expect(MessageType::EchoSend).await.text(), "after");
}

#[tokio::test]
async fn file_request_to_unknown_recipient() {
    let addr = start(15).await;
    let mut alice = Peer::login(addr, "alice").await;
    alice
        .send(Frame::new(MessageType::FileRequest).info("nobody").payload("Cargo.toml"))
        .await;
    alice.expect(MessageType::ReceiverExistenceError).await;
}

#[tokio::test]
async fn file_request_is_forwarded_when_file_exists() {
    let addr = start(15).await;
    let mut alice = Peer::login(addr, "alice").await;
    let mut bob = Peer::login(addr, "bob").await;
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().display().to_string();

    alice
        .send(Frame::new(MessageType::FileRequest).info("bob").payload(path.clone()))
        .await;
    let offer = bob.expect(MessageType::FileRequest).await;
    assert_eq!(offer.nick_sender, "alice");
    assert_eq!(offer.text(), path);

    bob.send(Frame::new(MessageType::FileAccept).info("alice").payload(path)).await;
    let accepted = alice.expect(MessageType::FileAccept).await;
    assert_eq!(accepted.infos, "127.0.0.1");

    alice
        .send(Frame::new(MessageType::FileRequest).info("bob").payload("/no/such/file"))
        .await;
    alice.expect(MessageType::FileExistenceError).await;
}
