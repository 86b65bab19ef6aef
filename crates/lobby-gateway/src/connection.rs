use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lobby_protocol::{Frame, FrameCodec, Inbound};
use lobby_types::limits::QUIT_KEYWORD;

use crate::dispatcher::{Dispatcher, Outcome};
use crate::sessions::{SESSION_QUEUE_CAPACITY, SessionId};
use crate::state::ChatState;
use crate::transfer::{self, FileCheck};

/// Pending connections the kernel may queue before `accept`.
const LISTEN_BACKLOG: i32 = 128;

/// Events the multiplexer may have pending. Readers wait when it is full.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Work for the multiplexer, posted by per-session tasks.
#[derive(Debug)]
pub enum Event {
    Inbound(SessionId, Inbound),
    /// The session's socket failed or reached EOF.
    Closed(SessionId),
    FileChecked(FileCheck),
}

/// A payload equal to the quit keyword ends the session instead of being dispatched.
fn is_quit(inbound: &Inbound) -> bool {
    matches!(inbound, Inbound::Frame(frame) if frame.text() == QUIT_KEYWORD)
}

/// Drain a session's queue onto its socket until the queue closes, a write
/// fails, or the session is marked stalled. Always reports `Closed` at the end.
async fn write_frames<W>(
    id: SessionId,
    write_half: W,
    mut rx: mpsc::Receiver<Frame>,
    stalled: CancellationToken,
    events: mpsc::Sender<Event>,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(write_half, FrameCodec::new());
    let drain = async {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                debug!(session = %id, "write failed: {}", e);
                break;
            }
        }
    };
    // Cancellation also ends a write the peer never drains.
    tokio::select! {
        _ = stalled.cancelled() => debug!(session = %id, "writer stopped: session stalled"),
        _ = drain => {}
    }
    let _ = events.send(Event::Closed(id)).await;
}

/// The chat server: a bound listener plus the session cap.
pub struct Server {
    listener: TcpListener,
    max_sessions: usize,
}

impl Server {
    /// Bind the listening socket. Failure here is fatal to the process.
    pub async fn bind(addr: SocketAddr, max_sessions: usize) -> anyhow::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        Ok(Self {
            listener,
            max_sessions,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the multiplexer. Never returns under normal operation.
    ///
    /// This task is the only one that touches the registries: accepts, decoded
    /// frames, disconnects and file-check results are all processed here, one
    /// at a time.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "Lobby listening on {} (max {} sessions)",
            self.local_addr()?,
            self.max_sessions
        );

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let dispatcher = Dispatcher::new(events_tx.clone());
        let mut mux = Multiplexer {
            state: ChatState::new(self.max_sessions),
            dispatcher,
            events: events_tx,
            readers: HashMap::new(),
        };

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => mux.admit(stream, addr),
                    Err(e) => error!("accept error: {}", e),
                },
                Some(event) = events_rx.recv() => mux.handle(event),
            }
        }
    }
}

struct Multiplexer {
    state: ChatState,
    dispatcher: Dispatcher,
    events: mpsc::Sender<Event>,
    /// Reader task per live session, aborted on disconnect.
    readers: HashMap<SessionId, AbortHandle>,
}

impl Multiplexer {
    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.state.sessions.is_full() {
            warn!(
                "rejecting {}: server full ({} sessions)",
                addr,
                self.state.sessions.len()
            );
            return;
        }

        if let Err(e) = socket2::SockRef::from(&stream).set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", addr, e);
        }

        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        let (id, stalled) = match self.state.sessions.register(addr, tx) {
            Ok(session) => (session.id, session.stall_signal()),
            Err(e) => {
                warn!("rejecting {}: {}", addr, e);
                return;
            }
        };
        info!(session = %id, "new connection from {}", addr);

        let (read_half, write_half) = stream.into_split();

        tokio::spawn(write_frames(id, write_half, rx, stalled, self.events.clone()));

        let events = self.events.clone();
        let reader = tokio::spawn(async move {
            let mut frames = FramedRead::new(read_half, FrameCodec::new());
            while let Some(item) = frames.next().await {
                match item {
                    Ok(inbound) => {
                        if events.send(Event::Inbound(id, inbound)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!(session = %id, "read failed: {}", e);
                        break;
                    }
                }
            }
            let _ = events.send(Event::Closed(id)).await;
        });
        self.readers.insert(id, reader.abort_handle());
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Inbound(id, inbound) => {
                if is_quit(&inbound) {
                    debug!(session = %id, "quit keyword");
                    self.disconnect(id);
                    return;
                }
                if self.dispatcher.dispatch(&mut self.state, id, inbound) == Outcome::Disconnect {
                    self.disconnect(id);
                }
            }
            Event::Closed(id) => self.disconnect(id),
            Event::FileChecked(check) => transfer::on_checked(&self.state, check),
        }
    }

    fn disconnect(&mut self, id: SessionId) {
        if let Some(reader) = self.readers.remove(&id) {
            reader.abort();
        }
        // Dropping the session closes its queue; the writer flushes what is
        // left and shuts the socket.
        if let Some(session) = self.dispatcher.disconnect(&mut self.state, id) {
            info!(
                "{} disconnected ({} sessions left)",
                session.addr,
                self.state.sessions.len()
            );
        }
    }
}
