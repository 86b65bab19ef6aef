//! File transfer data phase, run directly between two clients.
//!
//! The accepting side listens on the well-known port and the offering side
//! connects to it:
//!   sender   -> FileSend header (pld_len = file size, info = file name), then the raw bytes
//!   receiver -> FileAck header once every byte is on disk
//!
//! Only the header goes through the frame layout; the file body is streamed
//! and is not bound by the chat payload limit.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use lobby_protocol::{HEADER_LEN, Header};
use lobby_types::MessageType;
use lobby_types::limits::MSG_LEN;

async fn write_header(stream: &mut TcpStream, header: &Header) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    header.encode(&mut buf);
    stream.write_all(&buf).await
}

async fn read_header(stream: &mut TcpStream) -> std::io::Result<Header> {
    let mut raw = [0u8; HEADER_LEN];
    stream.read_exact(&mut raw).await?;
    Ok(Header::decode(&raw))
}

/// File name to store an offered file under: the last component of the
/// sender's path. `None` if the offer names no usable file.
pub fn local_name(offered: &str) -> Option<&str> {
    Path::new(offered).file_name()?.to_str()
}

/// Stream `path` to an accepting peer and wait for its acknowledgement.
/// Returns the number of bytes sent.
pub async fn send_file(peer: SocketAddr, path: &Path, sender: &str) -> anyhow::Result<u64> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let size = file.metadata().await?.len();
    let Ok(pld_len) = u32::try_from(size) else {
        bail!("{} is too large to send ({} bytes)", path.display(), size);
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_owned();

    let mut stream = TcpStream::connect(peer)
        .await
        .with_context(|| format!("connecting to {peer}"))?;
    info!("sending {} ({} bytes) to {}", name, size, peer);

    write_header(
        &mut stream,
        &Header {
            msg_type: MessageType::FileSend,
            nick_sender: sender.to_owned(),
            infos: name,
            pld_len,
        },
    )
    .await?;
    let sent = tokio::io::copy(&mut file, &mut stream).await?;
    stream.flush().await?;

    let ack = read_header(&mut stream).await.context("waiting for acknowledgement")?;
    if ack.msg_type != MessageType::FileAck {
        bail!("expected an acknowledgement, got {}", ack.msg_type);
    }
    // Drain whatever the ack carries.
    let extra = (ack.pld_len as usize).min(MSG_LEN);
    let mut sink = vec![0u8; extra];
    stream.read_exact(&mut sink).await?;

    debug!("transfer to {} acknowledged", peer);
    Ok(sent)
}

/// The accepting side of a transfer: a listener bound before the accept is
/// announced, so the sender always finds it ready.
pub struct Receiver {
    listener: TcpListener,
}

impl Receiver {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one sender and store the file it streams as
    /// `download_dir/<base name of offered>`. Returns the written path.
    pub async fn receive(self, download_dir: &Path, offered: &str, me: &str) -> anyhow::Result<PathBuf> {
        let Some(name) = local_name(offered) else {
            bail!("offered file name {offered:?} is not usable");
        };
        let target = download_dir.join(name);

        let (mut stream, peer) = self.listener.accept().await?;
        debug!("transfer connection from {}", peer);

        let header = read_header(&mut stream).await?;
        if header.msg_type != MessageType::FileSend {
            bail!("expected a file, got {}", header.msg_type);
        }
        let expected = u64::from(header.pld_len);

        let mut file = File::create(&target)
            .await
            .with_context(|| format!("creating {}", target.display()))?;
        let written = tokio::io::copy(&mut (&mut stream).take(expected), &mut file).await?;
        file.flush().await?;
        if written != expected {
            bail!("connection closed after {written} of {expected} bytes");
        }

        write_header(
            &mut stream,
            &Header {
                msg_type: MessageType::FileAck,
                nick_sender: me.to_owned(),
                infos: name.to_owned(),
                pld_len: 0,
            },
        )
        .await?;
        info!("received {} ({} bytes) from {}", target.display(), written, peer);
        Ok(target)
    }
}
