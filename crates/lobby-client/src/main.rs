mod app;
mod commands;
mod render;
mod transfer;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::warn;

use lobby_protocol::{Frame, FrameCodec, Inbound};
use lobby_types::limits::FILE_TRANSFER_PORT;

use crate::app::{App, Effect, Offer};
use crate::transfer::Receiver;

type Sink = SplitSink<Framed<TcpStream, FrameCodec>, Frame>;

/// Interactive client for the lobby chat server.
#[derive(Debug, Parser)]
#[command(name = "lobby-client", version)]
struct Args {
    /// Server host name or address.
    host: String,

    /// Server port.
    port: u16,

    /// Where received files are stored.
    #[arg(long, env = "LOBBY_DOWNLOAD_DIR", default_value = ".")]
    download_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they do not mix with the conversation.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lobby_client=warn".into()),
        )
        .init();

    let args = Args::parse();
    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("connecting to {}:{}", args.host, args.port))?;
    println!("Connected to {}:{}.", args.host, args.port);
    println!("Please log in with /nick <nickname>");

    let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new()).split();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut app = App::new();

    loop {
        let effects = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => app.on_input(&line),
                None => break,
            },
            inbound = frames.next() => match inbound {
                Some(Ok(Inbound::Frame(frame))) => app.on_frame(frame),
                Some(Ok(Inbound::Oversized(header))) => {
                    warn!("dropped oversized {} frame from server", header.msg_type);
                    continue;
                }
                Some(Err(e)) => return Err(e).context("connection to server lost"),
                None => {
                    println!("Server closed the connection.");
                    break;
                }
            },
        };

        for effect in effects {
            match effect {
                Effect::Send(frame) => sink.send(frame).await?,
                Effect::Print(text) => println!("{text}"),
                Effect::Accept(offer) => accept(&app, offer, &mut sink, &args.download_dir).await?,
                Effect::Upload { peer, path } => {
                    let me = app.nick().to_owned();
                    tokio::spawn(async move {
                        match transfer::send_file(peer, &path, &me).await {
                            Ok(bytes) => println!("Sent {} ({} bytes).", path.display(), bytes),
                            Err(e) => println!("Sending {} failed: {e:#}", path.display()),
                        }
                    });
                }
                Effect::Exit => return Ok(()),
            }
        }
    }
    Ok(())
}

/// Open the data listener and answer the offer: accept if the port could be
/// bound, reject otherwise.
async fn accept(app: &App, offer: Offer, sink: &mut Sink, download_dir: &Path) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, FILE_TRANSFER_PORT));
    let receiver = match Receiver::bind(addr).await {
        Ok(receiver) => receiver,
        Err(e) => {
            println!("Cannot listen on port {FILE_TRANSFER_PORT}: {e}. Declining.");
            sink.send(app.reject_frame(&offer)).await?;
            return Ok(());
        }
    };

    sink.send(app.accept_frame(&offer)).await?;
    println!("Waiting for {} from {}...", offer.filename, offer.from);

    let dir = download_dir.to_path_buf();
    let me = app.nick().to_owned();
    tokio::spawn(async move {
        match receiver.receive(&dir, &offer.filename, &me).await {
            Ok(path) => println!("Saved {} from {}.", path.display(), offer.from),
            Err(e) => println!("Receiving {} failed: {e:#}", offer.filename),
        }
    });
    Ok(())
}
