//! One task per TCP connection.
//!
//! The connection task reads the handshake, admits the session, writes the
//! grid snapshot straight to the socket, then hands the write half to a
//! writer task that drains the session's outbound queue. From then on the
//! task only reads: each line goes to the [CommandProcessor] until the peer
//! closes, an I/O error occurs, or the session is kicked.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::commands::CommandProcessor;
use super::handshake::{read_handshake, resolve_identity};
use crate::logutil::escape_log;
use crate::protocol::Outbound;
use crate::world::{ClientSession, World};

pub async fn handle_connection(world: Arc<World>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let Some(line) = read_handshake(&mut reader).await? else {
        debug!("{} closed before handshake", peer);
        return Ok(());
    };
    let identity = resolve_identity(&line, world.travel());

    let (tx, rx) = mpsc::unbounded_channel();
    let session = match world.admit(&identity.username, identity.origin_server, tx) {
        Ok(session) => session,
        Err(e) => {
            info!("Refused {} as '{}': {}", peer, escape_log(&identity.username), e);
            write_half.write_all(format!("{}\n", e).as_bytes()).await?;
            write_half.shutdown().await?;
            return Ok(());
        }
    };
    info!("{} connected as {}", peer, session.username());

    // The snapshot must precede anything queued for this session.
    if let Err(e) = write_half
        .write_all(world.snapshot_event().encode().as_bytes())
        .await
    {
        world.depart(&session);
        return Err(e.into());
    }
    let writer = tokio::spawn(write_loop(write_half, rx));
    world.announce_arrival(&session);

    let processor = CommandProcessor::new(Arc::clone(&world));
    read_loop(&mut reader, &session, &processor).await;

    world.depart(&session);
    session.send(Outbound::Close);
    let _ = writer.await;
    info!("{} ({}) disconnected", session.username(), peer);
    Ok(())
}

async fn read_loop(
    reader: &mut BufReader<OwnedReadHalf>,
    session: &Arc<ClientSession>,
    processor: &CommandProcessor,
) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        tokio::select! {
            _ = session.kicked() => {
                debug!("{} read loop ended by disconnect", session.username());
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    // Stray non-UTF-8 bytes become U+FFFD instead of ending the session.
                    let line = String::from_utf8_lossy(&buf);
                    processor.handle_line(session, line.trim_end_matches(['\r', '\n']));
                }
                Err(e) => {
                    debug!("read error for {}: {}", session.username(), e);
                    break;
                }
            },
        }
    }
}

/// Drain the outbound queue into the socket until `Close` or a write error.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(message) = rx.recv().await {
        match message {
            Outbound::Line(line) => {
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    debug!("write error: {}", e);
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}
