//! Newline-delimited JSON over TCP.
//!
//! Stands in for the connection layer in front of a conversation: each
//! accepted stream becomes one client, every line it sends is a broadcast
//! request, and its outbound queue is drained back onto the socket.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::conversation::ConversationHandle;
use crate::error::SessionError;
use crate::message::UserId;

/// Longest line accepted from a peer, terminator excluded
pub const MAX_LINE_LEN: usize = 1 << 20;

/// Terminate a payload for the wire
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.extend_from_slice(payload);
    framed.push(b'\n');
    framed
}

/// Strip the line terminator (and a stray carriage return) from a received line
pub fn unframe(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Run one client connection until either side hangs up
pub async fn serve_client(
    stream: TcpStream,
    handle: ConversationHandle,
    user_id: UserId,
) -> Result<(), SessionError> {
    serve_client_with_limit(stream, handle, user_id, MAX_LINE_LEN).await
}

/// Like [`serve_client`], disconnecting peers whose lines exceed `max_line`
pub async fn serve_client_with_limit(
    stream: TcpStream,
    handle: ConversationHandle,
    user_id: UserId,
    max_line: usize,
) -> Result<(), SessionError> {
    let (read_half, mut write_half) = stream.into_split();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (client, mut outbound) = handle.client(user_id, direct_tx);
    let client_id = client.id();
    handle.register(client).await?;

    let writer = tokio::spawn(async move {
        loop {
            // The INIT snapshot goes out ahead of anything queued
            let payload = tokio::select! {
                biased;
                Some(payload) = direct_rx.recv() => payload,
                payload = outbound.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };
            if let Err(e) = write_half.write_all(&frame(&payload)).await {
                log::debug!("Write to user {} failed: {}", user_id, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut reader = BufReader::new(read_half);
    let mut line = Vec::new();
    let result = loop {
        line.clear();
        let mut limited = (&mut reader).take(max_line as u64 + 1);
        match limited.read_until(b'\n', &mut line).await {
            Ok(0) => break Ok(()),
            Ok(n) if n > max_line && !line.ends_with(b"\n") => {
                log::warn!("Disconnecting user {}: line exceeds {} bytes", user_id, max_line);
                break Err(SessionError::LineTooLong(max_line));
            }
            Ok(_) => {
                let content = unframe(&line);
                if content.is_empty() {
                    continue;
                }
                if let Err(e) = handle.broadcast(content.to_vec(), client_id).await {
                    break Err(e);
                }
            }
            Err(e) => break Err(SessionError::Transport(e)),
        }
    };

    // Harmless if the conversation already dropped this client
    let _ = handle.unregister(client_id).await;
    let _ = writer.await;
    result
}
