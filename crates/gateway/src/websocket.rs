//! Netstrings tunneled through WebSocket messages.
//!
//! Inbound text and binary messages are chunks of one continuous netstring
//! byte stream; a netstring may span messages. Each reply is sent as one
//! text message holding exactly one netstring.

use std::time::Duration;

use {
    bytes::Bytes,
    futures::{SinkExt, StreamExt, future},
    tokio::io::{AsyncRead, AsyncWrite},
    tokio_tungstenite::tungstenite::Message,
    tokio_util::{codec::FramedRead, io::StreamReader},
    tracing::debug,
};

use crate::{
    connection::GatewayConnection,
    error::{Error, Result},
    netstring::{self, NetstringCodec},
};

/// Complete the WebSocket handshake on `stream`, then run `connection` over
/// the tunnel.
pub async fn serve_tunnel<S>(
    stream: S,
    connection: GatewayConnection,
    handshake_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = tokio::time::timeout(handshake_timeout, tokio_tungstenite::accept_async(stream))
        .await
        .map_err(|_| Error::message("WebSocket handshake timed out"))??;
    debug!(conn_id = connection.conn_id(), "WebSocket handshake complete");

    let (ws_sink, ws_stream) = ws.split();

    let chunks = ws_stream
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Bytes::copy_from_slice(text.as_bytes()))),
                Ok(Message::Binary(data)) => Some(Ok(data)),
                Ok(_) => None,
                Err(e) => Some(Err(std::io::Error::other(e))),
            })
        });
    let frames = FramedRead::new(
        StreamReader::new(Box::pin(chunks)),
        NetstringCodec::new(connection.settings().max_frame_bytes),
    );

    let replies = ws_sink.with(|payload: Bytes| {
        future::ready(
            String::from_utf8(netstring::frame(&payload).to_vec())
                .map(Message::text)
                .map_err(|_| Error::message("reply is not valid UTF-8")),
        )
    });

    connection.run(frames, Box::pin(replies)).await
}
