//! Lifecycle of one client connection.
//!
//! ```text
//! Connecting ──backend up──▶ Active ──client gone──▶ Closed
//!     └────────backend failed / timed out──────────────▲
//! ```
//!
//! While `Connecting` the client transport is neither read nor written, so
//! anything the client sends waits in the socket buffer until the backend
//! is ready.

use std::{sync::Arc, time::Duration};

use {
    ampgate_config::GatewayConfig,
    bytes::{Bytes, BytesMut},
    futures::{Sink, SinkExt, Stream, StreamExt, stream::FuturesOrdered},
    tokio::sync::watch,
    tracing::{debug, info, instrument, warn},
};

use crate::{
    backend::{Backend, BackendConnector},
    dispatch::Dispatcher,
    error::Result,
    pipeline,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub max_in_flight: usize,
    pub max_frame_bytes: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            connect_timeout: config.timeouts.connect(),
            max_in_flight: config.limits.max_in_flight.max(1),
            max_frame_bytes: config.limits.max_frame_bytes,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

pub struct GatewayConnection {
    conn_id: String,
    peer: String,
    connector: Arc<dyn BackendConnector>,
    dispatcher: Dispatcher,
    settings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
}

impl GatewayConnection {
    pub fn new(
        peer: impl Into<String>,
        connector: Arc<dyn BackendConnector>,
        dispatcher: Dispatcher,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            conn_id: uuid::Uuid::new_v4().to_string(),
            peer: peer.into(),
            connector,
            dispatcher,
            settings,
            state: watch::Sender::new(ConnectionState::Connecting),
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Drive the connection until the client goes away.
    ///
    /// `frames` yields inbound netstring payloads; `replies` takes response
    /// payloads and frames them for the transport.
    #[instrument(skip_all, fields(conn_id = %self.conn_id, peer = %self.peer))]
    pub async fn run<R, W>(self, mut frames: R, mut replies: W) -> Result<()>
    where
        R: Stream<Item = Result<BytesMut>> + Unpin + Send,
        W: Sink<Bytes, Error = crate::Error> + Unpin + Send,
    {
        debug!("client connected, dialing backend");
        let backend = match tokio::time::timeout(
            self.settings.connect_timeout,
            self.connector.connect(),
        )
        .await
        {
            Ok(Ok(backend)) => backend,
            Ok(Err(e)) => {
                warn!(error = %e, "backend connection failed, closing client");
                return self.close(&mut replies).await;
            },
            Err(_) => {
                warn!(
                    timeout = ?self.settings.connect_timeout,
                    "backend connection timed out, closing client"
                );
                return self.close(&mut replies).await;
            },
        };

        self.state.send_replace(ConnectionState::Active);
        info!("backend connected");

        let served = self.serve(&mut frames, &mut replies, backend.as_ref()).await;
        drop(backend);
        self.state.send_replace(ConnectionState::Closed);
        match &served {
            Ok(()) => info!("client disconnected"),
            Err(e) => warn!(error = %e, "client connection failed"),
        }
        served
    }

    async fn close<W>(&self, replies: &mut W) -> Result<()>
    where
        W: Sink<Bytes, Error = crate::Error> + Unpin,
    {
        self.state.send_replace(ConnectionState::Closed);
        if let Err(e) = replies.close().await {
            debug!(error = %e, "error closing client transport");
        }
        Ok(())
    }

    /// Read frames, dispatch them concurrently and write replies in arrival
    /// order. Returns when the client closes its side.
    async fn serve<R, W>(&self, frames: &mut R, replies: &mut W, backend: &dyn Backend) -> Result<()>
    where
        R: Stream<Item = Result<BytesMut>> + Unpin + Send,
        W: Sink<Bytes, Error = crate::Error> + Unpin + Send,
    {
        let dispatcher = &self.dispatcher;
        let mut in_flight = FuturesOrdered::new();

        loop {
            tokio::select! {
                frame = frames.next(), if in_flight.len() < self.settings.max_in_flight => {
                    match frame {
                        Some(Ok(frame)) => {
                            debug!(bytes = frame.len(), "frame received");
                            in_flight.push_back(async move {
                                pipeline::handle_frame(&frame, backend, dispatcher).await
                            });
                        },
                        Some(Err(e)) => return Err(e),
                        // Dropping `in_flight` cancels whatever is still running.
                        None => break,
                    }
                },
                Some(reply) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Some(reply) = reply {
                        replies.send(Bytes::from(reply)).await?;
                    }
                },
                else => break,
            }
        }

        if let Err(e) = replies.close().await {
            debug!(error = %e, "error closing client transport");
        }
        Ok(())
    }
}
