//! Listeners for the netstring and WebSocket services.

use std::{future::Future, net::SocketAddr, sync::Arc};

use {
    ampgate_config::GatewayConfig,
    tokio::{
        net::{TcpListener, TcpStream},
        sync::watch,
    },
    tokio_util::codec::{FramedRead, FramedWrite},
    tracing::{debug, info, warn},
};

use crate::{
    backend::{AmpConnector, BackendConnector},
    connection::{ConnectionSettings, GatewayConnection},
    dispatch::Dispatcher,
    error::{Error, Result},
    netstring::NetstringCodec,
    websocket,
};

/// Shared, immutable state for every accepted connection.
#[derive(Clone)]
pub struct GatewayServer {
    connector: Arc<dyn BackendConnector>,
    dispatcher: Dispatcher,
    settings: ConnectionSettings,
}

impl GatewayServer {
    pub fn new(
        connector: Arc<dyn BackendConnector>,
        dispatcher: Dispatcher,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            connector,
            dispatcher,
            settings,
        }
    }

    /// Build a server that forwards to the configured AMP backend.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let target = config
            .gateway
            .backend
            .clone()
            .ok_or_else(|| Error::message("no backend endpoint configured"))?;
        let connector = AmpConnector::new(target, config.timeouts.connect());
        Ok(Self::new(
            Arc::new(connector),
            Dispatcher::from_config(config),
            ConnectionSettings::from_config(config),
        ))
    }

    fn connection(&self, peer: SocketAddr) -> GatewayConnection {
        GatewayConnection::new(
            peer.to_string(),
            Arc::clone(&self.connector),
            self.dispatcher.clone(),
            self.settings,
        )
    }

    /// Accept netstring clients until `shutdown` flips to `true`.
    pub async fn serve_netstring(
        &self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.accept_loop("netstring", listener, shutdown, |stream, connection| async move {
            let max = connection.settings().max_frame_bytes;
            let (read_half, write_half) = stream.into_split();
            connection
                .run(
                    FramedRead::new(read_half, NetstringCodec::new(max)),
                    FramedWrite::new(write_half, NetstringCodec::new(max)),
                )
                .await
        })
        .await
    }

    /// Accept WebSocket clients until `shutdown` flips to `true`.
    pub async fn serve_websocket(
        &self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let handshake_timeout = self.settings.connect_timeout;
        self.accept_loop("websocket", listener, shutdown, move |stream, connection| {
            websocket::serve_tunnel(stream, connection, handshake_timeout)
        })
        .await
    }

    async fn accept_loop<F, Fut>(
        &self,
        service: &'static str,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
        handle: F,
    ) -> Result<()>
    where
        F: Fn(TcpStream, GatewayConnection) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        info!(service, addr = %listener.local_addr()?, "gateway listening");

        loop {
            tokio::select! {
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
                            }
                            let session = handle(stream, self.connection(peer));
                            tokio::spawn(async move {
                                if let Err(e) = session.await {
                                    debug!(service, peer = %peer, error = %e, "client session ended with error");
                                }
                            });
                        },
                        Err(e) => {
                            warn!(service, error = %e, "accept error");
                        },
                    }
                },
                _ = shutdown_signal(&shutdown) => {
                    info!(service, "gateway listener shutting down");
                    break;
                },
            }
        }
        Ok(())
    }
}

async fn shutdown_signal(rx: &watch::Receiver<bool>) {
    let mut rx = rx.clone();
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
