use std::path::PathBuf;

use {
    ampgate_config::{ConnectEndpoint, GatewayConfig, ListenEndpoint},
    ampgate_gateway::GatewayServer,
    anyhow::{Context, Result, bail},
    clap::Parser,
    tokio::{net::TcpListener, sync::watch, task::JoinSet},
    tracing::{info, warn},
    tracing_subscriber::EnvFilter,
};

/// JSON-RPC 2.0 gateway for AMP backends.
///
/// Accepts JSON-RPC requests framed as netstrings, over plain TCP or
/// tunneled through WebSocket, and forwards each one as an AMP command to
/// the backend. Every client gets its own backend connection.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file. Defaults to `./ampgate.toml` when
    /// that file exists.
    #[arg(long, env = "AMPGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listening endpoint for the netstring service, e.g. `tcp:7000`.
    #[arg(long, env = "AMPGATE_NETSTRING_ENDPOINT")]
    netstring_endpoint: Option<ListenEndpoint>,

    /// Listening endpoint for the WebSocket service, e.g.
    /// `tcp:port=7001:interface=127.0.0.1`.
    #[arg(long, env = "AMPGATE_WEBSOCKET_ENDPOINT")]
    websocket_endpoint: Option<ListenEndpoint>,

    /// AMP backend to dial for every client, e.g. `tcp:host=calc:port=9000`.
    #[arg(long, env = "AMPGATE_AMPTARGET_ENDPOINT")]
    backend_endpoint: Option<ConnectEndpoint>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Endpoints given on the command line (or through their environment
    /// variables) replace the ones from the configuration file.
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(endpoint) = self.netstring_endpoint {
            config.gateway.netstring = Some(endpoint);
        }
        if let Some(endpoint) = self.websocket_endpoint {
            config.gateway.websocket = Some(endpoint);
        }
        if let Some(endpoint) = &self.backend_endpoint {
            config.gateway.backend = Some(endpoint.clone());
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_config(args: &Args) -> Result<GatewayConfig> {
    let mut config =
        ampgate_config::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = resolve_config(&args)?;
    run(config).await
}

async fn run(config: GatewayConfig) -> Result<()> {
    let server = GatewayServer::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut services = JoinSet::new();

    if let Some(endpoint) = config.gateway.netstring {
        let listener = TcpListener::bind(endpoint.socket_addr())
            .await
            .with_context(|| format!("failed to bind netstring endpoint {endpoint}"))?;
        let server = server.clone();
        let shutdown = shutdown_rx.clone();
        services.spawn(async move { server.serve_netstring(listener, shutdown).await });
    }

    if let Some(endpoint) = config.gateway.websocket {
        let listener = TcpListener::bind(endpoint.socket_addr())
            .await
            .with_context(|| format!("failed to bind websocket endpoint {endpoint}"))?;
        let server = server.clone();
        let shutdown = shutdown_rx.clone();
        services.spawn(async move { server.serve_websocket(listener, shutdown).await });
    }

    if let Some(backend) = &config.gateway.backend {
        info!(backend = %backend, "forwarding to AMP backend");
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
        },
        Some(joined) = services.join_next() => {
            joined.context("listener task panicked")??;
            bail!("listener stopped unexpectedly");
        },
    }

    if shutdown_tx.send(true).is_err() {
        warn!("listeners already stopped");
    }
    while let Some(joined) = services.join_next().await {
        joined.context("listener task panicked")??;
    }
    info!("gateway stopped");
    Ok(())
}
