//! server-side event loop
// (c) 2025 Ross Younger

mod dispatcher;
pub(crate) use dispatcher::Dispatcher;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace};

use crate::cli::ServerOptions;
use crate::transport::QuicTransport;
use crate::util::Credentials;

/// Server event loop: accepts QUIC connections for as long as the
/// endpoint lives, one dispatcher task per connection.
pub(crate) async fn server_main(options: ServerOptions) -> Result<()> {
    let credentials = Credentials::load_or_generate(&options.cert_file, &options.key_file)?;
    let server_config = credentials.server_config()?;
    let addr = resolve_listen_addr(&options.listen, options.port).await?;
    let endpoint = quinn::Endpoint::server(server_config, addr)
        .with_context(|| format!("binding UDP {addr}"))?;
    info!("listening on {}", endpoint.local_addr()?);

    let mut tasks = JoinSet::new();
    while let Some(incoming) = endpoint.accept().await {
        let root = options.root.clone();
        let _ = tasks.spawn(async move {
            match handle_connection(incoming, root).await {
                Ok(()) => trace!("connection completed"),
                // Failures are contained to their connection
                Err(e) => error!("connection failed: {e:#}"),
            }
        });
    }

    // Endpoint closed: wait for the remaining connections to finish
    let _ = tasks.join_all().await;
    endpoint.wait_idle().await;
    Ok(())
}

async fn handle_connection(incoming: quinn::Incoming, root: PathBuf) -> Result<()> {
    let connection = incoming.await?;
    debug!(
        "accepted QUIC connection from {}",
        connection.remote_address()
    );
    let transport = Arc::new(QuicTransport::new_server(connection));
    Dispatcher::new(transport, root).run().await
}

async fn resolve_listen_addr(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving {host}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no address found for {host}"))
}
