//! Main client mode event loop
// (c) 2025 Ross Younger

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{Context as _, Result};
use human_repr::HumanCount as _;
use tracing::{debug, info};

use crate::cli::ClientOptions;
use crate::session::{Download, Upload};
use crate::transport::{QuicTransport, Transport as _};
use crate::util;

/// Main client mode event loop: connects, runs the requested transfer on
/// a fresh stream, closes down.
pub(crate) async fn client_main(options: ClientOptions) -> Result<()> {
    let remote = resolve_remote(&options.server, options.port).await?;
    let client_config = util::client_config(&options.cert_file)?;
    let mut endpoint =
        quinn::Endpoint::client(local_bind_addr(remote)).context("creating QUIC endpoint")?;
    endpoint.set_default_client_config(client_config);

    debug!("connecting to {remote}");
    let connection = endpoint
        .connect(remote, &options.server)?
        .await
        .with_context(|| format!("connecting to {remote}"))?;
    let transport = QuicTransport::new_client(connection);

    let result = if options.download {
        let filename = options
            .video_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("video path is not valid UTF-8"))?;
        Download::send(&transport, filename, &options.video_path).await
    } else {
        Upload::send(&transport, &options.video_path).await
    };

    // Close down gracefully whether or not the transfer succeeded
    transport.close().await;
    endpoint.wait_idle().await;

    let transferred = result?;
    info!("transfer complete: {}", transferred.human_count_bytes());
    Ok(())
}

async fn resolve_remote(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving {host}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no address found for {host}"))
}

fn local_bind_addr(remote: SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}
