//! Upload and download transaction logic
// (c) 2025 Ross Younger
//!
//! Each transaction type pairs a client-side `send` (the transfer
//! controller driving one dedicated stream end to end) with a
//! server-side [`StreamHandler`] implementation (spawned by the
//! dispatcher for the stream the REQUEST arrived on).

pub(crate) mod common;
mod download;
mod upload;

pub(crate) use download::Download;
pub(crate) use upload::Upload;

use anyhow::Result;
use async_trait::async_trait;

/// Server side of one transaction. Owns the rest of its stream's
/// lifecycle; does not return until completion (or error).
#[async_trait]
pub(crate) trait StreamHandler: Send {
    async fn handle(&mut self) -> Result<()>;
}
