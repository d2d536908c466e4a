//! General utility code that didn't fit anywhere else
// (c) 2025 Ross Younger

mod cert;
pub(crate) use cert::{client_config, Credentials};

mod tracing;
pub(crate) use tracing::setup as setup_tracing;
