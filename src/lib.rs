// (c) 2025 Ross Younger
//! The QUIC Video Transfer Protocol (`qvtp`) moves video files between a
//! client and a server over QUIC.
//!
//! ## Overview
//!
//! * One upload or download (a *transaction*) runs on one dedicated QUIC
//!   stream; a connection carries any number of transactions.
//! * Application messages ([Datagrams](protocol::Datagram)) have an
//!   explicit binary wire layout; see [protocol].
//! * File data travels as checksummed 10 KiB chunks. Corrupt or
//!   out-of-order chunks are dropped and logged; the protocol has no
//!   retransmission handshake, leaving recovery to the operator.
//! * TLS is self-signed by default: the server generates a certificate
//!   on first start and the client is pointed at it with `--cert-file`.
//!
//! ## Structure
//!
//! The protocol core is transport-agnostic: the state machines in
//! `session` consume the abstract stream interface of [transport], and
//! the quinn-backed adapter realises it over a QUIC connection.
//!
//! * [protocol] — the Datagram codec and chunk digests
//! * [transport] — the stream interface and its QUIC realisation
//! * `session` — upload/download transaction state machines
//! * `client` / `server` — the two event loops wired up by the CLI

pub(crate) mod cli;
pub use cli::cli as main;

mod client;
pub(crate) use client::client_main;

pub mod protocol;

mod server;
pub(crate) use server::server_main;

pub(crate) mod session;

pub mod transport;

pub(crate) mod util;
