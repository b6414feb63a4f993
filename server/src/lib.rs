//! # Room Server Library
//!
//! This library provides the authoritative side of the rollback netcode. It owns
//! the canonical state of every player in a room, consumes their inputs in
//! sequence order on a fixed tick, and periodically sends each player a
//! snapshot tagged with the last input sequence it consumed.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the same deterministic step function as the clients. Clients
//! predict ahead of it and conform to its snapshots.
//!
//! ### Input Ordering
//! Inputs are applied strictly by sequence number, never by arrival order.
//! Stale and duplicate inputs are dropped. A sequence gap holds later inputs
//! back for a bounded number of ticks, after which the missing inputs count as
//! "no input".
//!
//! ### Fault Isolation
//! Each player's queue and state are independent. A malformed record, a stale
//! input or a silent peer is logged and dropped without affecting the tick for
//! anyone else.
//!
//! ## Module Organization
//!
//! ### Room Module (`room`)
//! The player table and the fixed-tick simulation. Pure and synchronous, so it
//! can be driven directly in tests.
//!
//! ### Connections Module (`connections`)
//! Maps transport addresses to the player identities presented on join and
//! detects silent peers.
//!
//! ### Network Module (`network`)
//! UDP receiver and sender tasks plus the event loop that owns the room.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::NetcodeConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         NetcodeConfig::default(),
//!         32,
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod connections;
pub mod network;
pub mod room;
