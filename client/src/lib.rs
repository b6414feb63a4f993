//! # Predicting Client Library
//!
//! The client half of the rollback netcode. It makes the local player's own
//! actions visible immediately and keeps that prediction converging on the
//! server's authoritative state.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Every local step samples input, stamps it with the next sequence number,
//! applies it with the shared step function and sends it to the server without
//! waiting for a reply. Both the input and the resulting state are kept in
//! bounded histories.
//!
//! ### Reconciliation
//! Snapshots arrive tagged with the tick and the last input sequence the server
//! consumed. The client compares each one with what it predicted at that tick:
//!
//! - Within tolerance: the confirmed inputs are pruned and nothing visible
//!   changes.
//! - Diverged: the authoritative state is adopted and every unconfirmed input
//!   is replayed on top of it, re-deriving the predicted frames.
//!
//! ## Module Organization
//!
//! - `history`: bounded input and predicted-frame buffers
//! - `predictor`: the local predictive simulator
//! - `reconcile`: the rollback engine
//! - `input`: headless input patterns that stand in for a device
//! - `network`: the UDP session loop tying the pieces together
//!
//! ## Usage Example
//!
//! ```rust
//! use client::predictor::Predictor;
//! use client::reconcile::{Reconciler, Reconciliation};
//! use shared::{NetcodeConfig, PlayerId, Snapshot};
//!
//! let config = NetcodeConfig::default();
//! let mut predictor = Predictor::new(PlayerId(1), config.clone());
//! let mut reconciler = Reconciler::new(&config);
//!
//! // Predict three steps; each command would be sent to the server.
//! for _ in 0..3 {
//!     let _cmd = predictor.step(1.0, 0.0, 0, 16.667);
//! }
//!
//! // The server agrees with the first step.
//! let confirmed = predictor.frames().get(1).unwrap().state;
//! let snapshot = Snapshot::new(1, 1, confirmed, true);
//! let outcome = reconciler.on_snapshot(&mut predictor, &snapshot).unwrap();
//! assert_eq!(outcome, Reconciliation::Confirmed { pruned: 1 });
//! ```

pub mod history;
pub mod input;
pub mod network;
pub mod predictor;
pub mod reconcile;
