//! Service surface for the P2P settlement engine.
//!
//! Wires the configured storage, signing and chain implementations into a
//! [`settlement_core::SettlementEngine`], exposes its workflows over HTTP
//! and keeps off-chain records in step with the escrow in the background.
//!
//! # Components
//!
//! - `cli`: command-line arguments
//! - `service`: engine construction and the reconciliation watcher
//! - `server`: HTTP routes and failure rendering

pub mod cli;
pub mod server;
pub mod service;
