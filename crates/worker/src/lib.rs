//! Worker process for the generation relay.
//!
//! Wires the backend client, stores, and pipeline into a
//! [`RelayService`](relay_pipeline::service::RelayService) and exposes it
//! through a small CLI.

pub mod bootstrap;
pub mod cli;
pub mod commands;
