//! Job orchestration and completion polling.
//!
//! Drives generation requests against the backend, promotes ephemeral
//! attachments, negotiates upscale interactions, and chains the two into
//! full generations. [`service::RelayService`] is the caller-facing facade.

pub mod config;
pub mod full;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod sweeper;
pub mod upscale;
