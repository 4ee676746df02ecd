//! Backend client for the chat-platform generation bot.
//!
//! Provides typed message parsing, REST API wrappers, interaction payload
//! builders, candidate upscale token templates, a per-credential session
//! registry, and the [`backend::BackendClient`] seam the pipeline drives.

pub mod api;
pub mod backend;
pub mod client;
pub mod config;
pub mod messages;
pub mod payloads;
pub mod session;
pub mod tokens;
