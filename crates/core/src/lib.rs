//! Domain core for the generation relay.
//!
//! Pure types and helpers with no internal dependencies: errors, snowflake
//! math, image references, lifecycle statuses, polling policy, and the
//! store seams implemented by `relay-db`.

pub mod account;
pub mod config;
pub mod error;
pub mod image;
pub mod records;
pub mod retry;
pub mod snowflake;
pub mod status;
pub mod store;
pub mod types;
pub mod validation;
pub mod variant;
