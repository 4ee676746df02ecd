//! Row structs and DTOs.
//!
//! Each submodule holds a `FromRow` entity struct matching its table plus
//! the conversions to and from the core domain types.

pub mod account;
pub mod full_generation;
pub mod history;
