//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod account_repo;
pub mod full_generation_repo;
pub mod history_repo;

pub use account_repo::AccountRepo;
pub use full_generation_repo::FullGenerationRepo;
pub use history_repo::HistoryRepo;
