//! Error types for the feed engine repository.
mod repository;

pub use repository::RepositoryError;
