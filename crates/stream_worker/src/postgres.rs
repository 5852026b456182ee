mod error_log_repository;

pub use error_log_repository::*;
