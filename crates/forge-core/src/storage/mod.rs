//! Storage layer for the forge platform.
//!
//! This module provides data persistence using SQLite with the Repository pattern.
//! It includes repositories for datasets, runs and their metrics, registry
//! entries, and evaluations.

// SQL strings don't need hash-less raw strings
#![allow(clippy::needless_raw_string_hashes)]

pub mod database;
pub mod error;
pub mod registry_repository;
pub mod repositories;

pub use database::{Database, SharedDatabase};
pub use error::{StorageError, StorageResult};
pub use registry_repository::{
    EvalRepository, ModelRepository, SqliteEvalRepository, SqliteModelRepository,
};
pub use repositories::{
    DatasetRepository, RunRepository, SqliteDatasetRepository, SqliteRunRepository,
};
