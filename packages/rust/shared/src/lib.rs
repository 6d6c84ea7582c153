//! Shared types, error model, and configuration for graphqa.
//!
//! This crate is the foundation depended on by all other graphqa crates.
//! It provides:
//! - [`GraphQaError`]: the unified error type
//! - Domain types ([`GraphRecord`], [`QaEntry`], [`Dataset`], [`JobId`])
//! - Configuration ([`AppConfig`], [`ConversionConfig`], config loading)
//! - [`fs`]: atomic file replacement for manifests and checkpoints

pub mod config;
pub mod error;
pub mod fs;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConversionConfig, ConversionDefaults, DatasetConfig, ServiceDefaults, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{GraphQaError, Result};
pub use types::{
    AnswerType, Dataset, DatasetStatistics, Edge, GraphData, GraphRecord, JobId, Node, Position,
    QaEntry,
};
