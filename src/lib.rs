//! Concurrent terminal session orchestration for AI coding-assistant CLIs.

#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod process_registry;
pub mod runtime;

pub use config::HelmConfig;
pub use errors::{AppError, Result};
