//! s3accel Common - Shared types and utilities
//!
//! This crate provides the object identifiers, error definitions and
//! configuration structures shared by the block cache engine and the
//! binaries built on top of it.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BlockManagerConfig, Config, ObjectClientConfig};
pub use error::{Error, Result};
pub use types::*;
