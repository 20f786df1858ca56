//! # Sprite Common Library
//!
//! Shared code for the sprite quality services:
//! - Error and result types
//! - Bootstrap configuration (TOML + environment)
//! - SQLite pool initialization
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
