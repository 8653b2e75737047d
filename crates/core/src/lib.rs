//! Core types and utilities for the LTP service
//!
//! This crate provides shared types used across all components:
//! - Pair, symbol and price definitions
//! - Response payload types
//! - Error taxonomy
//! - Service configuration

pub mod types;
pub mod config;
pub mod errors;

pub use crate::types::*;
pub use crate::config::*;
pub use crate::errors::*;
