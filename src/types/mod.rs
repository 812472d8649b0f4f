//! Shared type definitions
//!
//! Transcript entries and widget configuration used across the crate.

pub mod config;
pub mod message;
