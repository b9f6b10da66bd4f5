//! CLI command implementations.

pub mod common;
pub mod config;
pub mod copy;
pub mod read;
