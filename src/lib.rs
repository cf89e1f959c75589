//! Moisture Monitor library
//!
//! This module exposes the core functionality for use in tests
//! and by the binaries.

pub mod acquisition;
pub mod cli;
pub mod core;
pub mod logging;
pub mod monitor;
pub mod notify;
