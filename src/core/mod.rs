//! Core module - Configuration, errors, and common types

pub mod config;
mod error;
mod types;

pub use config::{
    AcquisitionSettings, ConfigResolver, LogSettings, NotificationSettings, ResolvedConfig,
};
pub use error::{Error, Result};
pub use types::{Event, EventCounters, EventKind, Reading, Transition, TransitionKind};
