//! Moisture transition monitoring
//!
//! - `detector`: classifies each reading against the previous one
//! - `dispatcher`: counts transitions and runs the gain/loss handlers
//! - `polling`: drives both at the configured cadence until shutdown

mod detector;
mod dispatcher;
mod polling;

pub use detector::{classify, TransitionDetector, SENTINEL};
pub use dispatcher::{log_gain, log_loss, EventDispatcher, Handler, NoopHandler};
pub use polling::{LoopState, PollingLoop, StopReason};
