//! Transition detection between consecutive readings

use crate::core::{Reading, Transition, TransitionKind};

/// Initial "previous" value, below any legal ADC reading.
///
/// Because every real reading is greater, the first sample is always
/// classified as a `Loss`.
pub const SENTINEL: i32 = -1;

/// Classify `current` against `previous`
pub fn classify(previous: i32, current: i32) -> TransitionKind {
    if current < previous {
        TransitionKind::Gain
    } else if current > previous {
        TransitionKind::Loss
    } else {
        TransitionKind::None
    }
}

/// Remembers only the last observed value
#[derive(Debug, Clone)]
pub struct TransitionDetector {
    previous: i32,
}

impl TransitionDetector {
    pub fn new() -> Self {
        Self { previous: SENTINEL }
    }

    /// Classify a reading and make it the new previous value
    pub fn observe(&mut self, reading: Reading) -> Transition {
        let kind = classify(self.previous, reading.value);
        self.previous = reading.value;
        Transition { kind, reading }
    }

    /// The value the next reading is compared against
    pub fn previous(&self) -> i32 {
        self.previous
    }
}

impl Default for TransitionDetector {
    fn default() -> Self {
        Self::new()
    }
}
