//! Common types used across the application

use serde::Serialize;

/// A single sample from an ADC channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// Tick number the sample was taken at (starts at 0)
    pub sequence: u64,
    /// Raw ADC value
    pub value: i32,
    /// Timestamp of the reading (Unix timestamp)
    pub timestamp: i64,
}

impl Reading {
    pub fn new(sequence: u64, value: i32) -> Self {
        Self {
            sequence,
            value,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Direction of a change between two consecutive readings.
///
/// The probe reads lower when the soil is wetter, so a falling value is a
/// moisture gain and a rising value a moisture loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionKind {
    None,
    Gain,
    Loss,
}

impl TransitionKind {
    /// Handler slot this transition is dispatched to, if any
    pub fn event(self) -> Option<EventKind> {
        match self {
            TransitionKind::None => None,
            TransitionKind::Gain => Some(EventKind::Gain),
            TransitionKind::Loss => Some(EventKind::Loss),
        }
    }
}

/// A classified reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub reading: Reading,
}

/// The two dispatchable transition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Gain,
    Loss,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Gain => write!(f, "gain"),
            EventKind::Loss => write!(f, "loss"),
        }
    }
}

/// What a handler receives for a dispatched transition
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub kind: EventKind,
    pub reading: Reading,
    /// Count of events of this kind including this one
    pub count: u64,
}

/// Gain/loss counts since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounters {
    pub gains: u64,
    pub losses: u64,
}

impl EventCounters {
    /// Bump the counter for `kind` and return its new value
    pub fn record(&mut self, kind: EventKind) -> u64 {
        let counter = match kind {
            EventKind::Gain => &mut self.gains,
            EventKind::Loss => &mut self.losses,
        };
        *counter += 1;
        *counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_per_kind() {
        let mut counters = EventCounters::default();
        assert_eq!(counters.record(EventKind::Loss), 1);
        assert_eq!(counters.record(EventKind::Gain), 1);
        assert_eq!(counters.record(EventKind::Loss), 2);
        assert_eq!(counters, EventCounters { gains: 1, losses: 2 });
    }

    #[test]
    fn test_reading_serializes_plain_timestamp() {
        let reading = Reading {
            sequence: 3,
            value: 600,
            timestamp: 1_705_320_000,
        };
        let text = toml::to_string(&reading).unwrap();
        assert!(text.contains("timestamp = 1705320000"));
        assert!(text.contains("value = 600"));
    }
}
