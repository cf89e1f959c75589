//! Simulated soil probe
//!
//! When no ADC is attached, this produces a repeatable drying curve: freshly
//! watered soil reads around 500 and drifts up towards 850 over time, with
//! occasional flat stretches, then gets watered again.

use crate::acquisition::AnalogSource;
use crate::core::{Error, Result};

/// Reading right after watering
const WATERED: i32 = 497;
/// Reading at which the simulated gardener waters again
const DRY: i32 = 850;

/// Deterministic drying-curve generator
pub struct SimulatedProbe {
    value: i32,
    tick: u64,
    released: bool,
}

impl SimulatedProbe {
    pub fn new() -> Self {
        Self::starting_at(WATERED)
    }

    /// Start the curve from a specific reading
    pub fn starting_at(value: i32) -> Self {
        Self {
            value,
            tick: 0,
            released: false,
        }
    }

    fn advance(&mut self) -> i32 {
        self.tick += 1;

        if self.value >= DRY {
            self.value = WATERED;
        } else if self.tick % 4 != 0 {
            // Every fourth sample holds steady
            let step = 3 + (self.tick % 7) as i32 * 4;
            self.value = (self.value + step).min(DRY);
        }

        self.value
    }
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogSource for SimulatedProbe {
    fn read_channel(&mut self, _channel: u32) -> Result<i32> {
        if self.released {
            return Err(Error::PermanentAcquisition("simulated probe released".to_string()));
        }
        Ok(self.advance())
    }

    fn name(&self) -> &str {
        "Simulated probe (no ADC)"
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_stays_in_range_and_rewaters() {
        let mut probe = SimulatedProbe::new();
        let values: Vec<i32> = (0..200).map(|_| probe.read_channel(0).unwrap()).collect();

        assert!(values.iter().all(|v| (WATERED..=DRY).contains(v)));
        assert!(values.contains(&DRY));
        assert!(values.windows(2).any(|w| w[1] < w[0]));
        assert!(values.windows(2).any(|w| w[1] == w[0]));
    }

    #[test]
    fn test_repeatable() {
        let mut a = SimulatedProbe::starting_at(600);
        let mut b = SimulatedProbe::starting_at(600);
        for _ in 0..50 {
            assert_eq!(a.read_channel(0).unwrap(), b.read_channel(0).unwrap());
        }
    }
}
