// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-period accumulator gating logic units that run on a schedule.

/// Smallest accepted period. Guards the modulo carry against a zero or
/// negative period.
const MIN_PERIOD_MS: f64 = 1e-3;

/// Accumulates elapsed time against a fixed period with catch-up semantics.
///
/// [`tick`](Self::tick) reports at most one trigger per call: if several
/// whole periods elapsed since the last check, the trigger still fires once
/// and the remainder modulo the period is retained, so a stalled scheduler
/// does not burst-fire a scheduled unit to catch up.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAccumulator {
    period_ms: f64,
    accum_ms: f64,
}

impl TimeAccumulator {
    /// Creates an accumulator with the given period in milliseconds.
    pub fn new(period_ms: f64) -> Self {
        Self {
            period_ms: period_ms.max(MIN_PERIOD_MS),
            accum_ms: 0.0,
        }
    }

    /// Adds `dt_ms` of elapsed time and reports whether the period elapsed.
    pub fn tick(&mut self, dt_ms: f64) -> bool {
        self.accum_ms += dt_ms.max(0.0);
        if self.accum_ms >= self.period_ms {
            self.accum_ms %= self.period_ms;
            true
        } else {
            false
        }
    }

    /// Returns the configured period in milliseconds.
    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    /// Replaces the period, keeping accumulated time capped below the new
    /// period so the next trigger still requires real elapsed time.
    pub(crate) fn set_period(&mut self, period_ms: f64) {
        self.period_ms = period_ms.max(MIN_PERIOD_MS);
        if self.accum_ms >= self.period_ms {
            self.accum_ms %= self.period_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn does_not_trigger_before_period() {
        let mut acc = TimeAccumulator::new(100.0);
        assert!(!acc.tick(40.0));
        assert!(!acc.tick(40.0));
    }

    #[test]
    fn triggers_once_period_elapsed() {
        let mut acc = TimeAccumulator::new(100.0);
        assert!(!acc.tick(60.0));
        assert!(acc.tick(60.0));
    }

    #[test]
    fn multiple_elapsed_periods_report_single_trigger_and_keep_remainder() {
        let mut acc = TimeAccumulator::new(100.0);
        // 350ms elapsed at once: one trigger, 50ms carried over.
        assert!(acc.tick(350.0));
        assert_relative_eq!(acc.accum_ms, 50.0, epsilon = 1e-9);
        assert!(acc.tick(50.0));
        assert!(!acc.tick(49.0));
    }

    #[test]
    fn negative_dt_is_ignored() {
        let mut acc = TimeAccumulator::new(100.0);
        assert!(!acc.tick(-500.0));
        assert_relative_eq!(acc.accum_ms, 0.0);
    }

    #[test]
    fn degenerate_period_is_clamped() {
        let mut acc = TimeAccumulator::new(0.0);
        assert!(acc.period_ms() > 0.0);
        assert!(acc.tick(1.0));
    }

    #[test]
    fn set_period_caps_carry() {
        let mut acc = TimeAccumulator::new(100.0);
        acc.tick(90.0);
        acc.set_period(30.0);
        // Carry was 90; capped below the new 30ms period.
        assert!(acc.accum_ms < 30.0);
    }
}
