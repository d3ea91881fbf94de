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

//! The schedulable unit: a named callback with an activity flag and an
//! optional fixed schedule.

use crate::schedule::TimeAccumulator;
use std::fmt;

/// Callback type for a logic unit.
///
/// Receives the elapsed real time in milliseconds since this unit's own last
/// invocation (not since tick start), so each unit can integrate motion or
/// time smoothly regardless of how the scheduler interleaves it with others.
pub type LogicFn = Box<dyn FnMut(f64) + Send>;

/// A named, schedulable callback.
///
/// The name is the unit's identity inside its owning scheduler: duplicate
/// registration under the same name aborts, and removal is addressed by
/// name. All runtime bookkeeping (estimates, hotness, timestamps) is owned
/// by the scheduler and is not part of this type.
pub struct LogicUnit {
    name: String,
    callback: LogicFn,
    active: bool,
    schedule: Option<TimeAccumulator>,
}

impl LogicUnit {
    /// Creates an active unit that is eligible every tick.
    pub fn new(name: impl Into<String>, callback: impl FnMut(f64) + Send + 'static) -> Self {
        Self {
            name: name.into(),
            callback: Box::new(callback),
            active: true,
            schedule: None,
        }
    }

    /// Creates an active unit additionally gated on a fixed period.
    pub fn with_schedule(
        name: impl Into<String>,
        period_ms: f64,
        callback: impl FnMut(f64) + Send + 'static,
    ) -> Self {
        Self {
            schedule: Some(TimeAccumulator::new(period_ms)),
            ..Self::new(name, callback)
        }
    }

    /// Builder-style toggle returning the unit deactivated. Deactivated
    /// units are skipped without touching any statistics until reactivated.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Returns the unit's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the unit is currently eligible to run.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the fixed period in milliseconds, if one is set.
    pub fn period_ms(&self) -> Option<f64> {
        self.schedule.as_ref().map(|s| s.period_ms())
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_schedule(&mut self, period_ms: f64) {
        match &mut self.schedule {
            Some(acc) => acc.set_period(period_ms),
            None => self.schedule = Some(TimeAccumulator::new(period_ms)),
        }
    }

    pub(crate) fn schedule_mut(&mut self) -> Option<&mut TimeAccumulator> {
        self.schedule.as_mut()
    }

    pub(crate) fn invoke(&mut self, dt_ms: f64) {
        (self.callback)(dt_ms);
    }
}

impl fmt::Debug for LogicUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicUnit")
            .field("name", &self.name)
            .field("active", &self.active)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn invoke_passes_dt_to_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_seen = calls.clone();
        let mut unit = LogicUnit::new("counter", move |dt_ms| {
            assert!(dt_ms >= 0.0);
            calls_seen.fetch_add(1, Ordering::SeqCst);
        });

        unit.invoke(0.0);
        unit.invoke(16.7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn inactive_builder_starts_deactivated() {
        let unit = LogicUnit::new("idle", |_| {}).inactive();
        assert!(!unit.is_active());
    }

    #[test]
    fn with_schedule_exposes_period() {
        let unit = LogicUnit::with_schedule("ambient", 500.0, |_| {});
        assert_eq!(unit.period_ms(), Some(500.0));
    }

    #[test]
    fn set_schedule_upgrades_unscheduled_unit() {
        let mut unit = LogicUnit::new("later", |_| {});
        assert_eq!(unit.period_ms(), None);
        unit.set_schedule(250.0);
        assert_eq!(unit.period_ms(), Some(250.0));
    }
}
