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

//! The scheduling core: runs one group of logic units inside a per-tick
//! millisecond allowance.
//!
//! A pass visits units round-robin in registration order, admitting each one
//! whose runtime estimate fits the remaining allowance. Once the next unit
//! in line no longer fits, the pass drops into an opportunistic fill that
//! walks units by ascending hotness (least-run first), backfilling whatever
//! still fits. Budgets are enforced at admission only: a callback that is
//! already running is never interrupted.

use crate::logic::LogicUnit;
use crate::mailbox::{ControlOp, Mailbox, Registrar};
use crate::stats::{LimiterStats, UnitStats};
use crate::utils::timer::Stopwatch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tuning knobs for a [`RuntimeLimiter`].
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Capacity of the bounded registration lane. Requests beyond this
    /// divert to the overflow retry worker with a warning.
    pub mailbox_capacity: usize,
    /// Initial backoff of the overflow retry worker.
    pub retry_backoff: Duration,
    /// Backoff ceiling of the overflow retry worker.
    pub retry_backoff_max: Duration,
    /// Weight of history in the smoothed pass-runtime statistic (0..1).
    pub runtime_smoothing: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            retry_backoff: Duration::from_millis(1),
            retry_backoff_max: Duration::from_millis(100),
            runtime_smoothing: 0.9,
        }
    }
}

/// Outcome of one [`RuntimeLimiter::run`] pass, consumed by the sharer.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    /// The limiter has nothing further to schedule this tick.
    pub finished: bool,
    /// Units invoked during this pass.
    pub ran: u32,
    /// Units that wanted a slot this tick (computed at tick start).
    pub wanted: u32,
    /// Fraction of willing units that have not run so far this tick.
    pub starvation: f64,
}

impl RunReport {
    fn empty(finished: bool) -> Self {
        Self {
            finished,
            ran: 0,
            wanted: 0,
            starvation: 0.0,
        }
    }
}

/// A registered unit plus every piece of bookkeeping the limiter owns for it.
struct UnitSlot {
    unit: LogicUnit,
    /// Shared with `Registrar::remove`; once set the unit never runs again.
    removed: Arc<AtomicBool>,
    estimate_ms: Option<f64>,
    last_start: Option<Instant>,
    last_end: Option<Instant>,
    hotness: u32,
    total_runs: u64,
    ran_this_tick: bool,
    wanted_this_tick: bool,
    schedule_due: bool,
}

impl UnitSlot {
    fn new(unit: LogicUnit, removed: Arc<AtomicBool>) -> Self {
        Self {
            unit,
            removed,
            estimate_ms: None,
            last_start: None,
            last_end: None,
            hotness: 0,
            total_runs: 0,
            ran_this_tick: false,
            wanted_this_tick: false,
            schedule_due: true,
        }
    }
}

enum Phase {
    RoundRobin,
    Opportunistic,
}

/// Schedules a single group of [`LogicUnit`]s against one allowance.
///
/// Construct one per subsystem group, or let a
/// [`RuntimeLimitSharer`](crate::RuntimeLimitSharer) own a set of them.
/// All scheduling happens on the thread calling [`run`](Self::run);
/// registration and removal are safe from any thread via
/// [`registrar`](Self::registrar).
pub struct RuntimeLimiter {
    config: LimiterConfig,
    mailbox: Mailbox,
    slots: Vec<UnitSlot>,

    // Round-robin position, persisted across ticks for continuity.
    robin_idx: usize,
    start_idx: usize,
    tick_visits: usize,
    last_tick: Option<Instant>,

    // Opportunistic ordering, rebuilt lazily once per tick.
    opp_order: Vec<usize>,
    opp_suffix_min: Vec<f64>,
    opp_cursor: usize,
    opp_built: bool,

    // Aggregate statistics.
    total_ran: u64,
    ran_round_robin: u64,
    ran_opportunistic: u64,
    starvation: f64,
    overrun_ms: f64,
    underrun_ms: f64,
    smoothed_runtime_ms: f64,
    passes: u64,
}

impl RuntimeLimiter {
    /// Creates a limiter with default configuration.
    pub fn new() -> Self {
        Self::with_config(LimiterConfig::default())
    }

    /// Creates a limiter with explicit configuration.
    pub fn with_config(config: LimiterConfig) -> Self {
        let mailbox = Mailbox::new(
            config.mailbox_capacity,
            config.retry_backoff,
            config.retry_backoff_max,
        );
        Self {
            config,
            mailbox,
            slots: Vec::new(),
            robin_idx: 0,
            start_idx: 0,
            tick_visits: 0,
            last_tick: None,
            opp_order: Vec::new(),
            opp_suffix_min: Vec::new(),
            opp_cursor: 0,
            opp_built: false,
            total_ran: 0,
            ran_round_robin: 0,
            ran_opportunistic: 0,
            starvation: 0.0,
            overrun_ms: 0.0,
            underrun_ms: 0.0,
            smoothed_runtime_ms: 0.0,
            passes: 0,
        }
    }

    /// Queues a unit for registration at the next pass start.
    ///
    /// A duplicate name within this limiter is a programmer error and aborts
    /// when the registration queue is drained.
    pub fn add(&self, unit: LogicUnit) {
        self.mailbox.registrar().add(unit);
    }

    /// Queues a unit for removal; known units are marked removed immediately
    /// and never run again. Unknown or already-removed names are a no-op.
    pub fn remove(&self, name: &str) {
        self.mailbox.registrar().remove(name);
    }

    /// Returns a cloneable handle for cross-thread (or reentrant, from
    /// inside a running callback) registration and removal.
    pub fn registrar(&self) -> Registrar {
        self.mailbox.registrar()
    }

    /// Number of units currently materialized in the schedule. Queued
    /// additions are not counted until the next pass drains them.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no units are materialized.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Marks every materialized unit active.
    pub fn activate_all(&mut self) {
        for slot in &mut self.slots {
            slot.unit.set_active(true);
        }
    }

    /// Marks every materialized unit inactive. Inactive units are skipped
    /// without touching statistics.
    pub fn deactivate_all(&mut self) {
        for slot in &mut self.slots {
            slot.unit.set_active(false);
        }
    }

    /// Sets or replaces the fixed run period of a materialized unit.
    pub fn set_schedule(&mut self, name: &str, period_ms: f64) {
        match self.slots.iter_mut().find(|s| s.unit.name() == name) {
            Some(slot) => slot.unit.set_schedule(period_ms),
            None => log::warn!(
                "set_schedule: no unit named '{name}' (registration may still be queued)"
            ),
        }
    }

    /// Runs one scheduling pass inside `allowance_ms`.
    ///
    /// `loop_index == 0` starts a new tick: the registration queue is
    /// drained, per-tick bookkeeping resets, and the round-robin phase
    /// resumes from where the previous tick stopped. `loop_index > 0` is a
    /// bonus pass fed with leftover allowance: it continues the current tick
    /// without resetting and keeps circling past the wrap point while the
    /// allowance lasts.
    pub fn run(&mut self, allowance_ms: f64, loop_index: u32) -> RunReport {
        let pass = Stopwatch::new();
        if loop_index == 0 {
            self.drain_mailbox();
            self.begin_tick();
        }
        if self.slots.is_empty() {
            return RunReport::empty(true);
        }

        let len = self.slots.len();
        let mut phase = Phase::RoundRobin;
        let mut ran: u32 = 0;
        let mut lap_visits = 0usize;
        let mut lap_runs = 0usize;
        let mut finished = false;

        loop {
            let remaining = allowance_ms - pass.elapsed_ms_f64();
            if remaining <= 0.0 {
                break;
            }

            match phase {
                Phase::RoundRobin => {
                    if loop_index == 0 {
                        if self.tick_visits > 0 && self.robin_idx == self.start_idx {
                            finished = true;
                            break;
                        }
                    } else if lap_visits >= len {
                        // A bonus lap that ran nothing cannot make progress
                        // by circling further.
                        if lap_runs == 0 {
                            finished = true;
                            break;
                        }
                        lap_visits = 0;
                        lap_runs = 0;
                    }

                    let idx = self.robin_idx;
                    let first_of_tick = loop_index == 0 && self.tick_visits == 0;
                    self.tick_visits += 1;
                    lap_visits += 1;

                    let now = Instant::now();
                    if !self.visit_gate(idx, now) {
                        self.advance_robin();
                        continue;
                    }

                    let admit = match self.slots[idx].estimate_ms {
                        None => true, // must run once to be estimated
                        Some(est) if est <= remaining => true,
                        // The very first unit of the tick runs even over
                        // budget: a unit heavier than any plausible
                        // allowance must still make forward progress. Known
                        // fairness edge case if an adversarial ordering
                        // keeps a heavy unit first.
                        Some(_) if first_of_tick => true,
                        Some(_) => false,
                    };

                    if admit {
                        self.run_slot(idx, now, true);
                        ran += 1;
                        lap_runs += 1;
                        self.advance_robin();
                    } else {
                        log::trace!(
                            "'{}' does not fit remaining {remaining:.3}ms; opportunistic fill",
                            self.slots[idx].unit.name()
                        );
                        phase = Phase::Opportunistic;
                    }
                }
                Phase::Opportunistic => {
                    if !self.opp_built {
                        self.build_opportunistic();
                    }
                    if self.opp_cursor >= self.opp_order.len() {
                        break;
                    }
                    // Nothing from the cursor onward can possibly fit.
                    if self.opp_suffix_min[self.opp_cursor] > remaining {
                        break;
                    }
                    let idx = self.opp_order[self.opp_cursor];
                    self.opp_cursor += 1;

                    let now = Instant::now();
                    if !self.visit_gate(idx, now) || self.slots[idx].ran_this_tick {
                        continue;
                    }
                    if self.slots[idx].estimate_ms.unwrap_or(0.0) > remaining {
                        continue;
                    }
                    self.run_slot(idx, now, false);
                    ran += 1;
                }
            }
        }

        // A zero-progress bonus pass means nothing left fits this tick.
        if loop_index > 0 && ran == 0 {
            finished = true;
        }
        self.finish_pass(allowance_ms, pass.elapsed_ms_f64(), finished, ran)
    }

    /// Snapshot of aggregate and per-unit statistics.
    pub fn dump_stats(&self) -> LimiterStats {
        LimiterStats {
            total_ran: self.total_ran,
            ran_round_robin: self.ran_round_robin,
            ran_opportunistic: self.ran_opportunistic,
            starvation: self.starvation,
            overrun_ms: self.overrun_ms,
            underrun_ms: self.underrun_ms,
            smoothed_runtime_ms: self.smoothed_runtime_ms,
            units: self
                .slots
                .iter()
                .map(|s| UnitStats {
                    name: s.unit.name().to_string(),
                    active: s.unit.is_active(),
                    estimate_ms: s.estimate_ms,
                    hotness: s.hotness,
                    total_runs: s.total_runs,
                    idle_ms: s.last_end.map(|t| t.elapsed().as_secs_f64() * 1000.0),
                })
                .collect(),
        }
    }

    // ---- internals -------------------------------------------------------

    fn drain_mailbox(&mut self) {
        for op in self.mailbox.drain() {
            match op {
                ControlOp::Add(unit) => self.apply_add(unit),
                ControlOp::Remove(name) => {
                    // The registrar already tombstoned known names; this
                    // covers add-then-remove arriving in the same batch.
                    if let Some(flag) = self.mailbox.tombstones().lock().unwrap().get(&name) {
                        flag.store(true, Ordering::Release);
                    }
                }
            }
        }
        self.sweep_removed();
    }

    fn apply_add(&mut self, unit: LogicUnit) {
        let name = unit.name().to_string();
        let mut map = self.mailbox.tombstones().lock().unwrap();
        let live_duplicate = map
            .get(&name)
            .map(|flag| !flag.load(Ordering::Acquire))
            .unwrap_or(false);
        if live_duplicate {
            drop(map);
            panic!("duplicate logic unit name registered: {name}");
        }
        let flag = Arc::new(AtomicBool::new(false));
        map.insert(name.clone(), Arc::clone(&flag));
        drop(map);

        log::debug!("materialized logic unit '{name}'");
        self.slots.push(UnitSlot::new(unit, flag));
    }

    /// Physically removes tombstoned slots, preserving registration order
    /// and keeping the round-robin position pointing at the same neighbor.
    fn sweep_removed(&mut self) {
        if !self.slots.iter().any(|s| s.removed.load(Ordering::Acquire)) {
            return;
        }
        let removed_before_robin = self.slots[..self.robin_idx]
            .iter()
            .filter(|s| s.removed.load(Ordering::Acquire))
            .count();
        self.robin_idx -= removed_before_robin;
        self.slots.retain(|s| !s.removed.load(Ordering::Acquire));
        if self.slots.is_empty() {
            self.robin_idx = 0;
        } else {
            self.robin_idx %= self.slots.len();
        }

        let mut map = self.mailbox.tombstones().lock().unwrap();
        map.clear();
        for slot in &self.slots {
            map.insert(slot.unit.name().to_string(), Arc::clone(&slot.removed));
        }
    }

    fn begin_tick(&mut self) {
        let now = Instant::now();
        let dt_tick_ms = self
            .last_tick
            .map(|t| now.duration_since(t).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        if self.robin_idx >= self.slots.len() {
            self.robin_idx = 0;
        }
        self.start_idx = self.robin_idx;
        self.tick_visits = 0;
        self.opp_built = false;
        self.opp_cursor = 0;

        for slot in &mut self.slots {
            slot.ran_this_tick = false;
            slot.schedule_due = match slot.unit.schedule_mut() {
                None => true,
                Some(acc) => acc.tick(dt_tick_ms),
            };
            let throttled = match (slot.estimate_ms, slot.last_start) {
                (Some(est), Some(t)) => (now.duration_since(t).as_secs_f64() * 1000.0) < est,
                _ => false,
            };
            slot.wanted_this_tick = slot.unit.is_active()
                && !slot.removed.load(Ordering::Acquire)
                && slot.schedule_due
                && !throttled;
        }
    }

    /// Whether the unit may run right now. Checked at every visit, so a
    /// bonus pass revisiting a unit still honors its estimate window.
    fn visit_gate(&self, idx: usize, now: Instant) -> bool {
        let slot = &self.slots[idx];
        if !slot.unit.is_active() || slot.removed.load(Ordering::Acquire) || !slot.schedule_due {
            return false;
        }
        match (slot.estimate_ms, slot.last_start) {
            (Some(est), Some(t)) => now.duration_since(t).as_secs_f64() * 1000.0 >= est,
            _ => true,
        }
    }

    fn advance_robin(&mut self) {
        self.robin_idx = (self.robin_idx + 1) % self.slots.len();
    }

    fn build_opportunistic(&mut self) {
        let len = self.slots.len();
        let mut order: Vec<usize> = (0..len).collect();
        // Stable sort: hotness ties keep registration order.
        order.sort_by_key(|&i| self.slots[i].hotness);

        let mut suffix = vec![f64::INFINITY; len];
        let mut min_ahead = f64::INFINITY;
        for pos in (0..len).rev() {
            let est = self.slots[order[pos]].estimate_ms.unwrap_or(0.0);
            min_ahead = min_ahead.min(est);
            suffix[pos] = min_ahead;
        }

        self.opp_order = order;
        self.opp_suffix_min = suffix;
        self.opp_cursor = 0;
        self.opp_built = true;
    }

    fn run_slot(&mut self, idx: usize, now: Instant, by_round_robin: bool) {
        // Jubilee: one counter at the ceiling resets every counter, so
        // hotness stays a purely relative ranking.
        if self.slots[idx].hotness == u32::MAX {
            log::debug!("hotness jubilee: resetting all counters");
            for slot in &mut self.slots {
                slot.hotness = 0;
            }
        }

        let slot = &mut self.slots[idx];
        let dt_ms = slot
            .last_start
            .map(|t| now.duration_since(t).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        let watch = Stopwatch::new();
        slot.unit.invoke(dt_ms);
        let actual_ms = watch.elapsed_ms_f64();

        slot.last_start = Some(now);
        slot.last_end = Some(Instant::now());
        slot.estimate_ms = Some(match slot.estimate_ms {
            None => actual_ms,
            Some(est) => 0.5 * (est + actual_ms),
        });
        slot.hotness += 1;
        slot.total_runs += 1;
        slot.ran_this_tick = true;

        self.total_ran += 1;
        if by_round_robin {
            self.ran_round_robin += 1;
        } else {
            self.ran_opportunistic += 1;
        }
    }

    fn finish_pass(
        &mut self,
        allowance_ms: f64,
        spent_ms: f64,
        finished: bool,
        ran: u32,
    ) -> RunReport {
        let wanted = self.slots.iter().filter(|s| s.wanted_this_tick).count() as u32;
        let unmet = self
            .slots
            .iter()
            .filter(|s| s.wanted_this_tick && !s.ran_this_tick)
            .count() as u32;
        self.starvation = if wanted > 0 {
            f64::from(unmet) / f64::from(wanted)
        } else {
            0.0
        };

        if spent_ms > allowance_ms {
            self.overrun_ms += spent_ms - allowance_ms;
        } else {
            self.underrun_ms += allowance_ms - spent_ms;
        }
        self.smoothed_runtime_ms = if self.passes == 0 {
            spent_ms
        } else {
            let a = self.config.runtime_smoothing;
            a * self.smoothed_runtime_ms + (1.0 - a) * spent_ms
        };
        self.passes += 1;

        RunReport {
            finished,
            ran,
            wanted,
            starvation: self.starvation,
        }
    }
}

impl Default for RuntimeLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::thread;

    fn busy_wait(ms: f64) {
        let watch = Stopwatch::new();
        while watch.elapsed_ms_f64() < ms {
            std::hint::spin_loop();
        }
    }

    fn counting_unit(name: &str, count: &Arc<AtomicUsize>) -> LogicUnit {
        let count = Arc::clone(count);
        LogicUnit::new(name, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn empty_limiter_reports_finished() {
        let mut limiter = RuntimeLimiter::new();
        let report = limiter.run(10.0, 0);
        assert!(report.finished);
        assert_eq!(report.ran, 0);
        assert_eq!(report.starvation, 0.0);
    }

    #[test]
    fn queued_units_materialize_at_pass_start() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut limiter = RuntimeLimiter::new();
        limiter.add(counting_unit("a", &count));
        assert!(limiter.is_empty(), "add is deferred until the next pass");

        let report = limiter.run(10.0, 0);
        assert_eq!(limiter.len(), 1);
        assert_eq!(report.ran, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "duplicate logic unit name")]
    fn duplicate_name_aborts() {
        let mut limiter = RuntimeLimiter::new();
        limiter.add(LogicUnit::new("same", |_| {}));
        limiter.add(LogicUnit::new("same", |_| {}));
        limiter.run(10.0, 0);
    }

    #[test]
    fn remove_is_idempotent_for_unknown_names() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut limiter = RuntimeLimiter::new();
        limiter.add(counting_unit("keep", &count));
        limiter.remove("nobody");
        limiter.remove("nobody");
        limiter.run(10.0, 0);
        assert_eq!(limiter.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_unit_never_runs_again_even_before_cleanup() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut limiter = RuntimeLimiter::new();
        limiter.add(counting_unit("doomed", &count));
        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Tombstone lands immediately; the unit is skipped on the very next
        // pass and physically swept at its start.
        limiter.remove("doomed");
        thread::sleep(Duration::from_millis(2));
        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(limiter.is_empty());
    }

    #[test]
    fn reentrant_add_from_callback_lands_next_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut limiter = RuntimeLimiter::new();
        let registrar = limiter.registrar();
        let spawned = Arc::clone(&count);
        limiter.add(LogicUnit::new("spawner", move |_| {
            let inner = Arc::clone(&spawned);
            registrar.add(LogicUnit::new("spawned", move |_| {
                inner.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(2));
        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // The spawner keeps re-adding its child under the same name, which
        // would abort; remove it after the point is made.
        limiter.remove("spawner");
        limiter.remove("spawned");
        limiter.run(10.0, 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn deactivate_all_skips_units_without_statistics() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut limiter = RuntimeLimiter::new();
        limiter.add(counting_unit("a", &count));
        limiter.add(counting_unit("b", &count));
        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        limiter.deactivate_all();
        thread::sleep(Duration::from_millis(2));
        let report = limiter.run(10.0, 0);
        assert_eq!(report.ran, 0);
        assert_eq!(report.wanted, 0, "inactive units must not count as willing");
        assert_eq!(report.starvation, 0.0);

        limiter.activate_all();
        thread::sleep(Duration::from_millis(2));
        let report = limiter.run(10.0, 0);
        assert_eq!(report.ran, 2);
    }

    #[test]
    fn scheduled_unit_waits_for_its_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut limiter = RuntimeLimiter::new();
        limiter.add(LogicUnit::with_schedule("ambient", 50.0, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0, "period has not elapsed yet");

        thread::sleep(Duration::from_millis(60));
        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Immediately after a trigger the accumulator holds only remainder.
        limiter.run(10.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_schedule_on_unknown_name_is_a_warned_noop() {
        let mut limiter = RuntimeLimiter::new();
        limiter.set_schedule("missing", 100.0);
    }

    #[test]
    fn self_throttle_blocks_rerun_within_estimate_window() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut limiter = RuntimeLimiter::new();
        limiter.add(counting_unit("steady", &count));
        limiter.run(100.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // History says this unit costs 50ms; it just ran, so revisits inside
        // that window must be skipped no matter how large the allowance is.
        limiter.slots[0].estimate_ms = Some(50.0);
        thread::sleep(Duration::from_millis(2));
        let report = limiter.run(100.0, 0);
        assert_eq!(report.ran, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(60));
        limiter.run(100.0, 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sole_heavy_unit_still_runs_once_per_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut limiter = RuntimeLimiter::new();
        limiter.add(LogicUnit::new("whale", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            busy_wait(10.0);
        }));

        for tick in 1..=3 {
            let report = limiter.run(2.0, 0);
            assert_eq!(
                count.load(Ordering::SeqCst),
                tick,
                "heavy unit must make forward progress every tick"
            );
            assert_eq!(report.ran, 1);
            // Clear the estimate window before the next tick.
            thread::sleep(Duration::from_millis(15));
        }
    }

    #[test]
    fn opportunistic_fill_prefers_cold_units() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut limiter = RuntimeLimiter::new();
        for name in ["a", "heavy", "hot", "cold"] {
            let log = Arc::clone(&order);
            limiter.add(LogicUnit::new(name, move |_| {
                log.lock().unwrap().push(name);
            }));
        }
        limiter.run(100.0, 0);
        assert_eq!(limiter.len(), 4);
        order.lock().unwrap().clear();

        // Shape the bookkeeping: everyone ran long ago, 'heavy' cannot fit
        // a 10ms allowance, and 'hot' has run far more often than 'cold'.
        let long_ago = Instant::now() - Duration::from_secs(2);
        for slot in &mut limiter.slots {
            slot.last_start = Some(long_ago);
            slot.estimate_ms = Some(match slot.unit.name() {
                "heavy" => 1000.0,
                _ => 0.01,
            });
            slot.hotness = match slot.unit.name() {
                "hot" => 9,
                "cold" => 2,
                "a" => 5,
                _ => 5,
            };
        }
        limiter.robin_idx = 0;

        let report = limiter.run(10.0, 0);
        let order = order.lock().unwrap();
        // Round-robin runs 'a', stalls on 'heavy', and the opportunistic
        // fill visits 'cold' before 'hot'.
        assert_eq!(order[0], "a");
        let cold_pos = order.iter().position(|&n| n == "cold").unwrap();
        let hot_pos = order.iter().position(|&n| n == "hot").unwrap();
        assert!(
            cold_pos < hot_pos,
            "cold unit must be preferred once opportunistic: {order:?}"
        );
        assert_eq!(report.ran, 3);
        assert!(!report.finished, "'heavy' was left wanting");

        let stats = limiter.dump_stats();
        assert_eq!(stats.ran_opportunistic, 2);
        assert!(stats.starvation > 0.0);
    }

    #[test]
    fn hotness_jubilee_resets_all_counters_together() {
        let mut limiter = RuntimeLimiter::new();
        limiter.add(LogicUnit::new("x", |_| {}));
        limiter.add(LogicUnit::new("y", |_| {}));
        limiter.run(50.0, 0);

        limiter.slots[0].hotness = u32::MAX;
        limiter.slots[1].hotness = 12345;
        // Let the estimate windows clear.
        thread::sleep(Duration::from_millis(2));
        limiter.run(50.0, 0);

        let stats = limiter.dump_stats();
        for unit in &stats.units {
            assert!(
                unit.hotness <= 2,
                "jubilee must reset every counter, '{}' is at {}",
                unit.name,
                unit.hotness
            );
        }
    }

    #[test]
    fn dump_stats_reflects_estimates_and_counts() {
        let mut limiter = RuntimeLimiter::new();
        limiter.add(LogicUnit::new("spin", |_| busy_wait(3.0)));
        limiter.run(50.0, 0);

        let stats = limiter.dump_stats();
        assert_eq!(stats.total_ran, 1);
        assert_eq!(stats.ran_round_robin, 1);
        assert_eq!(stats.units.len(), 1);
        let est = stats.units[0].estimate_ms.expect("ran once, so estimated");
        assert!(est >= 3.0, "estimate ({est}) must reflect the 3ms spin");
        assert!(stats.smoothed_runtime_ms > 0.0);
        assert!(stats.underrun_ms > 0.0, "50ms allowance was not used up");
    }
}
