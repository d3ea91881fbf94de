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

//! Splits one allowance across several named [`RuntimeLimiter`]s by weight,
//! redistributing unused time in bonus passes.

use crate::limiter::{LimiterConfig, RuntimeLimiter};
use crate::logic::LogicUnit;
use crate::mailbox::Registrar;
use crate::stats::{RunnerStats, SharerStats};
use crate::utils::timer::Stopwatch;
use std::collections::HashMap;

/// Remaining allowance below this is treated as exhausted; it absorbs the
/// scheduling overhead of the sharing loop itself.
const SHARE_EPSILON_MS: f64 = 0.05;

/// Outcome of one [`RuntimeLimitSharer::share`] call.
#[derive(Debug, Clone, Copy)]
pub struct ShareReport {
    /// Allowance left unspent when every runner finished.
    pub remaining_ms: f64,
    /// Runners that had willing units but executed none at all this call.
    /// Distinct from a runner's internal starvation ratio.
    pub starved_runners: u32,
}

struct RunnerSlot {
    name: String,
    weight: f64,
    limiter: RuntimeLimiter,
}

/// Owns a named set of weighted [`RuntimeLimiter`]s and drives them once per
/// external tick.
///
/// [`share`](Self::share) gives every runner its weight-proportional share
/// of the allowance, then keeps cycling leftover time into bonus passes
/// until the allowance is exhausted or every runner reports finished.
/// Runners are serviced starting from a rotating index so the same runner is
/// not always first in line.
pub struct RuntimeLimitSharer {
    runners: Vec<RunnerSlot>,
    by_name: HashMap<String, usize>,
    resume_at: usize,
}

impl RuntimeLimitSharer {
    /// Creates an empty sharer.
    pub fn new() -> Self {
        Self {
            runners: Vec::new(),
            by_name: HashMap::new(),
            resume_at: 0,
        }
    }

    /// Registers a named runner with a relative weight.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate runner name or a non-positive weight; both are
    /// programmer errors.
    pub fn register_runner(&mut self, name: impl Into<String>, weight: f64) {
        self.register_runner_with(name, weight, LimiterConfig::default());
    }

    /// [`register_runner`](Self::register_runner) with an explicit limiter
    /// configuration.
    pub fn register_runner_with(
        &mut self,
        name: impl Into<String>,
        weight: f64,
        config: LimiterConfig,
    ) {
        let name = name.into();
        assert!(weight > 0.0, "runner weight must be positive, got {weight}");
        assert!(
            !self.by_name.contains_key(&name),
            "duplicate runner name registered: {name}"
        );
        log::info!("RuntimeLimitSharer: registered runner '{name}' (weight={weight:.2})");
        self.by_name.insert(name.clone(), self.runners.len());
        self.runners.push(RunnerSlot {
            name,
            weight,
            limiter: RuntimeLimiter::with_config(config),
        });
    }

    /// Queues a unit for registration with the named runner.
    pub fn add_logic(&self, runner: &str, unit: LogicUnit) {
        self.runners[self.index_of(runner)].limiter.add(unit);
    }

    /// Queues a unit for removal from the named runner.
    pub fn remove_logic(&self, runner: &str, unit_name: &str) {
        self.runners[self.index_of(runner)].limiter.remove(unit_name);
    }

    /// Returns a cross-thread registration handle for the named runner.
    pub fn registrar(&self, runner: &str) -> Registrar {
        self.runners[self.index_of(runner)].limiter.registrar()
    }

    /// Activates every unit of the named runner.
    pub fn activate_all(&mut self, runner: &str) {
        let idx = self.index_of(runner);
        self.runners[idx].limiter.activate_all();
    }

    /// Deactivates every unit of the named runner.
    pub fn deactivate_all(&mut self, runner: &str) {
        let idx = self.index_of(runner);
        self.runners[idx].limiter.deactivate_all();
    }

    /// Direct access to the named runner, e.g. for
    /// [`set_schedule`](RuntimeLimiter::set_schedule).
    pub fn runner_mut(&mut self, runner: &str) -> &mut RuntimeLimiter {
        let idx = self.index_of(runner);
        &mut self.runners[idx].limiter
    }

    /// Number of registered runners.
    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }

    /// Splits `allowance_ms` across all runners and drives them for one
    /// external tick.
    ///
    /// Pass 0 visits every runner with its nominal weight-proportional share
    /// of the full allowance, regardless of what earlier runners spent.
    /// Bonus passes then split whatever wall-clock allowance remains among
    /// the runners that have not reported finished, until the allowance is
    /// exhausted or everyone is done. Time a runner leaves unused is
    /// implicitly returned to the pool, because the remainder is re-measured
    /// before every runner invocation.
    pub fn share(&mut self, allowance_ms: f64) -> ShareReport {
        let pass = Stopwatch::new();
        let n = self.runners.len();
        if n == 0 {
            return ShareReport {
                remaining_ms: allowance_ms.max(0.0),
                starved_runners: 0,
            };
        }

        let total_weight: f64 = self.runners.iter().map(|r| r.weight).sum();
        let mut finished = vec![false; n];
        let mut ran_total = vec![0u64; n];
        let mut wanted_last = vec![0u32; n];
        let mut loop_index: u32 = 0;

        'sharing: loop {
            let pool_weight: f64 = if loop_index == 0 {
                total_weight
            } else {
                self.runners
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !finished[*i])
                    .map(|(_, r)| r.weight)
                    .sum()
            };
            if pool_weight <= 0.0 {
                break;
            }

            let first = self.resume_at;
            for k in 0..n {
                let i = (first + k) % n;
                if loop_index > 0 && finished[i] {
                    continue;
                }
                let share_ms = if loop_index == 0 {
                    allowance_ms * self.runners[i].weight / total_weight
                } else {
                    let remaining = allowance_ms - pass.elapsed_ms_f64();
                    if remaining <= SHARE_EPSILON_MS {
                        break 'sharing;
                    }
                    remaining * self.runners[i].weight / pool_weight
                };

                let report = self.runners[i].limiter.run(share_ms, loop_index);
                finished[i] = report.finished;
                ran_total[i] += u64::from(report.ran);
                wanted_last[i] = report.wanted;
            }
            self.resume_at = (self.resume_at + 1) % n;

            if finished.iter().all(|f| *f) {
                break;
            }
            if allowance_ms - pass.elapsed_ms_f64() <= SHARE_EPSILON_MS {
                break;
            }
            loop_index += 1;
        }

        let starved_runners = (0..n)
            .filter(|&i| wanted_last[i] > 0 && ran_total[i] == 0)
            .count() as u32;
        ShareReport {
            remaining_ms: (allowance_ms - pass.elapsed_ms_f64()).max(0.0),
            starved_runners,
        }
    }

    /// Snapshot of every runner's statistics.
    pub fn dump_stats(&self) -> SharerStats {
        SharerStats {
            runners: self
                .runners
                .iter()
                .map(|r| RunnerStats {
                    name: r.name.clone(),
                    weight: r.weight,
                    limiter: r.limiter.dump_stats(),
                })
                .collect(),
        }
    }

    fn index_of(&self, runner: &str) -> usize {
        match self.by_name.get(runner) {
            Some(&idx) => idx,
            None => panic!("unknown runner: {runner}"),
        }
    }
}

impl Default for RuntimeLimitSharer {
    fn default() -> Self {
        Self::new()
    }
}
