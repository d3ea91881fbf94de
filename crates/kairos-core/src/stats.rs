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

//! Serializable statistics snapshots exposed by `dump_stats`.
//!
//! Snapshots are plain data for external observability tooling; nothing in
//! the scheduler reads them back.

use serde::Serialize;

/// Per-unit statistics at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct UnitStats {
    /// Unit name (unique within its limiter).
    pub name: String,
    /// Whether the unit was active at snapshot time.
    pub active: bool,
    /// Smoothed runtime estimate in milliseconds, `None` until the first run.
    pub estimate_ms: Option<f64>,
    /// Relative fairness counter. Only meaningful compared against other
    /// units of the same limiter; reset wholesale on jubilee.
    pub hotness: u32,
    /// Absolute number of invocations since registration.
    pub total_runs: u64,
    /// Milliseconds since the unit last completed a run, `None` if it has
    /// never completed one.
    pub idle_ms: Option<f64>,
}

/// Aggregate statistics for one [`RuntimeLimiter`](crate::RuntimeLimiter).
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    /// Total unit invocations across all passes.
    pub total_ran: u64,
    /// Invocations performed by the round-robin phase.
    pub ran_round_robin: u64,
    /// Invocations performed by the opportunistic phase.
    pub ran_opportunistic: u64,
    /// Fraction of units that wanted to run last tick but got no slot.
    pub starvation: f64,
    /// Accumulated milliseconds spent beyond requested allowances.
    pub overrun_ms: f64,
    /// Accumulated milliseconds of allowance left unused.
    pub underrun_ms: f64,
    /// Exponentially smoothed duration of a full scheduling pass.
    pub smoothed_runtime_ms: f64,
    /// Per-unit breakdown in registration order.
    pub units: Vec<UnitStats>,
}

/// One named runner inside a sharer snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerStats {
    /// Runner name.
    pub name: String,
    /// Relative weight used when splitting the allowance.
    pub weight: f64,
    /// The runner's limiter statistics.
    pub limiter: LimiterStats,
}

/// Full snapshot of a [`RuntimeLimitSharer`](crate::RuntimeLimitSharer).
#[derive(Debug, Clone, Serialize)]
pub struct SharerStats {
    /// All registered runners in registration order.
    pub runners: Vec<RunnerStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_serialize_to_json() {
        let stats = SharerStats {
            runners: vec![RunnerStats {
                name: "systems".to_string(),
                weight: 3.0,
                limiter: LimiterStats {
                    total_ran: 42,
                    ran_round_robin: 40,
                    ran_opportunistic: 2,
                    starvation: 0.25,
                    overrun_ms: 1.5,
                    underrun_ms: 10.0,
                    smoothed_runtime_ms: 4.2,
                    units: vec![UnitStats {
                        name: "physics".to_string(),
                        active: true,
                        estimate_ms: Some(1.25),
                        hotness: 7,
                        total_runs: 42,
                        idle_ms: Some(0.5),
                    }],
                },
            }],
        };

        let json = serde_json::to_string(&stats).expect("snapshot should serialize");
        assert!(json.contains("\"systems\""));
        assert!(json.contains("\"physics\""));
        assert!(json.contains("\"estimate_ms\":1.25"));
    }
}
