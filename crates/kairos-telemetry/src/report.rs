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

//! Report assembly and export.

use crate::recorder::{RunnerSummary, StatsRecorder};
use anyhow::Context;
use kairos_core::stats::SharerStats;
use serde::Serialize;
use std::path::Path;

/// A full observability report: the latest snapshot plus rolling summaries.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerReport {
    /// The most recent stats snapshot.
    pub snapshot: SharerStats,
    /// Rolling-window summaries per runner.
    pub summaries: Vec<RunnerSummary>,
    /// Snapshots recorded so far.
    pub ticks: u64,
}

impl SchedulerReport {
    /// Assembles a report from the latest snapshot and a recorder.
    pub fn build(snapshot: SharerStats, recorder: &StatsRecorder) -> Self {
        Self {
            snapshot,
            summaries: recorder.summaries(),
            ticks: recorder.ticks(),
        }
    }

    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serializing scheduler report")
    }

    /// Writes the report as JSON to `path`.
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("writing scheduler report to {}", path.display()))
    }
}

/// Logs one summary line per runner at info level.
pub fn log_summaries(recorder: &StatsRecorder) {
    for row in recorder.summaries() {
        log::info!(
            "runner '{}': mean={:.3}ms peak={:.3}ms var={:.3} trend={:+.3} starvation={:.2} ({} samples)",
            row.name,
            row.mean_runtime_ms,
            row.peak_runtime_ms,
            row.runtime_variance,
            row.runtime_trend,
            row.mean_starvation,
            row.samples
        );
    }
}
