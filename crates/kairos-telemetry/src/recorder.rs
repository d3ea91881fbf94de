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

//! Rolling windows over per-runner scheduler statistics.

use kairos_core::stats::SharerStats;
use serde::Serialize;
use std::collections::HashMap;

/// Samples kept per window: roughly two seconds of ticks at 60Hz.
const WINDOW: usize = 120;

/// A fixed-size circular buffer of samples.
#[derive(Debug, Clone)]
pub struct RingWindow<const N: usize> {
    data: [f32; N],
    index: usize,
    count: usize,
}

impl<const N: usize> RingWindow<N> {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self {
            data: [0.0; N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a sample, overwriting the oldest once full.
    pub fn push(&mut self, value: f32) {
        self.data[self.index] = value;
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Number of samples currently held.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Iterates samples oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        let (left, right) = self.data.split_at(self.index);
        if self.count < N {
            right[N - self.index..]
                .iter()
                .chain(left[..self.index].iter())
        } else {
            right.iter().chain(left.iter())
        }
    }

    /// Arithmetic mean of the held samples, 0 when empty.
    pub fn average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.iter().sum::<f32>() / self.count as f32
    }

    /// Variance of the held samples. High variance over pass runtimes is
    /// the stutter signal.
    pub fn variance(&self) -> f32 {
        if self.count < 2 {
            return 0.0;
        }
        let avg = self.average();
        let sum_sq: f32 = self.iter().map(|v| (v - avg) * (v - avg)).sum();
        sum_sq / self.count as f32
    }

    /// Difference between the second-half and first-half averages. Positive
    /// means the sampled quantity is rising.
    pub fn trend(&self) -> f32 {
        if self.count < 2 {
            return 0.0;
        }
        let half = self.count / 2;
        let first: f32 = self.iter().take(half).sum::<f32>() / half as f32;
        let last: f32 = self.iter().skip(self.count - half).sum::<f32>() / half as f32;
        last - first
    }

    /// Largest held sample, or 0 when empty.
    pub fn max(&self) -> f32 {
        self.iter().copied().fold(0.0, f32::max)
    }
}

impl<const N: usize> Default for RingWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct RunnerWindows {
    runtime_ms: RingWindow<WINDOW>,
    starvation: RingWindow<WINDOW>,
}

/// One summarized row per runner, derived from its rolling windows.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerSummary {
    /// Runner name.
    pub name: String,
    /// Mean smoothed pass runtime over the window, in milliseconds.
    pub mean_runtime_ms: f32,
    /// Variance of the pass runtime over the window.
    pub runtime_variance: f32,
    /// Runtime trend over the window; positive means passes are getting
    /// slower.
    pub runtime_trend: f32,
    /// Worst pass runtime seen in the window, in milliseconds.
    pub peak_runtime_ms: f32,
    /// Mean starvation ratio over the window.
    pub mean_starvation: f32,
    /// Samples currently in the window.
    pub samples: usize,
}

/// Ingests scheduler snapshots once per tick and keeps per-runner rolling
/// windows of the quantities worth watching over time.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    windows: HashMap<String, RunnerWindows>,
    ticks: u64,
}

impl StatsRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one snapshot. Runners appearing for the first time get fresh
    /// windows; runners absent from the snapshot keep their history.
    pub fn record(&mut self, snapshot: &SharerStats) {
        for runner in &snapshot.runners {
            let windows = self.windows.entry(runner.name.clone()).or_default();
            windows
                .runtime_ms
                .push(runner.limiter.smoothed_runtime_ms as f32);
            windows.starvation.push(runner.limiter.starvation as f32);
        }
        self.ticks += 1;
    }

    /// Number of snapshots recorded.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Summary rows for all known runners, sorted by name for stable output.
    pub fn summaries(&self) -> Vec<RunnerSummary> {
        let mut rows: Vec<RunnerSummary> = self
            .windows
            .iter()
            .map(|(name, w)| RunnerSummary {
                name: name.clone(),
                mean_runtime_ms: w.runtime_ms.average(),
                runtime_variance: w.runtime_ms.variance(),
                runtime_trend: w.runtime_ms.trend(),
                peak_runtime_ms: w.runtime_ms.max(),
                mean_starvation: w.starvation.average(),
                samples: w.runtime_ms.count(),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}
