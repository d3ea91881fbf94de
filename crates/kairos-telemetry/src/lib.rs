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

//! # Kairos Telemetry
//!
//! Rolling statistics and report export for the scheduler core.
//!
//! A [`StatsRecorder`] ingests [`SharerStats`](kairos_core::stats::SharerStats)
//! snapshots once per tick and keeps fixed-size rolling windows per runner;
//! the [`report`] module turns the latest snapshot plus the window summaries
//! into a JSON document or a set of log lines.

#![warn(missing_docs)]

pub mod recorder;
pub mod report;

pub use recorder::{RunnerSummary, StatsRecorder};
pub use report::SchedulerReport;

/// Initializes `env_logger` from `RUST_LOG`. Safe to call more than once;
/// later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env().try_init();
}
