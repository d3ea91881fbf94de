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

//! # Kairos Core
//!
//! Time-budgeted cooperative scheduling for engine-style tick loops.
//!
//! A [`RuntimeLimiter`] runs a group of named [`LogicUnit`] callbacks inside
//! a per-tick millisecond allowance, round-robin first and opportunistically
//! (coldest units first) once the next unit in line no longer fits. A
//! [`RuntimeLimitSharer`] splits a larger allowance across several named
//! limiters by weight and hands leftover time back out in bonus passes.
//!
//! Callbacks are never preempted: budgets are enforced at admission, before
//! a callback starts, using a moving-average estimate of its past runtime.

#![warn(missing_docs)]

pub mod limiter;
pub mod logic;
pub mod mailbox;
pub mod schedule;
pub mod sharer;
pub mod stats;
pub mod utils;

pub use limiter::{LimiterConfig, RunReport, RuntimeLimiter};
pub use logic::LogicUnit;
pub use mailbox::Registrar;
pub use schedule::TimeAccumulator;
pub use sharer::{RuntimeLimitSharer, ShareReport};
pub use utils::timer::Stopwatch;
