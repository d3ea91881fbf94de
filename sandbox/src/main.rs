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

// Kairos Sandbox
// Drives a RuntimeLimitSharer at a 60Hz frame budget with a mixed workload.

use anyhow::Result;
use kairos_core::{LogicUnit, RuntimeLimitSharer, Stopwatch};
use kairos_telemetry::report::{self, SchedulerReport};
use kairos_telemetry::StatsRecorder;
use std::path::Path;
use std::thread;
use std::time::Duration;

const FRAME_BUDGET_MS: f64 = 16.7;
const FRAMES: u32 = 300;
const ENTITY_COUNT: usize = 24;

fn busy_wait(ms: f64) {
    let watch = Stopwatch::new();
    while watch.elapsed_ms_f64() < ms {
        std::hint::spin_loop();
    }
}

fn build_world(sharer: &mut RuntimeLimitSharer) {
    sharer.register_runner("systems", 3.0);
    sharer.register_runner("entities", 2.0);
    sharer.register_runner("world", 1.0);

    // Systems: a dt-integrated physics step plus a deliberately heavy
    // planner that will not fit most frames.
    let mut positions = vec![0.0f64; ENTITY_COUNT];
    let velocities = vec![0.3f64; ENTITY_COUNT];
    sharer.add_logic(
        "systems",
        LogicUnit::new("physics", move |dt_ms| {
            for (pos, vel) in positions.iter_mut().zip(&velocities) {
                *pos += vel * dt_ms;
            }
            busy_wait(1.0);
        }),
    );
    sharer.add_logic(
        "systems",
        LogicUnit::new("collision", |_| busy_wait(1.5)),
    );
    sharer.add_logic(
        "systems",
        LogicUnit::new("ai-planner", |_| busy_wait(8.0)),
    );

    // Entities: a spread of small per-group behaviors.
    for group in 0..6 {
        sharer.add_logic(
            "entities",
            LogicUnit::new(format!("behavior-{group}"), |_| busy_wait(0.6)),
        );
    }

    // World: ambient work on fixed schedules.
    sharer.add_logic(
        "world",
        LogicUnit::with_schedule("spawner", 500.0, |_| busy_wait(1.0)),
    );
    sharer.add_logic(
        "world",
        LogicUnit::with_schedule("weather", 1000.0, |_| busy_wait(2.0)),
    );
}

fn main() -> Result<()> {
    kairos_telemetry::init_logging();
    log::info!("sandbox: {FRAMES} frames at {FRAME_BUDGET_MS}ms budget");

    let mut sharer = RuntimeLimitSharer::new();
    build_world(&mut sharer);

    let mut recorder = StatsRecorder::new();
    let mut starved_frames = 0u32;

    for frame in 0..FRAMES {
        let frame_watch = Stopwatch::new();
        let outcome = sharer.share(FRAME_BUDGET_MS);
        recorder.record(&sharer.dump_stats());
        if outcome.starved_runners > 0 {
            starved_frames += 1;
        }
        if frame % 60 == 0 {
            log::debug!(
                "frame {frame}: remaining={:.2}ms starved_runners={}",
                outcome.remaining_ms,
                outcome.starved_runners
            );
        }

        // Sleep off whatever the scheduler left of the frame.
        let elapsed = frame_watch.elapsed_ms_f64();
        if elapsed < FRAME_BUDGET_MS {
            thread::sleep(Duration::from_secs_f64(
                (FRAME_BUDGET_MS - elapsed) / 1000.0,
            ));
        }
    }

    log::info!("sandbox: done, {starved_frames} frames saw a fully starved runner");
    report::log_summaries(&recorder);

    let report_path = Path::new("kairos-report.json");
    SchedulerReport::build(sharer.dump_stats(), &recorder).write_to(report_path)?;
    log::info!("sandbox: wrote {}", report_path.display());
    Ok(())
}
