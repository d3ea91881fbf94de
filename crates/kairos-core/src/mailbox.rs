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

//! Cross-thread registration mailbox.
//!
//! Add/remove requests are the scheduler's only concurrency-safe surface.
//! They travel over a bounded lane drained exclusively at the start of a
//! scheduling pass, so live iteration state is never mutated mid-pass. When
//! the bounded lane is full, requests divert to an unbounded overflow lane
//! serviced by a single retry worker with exponential backoff: registration
//! is never dropped and never blocks the caller.

use crate::logic::LogicUnit;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long the retry worker sleeps between checks for shutdown while idle.
const WORKER_IDLE_POLL: Duration = Duration::from_millis(10);

pub(crate) enum ControlOp {
    Add(LogicUnit),
    Remove(String),
}

impl ControlOp {
    fn kind(&self) -> &'static str {
        match self {
            ControlOp::Add(_) => "add",
            ControlOp::Remove(_) => "remove",
        }
    }
}

/// Shared name-to-tombstone registry. `Registrar::remove` flips the flag so
/// an already-registered unit can never run again, even before the deferred
/// physical cleanup executes.
pub(crate) type TombstoneMap = Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>;

/// Cloneable handle for registering and removing logic units from any
/// thread, including from inside a running callback.
///
/// Obtained from [`RuntimeLimiter::registrar`](crate::RuntimeLimiter::registrar).
/// Requests take effect at the start of the next scheduling pass; removal
/// additionally tombstones a known unit immediately.
#[derive(Clone)]
pub struct Registrar {
    ops: Sender<ControlOp>,
    overflow: Sender<ControlOp>,
    tombstones: TombstoneMap,
}

impl Registrar {
    /// Queues a unit for registration at the next pass start.
    ///
    /// Registering a name already present in the owning scheduler is a
    /// programmer error and aborts when the queue is drained.
    pub fn add(&self, unit: LogicUnit) {
        self.push(ControlOp::Add(unit));
    }

    /// Queues a unit for removal. Unknown or already-removed names are a
    /// silent no-op; a known unit is marked removed immediately and will not
    /// run again.
    pub fn remove(&self, name: &str) {
        if let Some(flag) = self.tombstones.lock().unwrap().get(name) {
            flag.store(true, Ordering::Release);
        }
        self.push(ControlOp::Remove(name.to_string()));
    }

    fn push(&self, op: ControlOp) {
        // Anything already sitting in the overflow lane must stay ahead of
        // newer requests, so keep routing through it until it drains.
        if !self.overflow.is_empty() {
            let _ = self.overflow.send(op);
            return;
        }
        match self.ops.try_send(op) {
            Ok(()) => {}
            Err(TrySendError::Full(op)) => {
                log::warn!(
                    "registration mailbox full; deferring {} to the retry worker",
                    op.kind()
                );
                let _ = self.overflow.send(op);
            }
            Err(TrySendError::Disconnected(op)) => {
                log::error!(
                    "registration mailbox closed; discarding {} (scheduler was dropped)",
                    op.kind()
                );
            }
        }
    }
}

/// Owning side of the mailbox, held by the scheduler.
pub(crate) struct Mailbox {
    ops_rx: Receiver<ControlOp>,
    registrar: Registrar,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Mailbox {
    pub fn new(capacity: usize, backoff: Duration, backoff_max: Duration) -> Self {
        let (ops_tx, ops_rx) = crossbeam_channel::bounded(capacity.max(1));
        let (overflow_tx, overflow_rx) = crossbeam_channel::unbounded();
        let tombstones: TombstoneMap = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let worker_running = Arc::clone(&running);
        let worker_ops = ops_tx.clone();
        let worker = thread::spawn(move || {
            retry_loop(overflow_rx, worker_ops, worker_running, backoff, backoff_max);
        });

        Self {
            ops_rx,
            registrar: Registrar {
                ops: ops_tx,
                overflow: overflow_tx,
                tombstones,
            },
            running,
            worker: Some(worker),
        }
    }

    pub fn registrar(&self) -> Registrar {
        self.registrar.clone()
    }

    pub fn tombstones(&self) -> &TombstoneMap {
        &self.registrar.tombstones
    }

    /// Takes every currently queued op. Called only by the scheduling thread
    /// at the start of a pass.
    pub fn drain(&self) -> Vec<ControlOp> {
        self.ops_rx.try_iter().collect()
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Moves diverted ops back into the bounded lane, backing off while it stays
/// full. Exactly one worker exists per mailbox, which bounds retry
/// concurrency under sustained pressure.
fn retry_loop(
    overflow_rx: Receiver<ControlOp>,
    ops_tx: Sender<ControlOp>,
    running: Arc<AtomicBool>,
    backoff: Duration,
    backoff_max: Duration,
) {
    loop {
        match overflow_rx.recv_timeout(WORKER_IDLE_POLL) {
            Ok(mut op) => {
                let mut delay = backoff;
                loop {
                    match ops_tx.try_send(op) {
                        Ok(()) => break,
                        Err(TrySendError::Full(returned)) => {
                            if !running.load(Ordering::Relaxed) {
                                return;
                            }
                            op = returned;
                            thread::sleep(delay);
                            delay = (delay * 2).min(backoff_max);
                        }
                        Err(TrySendError::Disconnected(_)) => return,
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> LogicUnit {
        LogicUnit::new(name, |_| {})
    }

    #[test]
    fn ops_round_trip_through_bounded_lane() {
        let mailbox = Mailbox::new(8, Duration::from_millis(1), Duration::from_millis(10));
        let registrar = mailbox.registrar();
        registrar.add(unit("a"));
        registrar.remove("a");

        let ops = mailbox.drain();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], ControlOp::Add(_)));
        assert!(matches!(&ops[1], ControlOp::Remove(name) if name == "a"));
    }

    #[test]
    fn overflow_is_retried_not_dropped() {
        let mailbox = Mailbox::new(1, Duration::from_millis(1), Duration::from_millis(5));
        let registrar = mailbox.registrar();
        for i in 0..5 {
            registrar.add(unit(&format!("u{i}")));
        }

        // The worker needs drain cycles to move overflow into the bounded
        // lane; emulate a few scheduling passes.
        let mut seen = 0;
        for _ in 0..50 {
            seen += mailbox.drain().len();
            if seen == 5 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen, 5, "every overflowed op must eventually arrive");
    }

    #[test]
    fn remove_marks_known_tombstone_immediately() {
        let mailbox = Mailbox::new(8, Duration::from_millis(1), Duration::from_millis(10));
        let flag = Arc::new(AtomicBool::new(false));
        mailbox
            .tombstones()
            .lock()
            .unwrap()
            .insert("ghost".to_string(), Arc::clone(&flag));

        mailbox.registrar().remove("ghost");
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn remove_of_unknown_name_is_silent() {
        let mailbox = Mailbox::new(8, Duration::from_millis(1), Duration::from_millis(10));
        mailbox.registrar().remove("nobody");
        assert_eq!(mailbox.drain().len(), 1);
    }
}
