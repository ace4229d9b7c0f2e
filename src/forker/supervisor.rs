use super::{Forker, PoolSize};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info, info_span, warn, Instrument};

/// What an outside observer sees in a slot. `worker` is the sequence number
/// of the worker started into it, the first worker of a pool being 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    Running { worker: u64 },
}

#[derive(Debug)]
enum WorkerState {
    Absent,
    Running { worker: u64, abort: AbortHandle },
}

#[derive(Debug)]
enum Outcome {
    Finished,
    Failed(anyhow::Error),
    Killed,
    Panicked,
}

#[derive(Debug)]
struct WorkerExit {
    slot: usize,
    worker: u64,
    outcome: Outcome,
}

type Slots = Arc<StdMutex<Vec<WorkerState>>>;

/// Handle to a running pool. Dropping it stops the monitor and every worker.
#[derive(Debug)]
pub struct Supervisor {
    slots: Slots,
    started: Arc<AtomicU64>,
    monitor: JoinHandle<()>,
}

struct Monitor<F> {
    forker: Arc<F>,
    pool: PoolSize,
    slots: Slots,
    started: Arc<AtomicU64>,
    exit_tx: mpsc::UnboundedSender<WorkerExit>,
    exit_rx: mpsc::UnboundedReceiver<WorkerExit>,
}

impl Supervisor {
    pub(super) fn spawn<F: Forker>(forker: Arc<F>, pool: PoolSize) -> Self {
        let slots: Slots = Arc::new(StdMutex::new(
            (0..pool.workers).map(|_| WorkerState::Absent).collect(),
        ));
        let started = Arc::new(AtomicU64::new(0));
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();

        let monitor = Monitor {
            forker,
            pool,
            slots: slots.clone(),
            started: started.clone(),
            exit_tx,
            exit_rx,
        };

        for slot in 0..pool.workers {
            monitor.start_worker(slot);
        }

        Self {
            slots,
            started,
            monitor: tokio::spawn(monitor.run().in_current_span()),
        }
    }

    pub fn live_workers(&self) -> usize {
        self.slot_states()
            .iter()
            .filter(|state| matches!(state, SlotState::Running { .. }))
            .count()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .map(|state| match state {
                WorkerState::Absent => SlotState::Absent,
                WorkerState::Running { worker, .. } => SlotState::Running { worker: *worker },
            })
            .collect()
    }

    /// Number of workers started so far, replacements included.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Stops the worker in `slot` the way a termination signal would. Returns
    /// false if the slot is empty.
    pub fn kill(&self, slot: usize) -> bool {
        let Ok(slots) = self.slots.lock() else {
            return false;
        };

        match slots.get(slot) {
            Some(WorkerState::Running { abort, .. }) => {
                abort.abort();
                true
            }
            _ => false,
        }
    }

    /// Stops the monitor first, so killed workers are not replaced.
    pub fn shutdown(&self) {
        self.monitor.abort();

        let slots = self.slots.lock().map(|slots| slots.len()).unwrap_or(0);
        let killed = (0..slots).filter(|&slot| self.kill(slot)).count();

        if killed > 0 {
            info!(killed, "pool shut down");
        }
    }

    /// Resolves once every worker of a run-once pool has exited. A permanent
    /// pool only gets here after `shutdown`.
    pub async fn wait(mut self) -> Result<()> {
        match (&mut self.monitor).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(anyhow!("pool monitor failed: {e}")),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<F: Forker> Monitor<F> {
    fn start_worker(&self, slot: usize) {
        let worker = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let forker = self.forker.clone();

        let task = tokio::spawn(
            async move { forker.start_child_process(slot).await }
                .instrument(info_span!("worker", slot, worker)),
        );
        let abort = task.abort_handle();

        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(Ok(())) => Outcome::Finished,
                Ok(Err(e)) => Outcome::Failed(e),
                Err(e) if e.is_cancelled() => Outcome::Killed,
                Err(_) => Outcome::Panicked,
            };

            let _ = exit_tx.send(WorkerExit {
                slot,
                worker,
                outcome,
            });
        });

        self.slots.lock().unwrap()[slot] = WorkerState::Running { worker, abort };
    }

    async fn run(mut self) {
        let mut live = self.pool.workers;

        while live > 0 {
            let Some(exit) = self.exit_rx.recv().await else {
                break;
            };

            if !self.reap(&exit) {
                continue;
            }

            if self.pool.permanent {
                self.start_worker(exit.slot);
            } else {
                live -= 1;
            }
        }

        info!("all workers exited");
    }

    /// Marks the slot of an exited worker empty. An exit from a worker the
    /// slot no longer holds is ignored.
    fn reap(&self, exit: &WorkerExit) -> bool {
        let mut slots = self.slots.lock().unwrap();

        match slots.get(exit.slot) {
            Some(WorkerState::Running { worker, .. }) if *worker == exit.worker => {}
            _ => return false,
        }

        slots[exit.slot] = WorkerState::Absent;

        match &exit.outcome {
            Outcome::Finished => info!(slot = exit.slot, worker = exit.worker, "worker exited"),
            Outcome::Failed(e) => {
                error!(slot = exit.slot, worker = exit.worker, "worker failed: {e:#}")
            }
            Outcome::Killed => warn!(slot = exit.slot, worker = exit.worker, "worker killed"),
            Outcome::Panicked => error!(slot = exit.slot, worker = exit.worker, "worker panicked"),
        }

        true
    }
}
