use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::persistence::TimerPersistence;

use super::{Clock, Timer, TimerColor};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Full ordered collection, newest timer first. `revision` grows by one per
/// applied mutation.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub revision: u64,
    pub timers: Vec<Timer>,
}

impl TimerSnapshot {
    pub fn active(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter().filter(|timer| !timer.archived)
    }

    pub fn archived(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter().filter(|timer| timer.archived)
    }
}

struct Collection {
    timers: Vec<Timer>,
    revision: u64,
}

/// State shared with the ticker. Holds no cancellation guard so the ticker
/// never keeps the store alive.
struct StoreCore {
    collection: Mutex<Collection>,
    clock: Arc<dyn Clock>,
    snapshot_tx: watch::Sender<TimerSnapshot>,
    stopped: CancellationToken,
}

impl StoreCore {
    /// Runs `op` under the collection lock. A `Some` outcome counts as a
    /// mutation: the revision is bumped and a snapshot published before the
    /// lock is released. Nothing runs once the store has shut down.
    async fn apply<R>(&self, op: impl FnOnce(&mut Vec<Timer>, i64) -> Option<R>) -> Option<R> {
        let mut guard = self.collection.lock().await;
        if self.stopped.is_cancelled() {
            log_warn!("Timer store is shut down; ignoring mutation");
            return None;
        }
        let now = self.clock.now_ms();
        let outcome = op(&mut guard.timers, now);
        if outcome.is_some() {
            guard.revision += 1;
            self.snapshot_tx.send_replace(TimerSnapshot {
                revision: guard.revision,
                timers: guard.timers.clone(),
            });
        }
        outcome
    }

    async fn update_timer(&self, id: &str, op: impl FnOnce(&mut Timer, i64) -> bool) -> bool {
        self.apply(|timers, now| {
            let timer = timers.iter_mut().find(|timer| timer.id == id)?;
            op(timer, now).then_some(())
        })
        .await
        .is_some()
    }

    async fn tick(&self) -> usize {
        self.apply(|timers, now| {
            let folded = timers
                .iter_mut()
                .map(|timer| timer.accrue(now))
                .filter(|folded| *folded)
                .count();
            (folded > 0).then_some(folded)
        })
        .await
        .unwrap_or(0)
    }
}

struct BackgroundTasks {
    ticker: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Owner of every timer. Commands and ticks are serialized through one lock;
/// each applied mutation is published as a snapshot and written through to
/// storage in the background.
#[derive(Clone)]
pub struct TimerStore {
    core: Arc<StoreCore>,
    persistence: TimerPersistence,
    last_save_ok: Arc<AtomicBool>,
    tasks: Arc<Mutex<Option<BackgroundTasks>>>,
    cancel_token: CancellationToken,
    _cancel_on_drop: Arc<DropGuard>,
}

impl TimerStore {
    /// Loads the stored collection and starts the ticker and the
    /// write-through writer. Must be called inside a tokio runtime.
    pub async fn init(
        persistence: TimerPersistence,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        let timers = persistence.load(clock.now_ms()).await;
        log_info!(
            "Loaded {} timers from '{}'",
            timers.len(),
            persistence.key()
        );

        let (snapshot_tx, _) = watch::channel(TimerSnapshot {
            revision: 0,
            timers: timers.clone(),
        });
        let cancel_token = CancellationToken::new();
        let core = Arc::new(StoreCore {
            collection: Mutex::new(Collection {
                timers,
                revision: 0,
            }),
            clock,
            snapshot_tx,
            stopped: cancel_token.clone(),
        });

        let last_save_ok = Arc::new(AtomicBool::new(true));

        let ticker = tokio::spawn(run_ticker(
            core.clone(),
            tick_interval,
            cancel_token.clone(),
        ));
        let writer = tokio::spawn(write_through(
            persistence.clone(),
            core.snapshot_tx.subscribe(),
            last_save_ok.clone(),
            cancel_token.clone(),
        ));

        Self {
            core,
            persistence,
            last_save_ok,
            tasks: Arc::new(Mutex::new(Some(BackgroundTasks { ticker, writer }))),
            _cancel_on_drop: Arc::new(cancel_token.clone().drop_guard()),
            cancel_token,
        }
    }

    pub async fn create_timer(&self, name: &str, color: Option<TimerColor>) -> Option<Timer> {
        self.core
            .apply(|timers, now| {
                let mut timer = match Timer::new(name, color, now) {
                    Ok(timer) => timer,
                    Err(err) => {
                        log_debug!("Ignoring create command: {err}");
                        return None;
                    }
                };
                while timers.iter().any(|existing| existing.id == timer.id) {
                    timer.id = Uuid::new_v4().to_string();
                }
                timers.insert(0, timer.clone());
                Some(timer)
            })
            .await
    }

    pub async fn start_timer(&self, id: &str) -> bool {
        self.core
            .update_timer(id, |timer, now| timer.start(now))
            .await
    }

    pub async fn pause_timer(&self, id: &str) -> bool {
        self.core
            .update_timer(id, |timer, now| timer.pause(now))
            .await
    }

    pub async fn stop_timer(&self, id: &str) -> bool {
        self.core
            .update_timer(id, |timer, now| timer.stop(now))
            .await
    }

    pub async fn delete_timer(&self, id: &str) -> bool {
        self.core
            .apply(|timers, _| {
                let position = timers.iter().position(|timer| timer.id == id)?;
                Some(timers.remove(position))
            })
            .await
            .is_some()
    }

    pub async fn rename_timer(&self, id: &str, name: &str) -> bool {
        self.core
            .update_timer(id, |timer, _| timer.rename(name))
            .await
    }

    pub async fn set_timer_color(&self, id: &str, color: TimerColor) -> bool {
        self.core
            .update_timer(id, |timer, _| timer.set_color(color))
            .await
    }

    pub async fn link_task(&self, id: &str, task_id: &str, task_url: &str) -> bool {
        self.core
            .update_timer(id, |timer, _| timer.link_task(task_id, task_url))
            .await
    }

    pub async fn unlink_task(&self, id: &str) -> bool {
        self.core
            .update_timer(id, |timer, _| timer.unlink_task())
            .await
    }

    pub async fn set_archived(&self, id: &str, archived: bool) -> bool {
        self.core
            .update_timer(id, |timer, _| timer.set_archived(archived))
            .await
    }

    /// One accrual pass over all running timers. Returns how many were folded.
    pub async fn tick(&self) -> usize {
        self.core.tick().await
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let guard = self.core.collection.lock().await;
        TimerSnapshot {
            revision: guard.revision,
            timers: guard.timers.clone(),
        }
    }

    pub async fn timers(&self) -> Vec<Timer> {
        self.core.collection.lock().await.timers.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Timer> {
        self.core
            .collection
            .lock()
            .await
            .timers
            .iter()
            .find(|timer| timer.id == id)
            .cloned()
    }

    pub async fn active_timers(&self) -> Vec<Timer> {
        self.snapshot().await.active().cloned().collect()
    }

    pub async fn archived_timers(&self) -> Vec<Timer> {
        self.snapshot().await.archived().cloned().collect()
    }

    /// Receives a snapshot after every applied mutation.
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.core.snapshot_tx.subscribe()
    }

    /// Outcome of the most recent write, background or explicit.
    pub fn last_save_succeeded(&self) -> bool {
        self.last_save_ok.load(Ordering::SeqCst)
    }

    pub async fn save_now(&self) -> bool {
        let timers = self.timers().await;
        let saved = self.persistence.save(&timers).await;
        self.last_save_ok.store(saved, Ordering::SeqCst);
        saved
    }

    /// Stops the ticker and the writer, then flushes the current collection.
    /// Afterwards the store is read-only: every command is ignored and later
    /// calls only flush again.
    pub async fn shutdown(&self) -> bool {
        let tasks = self.tasks.lock().await.take();
        if let Some(tasks) = tasks {
            self.cancel_token.cancel();
            if let Err(err) = tasks.ticker.await {
                log_warn!("Ticker task ended abnormally: {err}");
            }
            if let Err(err) = tasks.writer.await {
                log_warn!("Write-through task ended abnormally: {err}");
            }
            log_info!("Timer store background tasks stopped");
        }

        self.save_now().await
    }
}

async fn run_ticker(core: Arc<StoreCore>, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                core.tick().await;
            }
            _ = cancel_token.cancelled() => {
                log_debug!("ticker shutting down");
                break;
            }
        }
    }
}

async fn write_through(
    persistence: TimerPersistence,
    mut snapshots: watch::Receiver<TimerSnapshot>,
    last_save_ok: Arc<AtomicBool>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let timers = snapshots.borrow_and_update().timers.clone();
                let saved = persistence.save(&timers).await;
                last_save_ok.store(saved, Ordering::SeqCst);
            }
            _ = cancel_token.cancelled() => {
                log_debug!("write-through shutting down");
                break;
            }
        }
    }
}
