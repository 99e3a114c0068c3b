//! Periodic driver for [`ReconciliationEngine::on_tick`].
//!
//! [`spawn`] moves the engine onto a Tokio task that waits for the initial
//! delay, then loops `tick → sleep(period returned by the tick)`.  Each tick
//! runs on the blocking pool.  The next sleep is only armed after a tick
//! returns, so ticks never overlap.
//!
//! [`TickerHandle::cancel`] stops the loop and hands the engine back, which
//! is what lets the host run the shutdown restore strictly after the last
//! tick:
//!
//! ```rust,no_run
//! # async fn run(engine: cputune_runtime::engine::ReconciliationEngine<
//! #     cputune_hal::SimRegisterFile, cputune_hal::SimDirectives>) {
//! use std::time::Duration;
//!
//! let ticker = cputune_runtime::ticker::spawn(engine, Duration::from_secs(2));
//! // ... wait for a shutdown signal ...
//! if let Ok(mut engine) = ticker.cancel().await {
//!     engine.on_shutdown_restore();
//! }
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cputune_hal::{DirectiveSource, RegisterAccessor};
use cputune_types::TuneError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{IntervalControl, ReconciliationEngine};

/// Control handle for a running ticker.
///
/// Dropping the handle without calling [`cancel`](Self::cancel) stops the
/// ticker as well, but the engine (and its original snapshot) is lost.
pub struct TickerHandle<R, D> {
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<ReconciliationEngine<R, D>, TuneError>>,
    interval: IntervalControl,
    ticks: Arc<AtomicU64>,
}

/// Start ticking `engine` after `initial_delay`.
///
/// Must be called from within a Tokio runtime.
pub fn spawn<R, D>(engine: ReconciliationEngine<R, D>, initial_delay: Duration) -> TickerHandle<R, D>
where
    R: RegisterAccessor + 'static,
    D: DirectiveSource + 'static,
{
    let (stop, mut stopped) = watch::channel(false);
    let interval = engine.interval_control();
    let ticks = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&ticks);

    info!(
        initial_delay_ms = initial_delay.as_millis() as u64,
        interval_ms = interval.millis(),
        "ticker started"
    );

    let task = tokio::spawn(async move {
        let mut engine = engine;
        let mut delay = initial_delay;
        loop {
            tokio::select! {
                biased;
                _ = stopped.changed() => break,
                () = tokio::time::sleep(delay) => {}
            }
            // Register and directive reads are blocking syscalls.
            let (returned, next) = tokio::task::spawn_blocking(move || {
                let next = engine.on_tick();
                (engine, next)
            })
            .await
            .map_err(|e| TuneError::Scheduler(format!("tick failed: {e}")))?;
            engine = returned;
            delay = next;
            counter.fetch_add(1, Ordering::Relaxed);
        }
        debug!(ticks = counter.load(Ordering::Relaxed), "ticker stopped");
        Ok::<_, TuneError>(engine)
    });

    TickerHandle {
        stop,
        task,
        interval,
        ticks,
    }
}

impl<R, D> TickerHandle<R, D> {
    /// Change the tick period; the current sleep is not shortened.
    pub fn set_interval(&self, millis: u64) {
        self.interval.set(millis);
    }

    /// Number of ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stop ticking and take the engine back.
    ///
    /// A tick already in progress runs to completion first; a pending sleep
    /// is abandoned immediately.
    ///
    /// # Errors
    ///
    /// [`TuneError::Scheduler`] if the ticker task or a tick panicked.
    pub async fn cancel(self) -> Result<ReconciliationEngine<R, D>, TuneError> {
        // The task may already be gone; joining below reports that.
        let _ = self.stop.send(true);
        self.task
            .await
            .map_err(|e| TuneError::Scheduler(format!("ticker task failed: {e}")))?
    }
}
