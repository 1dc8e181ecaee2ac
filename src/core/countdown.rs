// Countdown timer for the arming phase.
//
// Ticks are anchored to the start instant (1s, 2s, 3s after start), not to
// the previous tick's completion, so processing delay never accumulates
// into drift.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Emitted once per elapsed second, then exactly one `Elapsed` when the
/// count reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    Tick { remaining: u32 },
    Elapsed,
}

/// Handle to a running countdown.
///
/// Dropping the handle does not stop the countdown; call `cancel()`.
pub struct CountdownHandle {
    task: JoinHandle<()>,
}

impl CountdownHandle {
    /// Stop future ticks. Idempotent: cancelling an already-cancelled or
    /// already-elapsed countdown is a no-op.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

/// Start a countdown of `initial` ticks, delivering events over `tx`
/// mapped through `wrap`.
///
/// `Tick { remaining }` fires at each second boundary with the count after
/// that tick (`initial - 1` down to `0`), then `Elapsed` fires once. If the
/// receiver is dropped the countdown stops silently.
pub fn start<E, F>(initial: u32, tx: mpsc::Sender<E>, wrap: F) -> CountdownHandle
where
    E: Send + 'static,
    F: Fn(CountdownEvent) -> E + Send + 'static,
{
    let task = tokio::spawn(async move {
        // interval_at skips the immediate tick that `interval` would fire
        let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        let mut remaining = initial;
        loop {
            interval.tick().await;
            remaining = remaining.saturating_sub(1);
            if tx.send(wrap(CountdownEvent::Tick { remaining })).await.is_err() {
                return;
            }
            if remaining == 0 {
                let _ = tx.send(wrap(CountdownEvent::Elapsed)).await;
                return;
            }
        }
    });
    CountdownHandle { task }
}
