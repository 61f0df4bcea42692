use crate::error::TimerError;
use crate::timer::registry::Registry;
use crate::timer::{TimerCallback, TimerHandle};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, trace};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Messages to the driver thread.
pub(crate) enum Command {
    /// The registry changed; recompute the next deadline.
    Reschedule,
    Shutdown,
}

/// Starts the thread that fires registered timers.
pub(crate) fn spawn(registry: Arc<Registry>) -> Result<Sender<Command>, TimerError> {
    let (tx, rx) = channel::unbounded();

    thread::Builder::new()
        .name("lapse-timer".into())
        .spawn(move || run(registry, rx))
        .map_err(TimerError::Spawn)?;

    debug!("timer driver started");
    Ok(tx)
}

fn run(registry: Arc<Registry>, commands: Receiver<Command>) {
    // reused across ticks so steady-state dispatch does not allocate.
    let mut due: Vec<(TimerHandle, TimerCallback)> = Vec::new();

    loop {
        let received = match registry.next_deadline() {
            Some(deadline) => commands.recv_deadline(deadline),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Command::Reschedule) | Err(RecvTimeoutError::Timeout) => {}
        }

        registry.collect_due(Instant::now(), &mut due);
        for (handle, callback) in due.drain(..) {
            dispatch(handle, &callback);
        }
    }

    debug!("timer driver stopped");
}

/// Runs one callback outside the registry lock. A panic is logged and
/// swallowed so one faulty callback cannot stop every other timer.
fn dispatch(handle: TimerHandle, callback: &TimerCallback) {
    trace!(?handle, "timer fired");

    if catch_unwind(AssertUnwindSafe(|| (**callback)())).is_err() {
        error!(?handle, "timer callback panicked");
    }
}
