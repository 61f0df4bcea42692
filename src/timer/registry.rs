use crate::lock::Mutex;
use crate::timer::{TimerCallback, TimerHandle};

use slotmap::SlotMap;

use std::time::{Duration, Instant};

pub(crate) struct Registration {
    /// `None` once the next fire lies beyond what `Instant` can represent.
    next_fire: Option<Instant>,
    period: Duration,
    callback: TimerCallback,
}

/// Registered timers, keyed by the handle issued to their owner.
pub(crate) struct Registry {
    slots: Mutex<SlotMap<TimerHandle, Registration>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new("timer.registry", SlotMap::with_key()),
        }
    }

    pub fn insert(&self, first_fire: Instant, period: Duration, callback: TimerCallback) -> TimerHandle {
        self.slots.lock().insert(Registration {
            next_fire: Some(first_fire),
            period,
            callback,
        })
    }

    pub fn remove(&self, handle: TimerHandle) -> bool {
        self.slots.lock().remove(handle).is_some()
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.slots.lock().contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Earliest pending fire time.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.lock().values().filter_map(|r| r.next_fire).min()
    }

    /// Moves the callbacks of every registration due at `now` into `due` and
    /// schedules their next fire.
    ///
    /// A registration that fell more than one period behind fires once and
    /// is re-anchored on `now`; missed ticks are not replayed. A registration
    /// whose next fire would overflow `Instant` stays registered but never
    /// fires again.
    pub fn collect_due(&self, now: Instant, due: &mut Vec<(TimerHandle, TimerCallback)>) {
        let mut slots = self.slots.lock();
        for (handle, registration) in slots.iter_mut() {
            let fire = match registration.next_fire {
                Some(fire) if fire <= now => fire,
                _ => continue,
            };

            due.push((handle, registration.callback.clone()));

            let period = registration.period;
            registration.next_fire = match fire.checked_add(period) {
                Some(next) if next > now => Some(next),
                _ => now.checked_add(period),
            };
        }
    }
}
