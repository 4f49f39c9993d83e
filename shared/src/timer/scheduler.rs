use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
    time::{Duration, Instant},
};

use log::warn;

use crate::{timer::clock::Clock, KeyGenerator, ResettableTimeout, TimeoutKey};

struct TimeoutEntry {
    delay: Duration,
    deadline: Option<Instant>,
    callback: Rc<dyn Fn()>,
}

struct SchedulerInner {
    key_generator: KeyGenerator<TimeoutKey>,
    entries: HashMap<TimeoutKey, TimeoutEntry>,
}

/// Runs delayed callbacks on the peer loop. Nothing fires on its own: the
/// loop calls `poll()` and every timeout whose deadline has passed runs once.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    clock: Rc<dyn Clock>,
}

impl Scheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                key_generator: KeyGenerator::new(),
                entries: HashMap::new(),
            })),
            clock,
        }
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Arms a new timeout. The returned handle owns it: dropping the handle
    /// cancels the callback.
    pub fn start_timeout<F: Fn() + 'static>(&self, delay: Duration, callback: F) -> ResettableTimeout {
        let deadline = self.clock.now() + delay;
        let mut inner = self.inner.borrow_mut();
        let key = inner.key_generator.generate();
        inner.entries.insert(
            key,
            TimeoutEntry {
                delay,
                deadline: Some(deadline),
                callback: Rc::new(callback),
            },
        );
        ResettableTimeout::new(self.clone(), key)
    }

    /// Fires every due timeout, earliest deadline first. Returns how many ran.
    pub fn poll(&self) -> usize {
        let now = self.clock.now();

        let mut due: Vec<(Instant, TimeoutKey)> = {
            let inner = self.inner.borrow();
            inner
                .entries
                .iter()
                .filter_map(|(key, entry)| {
                    entry
                        .deadline
                        .filter(|deadline| *deadline <= now)
                        .map(|deadline| (deadline, *key))
                })
                .collect()
        };
        due.sort();

        let mut fired = 0;
        for (_, key) in due {
            // an earlier callback may have stopped, reset or dropped this one
            let callback = {
                let mut inner = self.inner.borrow_mut();
                let Some(entry) = inner.entries.get_mut(&key) else {
                    continue;
                };
                match entry.deadline {
                    Some(deadline) if deadline <= now => {
                        entry.deadline = None;
                        entry.callback.clone()
                    }
                    _ => continue,
                }
            };
            callback();
            fired += 1;
        }
        fired
    }

    /// Number of armed timeouts
    pub fn pending_count(&self) -> usize {
        self.inner
            .borrow()
            .entries
            .values()
            .filter(|entry| entry.deadline.is_some())
            .count()
    }

    pub(crate) fn reset(&self, key: &TimeoutKey) {
        let now = self.clock.now();
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            warn!("Scheduler busy, could not reset timeout {:?}", key);
            return;
        };
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.deadline = Some(now + entry.delay);
        }
    }

    pub(crate) fn stop(&self, key: &TimeoutKey) {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            warn!("Scheduler busy, could not stop timeout {:?}", key);
            return;
        };
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.deadline = None;
        }
    }

    pub(crate) fn is_pending(&self, key: &TimeoutKey) -> bool {
        self.inner
            .borrow()
            .entries
            .get(key)
            .map_or(false, |entry| entry.deadline.is_some())
    }

    pub(crate) fn release(&self, key: &TimeoutKey) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.entries.remove(key);
        } else {
            warn!("Scheduler busy, timeout {:?} leaked until next release", key);
        }
    }
}
