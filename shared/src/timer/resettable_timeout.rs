use crate::{Scheduler, TimeoutKey};

/// Handle to a delayed callback on a [`Scheduler`].
///
/// Starting a timeout arms it; `reset()` restarts the full delay (and re-arms
/// a timeout that already fired or was stopped); `stop()` disarms it.
/// Dropping the handle cancels the callback for good.
pub struct ResettableTimeout {
    scheduler: Scheduler,
    key: TimeoutKey,
}

impl ResettableTimeout {
    pub(crate) fn new(scheduler: Scheduler, key: TimeoutKey) -> Self {
        Self { scheduler, key }
    }

    pub fn reset(&self) {
        self.scheduler.reset(&self.key);
    }

    pub fn stop(&self) {
        self.scheduler.stop(&self.key);
    }

    pub fn is_pending(&self) -> bool {
        self.scheduler.is_pending(&self.key)
    }
}

impl Drop for ResettableTimeout {
    fn drop(&mut self) {
        self.scheduler.release(&self.key);
    }
}
