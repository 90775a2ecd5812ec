use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::types::ScreenPoint;

/// Shared stop flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag and wake every sleeper.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block for `duration` or until cancelled, whichever comes first.
    pub fn wait(&self, duration: Duration) -> Wake {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        if *guard {
            Wake::Cancelled
        } else {
            Wake::Elapsed
        }
    }
}

/// Why a sleep returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Cancelled,
}

/// Time source and suspension point for the automation loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> Wake;
}

/// Wall clock whose sleeps are cut short by a `Cancel`.
pub struct SystemClock {
    cancel: Cancel,
}

impl SystemClock {
    pub fn new(cancel: Cancel) -> Self {
        Self { cancel }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Wake {
        self.cancel.wait(duration)
    }
}

/// Offset `target` by an independent uniform draw in `[-offset, offset]` on
/// each axis. The lower bound is clamped at 0 so the point stays on screen.
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, target: ScreenPoint, offset: u32) -> ScreenPoint {
    if offset == 0 {
        return target;
    }
    let axis = |rng: &mut R, v: u32| {
        let lo = v.saturating_sub(offset);
        let hi = v.saturating_add(offset);
        rng.gen_range(lo..=hi)
    };
    let x = axis(rng, target.x);
    let y = axis(rng, target.y);
    ScreenPoint::new(x, y)
}
