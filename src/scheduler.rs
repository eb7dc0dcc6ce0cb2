//! Frame clock, coalesced render requests and one-shot timers.

use log::debug;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait FrameClock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl FrameClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl FrameClock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    pub force_reflow: bool,
}

/// At most one render is ever pending. Repeated requests fold into it and a
/// forced reflow upgrades a plain one.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    pending: Option<RenderRequest>,
}

impl RenderScheduler {
    /// Returns true when this call scheduled a new render.
    pub fn request(&mut self, force_reflow: bool) -> bool {
        match self.pending.as_mut() {
            Some(pending) => {
                if force_reflow && !pending.force_reflow {
                    debug!("Upgrading pending render to a forced reflow");
                    pending.force_reflow = true;
                }
                false
            }
            None => {
                self.pending = Some(RenderRequest { force_reflow });
                true
            }
        }
    }

    pub fn take(&mut self) -> Option<RenderRequest> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn schedule(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarms and returns true once the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
