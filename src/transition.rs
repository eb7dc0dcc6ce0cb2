//! Page turn state machine.
//!
//! The strip of columns slides horizontally by whole page shifts. A turn is
//! prepared for one frame (the buffer surface for the target page is set up
//! slightly shrunk), then animated with an ease-out curve, then settled. After
//! settling the buffer grows back to full size once a short delay passes.
//!
//! Nothing here reads a clock on its own; every entry point takes `now`.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::scheduler::Timer;
use crate::state::clamp_turn_speed;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionTuning {
    pub base_duration_ms: u64,
    /// Scale of the buffer surface while it waits to be revealed.
    pub reveal_scale: f32,
    pub reveal_delay_ms: u64,
    pub reveal_duration_ms: u64,
}

impl Default for TransitionTuning {
    fn default() -> Self {
        Self {
            base_duration_ms: 420,
            reveal_scale: 0.96,
            reveal_delay_ms: 120,
            reveal_duration_ms: 180,
        }
    }
}

impl TransitionTuning {
    pub fn turn_duration(&self, turn_speed: f32) -> Duration {
        let millis = self.base_duration_ms as f64 / clamp_turn_speed(turn_speed) as f64;
        Duration::from_millis(millis.round() as u64)
    }

    fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    fn reveal_duration(&self) -> Duration {
        Duration::from_millis(self.reveal_duration_ms)
    }
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

fn progress(start: Instant, duration: Duration, now: Instant) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (now.saturating_duration_since(start).as_secs_f32() / duration.as_secs_f32()).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionPhase {
    Idle,
    Preparing {
        from: usize,
        to: usize,
        duration: Duration,
    },
    Animating {
        from: usize,
        to: usize,
        start: Instant,
        duration: Duration,
    },
}

/// Offscreen copy of the page being turned to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSurface {
    pub page: usize,
    pub scale: f32,
    revealing_since: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Target equals the current page; nothing moves.
    Unchanged,
    Started { from: usize, to: usize },
    Jumped(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    Settled(usize),
    Revealed(usize),
}

#[derive(Debug)]
pub struct TransitionController {
    tuning: TransitionTuning,
    current: usize,
    phase: TransitionPhase,
    buffer: BufferSurface,
    reveal_timer: Timer,
    shift: f32,
    events: VecDeque<TransitionEvent>,
}

impl TransitionController {
    pub fn new(tuning: TransitionTuning) -> Self {
        Self {
            tuning,
            current: 0,
            phase: TransitionPhase::Idle,
            buffer: BufferSurface {
                page: 0,
                scale: 1.0,
                revealing_since: None,
            },
            reveal_timer: Timer::default(),
            shift: 0.0,
            events: VecDeque::new(),
        }
    }

    pub fn tuning(&self) -> &TransitionTuning {
        &self.tuning
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    /// Page the strip is heading to, or the current page when idle.
    pub fn target_page(&self) -> usize {
        match self.phase {
            TransitionPhase::Idle => self.current,
            TransitionPhase::Preparing { to, .. } | TransitionPhase::Animating { to, .. } => to,
        }
    }

    pub fn is_animating(&self) -> bool {
        !matches!(self.phase, TransitionPhase::Idle)
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    pub fn buffer(&self) -> BufferSurface {
        self.buffer
    }

    pub fn reveal_pending(&self) -> bool {
        self.reveal_timer.is_armed() || self.buffer.revealing_since.is_some()
    }

    /// Horizontal offset of the strip in px.
    pub fn translate_x(&self, now: Instant) -> f32 {
        match self.phase {
            TransitionPhase::Idle => self.current as f32 * self.shift,
            TransitionPhase::Preparing { from, .. } => from as f32 * self.shift,
            TransitionPhase::Animating {
                from,
                to,
                start,
                duration,
            } => {
                let eased = ease_out_cubic(progress(start, duration, now));
                (from as f32 + (to as f32 - from as f32) * eased) * self.shift
            }
        }
    }

    pub fn buffer_scale(&self, now: Instant) -> f32 {
        match self.buffer.revealing_since {
            Some(since) => {
                let t = ease_out_cubic(progress(since, self.tuning.reveal_duration(), now));
                self.buffer.scale + (1.0 - self.buffer.scale) * t
            }
            None => self.buffer.scale,
        }
    }

    /// Lands on `page` without animation and realigns the buffer.
    pub fn jump_to(&mut self, page: usize, shift: f32, _now: Instant) {
        if self.is_animating() {
            debug!("Jump to page {page} supersedes turn to {}", self.target_page());
        }
        self.shift = shift;
        self.phase = TransitionPhase::Idle;
        self.current = page;
        self.reveal_timer.cancel();
        self.buffer = BufferSurface {
            page,
            scale: 1.0,
            revealing_since: None,
        };
        self.events.push_back(TransitionEvent::Settled(page));
    }

    pub fn request_turn(
        &mut self,
        to: usize,
        total_pages: usize,
        shift: f32,
        turn_speed: f32,
        immediate: bool,
        now: Instant,
    ) -> TurnOutcome {
        self.cancel(now);
        self.shift = shift;

        let to = to.min(total_pages.saturating_sub(1));
        if to == self.current {
            return TurnOutcome::Unchanged;
        }
        if immediate {
            self.jump_to(to, shift, now);
            return TurnOutcome::Jumped(to);
        }

        self.reveal_timer.cancel();
        self.buffer = BufferSurface {
            page: to,
            scale: self.tuning.reveal_scale,
            revealing_since: None,
        };
        let from = self.current;
        self.phase = TransitionPhase::Preparing {
            from,
            to,
            duration: self.tuning.turn_duration(turn_speed),
        };
        debug!("Turning page {from} -> {to}");
        TurnOutcome::Started { from, to }
    }

    /// Stops any turn in flight by finalizing it at its target.
    pub fn cancel(&mut self, now: Instant) {
        if let TransitionPhase::Preparing { to, .. } | TransitionPhase::Animating { to, .. } =
            self.phase
        {
            self.settle(to, now);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            TransitionPhase::Idle => {}
            TransitionPhase::Preparing { from, to, duration } => {
                self.phase = TransitionPhase::Animating {
                    from,
                    to,
                    start: now,
                    duration,
                };
            }
            TransitionPhase::Animating {
                to,
                start,
                duration,
                ..
            } => {
                if now.saturating_duration_since(start) >= duration {
                    self.settle(to, now);
                }
            }
        }

        if self.reveal_timer.fire_if_due(now) {
            self.buffer.revealing_since = Some(now);
        }
        if let Some(since) = self.buffer.revealing_since {
            if now.saturating_duration_since(since) >= self.tuning.reveal_duration() {
                self.buffer.revealing_since = None;
                self.buffer.scale = 1.0;
                self.events
                    .push_back(TransitionEvent::Revealed(self.buffer.page));
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<TransitionEvent> {
        self.events.drain(..).collect()
    }

    fn settle(&mut self, page: usize, now: Instant) {
        self.phase = TransitionPhase::Idle;
        self.current = page;
        self.buffer = BufferSurface {
            page,
            scale: self.tuning.reveal_scale,
            revealing_since: None,
        };
        self.reveal_timer.schedule(now + self.tuning.reveal_delay());
        self.events.push_back(TransitionEvent::Settled(page));
    }
}
