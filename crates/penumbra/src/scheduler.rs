//! Per-frame work planning
//!
//! The scheduler decides, once per tick, whether any work runs and whether it
//! is a full recompute or a partial one. It never reads the clock itself:
//! every entry point takes the current [`Instant`].

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Animating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Seed, flood, distance field, every cascade, composite
    Full,
    /// Finer half of the cascade chain and composite
    Partial,
}

#[derive(Debug, Clone)]
pub struct FrameScheduler {
    state: SchedulerState,
    last_interaction: Option<Instant>,
    idle_timeout: Duration,
    amortized: bool,
    drawing: bool,
    next: Phase,
    /// A full phase has run since partial state was last discarded
    primed: bool,
}

impl FrameScheduler {
    pub fn new(idle_timeout: Duration, amortized: bool) -> Self {
        Self {
            state: SchedulerState::Animating,
            last_interaction: None,
            idle_timeout,
            amortized,
            drawing: false,
            next: Phase::Full,
            primed: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn notify_interaction(&mut self, now: Instant) {
        if self.state == SchedulerState::Idle {
            log::debug!("Scheduler waking up");
        }
        self.state = SchedulerState::Animating;
        self.last_interaction = Some(now);
    }

    pub fn start_drawing(&mut self, now: Instant) {
        self.drawing = true;
        self.notify_interaction(now);
    }

    pub fn move_to(&mut self, now: Instant) {
        self.notify_interaction(now);
    }

    pub fn stop_drawing(&mut self, now: Instant) {
        self.drawing = false;
        self.notify_interaction(now);
    }

    /// Next phase runs full, but retained partial state stays usable.
    pub fn force_full(&mut self) {
        self.next = Phase::Full;
    }

    /// Settings changed: run full next and forget retained partial state.
    pub fn configuration_changed(&mut self, now: Instant, idle_timeout: Duration, amortized: bool) {
        self.idle_timeout = idle_timeout;
        self.amortized = amortized;
        self.next = Phase::Full;
        self.primed = false;
        self.notify_interaction(now);
    }

    /// Plan the work for this tick. `None` means nothing runs.
    pub fn tick(&mut self, now: Instant) -> Option<Phase> {
        if self.state == SchedulerState::Idle {
            return None;
        }
        let last = *self.last_interaction.get_or_insert(now);
        if now.saturating_duration_since(last) >= self.idle_timeout {
            log::debug!("Scheduler idle after {:?} without interaction", self.idle_timeout);
            self.state = SchedulerState::Idle;
            return None;
        }

        let phase = if self.amortized && !self.drawing && self.primed {
            self.next
        } else {
            Phase::Full
        };
        self.next = match phase {
            Phase::Full => Phase::Partial,
            Phase::Partial => Phase::Full,
        };
        if phase == Phase::Full {
            self.primed = true;
        }
        log::trace!("Tick plan: {:?}", phase);
        Some(phase)
    }
}
