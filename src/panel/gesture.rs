use std::time::{Duration, Instant};
use tracing::debug;

/// Recognized press on a position control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Released before the threshold: select the position
    Tap(usize),
    /// Held past the threshold: edit the position
    LongPress(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressState {
    Idle,
    Pressed { index: usize, since: Instant },
    /// Long press already reported; waiting for release
    Held { index: usize },
}

/// Tap vs long-press recognizer driven by timestamped events
///
/// A long press fires as soon as `poll` observes the threshold elapsed, while the
/// control is still held; the later release is then swallowed. Only one control
/// can be pressed at a time.
#[derive(Debug)]
pub struct PressTracker {
    threshold: Duration,
    state: PressState,
}

impl PressTracker {
    pub const fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            state: PressState::Idle,
        }
    }

    pub const fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Index currently held down, if any
    pub const fn pressed(&self) -> Option<usize> {
        match self.state {
            PressState::Idle => None,
            PressState::Pressed { index, .. } | PressState::Held { index } => Some(index),
        }
    }

    /// Starts timing a press; restarts if another press was in flight
    pub fn press(&mut self, index: usize, now: Instant) {
        if let Some(previous) = self.pressed() {
            debug!(previous, index, "press restarted before release");
        }
        self.state = PressState::Pressed { index, since: now };
    }

    /// Reports a long press once the threshold has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<Gesture> {
        match self.state {
            PressState::Pressed { index, since }
                if now.saturating_duration_since(since) >= self.threshold =>
            {
                self.state = PressState::Held { index };
                Some(Gesture::LongPress(index))
            }
            _ => None,
        }
    }

    /// Ends a press
    ///
    /// A release after the threshold that `poll` has not yet seen still counts as
    /// a long press. A release of a control that is not pressed is ignored.
    pub fn release(&mut self, index: usize, now: Instant) -> Option<Gesture> {
        if self.pressed() != Some(index) {
            debug!(index, "release without matching press ignored");
            return None;
        }

        let gesture = self.poll(now);
        let state = std::mem::replace(&mut self.state, PressState::Idle);
        match (gesture, state) {
            (Some(gesture), _) => Some(gesture),
            (None, PressState::Pressed { index, .. }) => Some(Gesture::Tap(index)),
            (None, _) => None,
        }
    }

    /// Drops any press in flight without reporting a gesture
    pub fn reset(&mut self) {
        self.state = PressState::Idle;
    }
}
