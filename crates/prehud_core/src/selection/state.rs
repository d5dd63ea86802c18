//! Selection lifecycle
//!
//! `Disabled -> Stabilizing -> Armed -> Active`, with resets back to
//! `Stabilizing` and re-arms from `Active` back to `Armed`. The machine only
//! tracks the state and its countdowns; the engine decides when to move.

use serde::Serialize;

use crate::core::{ReloadConfig, SignatureConfig};

/// Lifecycle state of the selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum SelectionState {
    /// No graphics context
    #[default]
    Disabled = 0,
    /// Waiting out a settle countdown; requests are dropped
    Stabilizing = 1,
    /// Looking for a trusted scene signature
    Armed = 2,
    /// Injecting
    Active = 3,
}

impl SelectionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Stabilizing,
            2 => Self::Armed,
            3 => Self::Active,
            _ => Self::Disabled,
        }
    }

    /// Short lowercase name for logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Stabilizing => "stabilizing",
            Self::Armed => "armed",
            Self::Active => "active",
        }
    }
}

impl std::fmt::Display for SelectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened to a reload notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadDecision {
    /// No graphics context
    NotAlive,
    /// A successful injection happened too recently
    IgnoredHealthy,
    /// Another reload was accepted too recently
    IgnoredDebounced,
    /// The selector must re-stabilize
    Accepted,
}

/// State plus the frame-based countdowns attached to it
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: SelectionState,
    settle_frames: u32,
    skip_frames: u32,
    armed_since: u64,
    last_reload_frame: Option<u64>,
}

impl StateMachine {
    /// Machine in `Disabled`
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// Remaining settle frames
    pub fn settle_frames(&self) -> u32 {
        self.settle_frames
    }

    /// Remaining skip frames
    pub fn skip_frames(&self) -> u32 {
        self.skip_frames
    }

    /// Frame the machine last entered `Armed`
    pub fn armed_since(&self) -> u64 {
        self.armed_since
    }

    /// Enter `Stabilizing` for `settle_frames`, skipping at least `min_skip` frames
    pub fn stabilize(&mut self, settle_frames: u32, min_skip: u32) {
        self.state = SelectionState::Stabilizing;
        self.settle_frames = settle_frames;
        self.skip_frames = self.skip_frames.max(min_skip);
    }

    /// Enter `Armed` at `frame`
    pub fn arm(&mut self, frame: u64) {
        self.state = SelectionState::Armed;
        self.armed_since = frame;
    }

    /// Enter `Active`
    pub fn activate(&mut self) {
        self.state = SelectionState::Active;
    }

    /// Back to `Disabled` with all countdowns cleared
    pub fn disable(&mut self) {
        *self = Self::default();
    }

    /// Raise the skip countdown to at least `frames`
    pub fn raise_skip(&mut self, frames: u32) {
        self.skip_frames = self.skip_frames.max(frames);
    }

    /// Count one skip frame down
    pub fn tick_skip(&mut self) {
        self.skip_frames = self.skip_frames.saturating_sub(1);
    }

    /// Advance the settle countdown; returns true when it just ran out
    ///
    /// Only meaningful while stabilizing. The frame that finds the countdown
    /// at zero is the one that leaves `Stabilizing`.
    pub fn tick_settle(&mut self) -> bool {
        if self.state != SelectionState::Stabilizing {
            return false;
        }
        if self.settle_frames > 0 {
            self.settle_frames -= 1;
            return false;
        }
        true
    }

    /// Whether a streak should promote `Armed -> Active`
    pub fn streak_promotes(&self, streak: u32, config: &SignatureConfig) -> bool {
        self.state == SelectionState::Armed && streak >= config.streak_required
    }

    /// Whether the armed-duration fallback should promote at `frame`
    pub fn armed_timeout_promotes(&self, frame: u64, streak: u32, config: &SignatureConfig) -> bool {
        self.state == SelectionState::Armed
            && streak >= 1
            && frame.saturating_sub(self.armed_since) > config.armed_timeout_frames
    }

    /// Decide what to do with a reload notification at `frame`
    ///
    /// A notification inside the healthy window is dropped without touching the
    /// debounce bookkeeping.
    pub fn on_reload(&mut self, frame: u64, last_injection_frame: Option<u64>, config: &ReloadConfig) -> ReloadDecision {
        if let Some(injected) = last_injection_frame {
            if frame.saturating_sub(injected) < config.healthy_window_frames {
                return ReloadDecision::IgnoredHealthy;
            }
        }

        let previous = self.last_reload_frame.replace(frame);
        if let Some(previous) = previous {
            if frame.saturating_sub(previous) < config.debounce_frames {
                return ReloadDecision::IgnoredDebounced;
            }
        }
        ReloadDecision::Accepted
    }
}
