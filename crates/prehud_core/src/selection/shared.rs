//! Cross-thread selector signals
//!
//! The submission thread owns the [`SelectionEngine`](super::SelectionEngine).
//! Everything trigger threads and compositor callbacks may touch lives here as
//! relaxed atomics.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use super::clock::FrameClock;
use super::effects_gate::EffectsGate;
use super::request::{PostOutcome, RequestChannel};
use super::state::SelectionState;
use crate::backend::CommandList;

/// Atomics shared between the submission thread and everyone else
#[derive(Debug, Default)]
pub struct SelectorShared {
    /// Frame/pass counters
    pub clock: FrameClock,
    /// Pending-request slot
    pub requests: RequestChannel,
    /// Compositor effects-pass gate
    pub effects: EffectsGate,
    state: AtomicU8,
    alive: AtomicBool,
    weather_pending: AtomicBool,
    weather_value: AtomicU32,
}

impl SelectorShared {
    /// Fresh signals: clock at zero, state `Disabled`, context not alive
    pub const fn new() -> Self {
        Self {
            clock: FrameClock::new(),
            requests: RequestChannel::new(),
            effects: EffectsGate::new(),
            state: AtomicU8::new(SelectionState::Disabled as u8),
            alive: AtomicBool::new(false),
            weather_pending: AtomicBool::new(false),
            weather_value: AtomicU32::new(0),
        }
    }

    /// Selection state as last published by the submission thread
    pub fn state(&self) -> SelectionState {
        SelectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn publish_state(&self, state: SelectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Whether a graphics context is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    /// Take the weather value posted since the last call, if any
    pub(crate) fn take_weather_change(&self) -> Option<u32> {
        if self.weather_pending.swap(false, Ordering::Relaxed) {
            Some(self.weather_value.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    pub(crate) fn clear_weather_change(&self) {
        self.weather_pending.store(false, Ordering::Relaxed);
    }
}

/// Why a trigger request was not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Stored as the pending request
    Accepted,
    /// Folded into a request already pending for this frame
    Coalesced,
    /// No graphics context
    NotAlive,
    /// Selector is disabled or stabilizing
    NotReady,
    /// Too many passes into the frame already
    TooLate,
}

impl TriggerOutcome {
    /// Whether a request is pending after the call
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Accepted | Self::Coalesced)
    }
}

/// Handle for the external trigger source
///
/// Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    shared: Arc<SelectorShared>,
    late_request_passes: u64,
}

impl TriggerHandle {
    pub(crate) fn new(shared: Arc<SelectorShared>, late_request_passes: u64) -> Self {
        Self {
            shared,
            late_request_passes,
        }
    }

    /// Ask for effects to be injected around the current pass
    pub fn request_injection(&self) -> TriggerOutcome {
        if !self.shared.is_alive() {
            return TriggerOutcome::NotAlive;
        }
        if matches!(
            self.shared.state(),
            SelectionState::Disabled | SelectionState::Stabilizing
        ) {
            return TriggerOutcome::NotReady;
        }

        let clock = &self.shared.clock;
        let frame = clock.frame();
        let pass = clock.pass();
        if clock.passes_into_frame(pass) > self.late_request_passes {
            return TriggerOutcome::TooLate;
        }

        match self.shared.requests.post_external(frame, pass) {
            PostOutcome::Accepted => TriggerOutcome::Accepted,
            PostOutcome::Coalesced => TriggerOutcome::Coalesced,
        }
    }

    /// Report a weather/visibility change; consumed on the next present
    pub fn notify_weather_change(&self, value: u32) {
        if !self.shared.is_alive() {
            return;
        }
        self.shared.weather_value.store(value, Ordering::Relaxed);
        self.shared.weather_pending.store(true, Ordering::Relaxed);
    }
}

/// Handle for the compositor's effects-pass callbacks
#[derive(Debug, Clone)]
pub struct EffectsGateHandle {
    shared: Arc<SelectorShared>,
}

impl EffectsGateHandle {
    pub(crate) fn new(shared: Arc<SelectorShared>) -> Self {
        Self { shared }
    }

    /// The compositor is starting an effects pass on `cmd`; returns whether it is blocked
    pub fn on_begin_effects(&self, cmd: CommandList) -> bool {
        self.shared.effects.begin_effects(cmd, self.shared.clock.frame())
    }

    /// The compositor finished its effects pass
    pub fn on_finish_effects(&self) {
        self.shared.effects.finish_effects();
    }

    /// Whether a draw or dispatch issued now should be dropped
    pub fn should_block_draw(&self) -> bool {
        self.shared.effects.should_block_draw()
    }
}
