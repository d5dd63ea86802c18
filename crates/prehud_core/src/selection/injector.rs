//! # Render Injector
//!
//! Calls the compositor's effect render exactly once per frame at the chosen
//! pass. Every gate is evaluated into a [`RejectReason`] mask first; only an
//! empty mask leads to a render call. The call runs inside a [`FaultBarrier`]
//! and a fault trips a [`FaultLatch`] that stays tripped for the rest of the
//! graphics context lifetime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use bitflags::bitflags;
use serde::Serialize;

use crate::backend::{CommandList, EffectCompositor, RenderFault, Resource};
use crate::core::InjectionConfig;

use super::effects_gate::EffectsGate;
use super::request::PendingRequest;
use super::scoring::ResolvedTarget;
use super::state::SelectionState;

bitflags! {
    /// Gates that refused an injection attempt
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct RejectReason: u32 {
        /// Injection is switched off in the configuration
        const DISABLED = 1 << 0;
        /// The fault latch is tripped
        const FAULTED = 1 << 1;
        /// State is not `Active`
        const NOT_ACTIVE = 1 << 2;
        /// The skip countdown is running
        const SKIP_FRAMES = 1 << 3;
        /// No command list
        const NULL_COMMAND_LIST = 1 << 4;
        /// No usable render target
        const NO_RENDER_TARGET = 1 << 5;
        /// No depth target
        const NO_DEPTH_TARGET = 1 << 6;
        /// Render or depth target is multisampled or not a 2D texture
        const UNSUPPORTED_TARGET = 1 << 7;
        /// No pending request
        const NO_REQUEST = 1 << 8;
        /// The request is for another frame
        const WRONG_REQUEST_FRAME = 1 << 9;
        /// The pass is outside the request window
        const REQUEST_WINDOW = 1 << 10;
        /// The pass is too far into the frame
        const LATE_IN_FRAME = 1 << 11;
        /// The previous injection was too few passes ago
        const COOLDOWN = 1 << 12;
        /// Already injected this frame
        const ALREADY_THIS_FRAME = 1 << 13;
        /// The pass is not the locked pair
        const LOCK_MISMATCH = 1 << 14;
    }
}

/// Everything the gates look at for one pass
#[derive(Debug, Clone, Copy)]
pub struct InjectionContext {
    /// Current frame
    pub frame: u64,
    /// Current pass
    pub pass: u64,
    /// First pass of the current frame
    pub frame_start_pass: u64,
    /// Command list of the pass
    pub cmd: CommandList,
    /// Chosen render target
    pub target: Option<ResolvedTarget>,
    /// Depth-target resource
    pub depth: Resource,
    /// Whether the depth target is multisampled or not a 2D texture
    pub depth_unsupported: bool,
    /// Validated pending request
    pub request: Option<PendingRequest>,
    /// Selection state
    pub state: SelectionState,
    /// Skip countdown
    pub skip_frames: u32,
    /// Whether the pass may be used with respect to the lock
    pub lock_allows: bool,
}

/// Result of an injection attempt that passed every gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionOutcome {
    /// Effects were rendered; `count` injections since creation
    Injected {
        /// Injections since creation
        count: u64,
    },
    /// The compositor faulted and the latch tripped
    Faulted(RenderFault),
}

/// One-way latch tripped by the first render fault
#[derive(Debug, Clone, Default)]
pub struct FaultLatch {
    fault: Option<RenderFault>,
}

impl FaultLatch {
    /// Clear latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fault has been recorded
    pub fn is_tripped(&self) -> bool {
        self.fault.is_some()
    }

    /// The recorded fault
    pub fn fault(&self) -> Option<&RenderFault> {
        self.fault.as_ref()
    }

    /// Record `fault`; returns true only for the first one
    pub fn trip(&mut self, fault: RenderFault) -> bool {
        if self.fault.is_some() {
            return false;
        }
        self.fault = Some(fault);
        true
    }
}

/// Runs a foreign render call and reports any failure as a [`RenderFault`]
pub struct FaultBarrier;

impl FaultBarrier {
    /// Run `call`, converting both a returned error and a panic into `Err`
    pub fn run<F>(call: F) -> Result<(), RenderFault>
    where
        F: FnOnce() -> Result<(), RenderFault>,
    {
        match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(result) => result,
            Err(payload) => Err(RenderFault::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Gate evaluation and the guarded render call
#[derive(Debug, Clone)]
pub struct RenderInjector {
    latch: FaultLatch,
    injected_this_frame: bool,
    last_render_pass: Option<u64>,
    last_injection_frame: Option<u64>,
    injections: u64,
    last_reject: RejectReason,
}

impl Default for RenderInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderInjector {
    /// Injector with a fresh latch
    pub fn new() -> Self {
        Self {
            latch: FaultLatch::new(),
            injected_this_frame: false,
            last_render_pass: None,
            last_injection_frame: None,
            injections: 0,
            last_reject: RejectReason::empty(),
        }
    }

    /// Evaluate every gate for `ctx`
    pub fn evaluate(&self, ctx: &InjectionContext, config: &InjectionConfig) -> RejectReason {
        let mut mask = RejectReason::empty();

        if !config.enabled {
            mask |= RejectReason::DISABLED;
        }
        if self.latch.is_tripped() {
            mask |= RejectReason::FAULTED;
        }
        if ctx.state != SelectionState::Active {
            mask |= RejectReason::NOT_ACTIVE;
        }
        if ctx.skip_frames > 0 {
            mask |= RejectReason::SKIP_FRAMES;
        }
        if ctx.cmd.is_null() {
            mask |= RejectReason::NULL_COMMAND_LIST;
        }

        match ctx.target {
            None => mask |= RejectReason::NO_RENDER_TARGET,
            Some(target) if !target.desc.is_texture_2d() || target.desc.is_multisampled() => {
                mask |= RejectReason::UNSUPPORTED_TARGET;
            }
            Some(_) => {}
        }
        if ctx.depth.is_null() {
            mask |= RejectReason::NO_DEPTH_TARGET;
        } else if ctx.depth_unsupported {
            mask |= RejectReason::UNSUPPORTED_TARGET;
        }

        match ctx.request {
            None => mask |= RejectReason::NO_REQUEST,
            Some(request) => {
                if request.frame != ctx.frame {
                    mask |= RejectReason::WRONG_REQUEST_FRAME;
                }
                if !request.within_window(ctx.pass, config.request_window_passes) {
                    mask |= RejectReason::REQUEST_WINDOW;
                }
            }
        }

        let into_frame = ctx.pass.saturating_sub(ctx.frame_start_pass);
        if into_frame == 0 || into_frame > config.frame_phase_passes {
            mask |= RejectReason::LATE_IN_FRAME;
        }
        if let Some(last) = self.last_render_pass {
            if ctx.pass <= last || ctx.pass - last < config.cooldown_passes {
                mask |= RejectReason::COOLDOWN;
            }
        }
        if self.injected_this_frame || self.last_injection_frame == Some(ctx.frame) {
            mask |= RejectReason::ALREADY_THIS_FRAME;
        }
        if !ctx.lock_allows {
            mask |= RejectReason::LOCK_MISMATCH;
        }

        mask
    }

    /// Remember `mask` as the latest outcome; returns whether it changed
    pub fn note_reject(&mut self, mask: RejectReason) -> bool {
        let changed = self.last_reject != mask;
        self.last_reject = mask;
        changed
    }

    /// Render the effects for a pass whose gates all passed
    ///
    /// The compositor's effects gate is granted a one-shot budget for this
    /// call so that its own regular-pass suppression lets it through.
    pub fn inject<C>(
        &mut self,
        compositor: &mut C,
        ctx: &InjectionContext,
        target: ResolvedTarget,
        gate: &EffectsGate,
    ) -> InjectionOutcome
    where
        C: EffectCompositor + ?Sized,
    {
        gate.grant(ctx.cmd, ctx.frame);
        let result = FaultBarrier::run(|| compositor.render_effects(ctx.cmd, target.view, target.view));
        gate.revoke();

        match result {
            Ok(()) => {
                self.injected_this_frame = true;
                self.last_render_pass = Some(ctx.pass);
                self.last_injection_frame = Some(ctx.frame);
                self.injections += 1;
                self.last_reject = RejectReason::empty();
                InjectionOutcome::Injected {
                    count: self.injections,
                }
            }
            Err(fault) => {
                self.latch.trip(fault.clone());
                InjectionOutcome::Faulted(fault)
            }
        }
    }

    /// Start a new frame
    pub fn begin_frame(&mut self) {
        self.injected_this_frame = false;
    }

    /// Forget per-run bookkeeping; the fault latch survives
    pub fn reset(&mut self) {
        self.injected_this_frame = false;
        self.last_render_pass = None;
        self.last_injection_frame = None;
        self.last_reject = RejectReason::empty();
    }

    /// Whether effects were injected in the current frame
    pub fn injected_this_frame(&self) -> bool {
        self.injected_this_frame
    }

    /// Frame of the last injection
    pub fn last_injection_frame(&self) -> Option<u64> {
        self.last_injection_frame
    }

    /// Pass of the last injection
    pub fn last_render_pass(&self) -> Option<u64> {
        self.last_render_pass
    }

    /// Injections since creation
    pub fn injections(&self) -> u64 {
        self.injections
    }

    /// Latest reject mask
    pub fn last_reject(&self) -> RejectReason {
        self.last_reject
    }

    /// The fault latch
    pub fn latch(&self) -> &FaultLatch {
        &self.latch
    }
}
