//! Gate for the compositor's own effects pass
//!
//! While the selector injects effects before the HUD, the compositor's regular
//! end-of-frame effects pass would apply them a second time on top of the HUD.
//! The gate blocks the draws of that regular pass. The injector grants a
//! one-shot budget bound to its command list and frame so that its own render
//! call passes through.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::backend::CommandList;

/// Effects-pass gate state
#[derive(Debug, Default)]
pub struct EffectsGate {
    suppress_regular: AtomicBool,
    budget: AtomicU32,
    budget_cmd: AtomicU64,
    budget_frame: AtomicU64,
    blocking: AtomicBool,
}

impl EffectsGate {
    /// Gate that lets everything through
    pub const fn new() -> Self {
        Self {
            suppress_regular: AtomicBool::new(false),
            budget: AtomicU32::new(0),
            budget_cmd: AtomicU64::new(0),
            budget_frame: AtomicU64::new(0),
            blocking: AtomicBool::new(false),
        }
    }

    /// Whether regular effects passes are blocked
    pub fn set_suppress_regular(&self, suppress: bool) {
        self.suppress_regular.store(suppress, Ordering::Relaxed);
    }

    /// Let exactly one effects pass on `cmd` during `frame` through
    pub fn grant(&self, cmd: CommandList, frame: u64) {
        self.budget_cmd.store(cmd.0, Ordering::Relaxed);
        self.budget_frame.store(frame, Ordering::Relaxed);
        self.budget.store(1, Ordering::Relaxed);
    }

    /// Withdraw any unused grant
    pub fn revoke(&self) {
        self.budget.store(0, Ordering::Relaxed);
    }

    /// Compositor is about to run an effects pass on `cmd`; returns whether it is blocked
    pub fn begin_effects(&self, cmd: CommandList, frame: u64) -> bool {
        let granted = self.budget.load(Ordering::Relaxed) > 0
            && self.budget_frame.load(Ordering::Relaxed) == frame
            && self.budget_cmd.load(Ordering::Relaxed) == cmd.0;
        if granted {
            self.budget.fetch_sub(1, Ordering::Relaxed);
        }
        let block = self.suppress_regular.load(Ordering::Relaxed) && !granted;
        self.blocking.store(block, Ordering::Relaxed);
        block
    }

    /// Compositor finished its effects pass
    pub fn finish_effects(&self) {
        self.blocking.store(false, Ordering::Relaxed);
    }

    /// Whether draws/dispatches recorded right now belong to a blocked pass
    pub fn should_block_draw(&self) -> bool {
        self.blocking.load(Ordering::Relaxed)
    }

    /// Clear grants and any in-flight block
    pub fn reset(&self) {
        self.revoke();
        self.budget_cmd.store(0, Ordering::Relaxed);
        self.budget_frame.store(0, Ordering::Relaxed);
        self.blocking.store(false, Ordering::Relaxed);
    }
}
