//! # Scene-Pass Selection
//!
//! Decides, frame by frame, which render pass is the last scene pass before
//! HUD compositing and injects the effect stack there exactly once.
//!
//! ## Organization
//!
//! - **Clock / Request**: frame and pass counters, the single-slot request channel
//! - **Shared**: relaxed atomics visible to trigger threads and compositor callbacks
//! - **Scoring / Signature**: backbuffer-match scoring and the signature streak
//! - **Lock**: the pinned scene pair, miss accounting and render-target migration
//! - **State**: the `Disabled -> Stabilizing -> Armed -> Active` lifecycle
//! - **Injector**: the gates, the fault barrier and the fault latch
//! - **Depth binder**: the depth buffer exposed to the effects
//! - **Effects gate**: blocks the compositor's own post-HUD effects pass
//! - **Engine**: [`SelectionEngine`], which wires the above into the host callbacks

pub mod clock;
pub mod depth_binder;
pub mod effects_gate;
pub mod engine;
pub mod injector;
pub mod lock;
pub mod request;
pub mod scoring;
pub mod shared;
pub mod signature;
pub mod state;

#[cfg(test)]
mod tests;

pub use clock::FrameClock;
pub use depth_binder::{BoundDepth, DepthBinder, DepthCandidate, DepthCommit};
pub use effects_gate::EffectsGate;
pub use engine::{PassOutcome, SelectionEngine, SelectorSnapshot};
pub use injector::{FaultBarrier, FaultLatch, InjectionContext, InjectionOutcome, RejectReason, RenderInjector};
pub use lock::{LockManager, LockVerdict};
pub use request::{PendingRequest, PostOutcome, RequestChannel};
pub use scoring::{BackbufferInfo, ResolvedTarget};
pub use shared::{EffectsGateHandle, SelectorShared, TriggerHandle, TriggerOutcome};
pub use signature::{SceneSignature, SignatureTracker};
pub use state::{ReloadDecision, SelectionState, StateMachine};
