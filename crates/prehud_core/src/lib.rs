//! # Pre-HUD Core
//!
//! Picks the last scene render pass of each frame in a multi-pass command
//! stream and injects a post-processing effect stack there, before the HUD is
//! drawn on top.
//!
//! ## Features
//!
//! - **Signature Selection**: backbuffer-match scoring and a streak over `(render target, depth)` pairs
//! - **Scene Lock**: pins the trusted pair, survives short detours, migrates on sustained change
//! - **Guarded Injection**: at most once per frame, behind request, timing and fault gates
//! - **Recovery**: reload debounce, stale-lock re-arm, watchdog and weather signal
//! - **Depth Binding**: exposes the scene depth buffer to the effects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use prehud_core::backend::synthetic::{SyntheticCompositor, SyntheticDevice};
//! use prehud_core::prelude::*;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let mut engine = SelectionEngine::new(SelectorConfig::default(), Arc::new(SelectorShared::new()))?;
//!     let mut device = SyntheticDevice::new();
//!     let mut compositor = SyntheticCompositor::new(Resource(1));
//!     let trigger = engine.trigger();
//!
//!     engine.on_init();
//!     engine.on_present(&mut device, &mut compositor, Instant::now());
//!     trigger.request_injection();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;

pub mod backend;
pub mod selection;

/// Common imports for hosts
pub mod prelude {
    pub use crate::{
        backend::{CommandList, EffectCompositor, GraphicsDevice, Resource, ResourceDesc, ResourceView},
        config::Config,
        core::{ConfigError, SelectorConfig},
        selection::{
            EffectsGateHandle, PassOutcome, ReloadDecision, SceneSignature, SelectionEngine, SelectionState,
            SelectorShared, SelectorSnapshot, TriggerHandle, TriggerOutcome,
        },
    };
}
