//! # Backend Module
//!
//! The boundary between the selector and the host graphics layer.
//!
//! ## Organization
//!
//! - **Handles**: opaque resource/view/command-list identifiers and shape descriptors
//! - **Device**: the traits the host implements ([`GraphicsDevice`], [`EffectCompositor`])
//! - **Synthetic**: in-memory implementations for tests and replays

pub mod device;
pub mod handles;
pub mod synthetic;

pub use device::{DeviceError, EffectCompositor, GraphicsDevice, RenderFault};
pub use handles::{CommandList, Resource, ResourceDesc, ResourceKind, ResourceView};
