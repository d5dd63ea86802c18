//! # Host Graphics Seams
//!
//! The selector never talks to a graphics API directly. It consumes two traits
//! implemented by the host integration layer:
//!
//! - [`GraphicsDevice`]: resolves views to resources, describes resources and
//!   creates/destroys the views the selector owns
//! - [`EffectCompositor`]: the effect stack being injected, plus the current
//!   backbuffer identity
//!
//! Both are called only from the graphics-submission thread.

use ash::vk;
use thiserror::Error;

use super::handles::{CommandList, Resource, ResourceDesc, ResourceView};

/// Errors raised by the host graphics layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device refused to create a view
    #[error("View creation failed for resource {resource:?} ({format:?}): {reason}")]
    ViewCreationFailed {
        /// Resource the view was requested for
        resource: Resource,
        /// Requested view format
        format: vk::Format,
        /// Host-provided reason
        reason: String,
    },

    /// The resource is unknown to the device
    #[error("Unknown resource: {0:?}")]
    UnknownResource(Resource),
}

/// A fault raised while the compositor recorded its effects
///
/// Either the compositor reported the failure itself or it panicked inside the
/// fault barrier. In both cases the command-recording state is assumed to be
/// unrecoverable for the rest of the context lifetime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderFault {
    /// The compositor returned an error
    #[error("Effect rendering failed: {0}")]
    Reported(String),

    /// The compositor panicked
    #[error("Effect rendering panicked: {0}")]
    Panicked(String),
}

/// Resource identity resolver and view factory
pub trait GraphicsDevice {
    /// Underlying resource of a view (null if unknown)
    fn resource_from_view(&self, view: ResourceView) -> Resource;

    /// Shape of a resource (default descriptor if unknown)
    fn resource_desc(&self, resource: Resource) -> ResourceDesc;

    /// Format of a view
    fn view_format(&self, view: ResourceView) -> vk::Format;

    /// Create a shader-resource view over `resource`
    fn create_shader_view(&mut self, resource: Resource, format: vk::Format) -> Result<ResourceView, DeviceError>;

    /// Destroy a view created by [`GraphicsDevice::create_shader_view`]
    fn destroy_view(&mut self, view: ResourceView);
}

/// Downstream effect compositor
pub trait EffectCompositor {
    /// Resource currently presented for this frame
    fn current_back_buffer(&self) -> Resource;

    /// Render all enabled effects into `write`, sampling `read`
    fn render_effects(&mut self, cmd: CommandList, read: ResourceView, write: ResourceView) -> Result<(), RenderFault>;

    /// Bind `view` to a texture semantic used by the effects
    fn update_texture_binding(&mut self, semantic: &str, view: ResourceView);
}
