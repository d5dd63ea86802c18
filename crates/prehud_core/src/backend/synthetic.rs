//! In-memory stand-ins for the host graphics layer
//!
//! Used by the scenario tests and by the `pass_replay` tool to drive the
//! selector with a scripted command stream. Nothing here touches a GPU.

use std::collections::HashMap;

use ash::vk;

use super::device::{DeviceError, EffectCompositor, GraphicsDevice, RenderFault};
use super::handles::{CommandList, Resource, ResourceDesc, ResourceView};

/// First handle value handed out for views created by the selector
const CREATED_VIEW_BASE: u64 = 1 << 32;

/// Synthetic resource table
#[derive(Debug)]
pub struct SyntheticDevice {
    resources: HashMap<Resource, ResourceDesc>,
    views: HashMap<ResourceView, (Resource, vk::Format)>,
    next_view: u64,
    fail_view_creation: bool,
    created_views: Vec<ResourceView>,
    destroyed_views: Vec<ResourceView>,
}

impl SyntheticDevice {
    /// Empty device
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            views: HashMap::new(),
            next_view: CREATED_VIEW_BASE,
            fail_view_creation: false,
            created_views: Vec::new(),
            destroyed_views: Vec::new(),
        }
    }

    /// Register a resource
    pub fn add_resource(&mut self, resource: Resource, desc: ResourceDesc) {
        self.resources.insert(resource, desc);
    }

    /// Register a view onto an existing resource
    pub fn add_view(&mut self, view: ResourceView, resource: Resource) {
        let format = self.resources.get(&resource).map_or(vk::Format::UNDEFINED, |desc| desc.format);
        self.views.insert(view, (resource, format));
    }

    /// Register a 2D texture together with a view whose handle equals the resource handle
    pub fn add_texture(&mut self, id: u64, desc: ResourceDesc) -> ResourceView {
        let resource = Resource(id);
        let view = ResourceView(id);
        self.add_resource(resource, desc);
        self.add_view(view, resource);
        view
    }

    /// Make every subsequent view creation fail
    pub fn set_fail_view_creation(&mut self, fail: bool) {
        self.fail_view_creation = fail;
    }

    /// Views created so far
    pub fn created_views(&self) -> &[ResourceView] {
        &self.created_views
    }

    /// Views destroyed so far
    pub fn destroyed_views(&self) -> &[ResourceView] {
        &self.destroyed_views
    }

    /// Views created and not yet destroyed
    pub fn live_created_views(&self) -> usize {
        self.created_views
            .iter()
            .filter(|view| !self.destroyed_views.contains(view))
            .count()
    }
}

impl GraphicsDevice for SyntheticDevice {
    fn resource_from_view(&self, view: ResourceView) -> Resource {
        self.views.get(&view).map_or(Resource::NULL, |(resource, _)| *resource)
    }

    fn resource_desc(&self, resource: Resource) -> ResourceDesc {
        self.resources.get(&resource).copied().unwrap_or_default()
    }

    fn view_format(&self, view: ResourceView) -> vk::Format {
        self.views.get(&view).map_or(vk::Format::UNDEFINED, |(_, format)| *format)
    }

    fn create_shader_view(&mut self, resource: Resource, format: vk::Format) -> Result<ResourceView, DeviceError> {
        if !self.resources.contains_key(&resource) {
            return Err(DeviceError::UnknownResource(resource));
        }
        if self.fail_view_creation {
            return Err(DeviceError::ViewCreationFailed {
                resource,
                format,
                reason: "synthetic failure".to_string(),
            });
        }
        let view = ResourceView(self.next_view);
        self.next_view += 1;
        self.views.insert(view, (resource, format));
        self.created_views.push(view);
        Ok(view)
    }

    fn destroy_view(&mut self, view: ResourceView) {
        self.views.remove(&view);
        self.destroyed_views.push(view);
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// How the synthetic compositor fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultMode {
    /// Every render call succeeds
    #[default]
    Never,
    /// Render calls return an error
    Report,
    /// Render calls panic
    Panic,
}

/// One recorded `render_effects` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCall {
    /// Command list passed in
    pub cmd: CommandList,
    /// View sampled by the effects
    pub read: ResourceView,
    /// View written by the effects
    pub write: ResourceView,
}

/// Synthetic effect compositor
#[derive(Debug, Default)]
pub struct SyntheticCompositor {
    back_buffer: Resource,
    fault_mode: FaultMode,
    render_calls: Vec<RenderCall>,
    bindings: Vec<(String, ResourceView)>,
}

impl SyntheticCompositor {
    /// Compositor presenting `back_buffer`
    pub fn new(back_buffer: Resource) -> Self {
        Self {
            back_buffer,
            ..Self::default()
        }
    }

    /// Change the presented backbuffer (swapchain image churn)
    pub fn set_back_buffer(&mut self, back_buffer: Resource) {
        self.back_buffer = back_buffer;
    }

    /// Change how render calls fail
    pub fn set_fault_mode(&mut self, mode: FaultMode) {
        self.fault_mode = mode;
    }

    /// Render calls seen so far, including failed ones
    pub fn render_calls(&self) -> &[RenderCall] {
        &self.render_calls
    }

    /// Texture bindings seen so far
    pub fn bindings(&self) -> &[(String, ResourceView)] {
        &self.bindings
    }

    /// Most recent view bound to `semantic`
    pub fn bound_view(&self, semantic: &str) -> Option<ResourceView> {
        self.bindings
            .iter()
            .rev()
            .find(|(name, _)| name == semantic)
            .map(|(_, view)| *view)
    }
}

impl EffectCompositor for SyntheticCompositor {
    fn current_back_buffer(&self) -> Resource {
        self.back_buffer
    }

    fn render_effects(&mut self, cmd: CommandList, read: ResourceView, write: ResourceView) -> Result<(), RenderFault> {
        self.render_calls.push(RenderCall { cmd, read, write });
        match self.fault_mode {
            FaultMode::Never => Ok(()),
            FaultMode::Report => Err(RenderFault::Reported("synthetic device lost".to_string())),
            FaultMode::Panic => panic!("synthetic fault inside render_effects"),
        }
    }

    fn update_texture_binding(&mut self, semantic: &str, view: ResourceView) {
        self.bindings.push((semantic.to_string(), view));
    }
}
