//! Backbuffer-match scoring
//!
//! A pass that renders into the presented image is almost certainly the scene
//! or a post chain on top of it; a pass that renders into something of the same
//! size is a weaker hint. Shadow maps, reflections and UI atlases rarely match
//! either.

use crate::backend::{EffectCompositor, GraphicsDevice, Resource, ResourceDesc, ResourceView};
use crate::core::SignatureConfig;

/// Identity and shape of the presented image for the current frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackbufferInfo {
    /// Backbuffer resource (null if the compositor has none yet)
    pub resource: Resource,
    /// Backbuffer shape
    pub desc: ResourceDesc,
}

impl BackbufferInfo {
    /// Ask the compositor and device for the current backbuffer
    pub fn query<D, C>(device: &D, compositor: &C) -> Self
    where
        D: GraphicsDevice + ?Sized,
        C: EffectCompositor + ?Sized,
    {
        let resource = compositor.current_back_buffer();
        let desc = if resource.is_null() {
            ResourceDesc::default()
        } else {
            device.resource_desc(resource)
        };
        Self { resource, desc }
    }

    /// Whether `resource` is the backbuffer
    pub fn is_backbuffer(&self, resource: Resource) -> bool {
        !resource.is_null() && resource == self.resource
    }

    /// Whether `desc` is a 2D texture with the backbuffer's extent
    pub fn matches_size(&self, desc: &ResourceDesc) -> bool {
        self.desc.has_extent() && desc.matches_extent(self.desc.extent)
    }
}

/// A render-target view together with its resource and shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// View bound by the pass
    pub view: ResourceView,
    /// Resource behind the view
    pub resource: Resource,
    /// Resource shape
    pub desc: ResourceDesc,
}

/// Resolve every non-null render-target view of a pass
pub fn resolve_targets<D>(device: &D, views: &[ResourceView]) -> Vec<ResolvedTarget>
where
    D: GraphicsDevice + ?Sized,
{
    views
        .iter()
        .filter_map(|view| {
            let resource = device.resource_from_view(*view).non_null()?;
            Some(ResolvedTarget {
                view: *view,
                resource,
                desc: device.resource_desc(resource),
            })
        })
        .collect()
}

/// Score a pass's render targets against the backbuffer
///
/// `backbuffer_score` if any target is the backbuffer, else `size_match_score`
/// if any 2D target has the backbuffer's extent, else 0.
pub fn score_targets(targets: &[ResolvedTarget], backbuffer: &BackbufferInfo, config: &SignatureConfig) -> u32 {
    if backbuffer.resource.is_null() {
        return 0;
    }
    let mut score = 0;
    for target in targets {
        if backbuffer.is_backbuffer(target.resource) {
            return config.backbuffer_score;
        }
        if backbuffer.matches_size(&target.desc) {
            score = config.size_match_score;
        }
    }
    score
}

/// The target that is the backbuffer, if any
pub fn backbuffer_target(targets: &[ResolvedTarget], backbuffer: &BackbufferInfo) -> Option<ResolvedTarget> {
    targets
        .iter()
        .find(|target| backbuffer.is_backbuffer(target.resource))
        .copied()
}

/// The first full-resolution 2D target, if any
pub fn full_size_target(targets: &[ResolvedTarget], backbuffer: &BackbufferInfo) -> Option<ResolvedTarget> {
    targets
        .iter()
        .find(|target| backbuffer.matches_size(&target.desc))
        .copied()
}

/// Backbuffer target, falling back to a full-resolution one
pub fn choose_scene_target(targets: &[ResolvedTarget], backbuffer: &BackbufferInfo) -> Option<ResolvedTarget> {
    backbuffer_target(targets, backbuffer).or_else(|| full_size_target(targets, backbuffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::synthetic::SyntheticDevice;
    use ash::vk;

    fn setup() -> (SyntheticDevice, BackbufferInfo) {
        let mut device = SyntheticDevice::new();
        let hd = ResourceDesc::texture_2d(1920, 1080, vk::Format::B8G8R8A8_UNORM);
        device.add_texture(1, hd);
        device.add_texture(2, hd);
        device.add_texture(3, ResourceDesc::texture_2d(512, 512, vk::Format::R8G8B8A8_UNORM));
        let backbuffer = BackbufferInfo {
            resource: Resource(1),
            desc: hd,
        };
        (device, backbuffer)
    }

    #[test]
    fn test_backbuffer_target_scores_highest() {
        let (device, backbuffer) = setup();
        let config = SignatureConfig::default();
        let targets = resolve_targets(&device, &[ResourceView(3), ResourceView(2), ResourceView(1)]);
        assert_eq!(score_targets(&targets, &backbuffer, &config), 1000);
        assert_eq!(choose_scene_target(&targets, &backbuffer).map(|t| t.resource), Some(Resource(1)));
    }

    #[test]
    fn test_size_match_scores_600() {
        let (device, backbuffer) = setup();
        let config = SignatureConfig::default();
        let targets = resolve_targets(&device, &[ResourceView(3), ResourceView(2)]);
        assert_eq!(score_targets(&targets, &backbuffer, &config), 600);
        assert_eq!(choose_scene_target(&targets, &backbuffer).map(|t| t.resource), Some(Resource(2)));
    }

    #[test]
    fn test_unrelated_targets_score_zero() {
        let (device, backbuffer) = setup();
        let config = SignatureConfig::default();
        let targets = resolve_targets(&device, &[ResourceView(3)]);
        assert_eq!(score_targets(&targets, &backbuffer, &config), 0);
        assert_eq!(choose_scene_target(&targets, &backbuffer), None);
    }

    #[test]
    fn test_no_backbuffer_means_no_score() {
        let (device, _) = setup();
        let config = SignatureConfig::default();
        let targets = resolve_targets(&device, &[ResourceView(1)]);
        assert_eq!(score_targets(&targets, &BackbufferInfo::default(), &config), 0);
    }

    #[test]
    fn test_unknown_and_null_views_are_dropped() {
        let (device, _) = setup();
        let targets = resolve_targets(&device, &[ResourceView::NULL, ResourceView(77), ResourceView(2)]);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].resource, Resource(2));
    }
}
