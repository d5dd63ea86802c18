//! # Depth-Resource Binder
//!
//! Picks the depth buffer exposed to the effects as a sampled texture. Passes
//! report depth candidates with the same backbuffer-match score the scene
//! tracker uses; the best candidate since the last commit wins (score first,
//! then area). Once per frame the candidate is committed, limited by wall
//! clock and guarded by score hysteresis.

use std::time::Instant;

use ash::vk;
use serde::Serialize;

use crate::backend::{DeviceError, EffectCompositor, GraphicsDevice, Resource, ResourceDesc, ResourceView};
use crate::core::DepthBindConfig;
use crate::foundation::time::RateLimiter;

use super::scoring::BackbufferInfo;

/// Best depth candidate seen since the last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthCandidate {
    /// Depth-stencil view the pass bound
    pub view: ResourceView,
    /// Resource behind the view
    pub resource: Resource,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Sample count
    pub samples: u32,
    /// Score of the pass it was seen in
    pub score: u32,
    #[serde(skip)]
    format: vk::Format,
}

impl DepthCandidate {
    fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// The depth resource currently exposed to the effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundDepth {
    /// Bound resource
    pub resource: Resource,
    /// Shader view owned by the binder
    pub view: ResourceView,
    /// Score of the candidate when it was bound
    pub score: u32,
}

/// What a commit attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepthCommit {
    /// Binding disabled or no candidate
    Idle,
    /// Rate limit not yet elapsed
    Throttled,
    /// Candidate extent differs from the backbuffer
    SizeMismatch,
    /// Candidate does not beat the bound score by the hysteresis margin
    Hysteresis,
    /// Candidate is the resource already bound
    Unchanged,
    /// A new view was bound
    Bound(BoundDepth),
    /// View creation failed; the previous binding is kept
    Failed(DeviceError),
}

/// Depth candidate collector and committer
#[derive(Debug, Clone)]
pub struct DepthBinder {
    candidate: Option<DepthCandidate>,
    bound: Option<BoundDepth>,
    limiter: RateLimiter,
    commits: u64,
}

impl DepthBinder {
    /// Binder limited by `config.max_rebinds_per_second`
    pub fn new(config: &DepthBindConfig) -> Self {
        Self {
            candidate: None,
            bound: None,
            limiter: RateLimiter::per_second(config.max_rebinds_per_second),
            commits: 0,
        }
    }

    /// Current candidate
    pub fn candidate(&self) -> Option<&DepthCandidate> {
        self.candidate.as_ref()
    }

    /// Current binding
    pub fn bound(&self) -> Option<&BoundDepth> {
        self.bound.as_ref()
    }

    /// Successful binds since creation
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Offer the depth view of a pass scored `score`
    pub fn observe<D>(&mut self, device: &D, view: ResourceView, score: u32, config: &DepthBindConfig)
    where
        D: GraphicsDevice + ?Sized,
    {
        if !config.enabled || view.is_null() {
            return;
        }
        if config.lock_selection && self.bound.is_some() {
            return;
        }

        let resource = device.resource_from_view(view);
        if resource.is_null() {
            return;
        }
        let desc: ResourceDesc = device.resource_desc(resource);
        if !desc.is_texture_2d() {
            return;
        }

        let better = match &self.candidate {
            None => true,
            Some(best) => score > best.score || (score == best.score && desc.area() >= best.area()),
        };
        if better {
            self.candidate = Some(DepthCandidate {
                view,
                resource,
                width: desc.extent.width,
                height: desc.extent.height,
                samples: desc.sample_count(),
                score,
                format: device.view_format(view),
            });
        }
    }

    /// Commit the best candidate, at most once per rate-limit interval
    pub fn commit<D, C>(
        &mut self,
        device: &mut D,
        compositor: &mut C,
        backbuffer: &BackbufferInfo,
        now: Instant,
        config: &DepthBindConfig,
    ) -> DepthCommit
    where
        D: GraphicsDevice + ?Sized,
        C: EffectCompositor + ?Sized,
    {
        if !config.enabled {
            return DepthCommit::Idle;
        }
        let Some(candidate) = self.candidate else {
            return DepthCommit::Idle;
        };
        if !self.limiter.try_admit(now) {
            return DepthCommit::Throttled;
        }

        if config.require_backbuffer_match
            && backbuffer.desc.has_extent()
            && (candidate.width != backbuffer.desc.extent.width || candidate.height != backbuffer.desc.extent.height)
        {
            return DepthCommit::SizeMismatch;
        }

        if let Some(bound) = self.bound {
            if bound.resource == candidate.resource {
                self.candidate = None;
                return DepthCommit::Unchanged;
            }
            // A different resource must beat the bound one by the full margin
            if candidate.score < bound.score.saturating_add(config.hysteresis_margin) {
                return DepthCommit::Hysteresis;
            }
        }

        let view = match device.create_shader_view(candidate.resource, candidate.format) {
            Ok(view) => view,
            Err(err) => {
                log::warn!(
                    "Failed to create depth view for {:?} ({}x{}, {} samples): {}",
                    candidate.resource,
                    candidate.width,
                    candidate.height,
                    candidate.samples,
                    err
                );
                return DepthCommit::Failed(err);
            }
        };

        if let Some(previous) = self.bound.take() {
            device.destroy_view(previous.view);
        }
        compositor.update_texture_binding(&config.semantic, view);

        let bound = BoundDepth {
            resource: candidate.resource,
            view,
            score: candidate.score,
        };
        self.bound = Some(bound);
        self.candidate = None;
        self.commits += 1;
        log::info!(
            "Bound depth {:?} ({}x{}, score {}) as {}",
            candidate.resource,
            candidate.width,
            candidate.height,
            candidate.score,
            config.semantic
        );
        DepthCommit::Bound(bound)
    }

    /// Destroy the owned view and forget everything
    pub fn release<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        if let Some(bound) = self.bound.take() {
            device.destroy_view(bound.view);
        }
        self.candidate = None;
        self.limiter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::synthetic::{SyntheticCompositor, SyntheticDevice};
    use std::time::Duration;

    const HD: (u32, u32) = (1920, 1080);

    fn setup() -> (SyntheticDevice, SyntheticCompositor, BackbufferInfo) {
        let mut device = SyntheticDevice::new();
        let color = ResourceDesc::texture_2d(HD.0, HD.1, vk::Format::B8G8R8A8_UNORM);
        device.add_texture(1, color);
        device.add_texture(10, ResourceDesc::texture_2d(HD.0, HD.1, vk::Format::D32_SFLOAT));
        device.add_texture(11, ResourceDesc::texture_2d(1024, 1024, vk::Format::D32_SFLOAT));
        device.add_texture(12, ResourceDesc::texture_2d(HD.0, HD.1, vk::Format::D24_UNORM_S8_UINT));
        let backbuffer = BackbufferInfo {
            resource: Resource(1),
            desc: color,
        };
        (device, SyntheticCompositor::new(Resource(1)), backbuffer)
    }

    #[test]
    fn test_highest_score_then_largest_area_wins() {
        let (device, _, _) = setup();
        let config = DepthBindConfig::default();
        let mut binder = DepthBinder::new(&config);

        binder.observe(&device, ResourceView(11), 600, &config);
        binder.observe(&device, ResourceView(10), 0, &config);
        assert_eq!(binder.candidate().map(|c| c.resource), Some(Resource(11)));

        binder.observe(&device, ResourceView(10), 600, &config);
        assert_eq!(binder.candidate().map(|c| c.resource), Some(Resource(10)));

        binder.observe(&device, ResourceView(11), 600, &config);
        assert_eq!(binder.candidate().map(|c| c.resource), Some(Resource(10)));
    }

    #[test]
    fn test_commit_binds_and_is_rate_limited() {
        let (mut device, mut compositor, backbuffer) = setup();
        let config = DepthBindConfig::default();
        let mut binder = DepthBinder::new(&config);
        let start = Instant::now();

        binder.observe(&device, ResourceView(10), 1000, &config);
        let first = binder.commit(&mut device, &mut compositor, &backbuffer, start, &config);
        assert!(matches!(first, DepthCommit::Bound(_)));
        assert_eq!(compositor.bound_view("CUSTOMDEPTH"), binder.bound().map(|b| b.view));
        assert!(binder.candidate().is_none());

        binder.observe(&device, ResourceView(12), 1200, &config);
        let throttled = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_millis(10), &config);
        assert_eq!(throttled, DepthCommit::Throttled);

        let later = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_millis(100), &config);
        assert!(matches!(later, DepthCommit::Bound(BoundDepth { resource: Resource(12), .. })));
        assert_eq!(device.live_created_views(), 1);
    }

    #[test]
    fn test_hysteresis_keeps_better_binding() {
        let (mut device, mut compositor, backbuffer) = setup();
        let config = DepthBindConfig::default();
        let mut binder = DepthBinder::new(&config);
        let start = Instant::now();

        binder.observe(&device, ResourceView(10), 1000, &config);
        binder.commit(&mut device, &mut compositor, &backbuffer, start, &config);

        binder.observe(&device, ResourceView(12), 600, &config);
        let result = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_secs(1), &config);
        assert_eq!(result, DepthCommit::Hysteresis);
        assert_eq!(binder.bound().map(|b| b.resource), Some(Resource(10)));
    }

    #[test]
    fn test_similar_scores_do_not_alternate() {
        let (mut device, mut compositor, backbuffer) = setup();
        let config = DepthBindConfig::default();
        let mut binder = DepthBinder::new(&config);
        let start = Instant::now();

        let mut bound = Vec::new();
        for step in 0..6u64 {
            let view = if step % 2 == 0 { 10 } else { 12 };
            binder.observe(&device, ResourceView(view), 1000, &config);
            binder.commit(
                &mut device,
                &mut compositor,
                &backbuffer,
                start + Duration::from_millis(100 * step),
                &config,
            );
            bound.push(binder.bound().map(|b| b.resource));
        }
        assert!(bound.iter().all(|resource| *resource == Some(Resource(10))));
        assert_eq!(binder.commits(), 1);
    }

    #[test]
    fn test_lower_score_on_other_resource_is_refused() {
        let (mut device, mut compositor, backbuffer) = setup();
        let config = DepthBindConfig::default();
        let mut binder = DepthBinder::new(&config);
        let start = Instant::now();

        binder.observe(&device, ResourceView(10), 1000, &config);
        binder.commit(&mut device, &mut compositor, &backbuffer, start, &config);

        binder.observe(&device, ResourceView(12), 900, &config);
        let result = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_secs(1), &config);
        assert_eq!(result, DepthCommit::Hysteresis);

        // Just short of the margin is still refused, the full margin replaces
        binder.observe(&device, ResourceView(12), 1149, &config);
        let result = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_secs(2), &config);
        assert_eq!(result, DepthCommit::Hysteresis);
        binder.observe(&device, ResourceView(12), 1150, &config);
        let result = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_secs(3), &config);
        assert!(matches!(result, DepthCommit::Bound(BoundDepth { resource: Resource(12), score: 1150, .. })));
        assert_eq!(device.live_created_views(), 1);
    }

    #[test]
    fn test_rebinding_same_resource_is_a_noop() {
        let (mut device, mut compositor, backbuffer) = setup();
        let config = DepthBindConfig::default();
        let mut binder = DepthBinder::new(&config);
        let start = Instant::now();

        binder.observe(&device, ResourceView(10), 1000, &config);
        binder.commit(&mut device, &mut compositor, &backbuffer, start, &config);
        binder.observe(&device, ResourceView(10), 1000, &config);
        let result = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_secs(1), &config);
        assert_eq!(result, DepthCommit::Unchanged);
        assert_eq!(device.created_views().len(), 1);
    }

    #[test]
    fn test_failed_view_creation_keeps_previous_binding() {
        let (mut device, mut compositor, backbuffer) = setup();
        let config = DepthBindConfig::default();
        let mut binder = DepthBinder::new(&config);
        let start = Instant::now();

        binder.observe(&device, ResourceView(10), 1000, &config);
        binder.commit(&mut device, &mut compositor, &backbuffer, start, &config);
        let previous = binder.bound().copied();

        device.set_fail_view_creation(true);
        binder.observe(&device, ResourceView(12), 1600, &config);
        let result = binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_secs(1), &config);
        assert!(matches!(result, DepthCommit::Failed(DeviceError::ViewCreationFailed { .. })));
        assert_eq!(binder.bound().copied(), previous);
        assert!(device.destroyed_views().is_empty());
    }

    #[test]
    fn test_backbuffer_match_and_selection_lock() {
        let (mut device, mut compositor, backbuffer) = setup();
        let config = DepthBindConfig {
            require_backbuffer_match: true,
            lock_selection: true,
            ..DepthBindConfig::default()
        };
        let mut binder = DepthBinder::new(&config);
        let start = Instant::now();

        binder.observe(&device, ResourceView(11), 1000, &config);
        let result = binder.commit(&mut device, &mut compositor, &backbuffer, start, &config);
        assert_eq!(result, DepthCommit::SizeMismatch);

        binder.observe(&device, ResourceView(10), 1000, &config);
        binder.commit(&mut device, &mut compositor, &backbuffer, start + Duration::from_secs(1), &config);
        assert_eq!(binder.bound().map(|b| b.resource), Some(Resource(10)));

        let frozen_candidate = binder.candidate().copied();
        binder.observe(&device, ResourceView(12), 1000, &config);
        assert_eq!(binder.candidate().copied(), frozen_candidate);

        binder.release(&mut device);
        assert_eq!(device.live_created_views(), 0);
    }
}
