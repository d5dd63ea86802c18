//! Scene-pass selection engine
//!
//! One instance per graphics context, owned by the submission thread. The host
//! forwards its callbacks here; trigger threads talk to it only through
//! [`TriggerHandle`] and the compositor's effects callbacks through
//! [`EffectsGateHandle`].

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::backend::{CommandList, EffectCompositor, GraphicsDevice, Resource, ResourceView};
use crate::core::{ConfigError, SelectorConfig};

use super::depth_binder::{BoundDepth, DepthBinder};
use super::injector::{InjectionContext, InjectionOutcome, RejectReason, RenderInjector};
use super::lock::{LockManager, LockVerdict};
use super::request::PendingRequest;
use super::scoring::{self, BackbufferInfo};
use super::shared::{EffectsGateHandle, SelectorShared, TriggerHandle};
use super::signature::{SceneSignature, SignatureTracker};
use super::state::{ReloadDecision, SelectionState, StateMachine};

/// Render-pass callbacks logged at debug level after init
const LOGGED_PASS_CALLBACKS: u32 = 3;

/// What the engine did with one render-pass begin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// No graphics context
    Ignored,
    /// The pass has no depth target; only the pass clock moved
    NoDepth,
    /// The pass is not the locked pair
    LockMiss,
    /// Same depth as the lock, render target being tracked for migration
    Migrating,
    /// First qualifying pass after a request, skipped on purpose
    Deferred,
    /// At least one injection gate refused
    Rejected(RejectReason),
    /// Effects were injected
    Injected {
        /// Injections since creation
        count: u64,
    },
    /// The render call faulted; injection is off for this context
    Faulted,
}

/// Diagnostic view of the selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorSnapshot {
    /// Lifecycle state
    pub state: SelectionState,
    /// Graphics context alive
    pub alive: bool,
    /// Frame counter
    pub frame: u64,
    /// Pass counter
    pub pass: u64,
    /// First pass of the current frame
    pub frame_start_pass: u64,
    /// Signature streak
    pub streak: u32,
    /// Last qualifying signature
    pub last_signature: Option<SceneSignature>,
    /// Locked pair
    pub lock: Option<SceneSignature>,
    /// Frames with a lock miss since the last hit
    pub lock_miss_frames: u64,
    /// Frame of the last lock hit
    pub lock_last_hit_frame: Option<u64>,
    /// Render-target migrations
    pub migrations: u64,
    /// Skip countdown (frames)
    pub skip_frames: u32,
    /// Settle countdown (frames)
    pub settle_frames: u32,
    /// Fault latch tripped
    pub fault_latched: bool,
    /// Recorded fault
    pub fault: Option<String>,
    /// Injected in the current frame
    pub injected_this_frame: bool,
    /// Injections since creation
    pub injections: u64,
    /// Frame of the last injection
    pub last_injection_frame: Option<u64>,
    /// Pass of the last injection
    pub last_injection_pass: Option<u64>,
    /// Latest reject mask
    pub last_reject: RejectReason,
    /// Requests accepted since creation
    pub requests_accepted: u32,
    /// Pending request
    pub pending_request: Option<PendingRequest>,
    /// The next qualifying pass with a request will be skipped
    pub defer_armed: bool,
    /// Score of the depth candidate
    pub depth_candidate_score: Option<u32>,
    /// Bound depth resource
    pub depth_bound: Option<BoundDepth>,
    /// Successful depth binds
    pub depth_commits: u64,
}

/// Scene-pass selector for one graphics context
pub struct SelectionEngine {
    config: SelectorConfig,
    shared: Arc<SelectorShared>,
    machine: StateMachine,
    tracker: SignatureTracker,
    locks: LockManager,
    injector: RenderInjector,
    depth: DepthBinder,
    activated_frame: u64,
    logged_passes: u32,
}

impl SelectionEngine {
    /// Create an engine over `shared`; the context is not alive until [`Self::on_init`]
    pub fn new(config: SelectorConfig, shared: Arc<SelectorShared>) -> Result<Self, ConfigError> {
        config.validate()?;
        let depth = DepthBinder::new(&config.depth);
        Ok(Self {
            config,
            shared,
            machine: StateMachine::new(),
            tracker: SignatureTracker::new(),
            locks: LockManager::new(),
            injector: RenderInjector::new(),
            depth,
            activated_frame: 0,
            logged_passes: 0,
        })
    }

    /// Handle for the external trigger source
    pub fn trigger(&self) -> TriggerHandle {
        TriggerHandle::new(Arc::clone(&self.shared), self.config.injection.late_request_passes)
    }

    /// Handle for the compositor's effects-pass callbacks
    pub fn effects_gate(&self) -> EffectsGateHandle {
        EffectsGateHandle::new(Arc::clone(&self.shared))
    }

    /// Configuration in use
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Lifecycle state
    pub fn state(&self) -> SelectionState {
        self.machine.state()
    }

    /// Locked pair
    pub fn lock(&self) -> Option<SceneSignature> {
        self.locks.lock()
    }

    /// Graphics context came up
    pub fn on_init(&mut self) {
        self.shared.set_alive(true);
        self.shared.requests.reset();
        self.shared.clear_weather_change();
        self.shared
            .effects
            .set_suppress_regular(self.config.injection.enabled && self.config.injection.suppress_regular_pass);
        self.injector = RenderInjector::new();
        self.machine.disable();
        self.logged_passes = 0;
        log::info!("Graphics context initialised");
        self.reset("initial settle before scene-pass selection", self.config.stabilize.init_settle_frames);
    }

    /// Graphics context is going away
    pub fn on_destroy<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        self.depth.release(device);
        self.shared.set_alive(false);
        self.shared.effects.reset();
        self.shared.effects.set_suppress_regular(false);
        self.shared.requests.reset();
        self.shared.clear_weather_change();
        self.shared.clock.reset();
        self.locks.clear();
        self.tracker.reset();
        self.injector = RenderInjector::new();
        self.machine.disable();
        self.publish_state();
        log::info!("Graphics context destroyed; selector disabled");
    }

    /// Wipe the selection and re-stabilize for `settle_frames`
    pub fn reset(&mut self, reason: &str, settle_frames: u32) {
        if let Some(lock) = self.locks.lock() {
            log::info!("Unlocking scene pair {:?}/{:?}: {}", lock.color, lock.depth, reason);
        }
        self.locks.clear();
        self.tracker.reset();
        self.injector.reset();
        self.shared.requests.clear();
        self.shared.requests.arm_defer();
        self.shared.effects.reset();
        self.machine.stabilize(settle_frames, self.config.stabilize.reset_skip_frames);
        self.publish_state();
        log::info!("Re-stabilizing for {} frames: {}", settle_frames, reason);
    }

    /// The compositor reloaded its effects
    pub fn on_reloaded_effects(&mut self) -> ReloadDecision {
        if !self.shared.is_alive() {
            return ReloadDecision::NotAlive;
        }
        let frame = self.shared.clock.frame();
        let decision = self
            .machine
            .on_reload(frame, self.injector.last_injection_frame(), &self.config.reload);
        match decision {
            ReloadDecision::Accepted => self.reset("effects reloaded", self.config.stabilize.reload_settle_frames),
            ReloadDecision::IgnoredHealthy => log::debug!("Ignoring effects reload at frame {}: injection healthy", frame),
            ReloadDecision::IgnoredDebounced => log::debug!("Ignoring effects reload at frame {}: debounced", frame),
            ReloadDecision::NotAlive => {}
        }
        decision
    }

    /// A frame was presented
    pub fn on_present<D, C>(&mut self, device: &mut D, compositor: &mut C, now: Instant)
    where
        D: GraphicsDevice + ?Sized,
        C: EffectCompositor + ?Sized,
    {
        if !self.shared.is_alive() {
            return;
        }

        let frame = self.shared.clock.advance_frame();
        self.injector.begin_frame();
        self.machine.tick_skip();

        if let Some(value) = self.shared.take_weather_change() {
            self.on_weather_change(value);
        }

        match self.machine.state() {
            SelectionState::Stabilizing => {
                if self.machine.tick_settle() {
                    self.machine.arm(frame);
                    self.tracker.hold();
                    log::info!("Stabilize window complete at frame {}; arming scene-pass selection", frame);
                } else {
                    self.shared.requests.clear();
                }
            }
            SelectionState::Armed => {
                if self
                    .machine
                    .armed_timeout_promotes(frame, self.tracker.streak(), &self.config.signature)
                {
                    self.activate(frame);
                    log::info!(
                        "Armed for {} frames with streak {}; activating anyway",
                        frame.saturating_sub(self.machine.armed_since()),
                        self.tracker.streak()
                    );
                }
            }
            SelectionState::Active => self.check_watchdog(frame),
            SelectionState::Disabled => {}
        }
        self.publish_state();

        if self.machine.state() == SelectionState::Active
            && self.config.injection.auto_request
            && !self
                .shared
                .requests
                .external_feed_alive(frame, self.config.injection.external_feed_grace_frames)
        {
            self.shared.requests.post(frame, self.shared.clock.pass());
        }

        let backbuffer = BackbufferInfo::query(&*device, &*compositor);
        self.depth
            .commit(device, compositor, &backbuffer, now, &self.config.depth);
    }

    /// A render pass began
    pub fn on_begin_render_pass<D, C>(
        &mut self,
        device: &mut D,
        compositor: &mut C,
        cmd: CommandList,
        render_targets: &[ResourceView],
        depth_stencil: Option<ResourceView>,
    ) -> PassOutcome
    where
        D: GraphicsDevice + ?Sized,
        C: EffectCompositor + ?Sized,
    {
        if !self.shared.is_alive() {
            return PassOutcome::Ignored;
        }
        let pass = self.shared.clock.advance_pass();
        if self.logged_passes < LOGGED_PASS_CALLBACKS {
            self.logged_passes += 1;
            log::debug!(
                "begin_render_pass #{} ({} targets, depth {:?})",
                pass,
                render_targets.len(),
                depth_stencil
            );
        }

        let Some(depth_view) = depth_stencil.and_then(ResourceView::non_null) else {
            return PassOutcome::NoDepth;
        };

        let frame = self.shared.clock.frame();
        let backbuffer = BackbufferInfo::query(&*device, &*compositor);
        let targets = scoring::resolve_targets(&*device, render_targets);
        let score = scoring::score_targets(&targets, &backbuffer, &self.config.signature);
        let depth = device.resource_from_view(depth_view);
        let depth_desc = device.resource_desc(depth);

        self.depth.observe(&*device, depth_view, score, &self.config.depth);

        let verdict = self.locks.evaluate(
            frame,
            &targets,
            depth,
            scoring::choose_scene_target(&targets, &backbuffer),
            &self.config.lock,
        );
        let (chosen, lock_hit) = match verdict {
            LockVerdict::Miss {
                miss_frames,
                stale,
                first_in_frame,
            } => {
                self.log_lock_miss(frame, pass, depth, miss_frames, first_in_frame);
                if stale {
                    self.release_stale_lock(frame, pass, miss_frames);
                }
                return PassOutcome::LockMiss;
            }
            LockVerdict::Migrating { .. } => return PassOutcome::Migrating,
            LockVerdict::Migrated(target) => {
                log::info!(
                    "Scene lock render target migrated to {:?} at frame {}",
                    target.resource,
                    frame
                );
                (Some(target), true)
            }
            LockVerdict::Hit(target) => (Some(target), true),
            LockVerdict::Unlocked => (scoring::choose_scene_target(&targets, &backbuffer), false),
        };

        let qualifies = score >= self.config.signature.candidate_min_score || lock_hit;
        let signature = chosen
            .map(|target| SceneSignature::new(target.resource, depth))
            .filter(|signature| qualifies && signature.is_complete());
        self.observe_signature(signature, frame);

        let request = self
            .shared
            .requests
            .validate(frame, pass, self.config.injection.request_max_pass_age);

        if self.config.injection.defer_first_qualifying_pass
            && request.is_some()
            && signature.is_some()
            && self.shared.requests.take_defer()
        {
            return PassOutcome::Deferred;
        }

        let ctx = InjectionContext {
            frame,
            pass,
            frame_start_pass: self.shared.clock.frame_start_pass(),
            cmd,
            target: chosen,
            depth,
            depth_unsupported: !depth_desc.is_texture_2d() || depth_desc.is_multisampled(),
            request,
            state: self.machine.state(),
            skip_frames: self.machine.skip_frames(),
            lock_allows: self.locks.lock().is_none() || lock_hit,
        };
        let mask = self.injector.evaluate(&ctx, &self.config.injection);
        if !mask.is_empty() {
            if request.is_some() {
                let changed = self.injector.note_reject(mask);
                if changed && self.config.logging.verbose_rejects {
                    log::debug!(
                        "Injection rejected (mask={:?} frame={} pass={} request={:?} score={})",
                        mask,
                        frame,
                        pass,
                        request,
                        score
                    );
                }
            }
            return PassOutcome::Rejected(mask);
        }

        let Some(target) = chosen else {
            return PassOutcome::Rejected(RejectReason::NO_RENDER_TARGET);
        };
        match self.injector.inject(compositor, &ctx, target, &self.shared.effects) {
            InjectionOutcome::Injected { count } => {
                self.shared.requests.clear();
                let signature = SceneSignature::new(target.resource, depth);
                if self.locks.confirm(signature, frame) {
                    log::info!(
                        "Locked scene pair {:?}/{:?} (frame={} pass={})",
                        signature.color,
                        signature.depth,
                        frame,
                        pass
                    );
                }
                if count <= 5 || count % 120 == 0 {
                    log::info!(
                        "Rendered effects before HUD (count={} frame={} pass={} target={:?} depth={:?} score={})",
                        count,
                        frame,
                        pass,
                        target.resource,
                        depth,
                        score
                    );
                }
                PassOutcome::Injected { count }
            }
            InjectionOutcome::Faulted(fault) => {
                self.shared.requests.clear();
                log::error!("{}; disabling injection for this graphics context", fault);
                PassOutcome::Faulted
            }
        }
    }

    /// Render targets were bound outside a render pass
    pub fn on_bind_render_targets<D, C>(
        &mut self,
        device: &D,
        compositor: &C,
        render_targets: &[ResourceView],
        depth_stencil: Option<ResourceView>,
    ) where
        D: GraphicsDevice + ?Sized,
        C: EffectCompositor + ?Sized,
    {
        if !self.shared.is_alive() {
            return;
        }
        let Some(depth_view) = depth_stencil.and_then(ResourceView::non_null) else {
            return;
        };
        let backbuffer = BackbufferInfo::query(device, compositor);
        let targets = scoring::resolve_targets(device, render_targets);
        let score = scoring::score_targets(&targets, &backbuffer, &self.config.signature);
        self.depth.observe(device, depth_view, score, &self.config.depth);
    }

    /// A depth-stencil view was cleared
    pub fn on_clear_depth_stencil<D>(&mut self, device: &D, view: ResourceView)
    where
        D: GraphicsDevice + ?Sized,
    {
        if !self.shared.is_alive() {
            return;
        }
        self.depth.observe(device, view, 0, &self.config.depth);
    }

    /// Diagnostic snapshot
    pub fn snapshot(&self) -> SelectorSnapshot {
        let clock = &self.shared.clock;
        SelectorSnapshot {
            state: self.machine.state(),
            alive: self.shared.is_alive(),
            frame: clock.frame(),
            pass: clock.pass(),
            frame_start_pass: clock.frame_start_pass(),
            streak: self.tracker.streak(),
            last_signature: self.tracker.last(),
            lock: self.locks.lock(),
            lock_miss_frames: self.locks.miss_frames(),
            lock_last_hit_frame: self.locks.last_hit_frame(),
            migrations: self.locks.migrations(),
            skip_frames: self.machine.skip_frames(),
            settle_frames: self.machine.settle_frames(),
            fault_latched: self.injector.latch().is_tripped(),
            fault: self.injector.latch().fault().map(ToString::to_string),
            injected_this_frame: self.injector.injected_this_frame(),
            injections: self.injector.injections(),
            last_injection_frame: self.injector.last_injection_frame(),
            last_injection_pass: self.injector.last_render_pass(),
            last_reject: self.injector.last_reject(),
            requests_accepted: self.shared.requests.accepted_count(),
            pending_request: self.shared.requests.pending(),
            defer_armed: self.shared.requests.defer_armed(),
            depth_candidate_score: self.depth.candidate().map(|candidate| candidate.score),
            depth_bound: self.depth.bound().copied(),
            depth_commits: self.depth.commits(),
        }
    }

    fn publish_state(&self) {
        self.shared.publish_state(self.machine.state());
    }

    fn activate(&mut self, frame: u64) {
        self.machine.activate();
        self.activated_frame = frame;
        self.publish_state();
    }

    fn observe_signature(&mut self, signature: Option<SceneSignature>, frame: u64) {
        if matches!(
            self.machine.state(),
            SelectionState::Disabled | SelectionState::Stabilizing
        ) {
            self.tracker.hold();
            return;
        }

        let streak = self.tracker.observe(signature);
        if self.machine.streak_promotes(streak, &self.config.signature) {
            self.activate(frame);
            log::info!(
                "Scene signature stable for {} passes at frame {}; selection active",
                streak,
                frame
            );
        }
    }

    fn on_weather_change(&mut self, value: u32) {
        if !self.config.recovery.weather_unlock || self.machine.state() == SelectionState::Disabled {
            return;
        }
        self.locks.clear();
        self.tracker.hold();
        self.shared.requests.clear();
        self.shared.requests.arm_defer();
        self.machine.raise_skip(self.config.recovery.weather_skip_frames);
        log::info!("Weather change signal {:#x}; scene lock dropped", value);
    }

    fn check_watchdog(&mut self, frame: u64) {
        let Some(limit) = self.config.recovery.watchdog_frames else {
            return;
        };
        // A latched fault stops injection for good; re-arming cannot help
        if self.injector.latch().is_tripped() {
            return;
        }
        let Some(last) = self.injector.last_injection_frame() else {
            return;
        };
        let idle = frame.saturating_sub(last.max(self.activated_frame));
        if idle > limit {
            log::warn!("No injection for {} frames; re-arming scene-pass selection", idle);
            self.rearm(frame, self.shared.clock.pass());
        }
    }

    fn release_stale_lock(&mut self, frame: u64, pass: u64, miss_frames: u64) {
        if let Some(lock) = self.locks.lock() {
            log::warn!(
                "Scene lock {:?}/{:?} stale after {} miss frames; re-acquiring",
                lock.color,
                lock.depth,
                miss_frames
            );
        }
        self.rearm(frame, pass);
    }

    /// Drop the lock, go back to `Armed` and post a request so re-discovery starts now
    fn rearm(&mut self, frame: u64, pass: u64) {
        self.locks.clear();
        self.tracker.reset();
        self.machine.arm(frame);
        self.publish_state();
        self.shared.requests.clear();
        self.shared.requests.post(frame, pass);
    }

    fn log_lock_miss(&self, frame: u64, pass: u64, depth: Resource, miss_frames: u64, first_in_frame: bool) {
        if !first_in_frame {
            return;
        }
        let total = self.locks.total_misses();
        if total <= 3 || total % 2400 == 0 {
            log::debug!(
                "Scene lock miss (miss_frames={} frame={} pass={} lock={:?} depth={:?})",
                miss_frames,
                frame,
                pass,
                self.locks.lock(),
                depth
            );
        }
    }
}
