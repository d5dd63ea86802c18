//! Scene lock with per-frame miss accounting and render-target migration
//!
//! The lock pins the selector to one (render target, depth target) pair. A pass
//! that shows the locked depth target with a different render target is not a
//! miss: the backbuffer identity churns across swapchain images and post
//! chains, so the render-target half may migrate, but only after a replacement
//! has been seen for `migration_streak` consecutive passes and
//! `migration_cooldown_frames` have passed since the previous migration.

use crate::backend::Resource;
use crate::core::LockConfig;

use super::scoring::ResolvedTarget;
use super::signature::SceneSignature;

/// How a pass relates to the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockVerdict {
    /// No lock is set
    Unlocked,
    /// The pass shows the locked pair
    Hit(ResolvedTarget),
    /// Same depth target, other render target; replacement seen `streak` times
    Migrating {
        /// Consecutive passes the replacement has been seen
        streak: u32,
    },
    /// The render-target half was just replaced
    Migrated(ResolvedTarget),
    /// The pass does not belong to the lock
    Miss {
        /// Frames with a miss and no hit
        miss_frames: u64,
        /// Whether this miss made the lock stale
        stale: bool,
        /// Whether this is the first miss of the frame
        first_in_frame: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct MigrationCandidate {
    color: Resource,
    streak: u32,
}

/// Owner of the scene lock
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    lock: Option<SceneSignature>,
    miss_frames: u64,
    last_miss_frame: Option<u64>,
    last_hit_frame: Option<u64>,
    total_misses: u64,
    migration: Option<MigrationCandidate>,
    last_migration_frame: Option<u64>,
    migrations: u64,
}

impl LockManager {
    /// No lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Locked pair
    pub fn lock(&self) -> Option<SceneSignature> {
        self.lock
    }

    /// Frames with a miss since the last hit
    pub fn miss_frames(&self) -> u64 {
        self.miss_frames
    }

    /// Misses counted since the lock was set (for log throttling)
    pub fn total_misses(&self) -> u64 {
        self.total_misses
    }

    /// Frame of the last hit
    pub fn last_hit_frame(&self) -> Option<u64> {
        self.last_hit_frame
    }

    /// Render-target migrations since creation
    pub fn migrations(&self) -> u64 {
        self.migrations
    }

    /// Classify one pass against the lock
    ///
    /// `migration_target` is the pass's backbuffer or full-resolution target,
    /// the only kind of render target the lock may migrate to.
    pub fn evaluate(
        &mut self,
        frame: u64,
        targets: &[ResolvedTarget],
        depth: Resource,
        migration_target: Option<ResolvedTarget>,
        config: &LockConfig,
    ) -> LockVerdict {
        let Some(lock) = self.lock else {
            return LockVerdict::Unlocked;
        };

        if !depth.is_null() && depth == lock.depth {
            if let Some(target) = targets.iter().find(|target| target.resource == lock.color) {
                self.record_hit(frame);
                return LockVerdict::Hit(*target);
            }
            return self.track_migration(frame, migration_target, config);
        }

        self.record_miss(frame, config)
    }

    fn record_hit(&mut self, frame: u64) {
        self.miss_frames = 0;
        self.last_hit_frame = Some(frame);
        self.migration = None;
    }

    fn record_miss(&mut self, frame: u64, config: &LockConfig) -> LockVerdict {
        self.migration = None;
        let first_in_frame = self.last_miss_frame != Some(frame);
        if first_in_frame {
            self.last_miss_frame = Some(frame);
            self.miss_frames += 1;
            self.total_misses += 1;
        }
        LockVerdict::Miss {
            miss_frames: self.miss_frames,
            stale: self.miss_frames > config.stale_miss_frames,
            first_in_frame,
        }
    }

    fn track_migration(&mut self, frame: u64, target: Option<ResolvedTarget>, config: &LockConfig) -> LockVerdict {
        let Some(target) = target else {
            self.migration = None;
            return LockVerdict::Migrating { streak: 0 };
        };

        let streak = match self.migration {
            Some(candidate) if candidate.color == target.resource => candidate.streak.saturating_add(1),
            _ => 1,
        };
        self.migration = Some(MigrationCandidate {
            color: target.resource,
            streak,
        });

        let cooled_down = self
            .last_migration_frame
            .map_or(true, |last| frame.saturating_sub(last) >= config.migration_cooldown_frames);
        if streak < config.migration_streak || !cooled_down {
            return LockVerdict::Migrating { streak };
        }

        if let Some(lock) = self.lock.as_mut() {
            lock.color = target.resource;
        }
        self.last_migration_frame = Some(frame);
        self.migrations += 1;
        self.record_hit(frame);
        LockVerdict::Migrated(target)
    }

    /// Set the lock to `signature`, or refresh it if already set to it
    ///
    /// Returns whether the locked pair changed. A different pair never
    /// replaces an existing lock here.
    pub fn confirm(&mut self, signature: SceneSignature, frame: u64) -> bool {
        if !signature.is_complete() {
            return false;
        }
        match self.lock {
            Some(lock) if lock == signature => {
                self.record_hit(frame);
                false
            }
            Some(_) => false,
            None => {
                self.lock = Some(signature);
                self.total_misses = 0;
                self.record_hit(frame);
                true
            }
        }
    }

    /// Drop the lock and all accounting attached to it
    pub fn clear(&mut self) {
        let migrations = self.migrations;
        *self = Self {
            migrations,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ResourceDesc, ResourceView};
    use ash::vk;

    const A: Resource = Resource(1);
    const B: Resource = Resource(2);
    const C: Resource = Resource(3);

    fn target(resource: Resource) -> ResolvedTarget {
        ResolvedTarget {
            view: ResourceView(resource.0),
            resource,
            desc: ResourceDesc::texture_2d(1280, 720, vk::Format::B8G8R8A8_UNORM),
        }
    }

    fn locked() -> LockManager {
        let mut manager = LockManager::new();
        assert!(manager.confirm(SceneSignature::new(A, B), 1));
        manager
    }

    #[test]
    fn test_unlocked_without_confirm() {
        let mut manager = LockManager::new();
        let verdict = manager.evaluate(1, &[target(A)], B, None, &LockConfig::default());
        assert_eq!(verdict, LockVerdict::Unlocked);
    }

    #[test]
    fn test_hit_resets_miss_count() {
        let config = LockConfig::default();
        let mut manager = locked();
        manager.evaluate(2, &[target(C)], C, None, &config);
        assert_eq!(manager.miss_frames(), 1);
        let verdict = manager.evaluate(3, &[target(C), target(A)], B, None, &config);
        assert_eq!(verdict, LockVerdict::Hit(target(A)));
        assert_eq!(manager.miss_frames(), 0);
    }

    #[test]
    fn test_misses_are_counted_once_per_frame() {
        let config = LockConfig::default();
        let mut manager = locked();
        for _ in 0..10 {
            manager.evaluate(5, &[target(C)], C, None, &config);
        }
        assert_eq!(manager.miss_frames(), 1);
        manager.evaluate(6, &[target(C)], C, None, &config);
        assert_eq!(manager.miss_frames(), 2);
    }

    #[test]
    fn test_lock_goes_stale_after_threshold() {
        let config = LockConfig {
            stale_miss_frames: 3,
            ..LockConfig::default()
        };
        let mut manager = locked();
        let mut stale_at = None;
        for frame in 2..10 {
            if let LockVerdict::Miss { stale: true, .. } = manager.evaluate(frame, &[target(C)], C, None, &config) {
                stale_at = Some(frame);
                break;
            }
        }
        assert_eq!(stale_at, Some(5));
    }

    #[test]
    fn test_same_depth_is_never_a_miss() {
        let config = LockConfig::default();
        let mut manager = locked();
        for frame in 2..50 {
            let verdict = manager.evaluate(frame, &[], B, None, &config);
            assert_eq!(verdict, LockVerdict::Migrating { streak: 0 });
        }
        assert_eq!(manager.miss_frames(), 0);
    }

    #[test]
    fn test_migration_needs_streak() {
        let config = LockConfig::default();
        let mut manager = locked();
        for expected in 1..4 {
            let verdict = manager.evaluate(100, &[target(C)], B, Some(target(C)), &config);
            assert_eq!(verdict, LockVerdict::Migrating { streak: expected });
        }
        let verdict = manager.evaluate(100, &[target(C)], B, Some(target(C)), &config);
        assert_eq!(verdict, LockVerdict::Migrated(target(C)));
        assert_eq!(manager.lock(), Some(SceneSignature::new(C, B)));
    }

    #[test]
    fn test_hit_interrupts_migration_streak() {
        let config = LockConfig::default();
        let mut manager = locked();
        for frame in 2..200 {
            manager.evaluate(frame, &[target(C)], B, Some(target(C)), &config);
            manager.evaluate(frame, &[target(C)], B, Some(target(C)), &config);
            manager.evaluate(frame, &[target(A)], B, Some(target(A)), &config);
        }
        assert_eq!(manager.lock(), Some(SceneSignature::new(A, B)));
        assert_eq!(manager.migrations(), 0);
    }

    #[test]
    fn test_migration_cooldown() {
        let config = LockConfig::default();
        let mut manager = locked();
        for _ in 0..4 {
            manager.evaluate(100, &[target(C)], B, Some(target(C)), &config);
        }
        assert_eq!(manager.lock().map(|lock| lock.color), Some(C));

        let d = Resource(4);
        for _ in 0..10 {
            manager.evaluate(120, &[target(d)], B, Some(target(d)), &config);
        }
        assert_eq!(manager.lock().map(|lock| lock.color), Some(C));

        let verdict = manager.evaluate(160, &[target(d)], B, Some(target(d)), &config);
        assert_eq!(verdict, LockVerdict::Migrated(target(d)));
        assert_eq!(manager.migrations(), 2);
    }

    #[test]
    fn test_confirm_never_replaces_other_lock() {
        let mut manager = locked();
        assert!(!manager.confirm(SceneSignature::new(C, C), 3));
        assert_eq!(manager.lock(), Some(SceneSignature::new(A, B)));
        manager.clear();
        assert_eq!(manager.lock(), None);
        assert!(manager.confirm(SceneSignature::new(C, C), 4));
    }
}
