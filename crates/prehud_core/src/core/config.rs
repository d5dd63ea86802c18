//! # Selector Configuration
//!
//! Every heuristic threshold used by the scene-pass selector lives here instead
//! of being scattered through the callbacks as literals. Each field names its
//! unit in the doc comment; frames and passes are different clocks and mixing
//! them up is an easy mistake.
//!
//! ## Units
//!
//! - **frames**: counted by presents (`SelectionEngine::on_present`)
//! - **passes**: counted by render-pass begin callbacks, process-wide
//! - **score points**: output of the backbuffer-match scoring heuristic
//! - **seconds / Hz**: wall-clock, only used by the depth binder rate limit

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};

/// Settle and skip countdowns applied around disruptive events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StabilizeConfig {
    /// Frames spent in `Stabilizing` after graphics-context init
    pub init_settle_frames: u32,
    /// Frames spent in `Stabilizing` after an accepted effects reload
    pub reload_settle_frames: u32,
    /// Minimum skip countdown (frames) armed by every reset
    pub reset_skip_frames: u32,
}

impl Default for StabilizeConfig {
    fn default() -> Self {
        Self {
            init_settle_frames: 30,
            reload_settle_frames: 45,
            reset_skip_frames: 8,
        }
    }
}

/// Scene signature scoring and promotion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignatureConfig {
    /// Consecutive qualifying passes (same RT/DS pair) needed for `Armed -> Active`
    pub streak_required: u32,
    /// Frames in `Armed` after which a streak of at least 1 promotes anyway
    pub armed_timeout_frames: u64,
    /// Score points when a render target is the current backbuffer
    pub backbuffer_score: u32,
    /// Score points when a render target only matches the backbuffer extent
    pub size_match_score: u32,
    /// Minimum score points for a pass to count as a scene-signature candidate
    pub candidate_min_score: u32,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            streak_required: 3,
            armed_timeout_frames: 240,
            backbuffer_score: 1000,
            size_match_score: 600,
            candidate_min_score: 600,
        }
    }
}

/// Lock hysteresis, miss accounting and render-target migration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    /// Frames with a lock miss (and no hit) after which the lock is stale
    pub stale_miss_frames: u64,
    /// Consecutive qualifying passes a replacement render target must show
    pub migration_streak: u32,
    /// Frames that must pass between two render-target migrations
    pub migration_cooldown_frames: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_miss_frames: 600,
            migration_streak: 4,
            migration_cooldown_frames: 60,
        }
    }
}

/// Injection gates and request handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InjectionConfig {
    /// Master switch for the render injector
    pub enabled: bool,
    /// Passes after which a pending request is dropped as stale
    pub request_max_pass_age: u64,
    /// Passes after the request anchor during which injection may happen
    pub request_window_passes: u64,
    /// Passes after the frame start during which injection may happen
    pub frame_phase_passes: u64,
    /// Passes into the frame after which incoming requests are ignored
    pub late_request_passes: u64,
    /// Passes that must separate two injections
    pub cooldown_passes: u64,
    /// Skip the first qualifying pass after each accepted request
    pub defer_first_qualifying_pass: bool,
    /// Post a request on present when no external trigger is feeding requests
    pub auto_request: bool,
    /// Frames an external request keeps the auto-request fallback quiet
    pub external_feed_grace_frames: u64,
    /// Block the compositor's own regular effects pass
    pub suppress_regular_pass: bool,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_max_pass_age: 96,
            request_window_passes: 48,
            frame_phase_passes: 80,
            late_request_passes: 128,
            cooldown_passes: 10,
            defer_first_qualifying_pass: true,
            auto_request: true,
            external_feed_grace_frames: 2,
            suppress_regular_pass: true,
        }
    }
}

/// Debounce of effects-reload notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    /// Frames after an accepted reload during which further reloads are ignored
    pub debounce_frames: u64,
    /// Frames after a successful injection during which reloads are ignored
    pub healthy_window_frames: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_frames: 240,
            healthy_window_frames: 600,
        }
    }
}

/// Secondary staleness-recovery paths
///
/// The primary path is the lock-miss threshold in [`LockConfig`]; these only
/// catch what it cannot see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Frames without injection (while `Active`) before the watchdog re-arms; `None` disables it
    pub watchdog_frames: Option<u64>,
    /// Drop the lock when the trigger source reports a weather change
    pub weather_unlock: bool,
    /// Minimum skip countdown (frames) after a weather change
    pub weather_skip_frames: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            watchdog_frames: Some(1800),
            weather_unlock: true,
            weather_skip_frames: 3,
        }
    }
}

/// Depth-resource binder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DepthBindConfig {
    /// Whether depth candidates are collected and committed at all
    pub enabled: bool,
    /// Wall-clock commit rate limit (Hz)
    pub max_rebinds_per_second: f64,
    /// Score points by which a candidate on another resource must beat the bound one to replace it
    pub hysteresis_margin: u32,
    /// Freeze the binding once a depth resource is bound
    pub lock_selection: bool,
    /// Only commit candidates whose extent equals the backbuffer extent
    pub require_backbuffer_match: bool,
    /// Texture semantic the depth view is bound to in the compositor
    pub semantic: String,
}

impl Default for DepthBindConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rebinds_per_second: 15.0,
            hysteresis_margin: 150,
            lock_selection: false,
            require_backbuffer_match: false,
            semantic: "CUSTOMDEPTH".to_string(),
        }
    }
}

/// Logging behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter (`RUST_LOG` takes precedence)
    pub level: String,
    /// Log every change of the injection reject mask
    pub verbose_rejects: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose_rejects: false,
        }
    }
}

/// # Complete Selector Configuration
///
/// Top-level configuration of the scene-pass selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorConfig {
    /// Settle and skip countdowns
    pub stabilize: StabilizeConfig,
    /// Signature scoring and promotion
    pub signature: SignatureConfig,
    /// Lock hysteresis and migration
    pub lock: LockConfig,
    /// Injection gates
    pub injection: InjectionConfig,
    /// Reload debounce
    pub reload: ReloadConfig,
    /// Secondary recovery paths
    pub recovery: RecoveryConfig,
    /// Depth binder
    pub depth: DepthBindConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl SelectorConfig {
    /// Create a configuration with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the settle countdowns (frames)
    pub fn with_settle_frames(mut self, init: u32, reload: u32) -> Self {
        self.stabilize.init_settle_frames = init;
        self.stabilize.reload_settle_frames = reload;
        self
    }

    /// Set the streak needed for promotion
    pub fn with_streak_required(mut self, streak: u32) -> Self {
        self.signature.streak_required = streak;
        self
    }

    /// Enable or disable the defer-once rule
    pub fn with_defer_first_pass(mut self, enabled: bool) -> Self {
        self.injection.defer_first_qualifying_pass = enabled;
        self
    }

    /// Enable or disable the auto-request fallback
    pub fn with_auto_request(mut self, enabled: bool) -> Self {
        self.injection.auto_request = enabled;
        self
    }

    /// Set or disable the watchdog
    pub fn with_watchdog(mut self, frames: Option<u64>) -> Self {
        self.recovery.watchdog_frames = frames;
        self
    }

    /// Enable or disable the depth binder
    pub fn with_depth_binding(mut self, enabled: bool) -> Self {
        self.depth.enabled = enabled;
        self
    }

    /// Set the default log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signature.streak_required == 0 {
            return Err(ConfigError::Invalid("signature.streak_required must be at least 1".to_string()));
        }

        if self.signature.size_match_score > self.signature.backbuffer_score {
            return Err(ConfigError::Invalid(
                "signature.size_match_score must not exceed signature.backbuffer_score".to_string(),
            ));
        }

        if self.lock.migration_streak == 0 {
            return Err(ConfigError::Invalid("lock.migration_streak must be at least 1".to_string()));
        }

        if self.lock.stale_miss_frames == 0 {
            return Err(ConfigError::Invalid("lock.stale_miss_frames must be at least 1".to_string()));
        }

        if self.injection.request_window_passes > self.injection.request_max_pass_age {
            return Err(ConfigError::Invalid(
                "injection.request_window_passes must not exceed injection.request_max_pass_age".to_string(),
            ));
        }

        if !(self.depth.max_rebinds_per_second.is_finite() && self.depth.max_rebinds_per_second > 0.0) {
            return Err(ConfigError::Invalid("depth.max_rebinds_per_second must be positive".to_string()));
        }

        if self.depth.semantic.is_empty() {
            return Err(ConfigError::Invalid("depth.semantic cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl Config for SelectorConfig {}
