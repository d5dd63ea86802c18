//! # Core Module
//!
//! Shared configuration types used by every part of the selector.

pub mod config;

pub use crate::config::{Config, ConfigError};

pub use config::{
    DepthBindConfig,
    InjectionConfig,
    LockConfig,
    LoggingConfig,
    RecoveryConfig,
    ReloadConfig,
    SelectorConfig,
    SignatureConfig,
    StabilizeConfig,
};
