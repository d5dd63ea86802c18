//! Foundation module - Core utilities
//!
//! - Logging initialisation
//! - Wall-clock rate limiting

pub mod logging;
pub mod time;
