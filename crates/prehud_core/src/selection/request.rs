//! Single-slot injection request channel
//!
//! Trigger threads post requests; the submission thread validates and consumes
//! them. There is never more than one pending request, so there is no queue to
//! grow. All loads and stores are relaxed: every consumer re-validates the frame
//! tag and pass distance before acting, so ordering between a post and a read
//! only needs to be "eventually visible".

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

/// A request tagged with the clock values at arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    /// Frame index at arrival
    pub frame: u64,
    /// Pass index at arrival
    pub pass: u64,
}

impl PendingRequest {
    /// Whether the request must be discarded at (`frame`, `pass`)
    pub fn is_stale(&self, frame: u64, pass: u64, max_pass_age: u64) -> bool {
        self.frame != frame || pass.saturating_sub(self.pass) > max_pass_age
    }

    /// Whether `pass` lies strictly after the request and within `window` passes of it
    pub fn within_window(&self, pass: u64, window: u64) -> bool {
        pass > self.pass && pass - self.pass <= window
    }
}

/// Outcome of posting a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Stored as the pending request
    Accepted,
    /// A request for the same frame is already pending; its earlier anchor is kept
    Coalesced,
}

/// The request slot
#[derive(Debug, Default)]
pub struct RequestChannel {
    pending: AtomicBool,
    frame: AtomicU64,
    pass: AtomicU64,
    defer: AtomicBool,
    last_external_frame: AtomicU64,
    accepted: AtomicU32,
}

impl RequestChannel {
    /// Empty channel
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            frame: AtomicU64::new(0),
            pass: AtomicU64::new(0),
            defer: AtomicBool::new(false),
            last_external_frame: AtomicU64::new(0),
            accepted: AtomicU32::new(0),
        }
    }

    /// Post a request tagged (`frame`, `pass`)
    ///
    /// Every accepted request re-arms the defer-once flag.
    pub fn post(&self, frame: u64, pass: u64) -> PostOutcome {
        if self.pending.load(Ordering::Relaxed) && self.frame.load(Ordering::Relaxed) == frame {
            return PostOutcome::Coalesced;
        }
        self.frame.store(frame, Ordering::Relaxed);
        self.pass.store(pass, Ordering::Relaxed);
        self.defer.store(true, Ordering::Relaxed);
        self.pending.store(true, Ordering::Relaxed);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        PostOutcome::Accepted
    }

    /// Post a request that came from the external trigger source
    pub fn post_external(&self, frame: u64, pass: u64) -> PostOutcome {
        let outcome = self.post(frame, pass);
        if outcome == PostOutcome::Accepted {
            self.last_external_frame.store(frame, Ordering::Relaxed);
        }
        outcome
    }

    /// Pending request, if any
    pub fn pending(&self) -> Option<PendingRequest> {
        if !self.pending.load(Ordering::Relaxed) {
            return None;
        }
        Some(PendingRequest {
            frame: self.frame.load(Ordering::Relaxed),
            pass: self.pass.load(Ordering::Relaxed),
        })
    }

    /// Pending request after dropping it if stale
    pub fn validate(&self, frame: u64, pass: u64, max_pass_age: u64) -> Option<PendingRequest> {
        let request = self.pending()?;
        if request.is_stale(frame, pass, max_pass_age) {
            self.clear();
            return None;
        }
        Some(request)
    }

    /// Drop the pending request
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Relaxed);
    }

    /// Consume the defer-once flag; true if it was set
    pub fn take_defer(&self) -> bool {
        self.defer.swap(false, Ordering::Relaxed)
    }

    /// Whether the defer-once flag is set
    pub fn defer_armed(&self) -> bool {
        self.defer.load(Ordering::Relaxed)
    }

    /// Set the defer-once flag without posting
    pub fn arm_defer(&self) {
        self.defer.store(true, Ordering::Relaxed);
    }

    /// Whether the external trigger posted within `grace_frames` of `frame`
    pub fn external_feed_alive(&self, frame: u64, grace_frames: u64) -> bool {
        let last = self.last_external_frame.load(Ordering::Relaxed);
        last != 0 && frame.saturating_sub(last) <= grace_frames
    }

    /// Requests accepted since creation
    pub fn accepted_count(&self) -> u32 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Forget everything, including the external-feed bookkeeping
    pub fn reset(&self) {
        self.clear();
        self.frame.store(0, Ordering::Relaxed);
        self.pass.store(0, Ordering::Relaxed);
        self.defer.store(true, Ordering::Relaxed);
        self.last_external_frame.store(0, Ordering::Relaxed);
    }
}
