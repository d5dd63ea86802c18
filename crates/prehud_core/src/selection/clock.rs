//! Frame and pass counters
//!
//! Both counters are process-wide and monotonic for the lifetime of a graphics
//! context. They are atomics because trigger threads read them to tag requests;
//! only the submission thread advances them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Frame/pass clock
#[derive(Debug, Default)]
pub struct FrameClock {
    frame: AtomicU64,
    pass: AtomicU64,
    frame_start_pass: AtomicU64,
}

impl FrameClock {
    /// Clock at frame 0, pass 0
    pub const fn new() -> Self {
        Self {
            frame: AtomicU64::new(0),
            pass: AtomicU64::new(0),
            frame_start_pass: AtomicU64::new(0),
        }
    }

    /// Start a new frame; returns the new frame index
    ///
    /// Snapshots the pass counter as the first pass index of the frame.
    pub fn advance_frame(&self) -> u64 {
        let frame = self.frame.fetch_add(1, Ordering::Relaxed) + 1;
        self.frame_start_pass
            .store(self.pass.load(Ordering::Relaxed), Ordering::Relaxed);
        frame
    }

    /// Count one render-pass begin; returns the new pass index
    pub fn advance_pass(&self) -> u64 {
        self.pass.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current frame index
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    /// Most recent pass index
    pub fn pass(&self) -> u64 {
        self.pass.load(Ordering::Relaxed)
    }

    /// Pass index snapshotted when the current frame started
    pub fn frame_start_pass(&self) -> u64 {
        self.frame_start_pass.load(Ordering::Relaxed)
    }

    /// How many passes into the current frame `pass` is
    pub fn passes_into_frame(&self, pass: u64) -> u64 {
        pass.saturating_sub(self.frame_start_pass())
    }

    /// Back to frame 0, pass 0 (context teardown only)
    pub fn reset(&self) {
        self.frame.store(0, Ordering::Relaxed);
        self.pass.store(0, Ordering::Relaxed);
        self.frame_start_pass.store(0, Ordering::Relaxed);
    }
}
