//! Scene signature streak tracking

use serde::Serialize;

use crate::backend::Resource;

/// The (render target, depth target) pair observed in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SceneSignature {
    /// Render-target resource
    pub color: Resource,
    /// Depth-target resource
    pub depth: Resource,
}

impl SceneSignature {
    /// Pair of two resources
    pub const fn new(color: Resource, depth: Resource) -> Self {
        Self { color, depth }
    }

    /// Whether both halves are non-null
    pub const fn is_complete(&self) -> bool {
        !self.color.is_null() && !self.depth.is_null()
    }
}

/// Counts consecutive qualifying passes that share one signature
#[derive(Debug, Clone, Default)]
pub struct SignatureTracker {
    last: Option<SceneSignature>,
    streak: u32,
}

impl SignatureTracker {
    /// Tracker with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one pass; `None` (or an incomplete pair) means the pass did not qualify
    ///
    /// Returns the streak after the pass. A non-qualifying pass zeroes the
    /// streak but keeps the last signature.
    pub fn observe(&mut self, candidate: Option<SceneSignature>) -> u32 {
        match candidate.filter(SceneSignature::is_complete) {
            Some(signature) if self.last == Some(signature) => {
                self.streak = self.streak.saturating_add(1);
            }
            Some(signature) => {
                self.last = Some(signature);
                self.streak = 1;
            }
            None => self.streak = 0,
        }
        self.streak
    }

    /// Current streak
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Last qualifying signature
    pub fn last(&self) -> Option<SceneSignature> {
        self.last
    }

    /// Zero the streak without forgetting the signature
    pub fn hold(&mut self) {
        self.streak = 0;
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AB: SceneSignature = SceneSignature::new(Resource(1), Resource(2));
    const CB: SceneSignature = SceneSignature::new(Resource(3), Resource(2));

    #[test]
    fn test_streak_counts_identical_qualifying_passes() {
        let mut tracker = SignatureTracker::new();
        for expected in 1..=5 {
            assert_eq!(tracker.observe(Some(AB)), expected);
        }
    }

    #[test]
    fn test_signature_change_restarts_at_one() {
        let mut tracker = SignatureTracker::new();
        tracker.observe(Some(AB));
        tracker.observe(Some(AB));
        assert_eq!(tracker.observe(Some(CB)), 1);
        assert_eq!(tracker.last(), Some(CB));
    }

    #[test]
    fn test_non_qualifying_pass_zeroes_but_keeps_signature() {
        let mut tracker = SignatureTracker::new();
        tracker.observe(Some(AB));
        tracker.observe(Some(AB));
        assert_eq!(tracker.observe(None), 0);
        assert_eq!(tracker.last(), Some(AB));
        // The remembered signature continues the count from zero
        assert_eq!(tracker.observe(Some(AB)), 1);
    }

    #[test]
    fn test_incomplete_signature_never_qualifies() {
        let mut tracker = SignatureTracker::new();
        tracker.observe(Some(AB));
        let half = SceneSignature::new(Resource(1), Resource::NULL);
        assert_eq!(tracker.observe(Some(half)), 0);
    }
}
