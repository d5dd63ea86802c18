//! Selection behaviour over scripted frames

use super::harness::*;
use crate::backend::Resource;
use crate::backend::synthetic::FaultMode;
use crate::selection::{PassOutcome, RejectReason, SceneSignature, SelectionState};

const LOCK_AB: SceneSignature = SceneSignature::new(Resource(A), Resource(B));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streak_follows_identical_qualifying_passes() {
        let mut h = Harness::new(test_config());
        h.present();
        for expected in 1..=2 {
            h.pass(&scene(C, B));
            assert_eq!(h.engine.snapshot().streak, expected);
        }
        // Passes without depth leave the streak alone
        h.pass(&hud());
        assert_eq!(h.engine.snapshot().streak, 2);
        // A non-qualifying pass zeroes it
        h.pass(&scene(HUD, SHADOW));
        assert_eq!(h.engine.snapshot().streak, 0);
        h.pass(&scene(D, B));
        assert_eq!(h.engine.snapshot().streak, 1);
    }

    #[test]
    fn test_promotion_exactly_at_threshold() {
        let mut h = Harness::new(test_config());
        h.present();
        assert_eq!(h.engine.state(), SelectionState::Armed);

        h.pass(&scene(A, B));
        h.pass(&scene(A, B));
        assert_eq!(h.engine.state(), SelectionState::Armed);
        h.pass(&scene(A, B));
        assert_eq!(h.engine.state(), SelectionState::Active);
    }

    #[test]
    fn test_armed_timeout_promotes_oscillating_signature() {
        let mut h = Harness::new(test_config());
        let oscillating = [scene(A, B), scene(C, B), hud()];
        let mut activated_at = None;
        for _ in 0..300 {
            h.frame(false, &oscillating);
            assert!(h.engine.snapshot().streak <= 1);
            if h.engine.state() == SelectionState::Active {
                activated_at = Some(h.engine.snapshot().frame);
                break;
            }
        }
        // Armed at frame 1, promoted once more than 240 frames have passed
        assert_eq!(activated_at, Some(242));
    }

    #[test]
    fn test_request_from_previous_frame_is_never_used() {
        let mut h = Harness::locked(test_config());

        let outcomes = h.frame(true, &[hud(), hud()]);
        assert_eq!(injections(&outcomes), 0);
        assert!(h.engine.snapshot().pending_request.is_some());

        let outcomes = h.frame(false, &standard_frame());
        assert_eq!(injections(&outcomes), 0);
        assert_eq!(h.engine.snapshot().pending_request, None);
        assert_eq!(h.render_count(), 2);
    }

    #[test]
    fn test_at_most_one_injection_per_frame() {
        let mut config = test_config();
        config.injection.auto_request = true;
        let mut h = Harness::new(config);

        let mut passes = vec![scene(A, B); 8];
        passes.extend(std::iter::repeat_with(hud).take(4));
        for _ in 0..50 {
            h.present();
            let mut outcomes = Vec::new();
            for pass in &passes {
                h.trigger.request_injection();
                outcomes.push(h.pass(pass));
                assert!(h.engine.snapshot().injected_this_frame == (injections(&outcomes) == 1));
            }
            assert!(injections(&outcomes) <= 1);
        }
        assert!(h.render_count() >= 49);
    }

    #[test]
    fn test_end_to_end_first_lock() {
        let mut h = Harness::new(test_config());

        let first = h.frame(true, &standard_frame());
        assert_eq!(first[0], PassOutcome::Deferred);
        assert!(matches!(first[1], PassOutcome::Rejected(mask) if mask.contains(RejectReason::NOT_ACTIVE)));
        assert_eq!(first[2], PassOutcome::Injected { count: 1 });
        assert_eq!(h.engine.state(), SelectionState::Active);
        assert_eq!(h.engine.lock(), Some(LOCK_AB));

        for _ in 1..10 {
            let outcomes = h.frame(true, &standard_frame());
            assert_eq!(outcomes[0], PassOutcome::Deferred);
            assert!(matches!(outcomes[1], PassOutcome::Injected { .. }));
            assert_eq!(injections(&outcomes), 1);
            assert_eq!(h.engine.lock(), Some(LOCK_AB));
        }
        assert_eq!(h.render_count(), 10);
        assert!(h.compositor.render_calls().iter().all(|call| call.write.0 == A));

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.lock_last_hit_frame, Some(10));
        assert_eq!(snapshot.last_injection_pass, Some(110));
        assert!(!snapshot.defer_armed);
    }

    #[test]
    fn test_lock_survives_short_render_target_detours() {
        let mut h = Harness::locked(test_config());
        let mut passes = vec![scene(C, B), scene(C, B), scene(A, B), scene(A, B)];
        passes.extend(std::iter::repeat_with(hud).take(8));

        for _ in 0..500 {
            let outcomes = h.frame(true, &passes);
            assert_eq!(outcomes[0], PassOutcome::Migrating);
            assert_eq!(injections(&outcomes), 1);
            assert_eq!(h.engine.lock(), Some(LOCK_AB));
        }
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.migrations, 0);
        assert_eq!(snapshot.lock_miss_frames, 0);
        assert_eq!(h.render_count(), 502);
    }

    #[test]
    fn test_lock_stable_under_backbuffer_churn() {
        let mut h = Harness::locked(test_config());
        for frame in 0..100u64 {
            let churn = 100 + frame;
            h.add_color_target(churn);
            h.compositor.set_back_buffer(Resource(churn));
            let mut passes = vec![scene(churn, B); 3];
            passes.push(hud());
            h.frame(true, &passes);
            assert_eq!(h.engine.lock(), Some(LOCK_AB));
        }
        assert_eq!(h.engine.snapshot().migrations, 0);
    }

    #[test]
    fn test_render_target_migrates_after_streak() {
        let mut h = Harness::locked(test_config());
        let mut passes = vec![scene(C, B); 6];
        passes.extend(std::iter::repeat_with(hud).take(6));

        let outcomes = h.frame(true, &passes);
        assert_eq!(outcomes[..3], [PassOutcome::Migrating, PassOutcome::Migrating, PassOutcome::Migrating]);
        assert_eq!(outcomes[3], PassOutcome::Deferred);
        assert!(matches!(outcomes[4], PassOutcome::Injected { .. }));
        assert_eq!(h.engine.lock(), Some(SceneSignature::new(Resource(C), Resource(B))));
        assert_eq!(h.engine.snapshot().migrations, 1);
    }

    #[test]
    fn test_fault_latch_is_permanent() {
        let mut h = Harness::new(test_config());
        h.compositor.set_fault_mode(FaultMode::Panic);

        let outcomes = h.frame(true, &standard_frame());
        assert_eq!(outcomes[2], PassOutcome::Faulted);
        assert!(h.engine.snapshot().fault_latched);
        assert_eq!(h.engine.snapshot().pending_request, None);

        h.compositor.set_fault_mode(FaultMode::Never);
        let variants = [standard_frame(), vec![scene(C, B); 5], vec![scene(A, E), scene(A, B), hud()]];
        for frame in 0..200 {
            if frame == 50 {
                h.engine.on_reloaded_effects();
            }
            if frame == 120 {
                h.trigger.notify_weather_change(1);
            }
            let outcomes = h.frame(true, &variants[frame % variants.len()]);
            assert_eq!(injections(&outcomes), 0);
            assert!(!outcomes.contains(&PassOutcome::Faulted));
            assert!(!h.engine.snapshot().injected_this_frame);
        }
        assert_eq!(h.render_count(), 1);
        assert!(h.engine.snapshot().fault_latched);
    }

    #[test]
    fn test_reported_fault_is_latched_too() {
        let mut h = Harness::locked(test_config());
        h.compositor.set_fault_mode(FaultMode::Report);
        let outcomes = h.frame(true, &standard_frame());
        assert_eq!(outcomes[1], PassOutcome::Faulted);

        h.compositor.set_fault_mode(FaultMode::Never);
        let outcomes = h.frame(true, &standard_frame());
        assert!(matches!(outcomes[1], PassOutcome::Rejected(mask) if mask.contains(RejectReason::FAULTED)));
        let snapshot = h.engine.snapshot();
        assert!(snapshot.fault.unwrap().contains("synthetic device lost"));
    }

    #[test]
    fn test_multisampled_scene_keeps_request_pending() {
        let mut h = Harness::new(test_config());
        h.compositor.set_back_buffer(Resource(MSAA));
        let outcomes = h.frame(true, &[scene(MSAA, B), scene(MSAA, B), scene(MSAA, B)]);
        assert_eq!(h.engine.state(), SelectionState::Active);
        assert_eq!(outcomes[2], PassOutcome::Rejected(RejectReason::UNSUPPORTED_TARGET));
        assert!(h.engine.snapshot().pending_request.is_some());
        assert_eq!(h.render_count(), 0);
    }

    #[test]
    fn test_late_pass_is_outside_frame_phase() {
        let mut h = Harness::locked(test_config());
        h.present();
        h.run(&vec![hud(); 60]);
        h.trigger.request_injection();
        h.run(&vec![hud(); 30]);
        let outcomes = h.run(&[scene(A, B), scene(A, B)]);
        assert_eq!(outcomes[0], PassOutcome::Deferred);
        assert!(matches!(outcomes[1], PassOutcome::Rejected(mask) if mask == RejectReason::LATE_IN_FRAME));
    }

    #[test]
    fn test_stale_lock_rearms_and_reacquires() {
        let mut config = test_config();
        config.lock.stale_miss_frames = 5;
        let mut h = Harness::locked(config);

        let mut rearmed_at = None;
        for _ in 0..10 {
            h.frame(false, &[scene(D, E), hud()]);
            if h.engine.state() == SelectionState::Armed {
                rearmed_at = Some(h.engine.snapshot().frame);
                break;
            }
        }
        assert_eq!(rearmed_at, Some(8));
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.lock, None);
        assert_eq!(snapshot.pending_request.map(|request| request.frame), Some(8));

        let outcomes = h.frame(true, &[scene(D, E), scene(D, E), scene(D, E), hud()]);
        assert!(matches!(outcomes[2], PassOutcome::Injected { .. }));
        assert_eq!(h.engine.lock(), Some(SceneSignature::new(Resource(D), Resource(E))));
    }
}
