//! End-to-end behavior of the limiter through its public API.

use std::sync::Arc;
use std::time::Duration;

use slidegate::config::{SlidegateConfig, SweeperConfig};
use slidegate::ratelimit::{Action, Code, ManualClock, Policy, PolicyTable, RateLimiter, Sweeper};

fn limiter() -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new();
    let limiter = RateLimiter::with_clock(Arc::new(clock.clone()));
    (limiter, clock)
}

#[test]
fn window_bound_holds_under_bursty_traffic() {
    let (limiter, clock) = limiter();
    let policy = Policy::new(4, 1000).unwrap();
    let mut admitted: Vec<u64> = Vec::new();

    // Bursts of 3 every 150ms for three seconds.
    for tick in 0..20u64 {
        clock.set_ms(tick * 150);
        for _ in 0..3 {
            if limiter.is_allowed("burst", &policy).unwrap() {
                admitted.push(clock.elapsed_ms());
            }
        }

        let now = clock.elapsed_ms();
        let in_window = admitted.iter().filter(|&&t| now - t < 1000).count();
        assert!(in_window <= 4, "{} admissions inside the window at t={}", in_window, now);
    }
}

#[test]
fn boundary_for_every_default_policy() {
    let (limiter, _clock) = limiter();

    for (action, policy) in PolicyTable::new().iter() {
        for i in 0..policy.limit {
            let decision = limiter.check(action, "boundary-user").unwrap();
            assert!(decision.is_allowed(), "{} attempt {} should pass", action, i + 1);
        }
        let decision = limiter.check(action, "boundary-user").unwrap();
        assert_eq!(decision.code, Code::OverLimit, "{} should deny past the limit", action);
    }
}

#[test]
fn sliding_scenario_matches_documented_timeline() {
    let (limiter, clock) = limiter();
    let policy = Policy::new(3, 10_000).unwrap();

    let outcomes: Vec<bool> = [0, 2000, 4000, 6000]
        .into_iter()
        .map(|t| {
            clock.set_ms(t);
            limiter.is_allowed("u1", &policy).unwrap()
        })
        .collect();
    assert_eq!(outcomes, vec![true, true, true, false]);

    clock.set_ms(10_001);
    assert!(limiter.is_allowed("u1", &policy).unwrap());
    assert!(!limiter.is_allowed("u1", &policy).unwrap());
}

#[test]
fn exhausting_one_subject_leaves_others_alone() {
    let (limiter, _clock) = limiter();

    while limiter.check(Action::NoteWrite, "alice").unwrap().is_allowed() {}

    let bob = limiter.status(Action::NoteWrite, "bob").unwrap();
    assert_eq!(bob.remaining, 5);
    assert!(limiter.check(Action::NoteWrite, "bob").unwrap().is_allowed());

    // Same subject, different action: separate quota.
    assert!(limiter.check(Action::CommentWrite, "alice").unwrap().is_allowed());
}

#[test]
fn status_after_denial_is_consistent() {
    let (limiter, clock) = limiter();

    for _ in 0..5 {
        limiter.check(Action::LoginAttempt, "mallory").unwrap();
        clock.advance_ms(1000);
    }
    let denied = limiter.check(Action::LoginAttempt, "mallory").unwrap();
    assert!(!denied.is_allowed());

    let status = limiter.status(Action::LoginAttempt, "mallory").unwrap();
    assert_eq!(status.remaining, 0);
    assert!(status.reset_time_ms > 0);
    assert!(status.reset_time_ms <= 300_000);
    assert_eq!(status.reset_time_ms, 300_000 - 5000);
    assert_eq!(denied.status.reset_time_ms, status.reset_time_ms);
}

#[test]
fn reset_twice_behaves_like_new_key() {
    let (limiter, _clock) = limiter();

    for _ in 0..3 {
        limiter.check(Action::ProfileUpdate, "carol").unwrap();
    }
    assert!(!limiter.check(Action::ProfileUpdate, "carol").unwrap().is_allowed());

    limiter.reset_action(Action::ProfileUpdate, "carol").unwrap();
    limiter.reset_action(Action::ProfileUpdate, "carol").unwrap();

    let decision = limiter.check(Action::ProfileUpdate, "carol").unwrap();
    assert!(decision.is_allowed());
    assert_eq!(decision.status.remaining, 2);
}

#[test]
fn sweeping_never_changes_admission_inside_a_window() {
    let (with_sweep, clock_a) = limiter();
    let (without_sweep, clock_b) = limiter();
    let with_sweep = Arc::new(with_sweep);
    let sweeper = Sweeper::new(with_sweep.clone(), SweeperConfig::default()).unwrap();

    for step in 0..40u64 {
        clock_a.set_ms(step * 7_000);
        clock_b.set_ms(step * 7_000);
        sweeper.sweep_once();

        let a = with_sweep.check(Action::ProfileUpdate, "dave").unwrap();
        let b = without_sweep.check(Action::ProfileUpdate, "dave").unwrap();
        assert_eq!(a.code, b.code, "diverged at step {}", step);
    }
}

#[test]
fn unknown_and_invalid_inputs_are_distinct_errors() {
    let (limiter, _clock) = limiter();

    let unknown = limiter.check_named("BULK_DELETE", "erin").unwrap_err();
    assert!(unknown.is_unknown_policy());

    let blank = limiter.check(Action::Search, "").unwrap_err();
    assert!(blank.is_invalid_argument());
    assert_eq!(limiter.tracked_keys(), 0);
}

#[test]
fn config_overrides_flow_into_limiter() {
    let yaml = r#"
policies:
  search:
    limit: 2
    window_ms: 1000
"#;
    let config = SlidegateConfig::from_yaml(yaml).unwrap();
    let clock = ManualClock::new();
    let limiter = RateLimiter::with_policies(config.policy_table().unwrap(), Some(Arc::new(clock.clone())));

    assert!(limiter.check(Action::Search, "frank").unwrap().is_allowed());
    assert!(limiter.check(Action::Search, "frank").unwrap().is_allowed());
    assert!(!limiter.check(Action::Search, "frank").unwrap().is_allowed());

    clock.advance(Duration::from_millis(1000));
    assert!(limiter.check(Action::Search, "frank").unwrap().is_allowed());
}
