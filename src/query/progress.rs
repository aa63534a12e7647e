use std::time::Duration;

use tokio::time::Instant;

/// Point-in-time progress of a job derived from its declared duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub progress: f64,
    pub is_complete: bool,
}

/// Estimate progress as the elapsed fraction of `declared`, capped at 1.0.
///
/// A zero declared duration is complete immediately. `now` earlier than
/// `submitted_at` reports zero progress.
pub fn estimate(submitted_at: Instant, declared: Duration, now: Instant) -> Estimate {
    if declared.is_zero() {
        return Estimate {
            progress: 1.0,
            is_complete: true,
        };
    }

    let elapsed = now.saturating_duration_since(submitted_at);
    let progress = (elapsed.as_secs_f64() / declared.as_secs_f64()).min(1.0);

    Estimate {
        progress,
        is_complete: progress >= 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_is_zero_progress() {
        let start = Instant::now();
        let est = estimate(start, Duration::from_secs(60), start);
        assert_eq!(est.progress, 0.0);
        assert!(!est.is_complete);
    }

    #[test]
    fn halfway_reports_half() {
        let start = Instant::now();
        let est = estimate(start, Duration::from_secs(60), start + Duration::from_secs(30));
        assert!((est.progress - 0.5).abs() < f64::EPSILON);
        assert!(!est.is_complete);
    }

    #[test]
    fn past_declared_duration_caps_at_one() {
        let start = Instant::now();
        let est = estimate(start, Duration::from_secs(60), start + Duration::from_secs(600));
        assert_eq!(est.progress, 1.0);
        assert!(est.is_complete);
    }

    #[test]
    fn exactly_declared_duration_is_complete() {
        let start = Instant::now();
        let est = estimate(start, Duration::from_secs(60), start + Duration::from_secs(60));
        assert!(est.is_complete);
    }

    #[test]
    fn clock_before_submission_is_zero() {
        let start = Instant::now() + Duration::from_secs(10);
        let est = estimate(start, Duration::from_secs(60), Instant::now());
        assert_eq!(est.progress, 0.0);
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let start = Instant::now();
        let est = estimate(start, Duration::ZERO, start);
        assert_eq!(est.progress, 1.0);
        assert!(est.is_complete);
    }

    #[test]
    fn estimates_are_monotonic_in_time() {
        let start = Instant::now();
        let declared = Duration::from_secs(120);
        let mut last = 0.0;
        for secs in (0..200).step_by(7) {
            let est = estimate(start, declared, start + Duration::from_secs(secs));
            assert!(est.progress >= last);
            assert!((0.0..=1.0).contains(&est.progress));
            last = est.progress;
        }
    }
}
