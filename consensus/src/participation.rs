//! Participation scoring.
//!
//! Each observation nudges a validator's score toward 1 (participated) or
//! 0 (missed) by an exponential moving average.

use meridian_types::ParticipationStatus;

/// Next score after one observation. Always in `[0, 1]`.
pub fn next_score(previous: f64, status: ParticipationStatus, alpha: f64) -> f64 {
    let target = match status {
        ParticipationStatus::Participated => 1.0,
        ParticipationStatus::Missed => 0.0,
    };
    let prev = if previous.is_finite() {
        previous.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (prev + alpha * (target - prev)).clamp(0.0, 1.0)
}
