//! Cross-iteration progress tracking
//!
//! Stores the compliance-score history for one inner loop and detects
//! stagnation. Also owns the graduated acceptance threshold.

use tracing::debug;

/// Graduated inner-loop acceptance target
///
/// The accepted compliance target rises with iteration count (1-indexed):
/// 0.60 for the first three iterations, 0.70 through the sixth, 0.85
/// thereafter. Early iterations must make some progress, later iterations
/// must approach full compliance.
pub fn graduated_target(inner_iteration: u32) -> f64 {
    match inner_iteration {
        0..=3 => 0.60,
        4..=6 => 0.70,
        _ => 0.85,
    }
}

/// Tracks compliance scores to detect stagnation
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    scores: Vec<f64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a compliance score to the history
    pub fn add_score(&mut self, score: f64) {
        debug!(score, count = self.scores.len() + 1, "ProgressTracker::add_score: called");
        self.scores.push(score);
    }

    /// Recorded score history
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Check whether the loop has stagnated
    ///
    /// Stuck iff the last three recorded scores form a non-increasing
    /// sequence. Fewer than three scores is never stuck.
    pub fn is_stuck(&self) -> bool {
        if self.scores.len() < 3 {
            return false;
        }

        let last_three = &self.scores[self.scores.len() - 3..];
        let stuck = last_three[2] <= last_three[1] && last_three[1] <= last_three[0];
        debug!(?last_three, stuck, "ProgressTracker::is_stuck: checked");
        stuck
    }
}
