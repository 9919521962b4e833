//! Stage-banded progress reporting.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, warn};

use super::types::Stage;
use crate::ports::store::ProjectStore;

/// Inclusive percentage range reserved for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    /// Lowest value written for the stage.
    pub min: u8,
    /// Highest value written for the stage.
    pub max: u8,
}

impl Band {
    /// Maps `fraction` (clamped to `0.0..=1.0`) into the band.
    #[must_use]
    pub fn at(self, fraction: f64) -> f64 {
        let fraction = fraction.clamp(0.0, 1.0);
        // Round away float noise so 0.6 of a 20-wide band floors to 12, not 11.
        let offset = (f64::from(self.max - self.min) * fraction * 1e6).round() / 1e6;
        f64::from(self.min) + offset
    }

    /// Whether `value` lies inside the band.
    #[must_use]
    pub fn contains(self, value: u8) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Fixed stage → percentage table.
#[must_use]
pub const fn band(stage: Stage) -> Band {
    let (min, max) = match stage {
        Stage::Preparing => (0, 10),
        Stage::Generating => (10, 40),
        Stage::Continuation => (40, 60),
        Stage::Revising => (60, 90),
        Stage::Finalizing => (90, 99),
        Stage::Completed => (100, 100),
        Stage::Failed => (0, 0),
    };
    Band { min, max }
}

/// Writes progress for one run of one project.
///
/// Values are floored and never move backwards within a run, except for the
/// reset to zero when the run fails.
pub struct ProgressReporter<'a> {
    store: &'a dyn ProjectStore,
    project_id: String,
    last: AtomicU8,
}

impl<'a> ProgressReporter<'a> {
    /// Creates a reporter starting from zero.
    #[must_use]
    pub fn new(store: &'a dyn ProjectStore, project_id: &str) -> Self {
        Self {
            store,
            project_id: project_id.to_string(),
            last: AtomicU8::new(0),
        }
    }

    /// Writes `value` (floored, clamped to `0..=100`) with an optional stage.
    ///
    /// Returns the percentage actually written.
    pub fn update(&self, value: f64, stage: Option<Stage>) -> u8 {
        let percent = floor_percent(value);
        let percent = if stage == Some(Stage::Failed) {
            self.last.store(percent, Ordering::SeqCst);
            percent
        } else {
            let previous = self.last.fetch_max(percent, Ordering::SeqCst);
            previous.max(percent)
        };

        debug!(project = %self.project_id, percent, stage = ?stage, "progress");
        if let Err(e) = self.store.set_progress(&self.project_id, percent, stage) {
            warn!(project = %self.project_id, error = %e, "failed to write progress");
        }
        percent
    }

    /// Reports the point `fraction` of the way through `stage`'s band.
    pub fn report_within(&self, stage: Stage, fraction: f64) -> u8 {
        self.update(band(stage).at(fraction), Some(stage))
    }

    /// Reports the start of `stage`.
    pub fn enter(&self, stage: Stage) -> u8 {
        self.report_within(stage, 0.0)
    }

    /// Resets progress to zero and labels the run failed.
    pub fn fail(&self) -> u8 {
        self.update(0.0, Some(Stage::Failed))
    }

    /// Last value written.
    #[must_use]
    pub fn last(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.floor().clamp(0.0, 100.0) as u8
}
