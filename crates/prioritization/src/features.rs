//! Feature extraction.
//!
//! Turns a task into the fixed-order numeric vector the scorer was built
//! against. The order in [`FEATURE_NAMES`] is part of the scorer contract:
//! reordering it invalidates every existing model artifact.

use chrono::NaiveDate;
use taskrank_core::{Task, Time};
use tracing::debug;

/// Number of features in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 5;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "days_left",
    "urgency_score",
    "dependency_count",
    "normalized_urgency",
    "overdue_flag",
];

/// Deadline format accepted by the extractor.
pub const DEADLINE_FORMAT: &str = "%Y-%m-%d";

/// Errors detected while validating a feature vector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    /// A feature is NaN or infinite
    #[error("Feature mismatch: {feature} is not a finite number ({value})")]
    NonFinite {
        /// Offending feature
        feature: &'static str,
        /// Its value
        value: f64,
    },
}

/// Fixed-order numeric features of one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build a vector from raw values in [`FEATURE_NAMES`] order.
    pub const fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    /// Values in [`FEATURE_NAMES`] order.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Signed whole days until the deadline.
    pub fn days_left(&self) -> f64 {
        self.0[0]
    }

    /// Raw urgency.
    pub fn urgency_score(&self) -> f64 {
        self.0[1]
    }

    /// Number of declared dependencies.
    pub fn dependency_count(&self) -> f64 {
        self.0[2]
    }

    /// Normalized urgency.
    pub fn normalized_urgency(&self) -> f64 {
        self.0[3]
    }

    /// `1` when the task is marked overdue, else `0`.
    pub fn overdue_flag(&self) -> f64 {
        self.0[4]
    }

    /// Check every value is finite.
    pub fn validate(&self) -> Result<(), FeatureError> {
        match self.0.iter().zip(FEATURE_NAMES).find(|(v, _)| !v.is_finite()) {
            Some((&value, feature)) => Err(FeatureError::NonFinite { feature, value }),
            None => Ok(()),
        }
    }
}

/// Derives feature vectors from tasks.
///
/// Extraction never fails. An unparsable or missing deadline degrades to
/// a neutral `days_left` of `0`, so a badly dated task looks the same as
/// one due today.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }

    /// Build the feature vector of `task` evaluated at `now`.
    pub fn extract(&self, task: &Task, now: Time) -> FeatureVector {
        let days_left = self.days_left(task.deadline.as_deref(), now);
        let overdue_flag = if task.status.is_overdue() { 1.0 } else { 0.0 };

        FeatureVector([
            days_left as f64,
            task.urgency_score as f64,
            task.dependencies.len() as f64,
            task.normalized_urgency,
            overdue_flag,
        ])
    }

    /// Calendar days from `now` to `deadline`; negative once it has passed.
    pub fn days_left(&self, deadline: Option<&str>, now: Time) -> i64 {
        let Some(raw) = deadline else {
            return 0;
        };
        match NaiveDate::parse_from_str(raw, DEADLINE_FORMAT) {
            Ok(date) => (date - now.date_naive()).num_days(),
            Err(e) => {
                debug!("Unparsable deadline {:?} ({}), using 0 days left", raw, e);
                0
            }
        }
    }
}
