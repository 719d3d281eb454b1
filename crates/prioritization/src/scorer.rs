//! Scoring capability.
//!
//! The engine only knows the [`Scorer`] trait. Anything that maps a
//! [`FeatureVector`] to a number can be plugged in: the bundled
//! [`LinearScorer`] loaded from a model artifact, a closure, or a client
//! for a remote model.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Errors a scorer may report for a single vector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    /// The backing model cannot be reached
    #[error("scorer unavailable: {0}")]
    Unavailable(String),

    /// The model expects a different number of features
    #[error("feature vector has {found} values, scorer expects {expected}")]
    DimensionMismatch {
        /// Expected length
        expected: usize,
        /// Actual length
        found: usize,
    },

    /// The model produced something that is not a usable score
    #[error("malformed score: {0}")]
    Malformed(String),

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

/// Maps a feature vector to a priority score. Higher ranks first.
///
/// Implementations must be pure: same input, same output, no side
/// effects. They are shared across threads without locking.
pub trait Scorer: Send + Sync {
    /// Score one feature vector.
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError>;
}

impl<F> Scorer for F
where
    F: Fn(&FeatureVector) -> Result<f64, ScoreError> + Send + Sync,
{
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        self(features)
    }
}

/// Errors raised while loading a model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ScorerLoadError {
    /// Artifact could not be read
    #[error("cannot read model artifact {path}: {source}")]
    Io {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Artifact is not valid JSON for [`ModelArtifact`]
    #[error("invalid model artifact: {0}")]
    Json(#[from] serde_json::Error),

    /// Artifact was trained on a different feature layout
    #[error("model features {found:?} do not match {expected:?}")]
    FeatureOrder {
        /// Features the extractor produces
        expected: Vec<String>,
        /// Features the artifact declares
        found: Vec<String>,
    },

    /// Weight count differs from the feature count
    #[error("model has {found} weights, expected {expected}")]
    WeightCount {
        /// Expected count
        expected: usize,
        /// Count in the artifact
        found: usize,
    },

    /// A weight or the intercept is NaN or infinite
    #[error("model parameters must be finite")]
    NonFinite,
}

/// On-disk form of a linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Free-form model version
    pub version: String,
    /// Feature names, in the order the weights apply to
    pub features: Vec<String>,
    /// One weight per feature
    pub weights: Vec<f64>,
    /// Constant term
    #[serde(default)]
    pub intercept: f64,
}

/// Linear model: `intercept + Σ weight_i * feature_i`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearScorer {
    version: String,
    weights: [f64; FEATURE_COUNT],
    intercept: f64,
}

impl LinearScorer {
    /// Build a scorer from weights in feature order.
    pub fn new(version: impl Into<String>, weights: [f64; FEATURE_COUNT], intercept: f64) -> Self {
        Self {
            version: version.into(),
            weights,
            intercept,
        }
    }

    /// Load and validate a JSON model artifact.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScorerLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ScorerLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)?;
        Self::from_artifact(artifact)
    }

    /// Validate an artifact against the extractor's feature layout.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ScorerLoadError> {
        if artifact.features.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ScorerLoadError::FeatureOrder {
                expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                found: artifact.features,
            });
        }

        let found = artifact.weights.len();
        let weights: [f64; FEATURE_COUNT] = artifact
            .weights
            .try_into()
            .map_err(|_| ScorerLoadError::WeightCount { expected: FEATURE_COUNT, found })?;

        if !artifact.intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(ScorerLoadError::NonFinite);
        }

        Ok(Self::new(artifact.version, weights, artifact.intercept))
    }

    /// Model version from the artifact.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Scorer for LinearScorer {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        let values = features.as_slice();
        if values.len() != self.weights.len() {
            return Err(ScoreError::DimensionMismatch {
                expected: self.weights.len(),
                found: values.len(),
            });
        }
        Ok(self.intercept + self.weights.iter().zip(values).map(|(w, x)| w * x).sum::<f64>())
    }
}

/// Process-wide scorer slot.
///
/// Set once at startup and read-only afterwards. A failed load is kept
/// as `Unavailable` so every prioritization request can report it instead
/// of scoring with a missing model.
#[derive(Clone)]
pub enum ScorerState {
    /// A usable scorer
    Loaded(Arc<dyn Scorer>),
    /// No scorer; prioritization is refused
    Unavailable {
        /// Why loading failed
        reason: String,
    },
}

impl ScorerState {
    /// Wrap a ready scorer.
    pub fn loaded(scorer: impl Scorer + 'static) -> Self {
        Self::Loaded(Arc::new(scorer))
    }

    /// Record that no scorer is available.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    /// Load a [`LinearScorer`] artifact, degrading to `Unavailable` on failure.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match LinearScorer::load(path) {
            Ok(scorer) => {
                info!("Loaded model {} from {}", scorer.version(), path.display());
                Self::loaded(scorer)
            }
            Err(e) => {
                warn!("Model loading failed: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    /// Whether a scorer is loaded.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// The scorer, or the reason there is none.
    pub fn scorer(&self) -> Result<&dyn Scorer, &str> {
        match self {
            Self::Loaded(scorer) => Ok(scorer.as_ref()),
            Self::Unavailable { reason } => Err(reason.as_str()),
        }
    }
}

impl std::fmt::Debug for ScorerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded(_) => f.write_str("ScorerState::Loaded"),
            Self::Unavailable { reason } => {
                f.debug_struct("ScorerState::Unavailable").field("reason", reason).finish()
            }
        }
    }
}
