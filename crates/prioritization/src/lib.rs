//! Prioritization layer - feature extraction, dependency readiness,
//! scoring, and ranking.

#![warn(missing_docs)]

pub mod features;
pub mod dependency;
pub mod scorer;
pub mod engine;

pub use features::{FeatureExtractor, FeatureError, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use dependency::{DependencyResolver, Resolution};
pub use scorer::{LinearScorer, ModelArtifact, ScoreError, Scorer, ScorerLoadError, ScorerState};
pub use engine::{EngineConfig, PrioritizationEngine, PrioritizeError};
