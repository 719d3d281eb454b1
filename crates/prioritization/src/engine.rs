//! The prioritization engine - scores, classifies and ranks tasks.

use std::cmp::Ordering;
use crate::{DependencyResolver, FeatureError, FeatureExtractor, ScoreError, Scorer, ScorerState};
use taskrank_core::{AnnotatedTask, EvaluationContext, Task, TaskStatus, Time};
use tracing::{debug, info, warn};

/// Configuration for the prioritization engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Score tasks on the rayon thread pool. Only effective when built
    /// with the `parallel` feature.
    pub parallel: bool,
}

/// Errors returned by the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrioritizeError {
    /// No scorer was loaded; nothing is ranked
    #[error("scorer unavailable: {reason}")]
    ScorerUnavailable {
        /// Why the scorer is missing
        reason: String,
    },

    /// The task's feature vector is unusable
    #[error(transparent)]
    Features(#[from] FeatureError),

    /// The scorer rejected the task
    #[error(transparent)]
    Scoring(#[from] ScoreError),
}

/// Ranks tasks by score and classifies their readiness.
///
/// ```text
/// Task ─► FeatureExtractor ─► Scorer ─► score ─┐
///   └──► DependencyResolver ─► Ready/Blocked ──┴─► AnnotatedTask ─► sort
/// ```
///
/// Every call is computed from its inputs alone. Nothing is cached and
/// the input tasks are never modified.
pub struct PrioritizationEngine {
    extractor: FeatureExtractor,
    resolver: DependencyResolver,
    scorer: ScorerState,
    config: EngineConfig,
}

impl PrioritizationEngine {
    /// Create an engine around the given scorer state.
    pub fn new(scorer: ScorerState) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            resolver: DependencyResolver::new(),
            scorer,
            config: EngineConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a scorer is loaded.
    pub fn is_ready(&self) -> bool {
        self.scorer.is_available()
    }

    /// Fail with `ScorerUnavailable` when no scorer is loaded.
    pub fn ensure_scorer(&self) -> Result<(), PrioritizeError> {
        self.scorer().map(|_| ())
    }

    /// Score, classify and rank `tasks`.
    ///
    /// Tasks that fail to score stay in the output with an `error`, their
    /// status untouched, ranked as if their score were `0`. Equal scores
    /// keep their input order. Fails as a whole only when no scorer is
    /// loaded.
    pub fn prioritize(
        &self,
        tasks: &[Task],
        ctx: &EvaluationContext,
    ) -> Result<Vec<AnnotatedTask>, PrioritizeError> {
        let scorer = self.scorer()?;
        info!(
            "Prioritizing {} tasks ({} completed ids)",
            tasks.len(),
            ctx.completed_ids.len()
        );

        let mut annotated = self.annotate_all(scorer, tasks, ctx);
        rank(&mut annotated);

        let failed = annotated.iter().filter(|a| a.error.is_some()).count();
        if failed > 0 {
            warn!("{} of {} tasks could not be scored", failed, annotated.len());
        }
        Ok(annotated)
    }

    /// The ranked tasks that are scored and ready to work on.
    pub fn ready_queue(
        &self,
        tasks: &[Task],
        ctx: &EvaluationContext,
    ) -> Result<Vec<AnnotatedTask>, PrioritizeError> {
        let mut ranked = self.prioritize(tasks, ctx)?;
        ranked.retain(AnnotatedTask::is_ready);
        Ok(ranked)
    }

    /// Score a single task without classifying it.
    pub fn score_task(&self, task: &Task, now: Time) -> Result<f64, PrioritizeError> {
        let scorer = self.scorer()?;
        self.score_with(scorer, task, now)
    }

    fn scorer(&self) -> Result<&dyn Scorer, PrioritizeError> {
        self.scorer.scorer().map_err(|reason| PrioritizeError::ScorerUnavailable {
            reason: reason.to_string(),
        })
    }

    fn score_with(&self, scorer: &dyn Scorer, task: &Task, now: Time) -> Result<f64, PrioritizeError> {
        let features = self.extractor.extract(task, now);
        features.validate()?;

        let score = scorer.score(&features)?;
        if !score.is_finite() {
            return Err(ScoreError::Malformed(format!("scorer returned {}", score)).into());
        }
        Ok(score)
    }

    fn annotate(&self, scorer: &dyn Scorer, task: &Task, ctx: &EvaluationContext) -> AnnotatedTask {
        match self.score_with(scorer, task, ctx.now) {
            Ok(score) => {
                let status = if self.resolver.is_ready(task, &ctx.completed_ids) {
                    TaskStatus::Ready
                } else {
                    TaskStatus::Blocked
                };
                debug!("Task {} scored {:.4} ({})", task.id, score, status);
                AnnotatedTask::scored(task.clone(), score, status)
            }
            Err(e) => {
                warn!("Task {} could not be scored: {}", task.id, e);
                AnnotatedTask::failed(task.clone(), e.to_string())
            }
        }
    }

    #[cfg(feature = "parallel")]
    fn annotate_all(&self, scorer: &dyn Scorer, tasks: &[Task], ctx: &EvaluationContext) -> Vec<AnnotatedTask> {
        use rayon::prelude::*;

        if self.config.parallel {
            tasks.par_iter().map(|task| self.annotate(scorer, task, ctx)).collect()
        } else {
            tasks.iter().map(|task| self.annotate(scorer, task, ctx)).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn annotate_all(&self, scorer: &dyn Scorer, tasks: &[Task], ctx: &EvaluationContext) -> Vec<AnnotatedTask> {
        tasks.iter().map(|task| self.annotate(scorer, task, ctx)).collect()
    }
}

/// Stable descending sort by ranking score.
fn rank(annotated: &mut [AnnotatedTask]) {
    annotated.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureVector;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use taskrank_core::TaskId;

    fn now() -> Time {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn urgency_times_ten() -> ScorerState {
        ScorerState::loaded(|v: &FeatureVector| -> Result<f64, ScoreError> {
            Ok(v.urgency_score() * 10.0)
        })
    }

    fn task(id: i64, urgency: i64) -> Task {
        Task::new(TaskId::new(id), format!("task {}", id))
            .with_deadline("2024-06-10")
            .with_urgency(urgency, 0.5)
    }

    fn ids(ranked: &[AnnotatedTask]) -> Vec<i64> {
        ranked.iter().map(|a| a.task.id.get()).collect()
    }

    #[test]
    fn test_ready_task_scenario() {
        let engine = PrioritizationEngine::new(urgency_times_ten());
        let task = Task::new(TaskId::new(1), "Launch")
            .with_deadline("2099-01-01")
            .with_urgency(5, 0.9);

        let ranked = engine.prioritize(&[task], &EvaluationContext::at(now(), [])).unwrap();

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, Some(50.0));
        assert_eq!(ranked[0].task.status, TaskStatus::Ready);
        assert!(ranked[0].error.is_none());
    }

    #[test]
    fn test_unmet_dependency_is_blocked_regardless_of_score() {
        let engine = PrioritizationEngine::new(urgency_times_ten());
        let blocked = Task::new(TaskId::new(2), "Follow-up")
            .with_urgency(100, 1.0)
            .with_dependencies([TaskId::new(1)]);

        let ranked = engine.prioritize(&[blocked.clone()], &EvaluationContext::at(now(), [])).unwrap();
        assert_eq!(ranked[0].task.status, TaskStatus::Blocked);
        assert_eq!(ranked[0].score, Some(1000.0));

        let ranked = engine
            .prioritize(&[blocked], &EvaluationContext::at(now(), [TaskId::new(1)]))
            .unwrap();
        assert_eq!(ranked[0].task.status, TaskStatus::Ready);
    }

    #[test]
    fn test_malformed_deadline_scores_normally() {
        let seen_days = |v: &FeatureVector| -> Result<f64, ScoreError> { Ok(v.days_left() + 7.0) };
        let engine = PrioritizationEngine::new(ScorerState::loaded(seen_days));
        let task = Task::new(TaskId::new(3), "Odd date").with_deadline("not-a-date");

        let ranked = engine.prioritize(&[task], &EvaluationContext::at(now(), [])).unwrap();
        assert_eq!(ranked[0].score, Some(7.0));
        assert!(ranked[0].error.is_none());
    }

    #[test]
    fn test_sorted_descending_with_stable_ties() {
        let engine = PrioritizationEngine::new(urgency_times_ten());
        let tasks = vec![task(1, 2), task(2, 5), task(3, 2), task(4, 9), task(5, 5)];

        let ranked = engine.prioritize(&tasks, &EvaluationContext::at(now(), [])).unwrap();
        assert_eq!(ids(&ranked), vec![4, 2, 5, 1, 3]);
    }

    #[test]
    fn test_failed_task_is_isolated_and_ranked_as_zero() {
        let engine = PrioritizationEngine::new(ScorerState::loaded(
            |v: &FeatureVector| -> Result<f64, ScoreError> { Ok(v.urgency_score()) },
        ));
        let broken = Task::new(TaskId::new(2), "broken")
            .with_urgency(50, f64::NAN)
            .with_status(TaskStatus::Overdue);
        let tasks = vec![task(1, 3), broken, task(3, -4), task(4, 8)];

        let ranked = engine.prioritize(&tasks, &EvaluationContext::at(now(), [])).unwrap();

        assert_eq!(ids(&ranked), vec![4, 1, 2, 3]);
        let failed: Vec<_> = ranked.iter().filter(|a| a.error.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].task.id, TaskId::new(2));
        assert_eq!(failed[0].score, None);
        assert_eq!(failed[0].task.status, TaskStatus::Overdue);
        assert!(failed[0].error.as_deref().unwrap().contains("normalized_urgency"));

        for ok in ranked.iter().filter(|a| a.task.id != TaskId::new(2)) {
            assert!(ok.score.is_some());
            assert_eq!(ok.task.status, TaskStatus::Ready);
        }
    }

    #[test]
    fn test_scorer_error_is_per_task() {
        let picky = |v: &FeatureVector| -> Result<f64, ScoreError> {
            if v.urgency_score() == 13.0 {
                Err(ScoreError::Backend("unlucky".to_string()))
            } else {
                Ok(v.urgency_score())
            }
        };
        let engine = PrioritizationEngine::new(ScorerState::loaded(picky));
        let tasks = vec![task(1, 13), task(2, 1)];

        let ranked = engine.prioritize(&tasks, &EvaluationContext::at(now(), [])).unwrap();
        assert_eq!(ids(&ranked), vec![2, 1]);
        assert_eq!(ranked[1].error.as_deref(), Some("unlucky"));
        assert_eq!(ranked[1].task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_non_finite_score_is_malformed() {
        let engine = PrioritizationEngine::new(ScorerState::loaded(
            |_: &FeatureVector| -> Result<f64, ScoreError> { Ok(f64::INFINITY) },
        ));
        let ranked = engine.prioritize(&[task(1, 1)], &EvaluationContext::at(now(), [])).unwrap();
        assert!(ranked[0].error.as_deref().unwrap().starts_with("malformed score"));

        let err = engine.score_task(&task(1, 1), now()).unwrap_err();
        assert!(matches!(err, PrioritizeError::Scoring(ScoreError::Malformed(_))));
    }

    #[test]
    fn test_unavailable_scorer_fails_whole_call() {
        let engine = PrioritizationEngine::new(ScorerState::unavailable("model file missing"));
        assert!(!engine.is_ready());

        let err = engine
            .prioritize(&[task(1, 1), task(2, 2)], &EvaluationContext::at(now(), []))
            .unwrap_err();
        assert_eq!(
            err,
            PrioritizeError::ScorerUnavailable { reason: "model file missing".to_string() }
        );
        assert_eq!(err.to_string(), "scorer unavailable: model file missing");
        assert!(engine.score_task(&task(1, 1), now()).is_err());
        assert!(engine.ensure_scorer().is_err());
    }

    #[test]
    fn test_prioritize_is_idempotent_and_leaves_input_alone() {
        let engine = PrioritizationEngine::new(urgency_times_ten());
        let tasks = vec![
            task(1, 4).with_dependencies([TaskId::new(9)]),
            task(2, 4),
            task(3, 7).with_status(TaskStatus::Overdue),
        ];
        let snapshot = tasks.clone();
        let ctx = EvaluationContext::at(now(), [TaskId::new(5)]);

        let first = engine.prioritize(&tasks, &ctx).unwrap();
        let second = engine.prioritize(&tasks, &ctx).unwrap();

        assert_eq!(first, second);
        assert_eq!(tasks, snapshot);
    }

    #[test]
    fn test_ready_queue_drops_blocked_and_failed() {
        let engine = PrioritizationEngine::new(ScorerState::loaded(
            |v: &FeatureVector| -> Result<f64, ScoreError> { Ok(v.urgency_score()) },
        ));
        let tasks = vec![
            task(1, 1),
            task(2, 9).with_dependencies([TaskId::new(1)]),
            Task::new(TaskId::new(3), "nan").with_urgency(3, f64::NAN),
            task(4, 5),
        ];

        let queue = engine.ready_queue(&tasks, &EvaluationContext::at(now(), [])).unwrap();
        assert_eq!(ids(&queue), vec![4, 1]);
    }

    #[test]
    fn test_score_task_uses_linear_model() {
        let scorer = crate::LinearScorer::new("t", [1.0, 0.0, 0.0, 0.0, 0.0], 0.5);
        let engine = PrioritizationEngine::new(ScorerState::loaded(scorer));
        // 2024-06-01 -> 2024-06-10
        assert_eq!(engine.score_task(&task(1, 1), now()).unwrap(), 9.5);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let tasks: Vec<_> = (0..500).map(|i| task(i, (i * 7919) % 23)).collect();
        let ctx = EvaluationContext::at(now(), []);

        let sequential = PrioritizationEngine::new(urgency_times_ten());
        let parallel = PrioritizationEngine::new(urgency_times_ten())
            .with_config(EngineConfig { parallel: true });

        assert_eq!(
            sequential.prioritize(&tasks, &ctx).unwrap(),
            parallel.prioritize(&tasks, &ctx).unwrap()
        );
    }

    proptest! {
        #[test]
        fn prop_output_is_stable_descending(urgencies in proptest::collection::vec(-5i64..5, 0..40)) {
            let engine = PrioritizationEngine::new(urgency_times_ten());
            let tasks: Vec<_> = urgencies
                .iter()
                .enumerate()
                .map(|(i, &u)| task(i as i64, u))
                .collect();

            let ranked = engine.prioritize(&tasks, &EvaluationContext::at(now(), [])).unwrap();
            prop_assert_eq!(ranked.len(), tasks.len());
            for pair in ranked.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.ranking_score() >= b.ranking_score());
                if a.ranking_score() == b.ranking_score() {
                    prop_assert!(a.task.id < b.task.id);
                }
            }
        }
    }
}
