//! Orchestrates a priority-ordered list of evaluators against a single
//! intent, short-circuiting on the first `BLOCK` verdict.

use crate::evaluators::Evaluator;
use crate::types::{ActionIntent, EvaluatorResult, Verdict};

/// Where a newly added evaluator should land relative to the existing
/// list. Mirrors the position hints accepted by the teacher's pipeline
/// `add` method.
pub enum Position<'a> {
    /// Re-sort by priority after insertion (the default).
    ByPriority,
    After(&'a str),
    Before(&'a str),
    Index(usize),
    Append,
}

/// An ordered sequence of evaluators, re-sorted by priority after every
/// insertion unless an explicit position is given.
#[derive(Default)]
pub struct EvaluationPipeline {
    evaluators: Vec<Box<dyn Evaluator>>,
}

impl EvaluationPipeline {
    pub fn new() -> Self {
        Self { evaluators: Vec::new() }
    }

    pub fn add(&mut self, evaluator: Box<dyn Evaluator>, position: Position) {
        match position {
            Position::ByPriority => {
                self.evaluators.push(evaluator);
                self.evaluators.sort_by_key(|e| e.priority());
            }
            Position::Append => self.evaluators.push(evaluator),
            Position::Index(idx) => {
                let idx = idx.min(self.evaluators.len());
                self.evaluators.insert(idx, evaluator);
            }
            Position::After(name) => {
                let idx = self
                    .evaluators
                    .iter()
                    .position(|e| e.name() == name)
                    .map(|i| i + 1)
                    .unwrap_or(self.evaluators.len());
                self.evaluators.insert(idx, evaluator);
            }
            Position::Before(name) => {
                let idx = self
                    .evaluators
                    .iter()
                    .position(|e| e.name() == name)
                    .unwrap_or(self.evaluators.len());
                self.evaluators.insert(idx, evaluator);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    /// Runs every enabled evaluator in order, stopping as soon as one
    /// returns `BLOCK`. Returns every result that ran, in run order.
    pub fn evaluate(&self, intent: &ActionIntent) -> Vec<EvaluatorResult> {
        let mut results = Vec::with_capacity(self.evaluators.len());
        for evaluator in &self.evaluators {
            if !evaluator.enabled() {
                continue;
            }
            let result = evaluator.evaluate(intent);
            let is_block = result.verdict == Verdict::Block;
            if is_block {
                tracing::info!(
                    evaluator = evaluator.name(),
                    action_id = %intent.action_id,
                    reason = %result.reason,
                    "pipeline short-circuited on BLOCK"
                );
            }
            results.push(result);
            if is_block {
                break;
            }
        }
        results
    }

    /// Picks the single most restrictive verdict among `results`,
    /// preferring the lowest [`Verdict::severity`]. Returns `ALLOW` if
    /// `results` is empty.
    pub fn worst_result(results: &[EvaluatorResult]) -> Option<&EvaluatorResult> {
        results.iter().min_by_key(|r| r.verdict.severity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedEvaluator {
        name: &'static str,
        priority: i32,
        verdict: Verdict,
    }

    impl Evaluator for FixedEvaluator {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn evaluate(&self, _intent: &ActionIntent) -> EvaluatorResult {
            EvaluatorResult::new(self.verdict, "fixed", self.name)
        }
    }

    fn intent() -> ActionIntent {
        ActionIntent::new("file.read", "read_file", "agent-1", HashMap::new())
    }

    #[test]
    fn evaluators_run_in_priority_order() {
        let mut pipeline = EvaluationPipeline::new();
        pipeline.add(
            Box::new(FixedEvaluator { name: "second", priority: 20, verdict: Verdict::Allow }),
            Position::ByPriority,
        );
        pipeline.add(
            Box::new(FixedEvaluator { name: "first", priority: 10, verdict: Verdict::Allow }),
            Position::ByPriority,
        );

        let results = pipeline.evaluate(&intent());
        assert_eq!(results[0].evaluator_name, "first");
        assert_eq!(results[1].evaluator_name, "second");
    }

    #[test]
    fn short_circuits_on_first_block() {
        let mut pipeline = EvaluationPipeline::new();
        pipeline.add(
            Box::new(FixedEvaluator { name: "blocker", priority: 10, verdict: Verdict::Block }),
            Position::ByPriority,
        );
        pipeline.add(
            Box::new(FixedEvaluator { name: "never-runs", priority: 20, verdict: Verdict::Allow }),
            Position::ByPriority,
        );

        let results = pipeline.evaluate(&intent());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].evaluator_name, "blocker");
    }

    #[test]
    fn worst_result_picks_most_restrictive_verdict() {
        let results = vec![
            EvaluatorResult::new(Verdict::Allow, "ok", "a"),
            EvaluatorResult::new(Verdict::Warn, "meh", "b"),
            EvaluatorResult::new(Verdict::Escalate, "careful", "c"),
        ];
        let worst = EvaluationPipeline::worst_result(&results).unwrap();
        assert_eq!(worst.verdict, Verdict::Escalate);
    }
}
