//! Pipeline composer.
//!
//! A pipeline is an ordered list of [`Middleware`] stages composed into one
//! callable entry point. Each stage receives the input and a [`Next`] handle
//! to the rest of the chain, and may:
//!
//! - transform the input before calling `next.run(input)`
//! - await the downstream output and transform it before returning
//! - return early without calling `next` (short-circuit)
//! - propagate or convert an error
//!
//! Stage order is fixed by [`PipelineBuilder::build`]. A built [`Pipeline`]
//! is immutable and reentrant: all per-call state travels in the input.

mod observer;

pub use observer::{PerfRecorder, StageObserver, StageOutcome, StageTiming, TracingObserver};

use async_trait::async_trait;
use nestql_common::utils::error::{Error, Result};
use std::sync::Arc;
use std::time::Instant;

/// One stage of a pipeline.
#[async_trait]
pub trait Middleware<I, O>: Send + Sync {
    /// Stage name, used by the instrumentation hooks.
    fn name(&self) -> &'static str;

    /// Handles the input, usually by delegating to `next`.
    async fn handle(&self, input: I, next: Next<'_, I, O>) -> Result<O>;
}

/// Handle to the remainder of a pipeline.
pub struct Next<'a, I, O> {
    stages: &'a [Arc<dyn Middleware<I, O>>],
    observers: &'a [Arc<dyn StageObserver>],
}

impl<'a, I, O> Next<'a, I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Invokes the next stage.
    ///
    /// # Errors
    ///
    /// Returns whatever the downstream stages return, or an internal error
    /// if the chain ends without a stage producing an output.
    pub async fn run(self, input: I) -> Result<O> {
        let Some((stage, rest)) = self.stages.split_first() else {
            return Err(Error::Internal(
                "pipeline ended without a terminal stage".to_string(),
            ));
        };
        let name = stage.name();
        let next = Next {
            stages: rest,
            observers: self.observers,
        };

        for observer in self.observers {
            observer.on_start(name);
        }
        let started = Instant::now();
        let result = stage.handle(input, next).await;
        let outcome = StageOutcome::of(&result);
        let elapsed = started.elapsed();
        for observer in self.observers {
            observer.on_stop(name, elapsed, outcome);
        }

        result
    }

    /// Number of stages left after the current one.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

/// A composed, immutable pipeline.
pub struct Pipeline<I, O> {
    stages: Arc<[Arc<dyn Middleware<I, O>>]>,
    observers: Arc<[Arc<dyn StageObserver>]>,
}

impl<I, O> Clone for Pipeline<I, O> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder<I, O> {
        PipelineBuilder::new()
    }

    /// Runs the input through every stage.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails without recovering.
    pub async fn call(&self, input: I) -> Result<O> {
        let next = Next {
            stages: &self.stages,
            observers: &self.observers,
        };
        next.run(input).await
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the pipeline has no stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Builder for [`Pipeline`].
///
/// Final order is `before` stages, main stages, then `after` stages. The
/// `after` list is where hosts attach their terminal stage when the main
/// list only transforms.
pub struct PipelineBuilder<I, O> {
    before: Vec<Arc<dyn Middleware<I, O>>>,
    stages: Vec<Arc<dyn Middleware<I, O>>>,
    after: Vec<Arc<dyn Middleware<I, O>>>,
    observers: Vec<Arc<dyn StageObserver>>,
}

impl<I, O> PipelineBuilder<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a builder with the tracing observer attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            before: Vec::new(),
            stages: Vec::new(),
            after: Vec::new(),
            observers: vec![Arc::new(TracingObserver)],
        }
    }

    /// Appends a stage that runs before the main list.
    #[must_use]
    pub fn before(mut self, stage: impl Middleware<I, O> + 'static) -> Self {
        self.before.push(Arc::new(stage));
        self
    }

    /// Appends a stage to the main list.
    #[must_use]
    pub fn stage(mut self, stage: impl Middleware<I, O> + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends an already shared stage to the main list.
    #[must_use]
    pub fn shared_stage(mut self, stage: Arc<dyn Middleware<I, O>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a stage that runs after the main list.
    #[must_use]
    pub fn after(mut self, stage: impl Middleware<I, O> + 'static) -> Self {
        self.after.push(Arc::new(stage));
        self
    }

    /// Attaches an instrumentation observer.
    #[must_use]
    pub fn observe(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Removes every observer, including the default tracing one.
    #[must_use]
    pub fn without_observers(mut self) -> Self {
        self.observers.clear();
        self
    }

    /// Composes the stages into a pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline<I, O> {
        let stages: Vec<_> = self
            .before
            .into_iter()
            .chain(self.stages)
            .chain(self.after)
            .collect();
        Pipeline {
            stages: stages.into(),
            observers: self.observers.into(),
        }
    }
}

impl<I, O> Default for PipelineBuilder<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Push(&'static str, Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl Middleware<i64, i64> for Push {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, input: i64, next: Next<'_, i64, i64>) -> Result<i64> {
            self.1.lock().push(self.0);
            next.run(input).await
        }
    }

    struct AddOne;

    #[async_trait]
    impl Middleware<i64, i64> for AddOne {
        fn name(&self) -> &'static str {
            "add_one"
        }

        async fn handle(&self, input: i64, next: Next<'_, i64, i64>) -> Result<i64> {
            next.run(input + 1).await
        }
    }

    struct Double;

    #[async_trait]
    impl Middleware<i64, i64> for Double {
        fn name(&self) -> &'static str {
            "double"
        }

        async fn handle(&self, input: i64, next: Next<'_, i64, i64>) -> Result<i64> {
            let output = next.run(input).await?;
            Ok(output * 2)
        }
    }

    struct Identity;

    #[async_trait]
    impl Middleware<i64, i64> for Identity {
        fn name(&self) -> &'static str {
            "identity"
        }

        async fn handle(&self, input: i64, _next: Next<'_, i64, i64>) -> Result<i64> {
            Ok(input)
        }
    }

    struct RejectNegative;

    #[async_trait]
    impl Middleware<i64, i64> for RejectNegative {
        fn name(&self) -> &'static str {
            "reject_negative"
        }

        async fn handle(&self, input: i64, next: Next<'_, i64, i64>) -> Result<i64> {
            if input < 0 {
                return Ok(0);
            }
            next.run(input).await
        }
    }

    struct Fail;

    #[async_trait]
    impl Middleware<i64, i64> for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn handle(&self, _input: i64, _next: Next<'_, i64, i64>) -> Result<i64> {
            Err(Error::downstream("fail", "boom"))
        }
    }

    #[tokio::test]
    async fn test_input_and_output_transforms() {
        let pipeline = Pipeline::builder()
            .stage(Double)
            .stage(AddOne)
            .stage(Identity)
            .build();

        // (3 + 1) * 2
        assert_eq!(pipeline.call(3).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_before_and_after_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .after(Push("after", Arc::clone(&log)))
            .stage(Push("main", Arc::clone(&log)))
            .before(Push("before", Arc::clone(&log)))
            .after(Identity)
            .build();

        assert_eq!(
            pipeline.stage_names(),
            vec!["before", "main", "after", "identity"]
        );
        pipeline.call(1).await.unwrap();
        assert_eq!(*log.lock(), vec!["before", "main", "after"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_downstream() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(RejectNegative)
            .stage(Push("downstream", Arc::clone(&log)))
            .stage(Identity)
            .build();

        assert_eq!(pipeline.call(-5).await.unwrap(), 0);
        assert!(log.lock().is_empty());
        assert_eq!(pipeline.call(5).await.unwrap(), 5);
        assert_eq!(*log.lock(), vec!["downstream"]);
    }

    #[tokio::test]
    async fn test_missing_terminal_stage() {
        let pipeline = Pipeline::builder().stage(AddOne).build();
        let err = pipeline.call(1).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_error_propagates_through_stages() {
        let pipeline = Pipeline::builder().stage(Double).stage(Fail).build();
        let err = pipeline.call(1).await.unwrap_err();
        assert_eq!(err, Error::downstream("fail", "boom"));
    }

    #[tokio::test]
    async fn test_observers_see_every_stage() {
        let recorder = Arc::new(PerfRecorder::new());
        let pipeline = Pipeline::builder()
            .stage(AddOne)
            .stage(Fail)
            .observe(recorder.clone())
            .build();

        let _ = pipeline.call(1).await;
        let timings = recorder.timings();
        let names: Vec<_> = timings.iter().map(|t| t.stage).collect();
        // Inner stages stop first.
        assert_eq!(names, vec!["fail", "add_one"]);
        assert!(timings.iter().all(|t| t.outcome == StageOutcome::Failed));
    }

    #[tokio::test]
    async fn test_pipeline_is_reentrant() {
        let pipeline = Pipeline::builder().stage(Double).stage(Identity).build();
        let results = futures::future::join_all((0..16).map(|i| {
            let pipeline = pipeline.clone();
            async move { pipeline.call(i).await.unwrap() }
        }))
        .await;
        assert_eq!(results, (0..16).map(|i| i * 2).collect::<Vec<_>>());
    }
}
