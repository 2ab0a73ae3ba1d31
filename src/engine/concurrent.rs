// src/engine/concurrent.rs

//! Asynchronous executor.
//!
//! Follows the same per-rule protocol as the
//! [`SequentialExecutor`](super::SequentialExecutor), with every hook and
//! every nested pass awaited. In each pass, parallel async rules without an
//! explicit order are dispatched first as independent tasks; the remaining
//! rules then run in order. Dispatched tasks are joined before the run
//! returns, and their results are merged with the rest in completion order.
//!
//! Synchronous bodies run their hooks on tokio's blocking pool and are
//! awaited from there, so a sync rule blocked on an exchange read leaves
//! the runtime free to drive the task that writes the value.
//!
//! A parallel task whose cancellation source is already signalled (before
//! it starts, or once `before_invoke` returned) completes with no result
//! and without invoking the rule body.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{EngineError, Result};
use crate::rule::{RuleBody, RuleContext, RuleRef, RuleResult, TaskCreation};

use super::RunScope;
use super::index::{Routing, TriggerIndex};
use super::order;

type PassFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
type TaskFuture = Pin<Box<dyn Future<Output = Result<Option<RuleResult>>> + Send + 'static>>;

pub struct ConcurrentExecutor {
    index: TriggerIndex,
    scope: RunScope,
    results: Mutex<Vec<RuleResult>>,
    tasks: Mutex<JoinSet<Result<Option<RuleResult>>>>,
}

impl ConcurrentExecutor {
    pub fn new(index: TriggerIndex, scope: RunScope) -> Self {
        Self {
            index,
            scope,
            results: Mutex::new(Vec::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Run the plain rules among `roots`, join every dispatched task and
    /// return the merged results.
    pub async fn run(self: Arc<Self>, roots: &[RuleRef]) -> Result<Vec<RuleResult>> {
        if let Err(err) = self.execute(order::plain(roots), Routing::Route).await {
            self.tasks.lock().abort_all();
            return Err(err);
        }
        self.join_parallel().await?;
        Ok(mem::take(&mut *self.results.lock()))
    }

    fn execute<'a>(self: &'a Arc<Self>, rules: Vec<RuleRef>, routing: Routing) -> PassFuture<'a> {
        Box::pin(async move {
            self.dispatch_parallel(order::parallel_batch(&rules), routing)
                .await?;

            for rule in order::async_sequence(&rules) {
                self.execute_rule(&rule, routing).await?;
            }
            Ok(())
        })
    }

    fn execute_rule<'a>(self: &'a Arc<Self>, rule: &'a RuleRef, routing: Routing) -> PassFuture<'a> {
        Box::pin(async move {
            let nested_first = rule.configuration().invoke_nested_rules_first;

            if nested_first {
                self.execute(order::nested_pass(rule, false), Routing::Route).await?;
            }

            if self.scope.can_invoke(rule) {
                if nested_first {
                    self.execute(order::nested_pass(rule, true), Routing::Route).await?;
                }

                self.execute(self.index.proactive_for(rule.kind()).to_vec(), Routing::Route)
                    .await?;

                match invoke_hooks(rule, parallel_cancellation(rule)).await {
                    Ok(result) => self.record(rule, result),
                    Err(error) => self.handle_failure(rule, error, routing).await?,
                }

                self.scope.absorb_terminate(rule);
                self.execute(self.index.reactive_for(rule.kind()).to_vec(), Routing::Route)
                    .await?;

                if !nested_first {
                    self.execute(order::nested_pass(rule, true), Routing::Route).await?;
                }
            }

            if !nested_first {
                self.execute(order::nested_pass(rule, false), Routing::Route).await?;
            }
            Ok(())
        })
    }

    /// Dispatch each rule as its own task. Linked and nested rules around it
    /// still run in this pass; reactive links do not wait for the task.
    fn dispatch_parallel<'a>(self: &'a Arc<Self>, rules: Vec<RuleRef>, routing: Routing) -> PassFuture<'a> {
        Box::pin(async move {
            for rule in rules {
                let nested_first = rule.configuration().invoke_nested_rules_first;

                if nested_first {
                    self.execute(order::nested_pass(&rule, false), Routing::Route).await?;
                }

                if self.scope.can_invoke(&rule) {
                    if nested_first {
                        self.execute(order::nested_pass(&rule, true), Routing::Route).await?;
                    }

                    self.execute(self.index.proactive_for(rule.kind()).to_vec(), Routing::Route)
                        .await?;
                    self.spawn_parallel(&rule, routing)?;
                    self.execute(self.index.reactive_for(rule.kind()).to_vec(), Routing::Route)
                        .await?;

                    if !nested_first {
                        self.execute(order::nested_pass(&rule, true), Routing::Route).await?;
                    }
                }

                if !nested_first {
                    self.execute(order::nested_pass(&rule, false), Routing::Route).await?;
                }
            }
            Ok(())
        })
    }

    fn spawn_parallel(self: &Arc<Self>, rule: &RuleRef, routing: Routing) -> Result<()> {
        let policy = rule.parallel_configuration();
        let handle = match policy.scheduler {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|err| EngineError::TaskFailed(err.to_string()))?,
        };
        let task = Arc::clone(self).run_parallel(Arc::clone(rule), routing);

        debug!(
            rule = %rule.kind(),
            run_id = %self.scope.run_id(),
            creation = ?policy.creation,
            "dispatching parallel rule"
        );

        let mut tasks = self.tasks.lock();
        match policy.creation {
            TaskCreation::Default => {
                tasks.spawn_on(task, &handle);
            }
            TaskCreation::LongRunning => {
                let driver = handle.clone();
                tasks.spawn_blocking_on(move || driver.block_on(task), &handle);
            }
        }
        Ok(())
    }

    fn run_parallel(self: Arc<Self>, rule: RuleRef, routing: Routing) -> TaskFuture {
        Box::pin(async move {
            let cancellation = rule.cancellation();
            if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
                debug!(rule = %rule.kind(), "parallel rule cancelled before start");
                return Ok(None);
            }

            match invoke_hooks(&rule, cancellation).await {
                Ok(result) => {
                    self.scope.absorb_terminate(&rule);
                    Ok(result.map(|mut result| {
                        result.tag_if_unnamed(rule.kind());
                        result
                    }))
                }
                Err(error) => {
                    self.handle_failure(&rule, error, routing).await?;
                    Ok(None)
                }
            }
        })
    }

    async fn handle_failure(self: &Arc<Self>, rule: &RuleRef, error: anyhow::Error, routing: Routing) -> Result<()> {
        let handlers = self.index.route_failure(rule, error, routing)?.to_vec();
        self.execute(handlers, Routing::Fatal).await
    }

    /// Await every dispatched task, including tasks dispatched by handlers
    /// and links while joining. The first failure aborts the rest.
    async fn join_parallel(&self) -> Result<()> {
        loop {
            let mut batch = mem::take(&mut *self.tasks.lock());
            if batch.is_empty() {
                return Ok(());
            }

            while let Some(joined) = batch.join_next().await {
                let outcome = joined
                    .map_err(|err| EngineError::TaskFailed(err.to_string()))
                    .and_then(|outcome| outcome);

                match outcome {
                    Ok(Some(result)) => {
                        self.results.lock().push(result);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(run_id = %self.scope.run_id(), error = %err, "parallel rule failed; aborting remaining tasks");
                        batch.abort_all();
                        self.tasks.lock().abort_all();
                        return Err(err);
                    }
                }
            }
        }
    }

    fn record(&self, rule: &RuleContext, result: Option<RuleResult>) {
        match result {
            Some(mut result) => {
                result.tag_if_unnamed(rule.kind());
                debug!(rule = %rule.kind(), run_id = %self.scope.run_id(), "rule result recorded");
                self.results.lock().push(result);
            }
            None => debug!(rule = %rule.kind(), "rule returned no result"),
        }
    }
}

/// Cancellation checked between `before_invoke` and `invoke` for parallel
/// rules that run in order.
fn parallel_cancellation(rule: &RuleContext) -> Option<CancellationToken> {
    if rule.is_parallel() { rule.cancellation() } else { None }
}

/// Sync bodies run on the blocking pool, so a blocking exchange read in
/// one of them never parks a runtime worker.
async fn invoke_hooks(rule: &RuleRef, cancellation: Option<CancellationToken>) -> anyhow::Result<Option<RuleResult>> {
    if !rule.is_async() {
        let rule = Arc::clone(rule);
        return match tokio::task::spawn_blocking(move || invoke_sync_hooks(&rule, cancellation)).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(EngineError::TaskFailed(err.to_string()).into()),
        };
    }

    let mut body = rule.body().lock().await;
    let context = rule.context();

    body.before_invoke(context).await?;
    if is_cancelled(rule, cancellation.as_ref()) {
        return Ok(None);
    }
    let result = body.invoke(context).await?;
    body.after_invoke(context).await?;
    Ok(result)
}

fn invoke_sync_hooks(rule: &RuleRef, cancellation: Option<CancellationToken>) -> anyhow::Result<Option<RuleResult>> {
    let mut body = rule.body().blocking_lock();
    let context = rule.context();
    let RuleBody::Sync(body) = &mut *body else {
        return Err(EngineError::IncompatibleRule {
            rule: rule.name().to_string(),
            executor: "concurrent",
        }
        .into());
    };

    body.before_invoke(context)?;
    if is_cancelled(rule, cancellation.as_ref()) {
        return Ok(None);
    }
    let result = body.invoke(context)?;
    body.after_invoke(context)?;
    Ok(result)
}

fn is_cancelled(rule: &RuleRef, cancellation: Option<&CancellationToken>) -> bool {
    let cancelled = cancellation.is_some_and(CancellationToken::is_cancelled);
    if cancelled {
        debug!(rule = %rule.kind(), "rule cancelled after before_invoke");
    }
    cancelled
}
