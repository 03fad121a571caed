//! Replay executor: a flat loop over recorded steps
//!
//! Per step the executor applies skip rules, then step routes, then test-id
//! routes, then the default click handler. It knows nothing about the
//! application; everything domain-specific comes in through the routing
//! tables, usually installed by a [`crate::profile::ReplayProfile`].

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::context::ReplayContext;
use crate::error::{ReplayError, ReplayResult};
use crate::interaction_log::read_interaction_log;
use crate::report::{format_duration_ms, ReplayReport, StepRecord};
use crate::routes::{
    ExactRoutes, PrefixRoutes, RouteKey, RoutingTables, SharedHandler, SharedPrepareHook, StepRoutes,
};
use crate::skip::{first_match, SkipRule};
use crate::step::Step;

/// How a step was dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Dropped by the skip rule at `rule` (position in the rule list)
    Skipped { rule: usize },
    StepRoute { event: String, action: String },
    Exact { test_id: String },
    Prefix { prefix: String },
    DefaultClick,
    /// Nothing matched; informational events end up here
    Unrouted,
}

impl StepOutcome {
    pub fn is_handled(&self) -> bool {
        !matches!(self, StepOutcome::Skipped { .. } | StepOutcome::Unrouted)
    }
}

/// Options for [`Executor::replay_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Run the prepare hook before the first step
    pub prepare: bool,
    /// Abort on the first handler failure
    pub stop_on_error: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            prepare: true,
            stop_on_error: true,
        }
    }
}

/// The replay dispatcher. Starts with empty tables and no hooks.
#[derive(Default)]
pub struct Executor {
    routes: RoutingTables,
    skip_rules: Vec<SkipRule>,
    default_click_handler: Option<SharedHandler>,
    prepare_hook: Option<SharedPrepareHook>,
    context: ReplayContext,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(context: ReplayContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn context(&self) -> &ReplayContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ReplayContext {
        &mut self.context
    }

    pub fn routes(&self) -> &RoutingTables {
        &self.routes
    }

    pub fn skip_rules(&self) -> &[SkipRule] {
        &self.skip_rules
    }

    pub fn has_default_click_handler(&self) -> bool {
        self.default_click_handler.is_some()
    }

    pub fn has_prepare_hook(&self) -> bool {
        self.prepare_hook.is_some()
    }

    /// Replace both test-id tables.
    pub fn set_click_routes(&mut self, exact: ExactRoutes, prefix: PrefixRoutes) {
        self.routes.exact = exact;
        self.routes.prefix = prefix;
    }

    pub fn set_step_routes(&mut self, routes: StepRoutes) {
        self.routes.steps = routes;
    }

    pub fn set_skip_rules(&mut self, rules: Vec<SkipRule>) {
        self.skip_rules = rules;
    }

    /// Append a rule. Empty rules are ignored here; pass them through
    /// [`Executor::set_skip_rules`] to skip everything on purpose.
    pub fn add_skip_rule(&mut self, rule: SkipRule) {
        if !rule.is_empty() {
            self.skip_rules.push(rule);
        }
    }

    pub fn set_default_click_handler(&mut self, handler: Option<SharedHandler>) {
        self.default_click_handler = handler;
    }

    pub fn set_prepare_hook(&mut self, hook: Option<SharedPrepareHook>) {
        self.prepare_hook = hook;
    }

    /// Read `log_path` and replay it. Input errors surface before any step runs.
    pub async fn replay_file(&mut self, log_path: &Path, options: ReplayOptions) -> ReplayResult<ReplayReport> {
        let steps = read_interaction_log(log_path)?;
        info!(
            "Replay file={} steps={} prepare={} stop_on_error={}",
            log_path.display(),
            steps.len(),
            options.prepare,
            options.stop_on_error
        );

        if options.prepare {
            self.prepare().await?;
        }

        self.replay_steps(&steps, options.stop_on_error).await
    }

    /// Run the prepare hook if one is configured.
    pub async fn prepare(&mut self) -> ReplayResult<()> {
        match &self.prepare_hook {
            Some(hook) => {
                info!("Running prepare hook");
                hook.prepare(&mut self.context).await
            }
            None => {
                info!("Prepare hook is not configured: skip prepare");
                Ok(())
            }
        }
    }

    pub async fn replay_steps(&mut self, steps: &[Step], stop_on_error: bool) -> ReplayResult<ReplayReport> {
        info!("Replay started: total_steps={}", steps.len());
        let started = Instant::now();
        let mut report = ReplayReport::new(steps.len());

        for step in steps {
            let step_started = Instant::now();
            let result = self.execute_step(step).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match result {
                Ok(outcome) => report.push(StepRecord::completed(step, outcome, duration_ms)),
                Err(source) => {
                    let (event, action) = step.action_key();
                    let failure = ReplayError::StepFailed {
                        line: step.index(),
                        seq: step.seq(),
                        event,
                        action,
                        test_id: step.test_id().map(str::to_string),
                        source: Box::new(source),
                    };
                    error!("{}: {}", failure, failure_cause(&failure));
                    report.push(StepRecord::failed(step, &failure, duration_ms));

                    if stop_on_error {
                        return Err(failure);
                    }
                }
            }
        }

        report.finish(started.elapsed().as_millis() as u64);
        info!(
            "Replay finished: handled={} skipped={} unrouted={} failed={} in {}",
            report.handled,
            report.skipped,
            report.unrouted,
            report.failed,
            format_duration_ms(report.duration_ms as f64)
        );
        Ok(report)
    }

    /// Dispatch a single step.
    pub async fn execute_step(&mut self, step: &Step) -> ReplayResult<StepOutcome> {
        let (event, action) = step.action_key();
        info!(
            "Step line={} seq={} event/action={}/{} testId={}",
            step.index(),
            step.seq().as_deref().unwrap_or("None"),
            event,
            action,
            step.test_id().unwrap_or("None")
        );

        if let Some(rule) = first_match(&self.skip_rules, step) {
            info!("Skip line={} by rule={:?}", step.index(), self.skip_rules[rule]);
            return Ok(StepOutcome::Skipped { rule });
        }

        if let Some((key, handler)) = self.routes.find_step_route(&event, &action) {
            info!("Route step line={} key={}", step.index(), key);
            handler.handle(step, &mut self.context).await?;
            let RouteKey { event, action } = key;
            return Ok(StepOutcome::StepRoute { event, action });
        }

        if let Some(outcome) = self.dispatch_by_test_id(step).await? {
            return Ok(outcome);
        }

        if event == "click" {
            if let Some(handler) = self.default_click_handler.clone() {
                info!(
                    "Route default-click line={} testId={}",
                    step.index(),
                    step.test_id().unwrap_or("None")
                );
                handler.handle(step, &mut self.context).await?;
                return Ok(StepOutcome::DefaultClick);
            }
        }

        info!("Skip line={} event/action={}/{}", step.index(), event, action);
        Ok(StepOutcome::Unrouted)
    }

    async fn dispatch_by_test_id(&mut self, step: &Step) -> ReplayResult<Option<StepOutcome>> {
        let Some(test_id) = step.test_id() else {
            return Ok(None);
        };

        if let Some(handler) = self.routes.find_exact(test_id) {
            info!("Route exact line={} testId={}", step.index(), test_id);
            handler.handle(step, &mut self.context).await?;
            return Ok(Some(StepOutcome::Exact {
                test_id: test_id.to_string(),
            }));
        }

        if let Some((prefix, handler)) = self.routes.find_prefix(test_id) {
            info!(
                "Route prefix line={} testId={} prefix={}",
                step.index(),
                test_id,
                prefix
            );
            handler.handle(step, &mut self.context).await?;
            return Ok(Some(StepOutcome::Prefix { prefix }));
        }

        info!("No route line={} testId={}", step.index(), test_id);
        Ok(None)
    }
}

fn failure_cause(error: &ReplayError) -> String {
    match error {
        ReplayError::StepFailed { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}
