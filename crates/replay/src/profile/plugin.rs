//! Generic replay policy for the SQL plugin
//!
//! Clicks go to whatever element the recorded test id points at, drags are
//! reassembled from their `dragstart`/`drop` pair, and editor noise is
//! skipped. Screen-specific routes belong in a profile of their own.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use super::ReplayProfile;
use crate::context::ReplayContext;
use crate::driver::{ClickMode, DragRequest, Locator};
use crate::error::{ReplayError, ReplayResult};
use crate::executor::Executor;
use crate::extract::{locator_from_step, point_from_step, value_text_from_step};
use crate::routes::{handler, handler_fn, noop, PrepareHook, RouteKey, SharedHandler, SharedPrepareHook, StepHandler, StepRoutes};
use crate::skip::SkipRule;
use crate::step::Step;

/// Stash slot holding the `dragstart` step until its `drop` arrives.
pub const PENDING_DRAG_SOURCE: &str = "pending_drag_source";

/// Read-only editor the SQL wizard renders its output into.
pub const WIZARD_OUTPUT_EDITOR: &str = "sql-codemirror-container-sql_wizard_output";

/// Body run with `element` bound to the editor container. `VALUE` is replaced
/// by the JSON-encoded text.
const CODEMIRROR_SET_VALUE_JS: &str = r#"
const value = VALUE;
const host = element && element.querySelector('.CodeMirror');
if (host && host.CodeMirror) {
  host.CodeMirror.setValue(value);
  return true;
}
const area = element && element.querySelector('textarea');
if (area) {
  area.value = value;
  area.dispatchEvent(new Event('input', { bubbles: true }));
  return true;
}
return false;
"#;

const DRAG_STEP_DELAY_MS: u64 = 70;
const DRAG_SETTLE_DELAY_MS: u64 = 100;
const FIND_TIMEOUT_MS: u64 = 10_000;

pub struct PluginProfile;

impl ReplayProfile for PluginProfile {
    fn name(&self) -> &str {
        "plugin"
    }

    fn build_context(&self, executor: &Executor) -> Option<Map<String, Value>> {
        let mut values = Map::new();
        for (key, default) in [
            ("drag_step_delay_ms", DRAG_STEP_DELAY_MS),
            ("drag_settle_delay_ms", DRAG_SETTLE_DELAY_MS),
            ("find_timeout_ms", FIND_TIMEOUT_MS),
        ] {
            // Values supplied by configuration win over the profile defaults.
            if executor.context().get(key).is_none() {
                values.insert(key.to_string(), Value::from(default));
            }
        }
        Some(values)
    }

    fn build_step_routes(&self, _executor: &Executor) -> Option<StepRoutes> {
        let mut routes = StepRoutes::new();
        routes.insert(RouteKey::new("dragstart", "*"), handler_fn(on_drag_start));
        routes.insert(RouteKey::new("drop", "*"), handler(DropHandler));
        routes.insert(
            RouteKey::new("dragend", "*"),
            handler_fn(|_, ctx| {
                ctx.forget_step(PENDING_DRAG_SOURCE);
                Ok(())
            }),
        );
        routes.insert(RouteKey::new("drag", "*"), noop());
        routes.insert(RouteKey::new("input", "set-value"), handler(FillValueHandler));
        routes.insert(RouteKey::new("codemirror-change", "set-value"), handler(CodeMirrorValueHandler));
        Some(routes)
    }

    fn build_skip_rules(&self) -> Option<Vec<SkipRule>> {
        Some(vec![
            SkipRule::new()
                .eq("event", "codemirror-change")
                .eq("action", "set-value")
                .eq("testId", WIZARD_OUTPUT_EDITOR),
            SkipRule::new()
                .eq("event", "click")
                .eq("action", "activate")
                .starts_with("testId", "sql-codemirror-"),
        ])
    }

    fn build_default_click_handler(&self, _executor: &Executor) -> Option<SharedHandler> {
        Some(handler(ClickHandler))
    }

    fn build_prepare_hook(&self, _executor: &Executor) -> Option<SharedPrepareHook> {
        Some(std::sync::Arc::new(OpenPluginHook))
    }
}

fn find_timeout(ctx: &ReplayContext) -> std::time::Duration {
    ctx.get_millis("find_timeout_ms", FIND_TIMEOUT_MS)
}

fn on_drag_start(step: &Step, ctx: &mut ReplayContext) -> ReplayResult<()> {
    info!(
        "profile drag_start line={} testId={} point={:?}",
        step.index(),
        step.test_id().unwrap_or("None"),
        point_from_step(step)
    );
    ctx.remember_step(PENDING_DRAG_SOURCE, step.clone());
    Ok(())
}

/// Click the element the step was recorded on.
pub struct ClickHandler;

#[async_trait]
impl StepHandler for ClickHandler {
    async fn handle(&self, step: &Step, ctx: &mut ReplayContext) -> ReplayResult<()> {
        let locator = locator_from_step(step).ok_or_else(|| {
            ReplayError::ElementNotFound(format!("Cannot build click locator for line={}", step.index()))
        })?;
        info!("profile click_generic line={} locator={}", step.index(), locator);

        let driver = ctx.driver()?;
        driver.wait_for(&locator, find_timeout(ctx)).await?;
        driver.click(&locator, ClickMode::Script).await
    }
}

/// Replays a drop as one full drag-and-drop from the pending source.
pub struct DropHandler;

#[async_trait]
impl StepHandler for DropHandler {
    async fn handle(&self, step: &Step, ctx: &mut ReplayContext) -> ReplayResult<()> {
        let Some(source) = ctx.peek_step(PENDING_DRAG_SOURCE).cloned() else {
            info!("profile drop skipped line={}: no drag source", step.index());
            return Ok(());
        };

        let request = DragRequest {
            source: locator_from_step(&source),
            target: locator_from_step(step),
            source_point: point_from_step(&source),
            target_point: point_from_step(step),
            step_delay: ctx.get_millis("drag_step_delay_ms", DRAG_STEP_DELAY_MS),
            settle_delay: ctx.get_millis("drag_settle_delay_ms", DRAG_SETTLE_DELAY_MS),
        };
        info!(
            "profile drag_drop source_line={} target_line={} request={:?}",
            source.index(),
            step.index(),
            request
        );

        ctx.driver()?.drag_and_drop(&request).await?;
        // Only a completed drag consumes the source.
        ctx.forget_step(PENDING_DRAG_SOURCE);
        Ok(())
    }
}

/// Types the recorded value into the element the step points at.
pub struct FillValueHandler;

#[async_trait]
impl StepHandler for FillValueHandler {
    async fn handle(&self, step: &Step, ctx: &mut ReplayContext) -> ReplayResult<()> {
        let Some(text) = value_text_from_step(step) else {
            info!("profile set_value skipped line={}: empty value", step.index());
            return Ok(());
        };
        let locator = locator_from_step(step).ok_or_else(|| {
            ReplayError::ElementNotFound(format!("Cannot build input locator for line={}", step.index()))
        })?;
        info!("profile set_value line={} locator={} chars={}", step.index(), locator, text.chars().count());

        let driver = ctx.driver()?;
        driver.wait_for(&locator, find_timeout(ctx)).await?;
        driver.fill(&locator, &text).await
    }
}

/// Sets CodeMirror editor text through its API, falling back to the inner
/// textarea. `fill` cannot target the editor's container.
pub struct CodeMirrorValueHandler;

#[async_trait]
impl StepHandler for CodeMirrorValueHandler {
    async fn handle(&self, step: &Step, ctx: &mut ReplayContext) -> ReplayResult<()> {
        let Some(text) = value_text_from_step(step) else {
            info!("profile set_code skipped line={}: empty value", step.index());
            return Ok(());
        };
        let locator = locator_from_step(step).ok_or_else(|| {
            ReplayError::ElementNotFound(format!("Cannot build editor locator for line={}", step.index()))
        })?;
        info!("profile set_code line={} locator={} chars={}", step.index(), locator, text.chars().count());

        let driver = ctx.driver()?;
        driver.wait_for(&locator, find_timeout(ctx)).await?;
        let script = CODEMIRROR_SET_VALUE_JS.replace("VALUE", &Value::String(text).to_string());
        match driver.evaluate(Some(&locator), &script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(ReplayError::ElementNotFound(format!("no CodeMirror or textarea inside {}", locator))),
        }
    }
}

/// Opens the plugin by clicking `prepare_selector`, when configured.
pub struct OpenPluginHook;

#[async_trait]
impl PrepareHook for OpenPluginHook {
    async fn prepare(&self, ctx: &mut ReplayContext) -> ReplayResult<()> {
        let Some(selector) = ctx.get_str("prepare_selector").map(str::to_string) else {
            info!("profile prepare: no prepare_selector configured, starting from current screen");
            return Ok(());
        };

        let locator = Locator::Css(selector);
        info!("profile prepare: open plugin via {}", locator);
        let driver = ctx.driver()?;
        driver.wait_for(&locator, find_timeout(ctx)).await?;
        driver.click(&locator, ClickMode::Script).await
    }
}
