//! End-to-end replay scenarios against a recording page driver

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use oo_replay::profile::{PluginProfile, PENDING_DRAG_SOURCE, WIZARD_OUTPUT_EDITOR};
use oo_replay::routes::{handler_fn, ExactRoutes, PrefixRoutes};
use oo_replay::skip::SkipRule;
use oo_replay::{
    apply_profile, ClickMode, DragRequest, ElementInfo, Executor, Locator, PageDriver, ReplayContext, ReplayError,
    ReplayOptions, ReplayResult, StepOutcome,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Click(Locator),
    Fill(Locator, String),
    Drag(DragRequest),
    Evaluate(Option<Locator>, String),
}

/// Finds every element and records what handlers ask it to do.
#[derive(Default)]
struct RecordingDriver {
    calls: Mutex<Vec<Call>>,
    /// CSS selectors that never show up
    missing: Vec<String>,
    fail_drag: bool,
}

impl RecordingDriver {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PageDriver for RecordingDriver {
    async fn find(&self, locator: &Locator) -> ReplayResult<Option<ElementInfo>> {
        if self.missing.contains(&locator.to_css()) {
            return Ok(None);
        }
        Ok(Some(ElementInfo {
            frame_url: "about:blank".into(),
            tag: "div".into(),
            text: locator.to_css(),
            visible: true,
            enabled: true,
        }))
    }

    async fn click(&self, locator: &Locator, _mode: ClickMode) -> ReplayResult<()> {
        self.record(Call::Click(locator.clone()));
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> ReplayResult<()> {
        self.record(Call::Fill(locator.clone(), text.to_string()));
        Ok(())
    }

    async fn drag_and_drop(&self, request: &DragRequest) -> ReplayResult<()> {
        self.record(Call::Drag(request.clone()));
        if self.fail_drag {
            return Err(ReplayError::Playwright("drop target detached".into()));
        }
        Ok(())
    }

    async fn window_handles(&self) -> ReplayResult<Vec<String>> {
        Ok(vec!["page-0".into()])
    }

    async fn current_window(&self) -> ReplayResult<String> {
        Ok("page-0".into())
    }

    async fn switch_window(&self, _handle: &str) -> ReplayResult<()> {
        Ok(())
    }

    async fn evaluate(&self, locator: Option<&Locator>, script: &str) -> ReplayResult<Value> {
        self.record(Call::Evaluate(locator.cloned(), script.to_string()));
        Ok(Value::Bool(true))
    }

    async fn screenshot_png(&self, _locator: Option<&Locator>) -> ReplayResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

fn write_log(dir: &TempDir, lines: &[Value]) -> PathBuf {
    let content: Vec<String> = lines.iter().map(Value::to_string).collect();
    write_raw_log(dir.path(), &content.join("\n"))
}

fn write_raw_log(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("interaction-log-1771241377641.jsonl");
    std::fs::write(&path, content).unwrap();
    path
}

fn plugin_executor(driver: Arc<RecordingDriver>) -> Executor {
    let mut executor = Executor::with_context(ReplayContext::with_driver(driver));
    apply_profile(&mut executor, &PluginProfile).unwrap();
    executor
}

fn no_prepare() -> ReplayOptions {
    ReplayOptions {
        prepare: false,
        ..ReplayOptions::default()
    }
}

#[tokio::test]
async fn test_exact_routes_dispatch_in_order() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[
            json!({"event": "click", "action": "activate", "testId": "main-sql-mode"}),
            json!({"event": "click", "action": "activate", "testId": "sql-home-open-sql-manager"}),
        ],
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut exact = ExactRoutes::new();
    for name in ["main-sql-mode", "sql-home-open-sql-manager"] {
        let seen = seen.clone();
        exact.insert(
            name.to_string(),
            handler_fn(move |step, _| {
                seen.lock().unwrap().push((name, step.index()));
                Ok(())
            }),
        );
    }

    let mut executor = Executor::new();
    executor.set_click_routes(exact, PrefixRoutes::new());
    let report = executor.replay_file(&log, ReplayOptions::default()).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![("main-sql-mode", 1), ("sql-home-open-sql-manager", 2)]);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.handled, 2);
    assert_eq!(
        report.steps[0].outcome,
        Some(StepOutcome::Exact { test_id: "main-sql-mode".into() })
    );
}

#[tokio::test]
async fn test_skip_rule_suppresses_input() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[json!({
            "event": "input",
            "action": "set-value",
            "testId": "sql-manager-add-query-name",
            "value": "Q1"
        })],
    );

    let driver = Arc::new(RecordingDriver::default());
    let mut executor = plugin_executor(driver.clone());
    let rule = json!({"event": "input", "action": "set-value", "testId": "sql-manager-add-query-name"});
    executor.add_skip_rule(SkipRule::from_map(rule.as_object().unwrap()));

    let report = executor.replay_file(&log, no_prepare()).await.unwrap();

    assert!(driver.calls().is_empty());
    assert_eq!(report.total, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.steps.len(), 1);
}

#[tokio::test]
async fn test_input_without_skip_rule_fills_value() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[json!({"event": "input", "action": "set-value", "testId": "sql-manager-add-query-name", "value": "Q1"})],
    );

    let driver = Arc::new(RecordingDriver::default());
    let mut executor = plugin_executor(driver.clone());
    executor.replay_file(&log, no_prepare()).await.unwrap();

    assert_eq!(
        driver.calls(),
        vec![Call::Fill(Locator::TestId("sql-manager-add-query-name".into()), "Q1".into())]
    );
}

#[tokio::test]
async fn test_drag_pair_becomes_one_drag_and_drop() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[
            json!({"event": "dragstart", "testId": "row-1", "clientX": 10, "clientY": 20}),
            json!({"event": "drag", "testId": "row-1", "clientX": 30, "clientY": 40}),
            json!({"event": "drop", "testId": "row-2", "clientX": 50, "clientY": 60}),
            json!({"event": "dragend", "testId": "row-1"}),
        ],
    );

    let driver = Arc::new(RecordingDriver::default());
    let mut executor = plugin_executor(driver.clone());
    let report = executor.replay_file(&log, no_prepare()).await.unwrap();

    let calls = driver.calls();
    assert_eq!(calls.len(), 1);
    let Call::Drag(request) = &calls[0] else {
        panic!("expected a drag, got {:?}", calls[0]);
    };
    assert_eq!(request.source_point, Some((10, 20)));
    assert_eq!(request.target_point, Some((50, 60)));
    assert_eq!(request.source, Some(Locator::TestId("row-1".into())));
    assert_eq!(request.target, Some(Locator::TestId("row-2".into())));
    assert_eq!(report.handled, 4);
}

#[tokio::test]
async fn test_drop_without_dragstart_does_nothing() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[json!({"event": "drop", "testId": "row-2", "clientX": 50, "clientY": 60})],
    );

    let driver = Arc::new(RecordingDriver::default());
    let mut executor = plugin_executor(driver.clone());
    let report = executor.replay_file(&log, no_prepare()).await.unwrap();

    assert!(driver.calls().is_empty());
    assert!(report.success());
}

#[tokio::test]
async fn test_failed_drag_keeps_pending_source() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[
            json!({"event": "dragstart", "testId": "row-1", "clientX": 10, "clientY": 20}),
            json!({"event": "drop", "testId": "row-2", "clientX": 50, "clientY": 60}),
        ],
    );

    let driver = Arc::new(RecordingDriver {
        fail_drag: true,
        ..RecordingDriver::default()
    });
    let mut executor = plugin_executor(driver.clone());
    let options = ReplayOptions {
        stop_on_error: false,
        ..no_prepare()
    };
    let report = executor.replay_file(&log, options).await.unwrap();

    assert_eq!(report.failed, 1);
    let pending = executor.context().peek_step(PENDING_DRAG_SOURCE).map(|s| s.index());
    assert_eq!(pending, Some(1));
}

#[tokio::test]
async fn test_wizard_output_editor_is_skipped() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[json!({
            "event": "codemirror-change",
            "action": "set-value",
            "testId": WIZARD_OUTPUT_EDITOR,
            "value": "SELECT 1"
        })],
    );

    let driver = Arc::new(RecordingDriver::default());
    let mut executor = plugin_executor(driver.clone());
    let report = executor.replay_file(&log, no_prepare()).await.unwrap();

    assert_eq!(report.steps[0].outcome, Some(StepOutcome::Skipped { rule: 0 }));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn test_codemirror_value_set_through_editor_api() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[json!({
            "event": "codemirror-change",
            "action": "set-value",
            "testId": "sql-manager-query-editor",
            "value": "SELECT \"id\" FROM t"
        })],
    );

    let driver = Arc::new(RecordingDriver::default());
    let mut executor = plugin_executor(driver.clone());
    executor.replay_file(&log, no_prepare()).await.unwrap();

    let calls = driver.calls();
    assert_eq!(calls.len(), 1);
    let Call::Evaluate(locator, script) = &calls[0] else {
        panic!("expected a script call, got {:?}", calls[0]);
    };
    assert_eq!(locator, &Some(Locator::TestId("sql-manager-query-editor".into())));
    assert!(script.contains("CodeMirror.setValue(value)"));
    assert!(script.contains(r#"const value = "SELECT \"id\" FROM t";"#));
}

#[tokio::test]
async fn test_find_optional_maps_timeout_to_none() {
    let driver = RecordingDriver {
        missing: vec!["[data-testid='gone']".into()],
        ..RecordingDriver::default()
    };

    let gone = Locator::TestId("gone".into());
    assert!(driver.find_optional(&gone, Duration::ZERO).await.unwrap().is_none());
    assert!(matches!(
        driver.wait_for(&gone, Duration::ZERO).await,
        Err(ReplayError::Timeout(_))
    ));

    let here = Locator::TestId("here".into());
    let found = driver.find_optional(&here, Duration::ZERO).await.unwrap();
    assert_eq!(found.map(|info| info.tag), Some("div".to_string()));
}

#[tokio::test]
async fn test_malformed_line_fails_before_replay() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (1..=10)
        .map(|i| {
            if i == 5 {
                r#"{"event": "click", "testId": "#.to_string()
            } else {
                json!({"event": "click", "testId": format!("button-{}", i)}).to_string()
            }
        })
        .collect();
    let log = write_raw_log(dir.path(), &lines.join("\n"));

    let invoked = Arc::new(Mutex::new(0usize));
    let counter = invoked.clone();
    let mut executor = Executor::new();
    executor.set_default_click_handler(Some(handler_fn(move |_, _| {
        *counter.lock().unwrap() += 1;
        Ok(())
    })));

    let err = executor.replay_file(&log, ReplayOptions::default()).await.unwrap_err();

    assert!(matches!(err, ReplayError::InvalidJson { line: 5, .. }));
    assert!(err.to_string().contains(":5:"));
    assert_eq!(*invoked.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_step_count_matches_non_blank_lines() {
    let dir = TempDir::new().unwrap();
    let content = [
        r#"{"event": "click", "testId": "a"}"#,
        "",
        "   ",
        r#"{"event": "focus"}"#,
        r#"{"event": "click", "testId": "sql-codemirror-container-1", "action": "activate"}"#,
        "",
    ]
    .join("\n");
    let log = write_raw_log(dir.path(), &content);

    let driver = Arc::new(RecordingDriver::default());
    let mut executor = plugin_executor(driver.clone());
    let report = executor.replay_file(&log, no_prepare()).await.unwrap();

    assert_eq!(report.total, 3);
    let lines: Vec<usize> = report.steps.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![1, 4, 5]);
    assert_eq!(report.unrouted, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(driver.calls(), vec![Call::Click(Locator::TestId("a".into()))]);
}

#[tokio::test]
async fn test_failing_step_names_line() {
    let dir = TempDir::new().unwrap();
    let log = write_log(
        &dir,
        &[
            json!({"event": "click", "testId": "ok"}),
            json!({"event": "click", "seq": 7, "testId": "broken"}),
            json!({"event": "click", "testId": "never"}),
        ],
    );

    let mut executor = Executor::new();
    executor.set_default_click_handler(Some(handler_fn(|step, _| match step.test_id() {
        Some("broken") => Err(ReplayError::ElementNotFound("broken".into())),
        _ => Ok(()),
    })));

    let err = executor.replay_file(&log, ReplayOptions::default()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Replay failed on line=2, seq=7, event=click/, testId=broken"
    );
}
