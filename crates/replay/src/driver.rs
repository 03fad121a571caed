//! Page-element provider used by replay handlers
//!
//! Handlers never talk to the browser directly; they go through a
//! [`PageDriver`] found in the execution context. The Playwright/CDP
//! implementation lives in [`crate::playwright`].

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ReplayError, ReplayResult};

/// Interval between element lookups while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How an element is addressed on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// `[data-testid='…']`
    TestId(String),
    /// `[data-testid^='…']`, used when the recorded id carried a generated suffix
    TestIdPrefix(String),
    /// Any other CSS selector, passed through as recorded
    Css(String),
}

impl Locator {
    pub fn to_css(&self) -> String {
        match self {
            Locator::TestId(id) => format!("[data-testid='{}']", escape_quote(id)),
            Locator::TestIdPrefix(prefix) => format!("[data-testid^='{}']", escape_quote(prefix)),
            Locator::Css(selector) => selector.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "css={}", self.to_css())
    }
}

fn escape_quote(value: &str) -> String {
    value.replace('\'', "\\'")
}

/// Click delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickMode {
    /// Real pointer click through the browser input pipeline
    Native,
    /// `element.click()` dispatched from script; works on covered elements
    #[default]
    Script,
}

/// What a lookup found. Only descriptive data crosses the driver boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub frame_url: String,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
}

/// One drag-and-drop gesture reconstructed from a recorded source/target pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragRequest {
    pub source: Option<Locator>,
    pub target: Option<Locator>,
    pub source_point: Option<(i64, i64)>,
    pub target_point: Option<(i64, i64)>,
    /// Delay between the synthetic drag events
    pub step_delay: Duration,
    /// Pause after the drop so the page can settle
    pub settle_delay: Duration,
}

impl Default for DragRequest {
    fn default() -> Self {
        Self {
            source: None,
            target: None,
            source_point: None,
            target_point: None,
            step_delay: Duration::from_millis(35),
            settle_delay: Duration::from_millis(50),
        }
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Single lookup of `locator` in the current page and all nested frames.
    async fn find(&self, locator: &Locator) -> ReplayResult<Option<ElementInfo>>;

    async fn click(&self, locator: &Locator, mode: ClickMode) -> ReplayResult<()>;

    async fn fill(&self, locator: &Locator, text: &str) -> ReplayResult<()>;

    async fn drag_and_drop(&self, request: &DragRequest) -> ReplayResult<()>;

    async fn window_handles(&self) -> ReplayResult<Vec<String>>;

    async fn current_window(&self) -> ReplayResult<String>;

    async fn switch_window(&self, handle: &str) -> ReplayResult<()>;

    /// Run `script` with `element` bound to the located element (or `null`).
    async fn evaluate(&self, locator: Option<&Locator>, script: &str) -> ReplayResult<Value>;

    /// PNG of the whole viewport, or of one element.
    async fn screenshot_png(&self, locator: Option<&Locator>) -> ReplayResult<Vec<u8>>;

    /// Poll [`PageDriver::find`] until the element shows up or `timeout` passes.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> ReplayResult<ElementInfo> {
        let start = Instant::now();
        loop {
            if let Some(found) = self.find(locator).await? {
                return Ok(found);
            }
            if start.elapsed() >= timeout {
                return Err(ReplayError::Timeout(format!("{} after {:?}", locator, timeout)));
            }
            debug!("Waiting for {}", locator);
            tokio::time::sleep(DEFAULT_POLL_INTERVAL.min(timeout)).await;
        }
    }

    /// Like [`PageDriver::wait_for`] but absence is an answer, not an error.
    async fn find_optional(&self, locator: &Locator, timeout: Duration) -> ReplayResult<Option<ElementInfo>> {
        match self.wait_for(locator, timeout).await {
            Ok(found) => Ok(Some(found)),
            Err(ReplayError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_css() {
        assert_eq!(Locator::TestId("main-sql-mode".into()).to_css(), "[data-testid='main-sql-mode']");
        assert_eq!(Locator::TestIdPrefix("row".into()).to_css(), "[data-testid^='row']");
        assert_eq!(Locator::TestId("it's".into()).to_css(), "[data-testid='it\\'s']");
        assert_eq!(Locator::Css("div > .btn".into()).to_css(), "div > .btn");
    }
}
