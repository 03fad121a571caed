//! Playwright browser automation over the Chrome DevTools Protocol
//!
//! Every operation renders a small Node script that attaches to the running
//! editor with `chromium.connectOverCDP`, performs one action on the selected
//! page and prints a single JSON line with the outcome.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command as TokioCommand;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::driver::{ClickMode, DragRequest, ElementInfo, Locator, PageDriver};
use crate::error::{ReplayError, ReplayResult};

/// Configuration for the Playwright driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    /// `host:port` of the editor's remote debugger
    pub debugger_address: String,

    /// Node executable
    pub node_binary: PathBuf,

    /// `node_modules` directory that contains `playwright`
    pub node_modules: PathBuf,

    /// Upper bound for one rendered script
    pub script_timeout_ms: u64,

    /// How long to wait for the debugger endpoint to answer
    pub connect_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            debugger_address: "127.0.0.1:9222".to_string(),
            node_binary: PathBuf::from("node"),
            node_modules: PathBuf::from("node_modules"),
            script_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Operation sent to the rendered script.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Operation<'a> {
    Find { selector: String },
    Click { selector: String, native: bool },
    Fill { selector: String, text: &'a str },
    Drag {
        source: Option<String>,
        target: Option<String>,
        source_point: Option<(i64, i64)>,
        target_point: Option<(i64, i64)>,
        step_delay_ms: u64,
        settle_delay_ms: u64,
    },
    Windows,
    Evaluate { selector: Option<String>, script: &'a str },
    Screenshot { selector: Option<String> },
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Operation::Find { .. } => "find",
            Operation::Click { .. } => "click",
            Operation::Fill { .. } => "fill",
            Operation::Drag { .. } => "drag",
            Operation::Windows => "windows",
            Operation::Evaluate { .. } => "evaluate",
            Operation::Screenshot { .. } => "screenshot",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptResponse {
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Page driver attached to an already running browser.
pub struct PlaywrightDriver {
    config: PlaywrightConfig,

    /// Index of the selected page among all pages of all contexts
    page_index: Mutex<usize>,
}

impl PlaywrightDriver {
    /// Verify the tooling, wait for the debugger endpoint and attach.
    pub async fn connect(config: PlaywrightConfig) -> ReplayResult<Self> {
        Self::check_playwright_installed()?;
        let driver = Self::new(config);
        driver.wait_for_debugger().await?;
        info!("Attached to remote debugger at {}", driver.config.debugger_address);
        Ok(driver)
    }

    /// Build without any checks; the first operation fails if nothing listens.
    pub fn new(config: PlaywrightConfig) -> Self {
        Self {
            config,
            page_index: Mutex::new(0),
        }
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> ReplayResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(ReplayError::PlaywrightNotFound),
        }
    }

    /// Poll `/json/version` until the debugger answers.
    async fn wait_for_debugger(&self) -> ReplayResult<()> {
        let version_url = format!("http://{}/json/version", self.config.debugger_address);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let limit = Duration::from_millis(self.config.connect_timeout_ms);
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < limit {
            attempts += 1;

            match client.get(&version_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let version: Value = resp.json().await.unwrap_or(Value::Null);
                    let browser = version.get("Browser").cloned().unwrap_or_default();
                    debug!("Debugger version: {}", browser);
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Debugger endpoint returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for remote debugger at {}...", self.config.debugger_address);
                    }
                    if !e.is_connect() {
                        warn!("Debugger check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(ReplayError::Debugger(format!(
            "{} did not answer after {} attempts",
            self.config.debugger_address, attempts
        )))
    }

    fn selected_page(&self) -> usize {
        self.page_index.lock().map(|i| *i).unwrap_or(0)
    }

    /// Render the script for one operation
    fn build_script(&self, operation: &Operation<'_>) -> ReplayResult<String> {
        let request = serde_json::to_string(operation)?;
        let endpoint = serde_json::to_string(&format!("http://{}", self.config.debugger_address))?;

        Ok(format!(
            r#"
const {{ chromium }} = require('playwright');

(async () => {{
  const browser = await chromium.connectOverCDP({endpoint});
  const request = {request};
  const pages = browser.contexts().flatMap((c) => c.pages());
  const page = pages[{page_index}] || pages[0];

  const locate = async (selector) => {{
    if (!selector) return null;
    for (const frame of page.frames()) {{
      const handle = await frame.$(selector).catch(() => null);
      if (handle) return {{ frame, handle }};
    }}
    return null;
  }};
  const require_ = async (selector) => {{
    const found = await locate(selector);
    if (!found) throw new Error('element not found: ' + selector);
    return found;
  }};

  try {{
    if (!page) throw new Error('no pages in attached browser');
    let result = null;
    switch (request.op) {{
{body}
      default:
        throw new Error('unknown op ' + request.op);
    }}
    console.log(JSON.stringify({{ success: true, result }}));
  }} catch (error) {{
    console.log(JSON.stringify({{ success: false, error: error.message }}));
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            endpoint = endpoint,
            request = request,
            page_index = self.selected_page(),
            body = OPERATION_JS,
        ))
    }

    /// Execute one operation and return its `result` payload
    async fn run(&self, operation: Operation<'_>) -> ReplayResult<Value> {
        let script = self.build_script(&operation)?;

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("replay-op.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright op {} via {}", operation.name(), script_path.display());

        let node_modules = std::fs::canonicalize(&self.config.node_modules)
            .unwrap_or_else(|_| self.config.node_modules.clone());

        let child = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .current_dir(temp_dir.path())
            .env("NODE_PATH", node_modules)
            .kill_on_drop(true)
            .output();

        let limit = Duration::from_millis(self.config.script_timeout_ms);
        let output = timeout(limit, child)
            .await
            .map_err(|_| ReplayError::Timeout(format!("playwright op {} after {:?}", operation.name(), limit)))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<ScriptResponse>(line.trim()).ok());

        match response {
            Some(resp) if resp.success => Ok(resp.result),
            Some(resp) => Err(ReplayError::Playwright(format!(
                "{} failed: {}",
                operation.name(),
                resp.error.unwrap_or_else(|| "unknown error".to_string())
            ))),
            None => Err(ReplayError::Playwright(format!(
                "Script failed:\nstdout: {}\nstderr: {}",
                stdout,
                String::from_utf8_lossy(&output.stderr)
            ))),
        }
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn find(&self, locator: &Locator) -> ReplayResult<Option<ElementInfo>> {
        let result = self.run(Operation::Find { selector: locator.to_css() }).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    async fn click(&self, locator: &Locator, mode: ClickMode) -> ReplayResult<()> {
        self.run(Operation::Click {
            selector: locator.to_css(),
            native: mode == ClickMode::Native,
        })
        .await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> ReplayResult<()> {
        self.run(Operation::Fill { selector: locator.to_css(), text }).await?;
        Ok(())
    }

    async fn drag_and_drop(&self, request: &DragRequest) -> ReplayResult<()> {
        if request.source.is_none() && request.source_point.is_none() {
            return Err(ReplayError::ElementNotFound("drag source: no locator and no point".to_string()));
        }
        if request.target.is_none() && request.target_point.is_none() {
            return Err(ReplayError::ElementNotFound("drop target: no locator and no point".to_string()));
        }

        self.run(Operation::Drag {
            source: request.source.as_ref().map(Locator::to_css),
            target: request.target.as_ref().map(Locator::to_css),
            source_point: request.source_point,
            target_point: request.target_point,
            step_delay_ms: request.step_delay.as_millis() as u64,
            settle_delay_ms: request.settle_delay.as_millis() as u64,
        })
        .await?;
        Ok(())
    }

    async fn window_handles(&self) -> ReplayResult<Vec<String>> {
        let result = self.run(Operation::Windows).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn current_window(&self) -> ReplayResult<String> {
        Ok(page_handle(self.selected_page()))
    }

    async fn switch_window(&self, handle: &str) -> ReplayResult<()> {
        let index = handle
            .strip_prefix("page-")
            .and_then(|i| i.parse::<usize>().ok())
            .ok_or_else(|| ReplayError::ElementNotFound(format!("window handle {}", handle)))?;

        let handles = self.window_handles().await?;
        if index >= handles.len() {
            return Err(ReplayError::ElementNotFound(format!("window handle {}", handle)));
        }
        if let Ok(mut selected) = self.page_index.lock() {
            *selected = index;
        }
        debug!("Switched to window {}", handle);
        Ok(())
    }

    async fn evaluate(&self, locator: Option<&Locator>, script: &str) -> ReplayResult<Value> {
        self.run(Operation::Evaluate {
            selector: locator.map(Locator::to_css),
            script,
        })
        .await
    }

    async fn screenshot_png(&self, locator: Option<&Locator>) -> ReplayResult<Vec<u8>> {
        let result = self.run(Operation::Screenshot { selector: locator.map(Locator::to_css) }).await?;
        let encoded = result
            .as_str()
            .ok_or_else(|| ReplayError::Playwright("screenshot returned no data".to_string()))?;
        BASE64
            .decode(encoded)
            .map_err(|e| ReplayError::Playwright(format!("screenshot payload: {}", e)))
    }
}

fn page_handle(index: usize) -> String {
    format!("page-{}", index)
}

/// `switch` arms for each operation; `locate`, `require_`, `page`, `pages`
/// and `request` are in scope.
const OPERATION_JS: &str = r#"
      case 'find': {
        const found = await locate(request.selector);
        if (found) {
          result = await found.handle.evaluate((el) => ({
            tag: el.tagName.toLowerCase(),
            text: (el.innerText || el.textContent || '').slice(0, 200),
            visible: !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length),
            enabled: !el.disabled,
          }));
          result.frame_url = found.frame.url();
        }
        break;
      }
      case 'click': {
        const found = await require_(request.selector);
        if (request.native) {
          await found.handle.click();
        } else {
          await found.handle.evaluate((el) => el.click());
        }
        break;
      }
      case 'fill': {
        const found = await require_(request.selector);
        await found.handle.fill(request.text);
        break;
      }
      case 'drag': {
        const source = await locate(request.source);
        const target = await locate(request.target);
        const frame = (source || target || { frame: page.mainFrame() }).frame;
        const dispatched = await frame.evaluate(async ([src, dst, sp, tp, delayMs]) => {
          const pick = (fallback, point) => {
            if (point) {
              const byPoint = document.elementFromPoint(point[0], point[1]);
              if (byPoint) return byPoint;
            }
            return fallback;
          };
          const sourceEl = pick(src ? document.querySelector(src) : null, sp);
          const targetEl = pick(dst ? document.querySelector(dst) : null, tp);
          if (!sourceEl || !targetEl) return false;
          try {
            const dataTransfer = new DataTransfer();
            const sequence = [
              [sourceEl, 'dragstart', sp],
              [targetEl, 'dragenter', tp],
              [targetEl, 'dragover', tp],
              [targetEl, 'drop', tp],
              [sourceEl, 'dragend', sp],
            ];
            for (const [node, type, point] of sequence) {
              node.dispatchEvent(new DragEvent(type, {
                bubbles: true,
                cancelable: true,
                dataTransfer,
                clientX: point ? point[0] : 0,
                clientY: point ? point[1] : 0,
              }));
              await new Promise((r) => setTimeout(r, delayMs));
            }
            return true;
          } catch (_err) {
            return false;
          }
        }, [request.source, request.target, request.source_point, request.target_point, request.step_delay_ms]);
        if (!dispatched) {
          if (!source || !target) throw new Error('drag source or target not found');
          await source.handle.hover();
          await page.mouse.down();
          await target.handle.hover();
          await page.mouse.up();
        }
        await page.waitForTimeout(request.settle_delay_ms);
        result = dispatched ? 'dispatched' : 'mouse';
        break;
      }
      case 'windows': {
        result = pages.map((_, i) => 'page-' + i);
        break;
      }
      case 'evaluate': {
        const found = await locate(request.selector);
        const frame = found ? found.frame : page.mainFrame();
        result = await frame.evaluate(([sel, src]) => {
          const element = sel ? document.querySelector(sel) : null;
          return (new Function('element', src))(element);
        }, [request.selector, request.script]);
        if (result === undefined) result = null;
        break;
      }
      case 'screenshot': {
        const buffer = request.selector
          ? await (await require_(request.selector)).handle.screenshot()
          : await page.screenshot();
        result = buffer.toString('base64');
        break;
      }"#;
