//! OnlyOffice plugin interaction-log replay
//!
//! This crate replays interaction logs recorded by the SQL plugin against a
//! live editor instance:
//! - Parses newline-delimited JSON logs into ordered steps
//! - Dispatches each step through skip rules and routing tables
//! - Drives the editor with Playwright attached over the remote debugger
//! - Performs visual regression checks against baseline screenshots
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    oo-replay (Rust)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Executor                                                   │
//! │    ├── replay_file(path) -> ReplayReport                    │
//! │    ├── prepare()            (profile prepare hook)          │
//! │    └── execute_step(step) -> StepOutcome                    │
//! │          1. skip rules          (first match wins)          │
//! │          2. step routes         (e,a) > (e,*) > (*,a)       │
//! │          3. exact testId route                              │
//! │          4. prefix testId route (insertion order)           │
//! │          5. default click       (event == "click")          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ReplayProfile -> routes, skip rules, context, hooks        │
//! │  PageDriver    -> PlaywrightDriver (connectOverCDP)         │
//! │  VisualTester  -> baseline / actual / diff PNGs             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod executor;
pub mod extract;
pub mod interaction_log;
pub mod logging;
pub mod playwright;
pub mod profile;
pub mod report;
pub mod routes;
pub mod skip;
pub mod step;
pub mod suite;
pub mod visual;

pub use config::ReplayConfig;
pub use context::ReplayContext;
pub use driver::{ClickMode, DragRequest, ElementInfo, Locator, PageDriver};
pub use error::{ReplayError, ReplayResult};
pub use executor::{Executor, ReplayOptions, StepOutcome};
pub use interaction_log::{find_latest_interaction_log, read_interaction_log};
pub use playwright::{PlaywrightConfig, PlaywrightDriver};
pub use profile::{apply_profile, ProfileRegistry, ReplayProfile};
pub use report::ReplayReport;
pub use step::Step;
