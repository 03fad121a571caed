//! Run-scoped state shared by handlers

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::driver::PageDriver;
use crate::error::{ReplayError, ReplayResult};
use crate::step::Step;

/// Mutable store owned by the executor for one replay run.
///
/// Profiles fill it before the first step; handlers read tunables from
/// `settings` and park steps in the stash to carry state across steps
/// (a drag source waiting for its drop, for instance).
#[derive(Default)]
pub struct ReplayContext {
    driver: Option<Arc<dyn PageDriver>>,
    settings: Map<String, Value>,
    stash: HashMap<String, Step>,
}

impl ReplayContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            driver: Some(driver),
            ..Self::default()
        }
    }

    pub fn set_driver(&mut self, driver: Arc<dyn PageDriver>) {
        self.driver = Some(driver);
    }

    /// The page driver, or an error naming the missing collaborator.
    pub fn driver(&self) -> ReplayResult<Arc<dyn PageDriver>> {
        self.driver
            .clone()
            .ok_or_else(|| ReplayError::Config("no page driver in replay context".to_string()))
    }

    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Merge `values` over the current settings.
    pub fn extend(&mut self, values: Map<String, Value>) {
        self.settings.extend(values);
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        match self.settings.get(key) {
            Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)).unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Millisecond setting as a duration.
    pub fn get_millis(&self, key: &str, default_ms: u64) -> Duration {
        Duration::from_millis(self.get_u64(key, default_ms))
    }

    pub fn remember_step(&mut self, slot: impl Into<String>, step: Step) {
        self.stash.insert(slot.into(), step);
    }

    pub fn peek_step(&self, slot: &str) -> Option<&Step> {
        self.stash.get(slot)
    }

    pub fn take_step(&mut self, slot: &str) -> Option<Step> {
        self.stash.remove(slot)
    }

    pub fn forget_step(&mut self, slot: &str) {
        self.stash.remove(slot);
    }
}

impl fmt::Debug for ReplayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayContext")
            .field("driver", &self.driver.is_some())
            .field("settings", &self.settings)
            .field("stash", &self.stash.keys().collect::<Vec<_>>())
            .finish()
    }
}
