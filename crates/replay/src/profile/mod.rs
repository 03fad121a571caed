//! Replay profiles: caller-supplied routes, skip rules and hooks
//!
//! The executor ships empty. A profile fills it in, either through one
//! [`ReplayProfile::configure`] call or through any subset of the narrower
//! builders. Entry points a profile does not provide are simply not used.

mod plugin;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ReplayError, ReplayResult};
use crate::executor::Executor;
use crate::routes::{ExactRoutes, PrefixRoutes, SharedHandler, SharedPrepareHook, StepRoutes};
use crate::skip::SkipRule;

pub use plugin::{PluginProfile, PENDING_DRAG_SOURCE, WIZARD_OUTPUT_EDITOR};

/// Configuration entry points. Every builder defaults to "not provided".
pub trait ReplayProfile: Send + Sync {
    fn name(&self) -> &str;

    /// Configure everything at once. When provided, the builders below are
    /// not consulted.
    fn configure(&self, _executor: &mut Executor) -> Option<ReplayResult<()>> {
        None
    }

    /// Settings merged into the execution context.
    fn build_context(&self, _executor: &Executor) -> Option<Map<String, Value>> {
        None
    }

    fn build_click_routes(&self, _executor: &Executor) -> Option<(ExactRoutes, PrefixRoutes)> {
        None
    }

    fn build_step_routes(&self, _executor: &Executor) -> Option<StepRoutes> {
        None
    }

    fn build_skip_rules(&self) -> Option<Vec<SkipRule>> {
        None
    }

    fn build_default_click_handler(&self, _executor: &Executor) -> Option<SharedHandler> {
        None
    }

    fn build_prepare_hook(&self, _executor: &Executor) -> Option<SharedPrepareHook> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    Configured,
    NoSupportedHooks,
}

/// Install `profile` into `executor`.
///
/// The context is built first so that later builders can read it.
pub fn apply_profile(executor: &mut Executor, profile: &dyn ReplayProfile) -> ReplayResult<ProfileStatus> {
    if let Some(result) = profile.configure(executor) {
        result?;
        info!("External routes profile loaded: {}", profile.name());
        return Ok(ProfileStatus::Configured);
    }

    let mut configured = false;

    if let Some(values) = profile.build_context(executor) {
        executor.context_mut().extend(values);
        configured = true;
    }

    if let Some((exact, prefix)) = profile.build_click_routes(executor) {
        executor.set_click_routes(exact, prefix);
        configured = true;
    }

    if let Some(routes) = profile.build_step_routes(executor) {
        executor.set_step_routes(routes);
        configured = true;
    }

    if let Some(rules) = profile.build_skip_rules() {
        executor.set_skip_rules(rules);
        configured = true;
    }

    if let Some(handler) = profile.build_default_click_handler(executor) {
        executor.set_default_click_handler(Some(handler));
        configured = true;
    }

    if let Some(hook) = profile.build_prepare_hook(executor) {
        executor.set_prepare_hook(Some(hook));
        configured = true;
    }

    if configured {
        info!("External routes profile loaded: {}", profile.name());
        Ok(ProfileStatus::Configured)
    } else {
        info!("External routes profile has no supported hooks: {}", profile.name());
        Ok(ProfileStatus::NoSupportedHooks)
    }
}

/// Named profiles the binary can pick from.
#[derive(Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Arc<dyn ReplayProfile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the profiles shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PluginProfile));
        registry
    }

    pub fn register(&mut self, profile: Arc<dyn ReplayProfile>) {
        self.profiles.insert(profile.name().to_string(), profile);
    }

    pub fn get(&self, name: &str) -> ReplayResult<Arc<dyn ReplayProfile>> {
        self.profiles
            .get(name.trim())
            .cloned()
            .ok_or_else(|| ReplayError::UnknownProfile(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}
