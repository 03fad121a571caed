//! Step handlers and the tables that route steps to them

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ReplayContext;
use crate::error::ReplayResult;
use crate::step::Step;

/// Wildcard side of a step-route key.
pub const ANY: &str = "*";

/// A unit of replay behavior bound to a route.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, step: &Step, ctx: &mut ReplayContext) -> ReplayResult<()>;
}

/// One-time action that brings the page to the starting screen.
#[async_trait]
pub trait PrepareHook: Send + Sync {
    async fn prepare(&self, ctx: &mut ReplayContext) -> ReplayResult<()>;
}

/// Synchronous closures are handlers too; handy for bookkeeping routes.
#[async_trait]
impl<F> StepHandler for F
where
    F: Fn(&Step, &mut ReplayContext) -> ReplayResult<()> + Send + Sync,
{
    async fn handle(&self, step: &Step, ctx: &mut ReplayContext) -> ReplayResult<()> {
        self(step, ctx)
    }
}

#[async_trait]
impl<F> PrepareHook for F
where
    F: Fn(&mut ReplayContext) -> ReplayResult<()> + Send + Sync,
{
    async fn prepare(&self, ctx: &mut ReplayContext) -> ReplayResult<()> {
        self(ctx)
    }
}

pub type SharedHandler = Arc<dyn StepHandler>;
pub type SharedPrepareHook = Arc<dyn PrepareHook>;

pub fn handler<H: StepHandler + 'static>(h: H) -> SharedHandler {
    Arc::new(h)
}

/// Wrap a synchronous closure as a shared handler.
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(&Step, &mut ReplayContext) -> ReplayResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn prepare_fn<F>(f: F) -> SharedPrepareHook
where
    F: Fn(&mut ReplayContext) -> ReplayResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handler that accepts a step and does nothing.
pub fn noop() -> SharedHandler {
    handler_fn(|_, _| Ok(()))
}

/// Normalized `(event, action)` route key; either side may be [`ANY`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub event: String,
    pub action: String,
}

impl RouteKey {
    pub fn new(event: impl AsRef<str>, action: impl AsRef<str>) -> Self {
        Self {
            event: event.as_ref().trim().to_lowercase(),
            action: action.as_ref().trim().to_lowercase(),
        }
    }

    /// Lookup order for a step: exact, event wildcard, action wildcard.
    pub fn candidates(event: &str, action: &str) -> [RouteKey; 3] {
        [
            RouteKey::new(event, action),
            RouteKey::new(event, ANY),
            RouteKey::new(ANY, action),
        ]
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.event, self.action)
    }
}

/// `test-id → handler`.
pub type ExactRoutes = HashMap<String, SharedHandler>;

/// `(event, action) → handler`.
pub type StepRoutes = HashMap<RouteKey, SharedHandler>;

/// Prefix routes; registration order decides between overlapping prefixes.
#[derive(Clone, Default)]
pub struct PrefixRoutes {
    entries: Vec<(String, SharedHandler)>,
}

impl PrefixRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `prefix`; re-registering replaces the handler in place.
    pub fn insert(&mut self, prefix: impl Into<String>, handler: SharedHandler) {
        let prefix = prefix.into();
        match self.entries.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = handler,
            None => self.entries.push((prefix, handler)),
        }
    }

    pub fn with(mut self, prefix: impl Into<String>, handler: SharedHandler) -> Self {
        self.insert(prefix, handler);
        self
    }

    /// First registered prefix of `test_id`, not the longest one.
    pub fn lookup(&self, test_id: &str) -> Option<(&str, &SharedHandler)> {
        self.entries
            .iter()
            .find(|(prefix, _)| test_id.starts_with(prefix.as_str()))
            .map(|(prefix, handler)| (prefix.as_str(), handler))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }
}

impl FromIterator<(String, SharedHandler)> for PrefixRoutes {
    fn from_iter<I: IntoIterator<Item = (String, SharedHandler)>>(iter: I) -> Self {
        let mut routes = PrefixRoutes::new();
        for (prefix, handler) in iter {
            routes.insert(prefix, handler);
        }
        routes
    }
}

/// The three lookup structures consulted by the executor.
#[derive(Clone, Default)]
pub struct RoutingTables {
    pub exact: ExactRoutes,
    pub prefix: PrefixRoutes,
    pub steps: StepRoutes,
}

impl RoutingTables {
    pub fn find_step_route(&self, event: &str, action: &str) -> Option<(RouteKey, SharedHandler)> {
        RouteKey::candidates(event, action)
            .into_iter()
            .find_map(|key| self.steps.get(&key).cloned().map(|h| (key, h)))
    }

    pub fn find_exact(&self, test_id: &str) -> Option<SharedHandler> {
        self.exact.get(test_id).cloned()
    }

    pub fn find_prefix(&self, test_id: &str) -> Option<(String, SharedHandler)> {
        self.prefix
            .lookup(test_id)
            .map(|(prefix, handler)| (prefix.to_string(), handler.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplayError;

    fn tagged(tag: &'static str) -> SharedHandler {
        handler_fn(move |_, _| Err(ReplayError::handler(tag)))
    }

    #[test]
    fn test_step_route_precedence() {
        let mut tables = RoutingTables::default();
        tables.steps.insert(RouteKey::new("*", "activate"), tagged("any-activate"));
        tables.steps.insert(RouteKey::new("click", "*"), tagged("click-any"));
        tables.steps.insert(RouteKey::new("click", "activate"), tagged("exact"));

        let (key, _) = tables.find_step_route("click", "activate").unwrap();
        assert_eq!(key, RouteKey::new("click", "activate"));

        let (key, _) = tables.find_step_route("click", "preview").unwrap();
        assert_eq!(key, RouteKey::new("click", "*"));

        let (key, _) = tables.find_step_route("keydown", "activate").unwrap();
        assert_eq!(key, RouteKey::new("*", "activate"));

        assert!(tables.find_step_route("scroll", "move").is_none());
    }

    #[test]
    fn test_route_key_normalizes() {
        assert_eq!(RouteKey::new(" DragStart ", "*"), RouteKey::new("dragstart", "*"));
        assert_eq!(RouteKey::new("drop", "*").to_string(), "(drop, *)");
    }

    #[test]
    fn test_prefix_first_registered_wins() {
        let routes = PrefixRoutes::new()
            .with("sql-manager-", tagged("broad"))
            .with("sql-manager-query-", tagged("narrow"));

        let (prefix, _) = routes.lookup("sql-manager-query-preview-1").unwrap();
        assert_eq!(prefix, "sql-manager-");
        assert!(routes.lookup("main-about").is_none());
    }

    #[test]
    fn test_prefix_reinsert_keeps_position() {
        let mut routes = PrefixRoutes::new().with("a", tagged("1")).with("ab", tagged("2"));
        routes.insert("a", tagged("3"));
        assert_eq!(routes.prefixes().collect::<Vec<_>>(), vec!["a", "ab"]);
        assert_eq!(routes.len(), 2);
    }
}
