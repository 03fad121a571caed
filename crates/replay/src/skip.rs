//! Declarative rules that drop recorded steps before dispatch

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::step::Step;

/// Suffix that turns a declarative key into a prefix test.
pub const STARTSWITH_SUFFIX: &str = "__startswith";

/// Prefix that forces a lookup in the raw record.
const RAW_FIELD_PREFIX: &str = "raw.";

pub type FieldPredicate = Arc<dyn Fn(Option<&Value>, &Step) -> bool + Send + Sync>;

/// How one field of a step is tested.
#[derive(Clone)]
pub enum MatchCondition {
    Equals(Value),
    OneOf(Vec<Value>),
    /// Stringified field starts with any of the prefixes
    StartsWith(Vec<String>),
    Predicate(FieldPredicate),
}

impl MatchCondition {
    pub fn starts_with(prefix: impl Into<String>) -> Self {
        MatchCondition::StartsWith(vec![prefix.into()])
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(Option<&Value>, &Step) -> bool + Send + Sync + 'static,
    {
        MatchCondition::Predicate(Arc::new(f))
    }

    /// Missing fields compare as JSON `null` and never satisfy a prefix test.
    pub fn matches(&self, actual: Option<&Value>, step: &Step) -> bool {
        match self {
            MatchCondition::Equals(expected) => actual.unwrap_or(&Value::Null) == expected,
            MatchCondition::OneOf(options) => {
                let actual = actual.unwrap_or(&Value::Null);
                options.iter().any(|option| option == actual)
            }
            MatchCondition::StartsWith(prefixes) => match actual {
                None | Some(Value::Null) => false,
                Some(value) => {
                    let text = stringify(value);
                    prefixes.iter().any(|prefix| text.starts_with(prefix.as_str()))
                }
            },
            MatchCondition::Predicate(predicate) => predicate(actual, step),
        }
    }
}

impl fmt::Debug for MatchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchCondition::Equals(v) => write!(f, "eq {}", v),
            MatchCondition::OneOf(vs) => write!(f, "in {:?}", vs),
            MatchCondition::StartsWith(ps) => write!(f, "startswith {:?}", ps),
            MatchCondition::Predicate(_) => write!(f, "predicate"),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A conjunction of field conditions. An empty rule matches every step.
#[derive(Clone, Default)]
pub struct SkipRule {
    clauses: Vec<(String, MatchCondition)>,
}

impl SkipRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, condition: MatchCondition) -> Self {
        self.clauses.push((name.into(), condition));
        self
    }

    pub fn eq(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(name, MatchCondition::Equals(value.into()))
    }

    pub fn starts_with(self, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.field(name, MatchCondition::starts_with(prefix))
    }

    /// Build from the declarative map form, e.g.
    /// `{"event": "click", "testId__startswith": "sql-codemirror-"}`.
    ///
    /// Arrays become membership tests; under a `__startswith` key an array is
    /// a list of prefixes.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let clauses = map
            .iter()
            .map(|(key, expected)| match key.strip_suffix(STARTSWITH_SUFFIX) {
                Some(field) => {
                    let prefixes = match expected {
                        Value::Array(items) => items.iter().map(stringify).collect(),
                        other => vec![stringify(other)],
                    };
                    (field.to_string(), MatchCondition::StartsWith(prefixes))
                }
                None => {
                    let condition = match expected {
                        Value::Array(items) => MatchCondition::OneOf(items.clone()),
                        other => MatchCondition::Equals(other.clone()),
                    };
                    (key.clone(), condition)
                }
            })
            .collect();
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(String, MatchCondition)] {
        &self.clauses
    }

    pub fn matches(&self, step: &Step) -> bool {
        self.clauses.iter().all(|(name, condition)| {
            let actual = lookup_field(step, name);
            condition.matches(actual.as_ref(), step)
        })
    }
}

impl fmt::Debug for SkipRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.clauses.iter().map(|(k, c)| (k, c)))
            .finish()
    }
}

/// `raw.x` reads the raw record, `index`/`action_key` read the step itself,
/// anything else falls back to the raw record.
fn lookup_field(step: &Step, name: &str) -> Option<Value> {
    if let Some(raw_key) = name.strip_prefix(RAW_FIELD_PREFIX) {
        return step.raw().get(raw_key).cloned();
    }
    match name {
        "index" => Some(Value::from(step.index())),
        "action_key" => {
            let (event, action) = step.action_key();
            Some(Value::Array(vec![Value::String(event), Value::String(action)]))
        }
        _ => step.raw().get(name).cloned(),
    }
}

/// Position of the first rule matching `step`.
pub fn first_match(rules: &[SkipRule], step: &Step) -> Option<usize> {
    rules.iter().position(|rule| rule.matches(step))
}
