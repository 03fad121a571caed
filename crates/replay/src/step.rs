//! One recorded interaction event

use serde_json::{Map, Value};

/// A single line of an interaction log.
///
/// The raw object is kept as recorded; every field is reachable through
/// [`Step::get`]. `index` is the 1-based physical line number in the source
/// file, so skipped blank lines leave gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    index: usize,
    raw: Map<String, Value>,
}

impl Step {
    pub fn new(index: usize, raw: Map<String, Value>) -> Self {
        Self { index, raw }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Field lookup by name against the raw record.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// String field; `None` when absent, null or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    /// Normalized `(event, action)` pair: trimmed, lowercased, empty when missing.
    pub fn action_key(&self) -> (String, String) {
        (self.normalized("event"), self.normalized("action"))
    }

    pub fn event(&self) -> Option<&str> {
        self.get_str("event")
    }

    pub fn action(&self) -> Option<&str> {
        self.get_str("action")
    }

    /// Test id, treating an empty string as absent.
    pub fn test_id(&self) -> Option<&str> {
        self.get_str("testId").filter(|id| !id.is_empty())
    }

    pub fn selector(&self) -> Option<&str> {
        self.get_str("selector").filter(|s| !s.trim().is_empty())
    }

    pub fn text(&self) -> Option<&str> {
        self.get_str("text")
    }

    /// Sequence id rendered for diagnostics (recorders emit numbers or strings).
    pub fn seq(&self) -> Option<String> {
        match self.raw.get("seq")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn normalized(&self, key: &str) -> String {
        match self.raw.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_lowercase(),
            Some(other) => other.to_string().trim().to_lowercase(),
        }
    }
}

#[cfg(test)]
pub(crate) fn fixture(index: usize, value: Value) -> Step {
    match value {
        Value::Object(raw) => Step::new(index, raw),
        other => panic!("step fixture must be a JSON object, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_key_is_normalized() {
        let s = fixture(3, json!({"event": " Click ", "action": "ACTIVATE"}));
        assert_eq!(s.action_key(), ("click".to_string(), "activate".to_string()));
        assert_eq!(s.index(), 3);
    }

    #[test]
    fn test_action_key_defaults_to_empty() {
        let s = fixture(1, json!({"event": null}));
        assert_eq!(s.action_key(), (String::new(), String::new()));
    }

    #[test]
    fn test_seq_and_test_id() {
        let s = fixture(1, json!({"seq": 42, "testId": ""}));
        assert_eq!(s.seq().as_deref(), Some("42"));
        assert_eq!(s.test_id(), None);

        let s = fixture(2, json!({"seq": "a-7", "testId": "main-sql-mode", "extra": {"k": 1}}));
        assert_eq!(s.seq().as_deref(), Some("a-7"));
        assert_eq!(s.test_id(), Some("main-sql-mode"));
        assert_eq!(s.get("extra"), Some(&json!({"k": 1})));
    }
}
