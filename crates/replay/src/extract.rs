//! Pure helpers that pull locators, points and values out of a step
//!
//! None of these fail: missing or unusable data yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::driver::Locator;
use crate::step::Step;

/// Trailing `abc_12_x9`-style run appended to ids that are unique per session.
static GENERATED_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]+(?:_[A-Za-z0-9]+)+$").expect("static regex"));

static SELECTOR_TEST_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\[data-testid=(?:"(.+?)"|'(.+?)')\]$"#).expect("static regex"));

/// Locator for the element a step acted on.
pub fn locator_from_step(step: &Step) -> Option<Locator> {
    if let Some(test_id) = step.test_id() {
        return Some(test_id_locator(test_id));
    }

    let selector = step.selector()?.trim();
    if let Some(caps) = SELECTOR_TEST_ID.captures(selector) {
        let embedded = caps.get(1).or_else(|| caps.get(2))?.as_str();
        return Some(test_id_locator(embedded));
    }
    Some(Locator::Css(selector.to_string()))
}

fn test_id_locator(test_id: &str) -> Locator {
    let trimmed = GENERATED_SUFFIX.replace(test_id, "");
    if trimmed != test_id {
        Locator::TestIdPrefix(trimmed.into_owned())
    } else {
        Locator::TestId(test_id.to_string())
    }
}

/// Viewport point from `clientX`/`clientY` when both are numeric.
pub fn point_from_step(step: &Step) -> Option<(i64, i64)> {
    let x = as_coordinate(step.get("clientX")?)?;
    let y = as_coordinate(step.get("clientY")?)?;
    Some((x, y))
}

fn as_coordinate(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

/// User-entered value: `value`, else `eventData.detail.value`.
pub fn value_from_step(step: &Step) -> Option<&Value> {
    if let Some(direct) = step.get("value").filter(|v| !v.is_null()) {
        return Some(direct);
    }

    step.get("eventData")?
        .as_object()?
        .get("detail")?
        .as_object()?
        .get("value")
        .filter(|v| !v.is_null())
}

/// [`value_from_step`] as text: strings verbatim, anything else as JSON.
pub fn value_text_from_step(step: &Step) -> Option<String> {
    value_from_step(step).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
