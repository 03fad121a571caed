//! Per-run replay results

use serde::{Deserialize, Serialize};

use crate::error::ReplayError;
use crate::executor::StepOutcome;
use crate::step::Step;

/// What happened to one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub line: usize,
    pub seq: Option<String>,
    pub event: String,
    pub action: String,
    pub test_id: Option<String>,
    /// `None` when the handler failed
    pub outcome: Option<StepOutcome>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl StepRecord {
    pub fn completed(step: &Step, outcome: StepOutcome, duration_ms: u64) -> Self {
        Self {
            outcome: Some(outcome),
            ..Self::base(step, duration_ms)
        }
    }

    pub fn failed(step: &Step, error: &ReplayError, duration_ms: u64) -> Self {
        let message = match error {
            ReplayError::StepFailed { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        Self {
            error: Some(message),
            ..Self::base(step, duration_ms)
        }
    }

    fn base(step: &Step, duration_ms: u64) -> Self {
        let (event, action) = step.action_key();
        Self {
            line: step.index(),
            seq: step.seq(),
            event,
            action,
            test_id: step.test_id().map(str::to_string),
            outcome: None,
            duration_ms,
            error: None,
        }
    }
}

/// Result of replaying one log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayReport {
    pub total: usize,
    pub handled: usize,
    pub skipped: usize,
    pub unrouted: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
}

impl ReplayReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            steps: Vec::with_capacity(total),
            ..Self::default()
        }
    }

    pub fn push(&mut self, record: StepRecord) {
        match &record.outcome {
            None => self.failed += 1,
            Some(outcome) if outcome.is_handled() => self.handled += 1,
            Some(StepOutcome::Skipped { .. }) => self.skipped += 1,
            Some(_) => self.unrouted += 1,
        }
        self.steps.push(record);
    }

    pub fn finish(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// One line per step: `01. line 3 click/activate  Δ=12.0ms  Σ=40.1ms`.
    pub fn timing_summary(&self) -> String {
        let mut total = 0u64;
        let rows: Vec<(String, String, String)> = self
            .steps
            .iter()
            .map(|s| {
                total += s.duration_ms;
                (
                    format!("line {} {}/{}", s.line, s.event, s.action),
                    format_duration_ms(s.duration_ms as f64),
                    format_duration_ms(total as f64),
                )
            })
            .collect();

        let name_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
        let delta_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);
        let total_width = rows.iter().map(|r| r.2.len()).max().unwrap_or(0);

        rows.iter()
            .enumerate()
            .map(|(i, (name, delta, sum))| {
                format!(
                    "{:02}. {:<nw$}  Δ={:>dw$}  Σ={:>tw$}",
                    i + 1,
                    name,
                    delta,
                    sum,
                    nw = name_width,
                    dw = delta_width,
                    tw = total_width
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `123.4ms`, `12.345s`, `2m 03.40s`, `1h 02m 05.40s`.
pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1000.0 {
        return format!("{:.1}ms", ms);
    }
    let sec = ms / 1000.0;
    if sec < 60.0 {
        return format!("{:.3}s", sec);
    }
    let minutes = (sec / 60.0).floor();
    let seconds = sec - minutes * 60.0;
    if minutes < 60.0 {
        return format!("{}m {:05.2}s", minutes as u64, seconds);
    }
    let hours = (minutes / 60.0).floor();
    let minutes = minutes - hours * 60.0;
    format!("{}h {:02}m {:05.2}s", hours as u64, minutes as u64, seconds)
}
