//! Batch replay of every interaction log in a directory

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use walkdir::WalkDir;

use crate::error::{ReplayError, ReplayResult};
use crate::executor::{Executor, ReplayOptions};
use crate::report::{format_duration_ms, ReplayReport};

/// Configuration for a batch run
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Directory holding `*.jsonl` cases
    pub cases_dir: PathBuf,

    /// `batch-<stamp>` directories are created here
    pub artifacts_dir: PathBuf,

    /// Keep going after a failing case
    pub continue_on_error: bool,

    pub options: ReplayOptions,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            cases_dir: PathBuf::from("test_cases"),
            artifacts_dir: PathBuf::from("artifacts/replay_cases"),
            continue_on_error: false,
            options: ReplayOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Ok,
    Failed,
}

/// Result of replaying one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub index: usize,
    pub case_file: PathBuf,
    pub case_dir: PathBuf,
    pub status: CaseStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub report: Option<ReplayReport>,
}

/// Written as `summary.json` in the run root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub cases_total: usize,
    pub cases_executed: usize,
    pub failures: usize,
    pub run_root: PathBuf,
    pub results: Vec<CaseResult>,
}

impl SuiteSummary {
    pub fn success(&self) -> bool {
        self.failures == 0
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_root.join("summary.json")
    }
}

/// `*.jsonl` files directly inside `dir`, sorted by name
pub fn find_cases(dir: &Path) -> ReplayResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ReplayError::Config(format!("cases dir not found: {}", dir.display())));
    }

    let mut cases: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "jsonl").unwrap_or(false))
        .collect();

    cases.sort();
    Ok(cases)
}

/// Replace anything but alphanumerics, `-`, `_` and `.` with `_`
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// Replay every case with a fresh executor from `make_executor`.
///
/// Each case gets `NNN_<name>/report.json`; the run root gets
/// `summary.json`. Stops at the first failing case unless
/// `continue_on_error` is set.
pub async fn run_suite<F>(config: &SuiteConfig, mut make_executor: F) -> ReplayResult<SuiteSummary>
where
    F: FnMut(&Path) -> ReplayResult<Executor>,
{
    let cases = find_cases(&config.cases_dir)?;
    if cases.is_empty() {
        return Err(ReplayError::Config(format!(
            "no *.jsonl files in: {}",
            config.cases_dir.display()
        )));
    }

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let run_root = config.artifacts_dir.join(format!("batch-{}", stamp));
    std::fs::create_dir_all(&run_root)?;

    info!("[batch-replay] run root: {}", run_root.display());
    info!("[batch-replay] cases: {}", cases.len());

    let mut results = Vec::new();
    let mut failures = 0;

    for (i, case_file) in cases.iter().enumerate() {
        let index = i + 1;
        let stem = case_file.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let case_dir = run_root.join(format!("{:03}_{}", index, safe_name(&stem)));
        std::fs::create_dir_all(&case_dir)?;

        info!("[batch-replay] ({}/{}) start: {}", index, cases.len(), case_file.display());
        let started = Instant::now();

        let outcome = match make_executor(&case_dir) {
            Ok(mut executor) => executor.replay_file(case_file, config.options).await,
            Err(e) => Err(e),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status, error, report) = match outcome {
            Ok(report) if report.success() => (CaseStatus::Ok, None, Some(report)),
            Ok(report) => (
                CaseStatus::Failed,
                Some(format!("{} step(s) failed", report.failed)),
                Some(report),
            ),
            Err(e) => (CaseStatus::Failed, Some(e.to_string()), None),
        };

        if let Some(report) = &report {
            std::fs::write(case_dir.join("report.json"), serde_json::to_string_pretty(report)?)?;
        }

        match status {
            CaseStatus::Ok => info!(
                "[batch-replay] ({}/{}) ok: duration={}, case_dir={}",
                index,
                cases.len(),
                format_duration_ms(duration_ms as f64),
                case_dir.display()
            ),
            CaseStatus::Failed => {
                failures += 1;
                error!(
                    "[batch-replay] ({}/{}) failed: {}, duration={}",
                    index,
                    cases.len(),
                    error.as_deref().unwrap_or("unknown error"),
                    format_duration_ms(duration_ms as f64)
                );
            }
        }

        results.push(CaseResult {
            index,
            case_file: case_file.clone(),
            case_dir,
            status,
            duration_ms,
            error,
            report,
        });

        if status == CaseStatus::Failed && !config.continue_on_error {
            break;
        }
    }

    let summary = SuiteSummary {
        cases_total: cases.len(),
        cases_executed: results.len(),
        failures,
        run_root,
        results,
    };

    let summary_path = summary.summary_path();
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    info!("[batch-replay] summary: {}", summary_path.display());

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::handler_fn;
    use crate::skip::SkipRule;
    use tempfile::TempDir;

    fn write_case(dir: &Path, name: &str, lines: &[&str]) {
        std::fs::write(dir.join(name), lines.join("\n")).unwrap();
    }

    fn failing_on_boom() -> ReplayResult<Executor> {
        let mut executor = Executor::new();
        executor.set_default_click_handler(Some(handler_fn(|step, _| {
            if step.test_id() == Some("boom") {
                Err(ReplayError::handler("boom"))
            } else {
                Ok(())
            }
        })));
        Ok(executor)
    }

    fn suite(cases: &TempDir, artifacts: &TempDir, continue_on_error: bool) -> SuiteConfig {
        SuiteConfig {
            cases_dir: cases.path().to_path_buf(),
            artifacts_dir: artifacts.path().to_path_buf(),
            continue_on_error,
            options: ReplayOptions::default(),
        }
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("case 01/ü.v2"), "case_01_ü.v2");
    }

    #[test]
    fn test_find_cases_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        write_case(dir.path(), "b.jsonl", &["{}"]);
        write_case(dir.path(), "a.jsonl", &["{}"]);
        write_case(dir.path(), "notes.txt", &["x"]);
        std::fs::create_dir(dir.path().join("nested.jsonl")).unwrap();

        let names: Vec<_> = find_cases(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
        assert!(find_cases(&dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_stops_at_first_failing_case() {
        let cases = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();
        write_case(cases.path(), "01.jsonl", &[r#"{"event":"click","testId":"boom"}"#]);
        write_case(cases.path(), "02.jsonl", &[r#"{"event":"click","testId":"fine"}"#]);

        let summary = run_suite(&suite(&cases, &artifacts, false), |_| failing_on_boom()).await.unwrap();
        assert_eq!(summary.cases_total, 2);
        assert_eq!(summary.cases_executed, 1);
        assert_eq!(summary.failures, 1);
        assert!(summary.results[0].error.as_deref().unwrap().contains("line=1"));
        assert!(summary.summary_path().exists());
    }

    #[tokio::test]
    async fn test_continue_on_error_runs_everything() {
        let cases = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();
        write_case(cases.path(), "01.jsonl", &[r#"{"event":"click","testId":"boom"}"#]);
        write_case(cases.path(), "02.jsonl", &[r#"{"event":"click","testId":"fine"}"#, ""]);

        let summary = run_suite(&suite(&cases, &artifacts, true), |_| failing_on_boom()).await.unwrap();
        assert_eq!(summary.cases_executed, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.results[1].status, CaseStatus::Ok);
        assert!(summary.results[1].case_dir.join("report.json").exists());

        let written: SuiteSummary =
            serde_json::from_str(&std::fs::read_to_string(summary.summary_path()).unwrap()).unwrap();
        assert_eq!(written.cases_executed, 2);
    }

    #[tokio::test]
    async fn test_each_case_gets_fresh_executor() {
        let cases = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();
        write_case(cases.path(), "a.jsonl", &[r#"{"event":"click","testId":"x"}"#]);
        write_case(cases.path(), "b.jsonl", &[r#"{"event":"click","testId":"x"}"#]);

        let mut built = 0;
        let summary = run_suite(&suite(&cases, &artifacts, false), |case_dir| {
            built += 1;
            assert!(case_dir.ends_with(format!("{:03}_{}", built, if built == 1 { "a" } else { "b" })));
            let mut executor = Executor::new();
            executor.set_skip_rules(vec![SkipRule::new()]);
            Ok(executor)
        })
        .await
        .unwrap();

        assert_eq!(built, 2);
        assert!(summary.success());
        assert_eq!(summary.results[0].report.as_ref().unwrap().skipped, 1);
    }

    #[tokio::test]
    async fn test_empty_cases_dir() {
        let cases = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();
        let result = run_suite(&suite(&cases, &artifacts, false), |_| Ok(Executor::new())).await;
        assert!(matches!(result, Err(ReplayError::Config(_))));
    }
}
