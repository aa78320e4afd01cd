//! End-to-end orchestrator tests with scripted fake capabilities
//!
//! Exercises every transition of the build-repair state machine without a
//! container engine or network access: the builder, runner and fixer are
//! scripted fakes injected through the capability traits.

use async_trait::async_trait;
use reprodock::catalog;
use reprodock::config::ReprodockConfig;
use reprodock::engine::{BuildOutcome, ContainerRunner, EngineError, ImageBuilder};
use reprodock::harness::BuildRepairOrchestrator;
use reprodock::repair::DockerfileFixer;
use reprodock::results::OutcomeSink;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

const BASE_DOCKERFILE: &str = "FROM ubuntu:18.04\nRUN ./build.sh\nCMD [\"./run_tests.sh\"]\n";

/// Builder that replays scripted outcomes, then succeeds forever.
#[derive(Default)]
struct ScriptedBuilder {
    outcomes: Mutex<VecDeque<BuildOutcome>>,
    tags_seen: Mutex<Vec<String>>,
    builds: AtomicU32,
}

impl ScriptedBuilder {
    fn failing_once(error: &str) -> Self {
        let builder = Self::default();
        builder.push(BuildOutcome::Failure {
            log: vec![format!("Step 2/3 : RUN ./build.sh"), error.to_string()],
            error: error.to_string(),
        });
        builder
    }

    fn push(&self, outcome: BuildOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    fn build_count(&self) -> u32 {
        self.builds.load(Ordering::SeqCst)
    }

    fn tags(&self) -> Vec<String> {
        self.tags_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBuilder for ScriptedBuilder {
    async fn build(
        &self,
        _context_dir: &Path,
        _dockerfile_name: &str,
        tag: &str,
    ) -> Result<BuildOutcome, EngineError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.tags_seen.lock().unwrap().push(tag.to_string());
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BuildOutcome::Success { log: vec![] }))
    }
}

/// Builder that fails every attempt with the same error.
struct AlwaysFailingBuilder {
    error: String,
    builds: AtomicU32,
}

impl AlwaysFailingBuilder {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            builds: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ImageBuilder for AlwaysFailingBuilder {
    async fn build(
        &self,
        _context_dir: &Path,
        _dockerfile_name: &str,
        _tag: &str,
    ) -> Result<BuildOutcome, EngineError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(BuildOutcome::Failure {
            log: vec![self.error.clone()],
            error: self.error.clone(),
        })
    }
}

/// Runner that replays scripted outputs; `Err` strings become engine errors.
struct ScriptedRunner {
    outputs: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedRunner {
    fn with_output(output: &str) -> Self {
        Self {
            outputs: Mutex::new(VecDeque::from([Ok(output.to_string())])),
        }
    }

    fn failing(error: &str) -> Self {
        Self {
            outputs: Mutex::new(VecDeque::from([Err(error.to_string())])),
        }
    }
}

#[async_trait]
impl ContainerRunner for ScriptedRunner {
    async fn run(&self, _tag: &str) -> Result<String, EngineError> {
        match self.outputs.lock().unwrap().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(error)) => Err(EngineError::Api(error)),
            None => Ok(String::new()),
        }
    }
}

/// Fixer that replays scripted responses and counts calls.
#[derive(Default)]
struct ScriptedFixer {
    responses: Mutex<VecDeque<Option<String>>>,
    calls: AtomicU32,
}

impl ScriptedFixer {
    fn returning(responses: Vec<Option<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn unavailable() -> Self {
        Self::returning(vec![None])
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DockerfileFixer for ScriptedFixer {
    async fn repair(&self, _dockerfile: &str, _error_log: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().unwrap().pop_front().flatten()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn test_config(versions: &[&str], max_retries: u32, results_path: PathBuf) -> ReprodockConfig {
    let mut config = ReprodockConfig::default();
    config.base_image = "ubuntu".to_string();
    config.versions = versions.iter().map(|v| v.to_string()).collect();
    config.max_repair_retries = max_retries;
    config.retry_delay = Duration::ZERO;
    config.results_path = results_path;
    config.implicit_pass = true;
    config
}

fn write_artifact(root: &Path, id: &str, dockerfile: &str) {
    let dir = root.join(id);
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(dir.join("Dockerfile"), dockerfile).unwrap();
}

fn read_rows(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn repair_then_success_records_test_results() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path(), "A1", BASE_DOCKERFILE);
    let results = tmp.path().join("results.csv");

    let builder = ScriptedBuilder::failing_once("missing pkg");
    let runner = ScriptedRunner::with_output("Tests Passed: 3\nTests Failed: 0\n");
    let fixer = ScriptedFixer::returning(vec![Some(
        "FROM ubuntu:20.04\nRUN apt-get install -y pkg\nRUN ./build.sh\n".to_string(),
    )]);
    let config = test_config(&["20.04"], 3, results.clone());

    let orchestrator = BuildRepairOrchestrator::new(&builder, &runner, &fixer, &config);
    let ids = catalog::resolve(tmp.path(), Some("A1")).unwrap();
    let summary = orchestrator
        .run_matrix(tmp.path(), &ids, &OutcomeSink::new(&results))
        .await;

    assert_eq!(summary.records_written, 1);
    assert_eq!(fixer.call_count(), 1);
    assert_eq!(builder.build_count(), 2);

    let rows = read_rows(&results);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], "1,A1,18.04,20.04,3,0,100.00,,");

    // Both variants and both bounded logs were persisted for audit.
    let dir = tmp.path().join("A1");
    assert!(dir.join("Dockerfile_20.04").exists());
    assert!(dir.join("Dockerfile_20.04_fixed_1").exists());
    assert!(dir.join("build_log_2004.txt").exists());
    assert!(dir.join("build_log_2004_fixed_1.txt").exists());

    // The original variant was retargeted; the repaired one replaced it.
    let original = std::fs::read_to_string(dir.join("Dockerfile_20.04")).unwrap();
    assert!(original.starts_with("FROM ubuntu:20.04"));
    let fixed = std::fs::read_to_string(dir.join("Dockerfile_20.04_fixed_1")).unwrap();
    assert!(fixed.contains("apt-get install -y pkg"));
}

#[tokio::test]
async fn repair_unavailable_short_circuits_remaining_retries() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path(), "A1", BASE_DOCKERFILE);
    let results = tmp.path().join("results.csv");

    let builder = ScriptedBuilder::failing_once("missing pkg");
    let runner = ScriptedRunner::with_output("");
    let fixer = ScriptedFixer::unavailable();
    let config = test_config(&["20.04"], 3, results.clone());

    let orchestrator = BuildRepairOrchestrator::new(&builder, &runner, &fixer, &config);
    let ids = vec!["A1".to_string()];
    orchestrator
        .run_matrix(tmp.path(), &ids, &OutcomeSink::new(&results))
        .await;

    // Exactly one repair call despite max_retries = 3, and only one build.
    assert_eq!(fixer.call_count(), 1);
    assert_eq!(builder.build_count(), 1);

    let rows = read_rows(&results);
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[1],
        "1,A1,18.04,20.04,0,0,0.00,missing pkg,\"Attempted fixes via repair service, 1 attempt(s)\""
    );
}

#[tokio::test]
async fn marker_free_output_counts_as_implicit_pass() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path(), "A1", BASE_DOCKERFILE);
    let results = tmp.path().join("results.csv");

    let builder = ScriptedBuilder::default();
    let runner = ScriptedRunner::with_output("experiment completed, see above\n");
    let fixer = ScriptedFixer::default();
    let config = test_config(&["20.04"], 3, results.clone());

    let orchestrator = BuildRepairOrchestrator::new(&builder, &runner, &fixer, &config);
    orchestrator
        .run_matrix(tmp.path(), &["A1".to_string()], &OutcomeSink::new(&results))
        .await;

    let rows = read_rows(&results);
    assert_eq!(rows[1], "1,A1,18.04,20.04,1,0,100.00,,");
    assert_eq!(fixer.call_count(), 0);
}

#[tokio::test]
async fn retry_ceiling_bounds_repair_calls() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path(), "A1", BASE_DOCKERFILE);
    let results = tmp.path().join("results.csv");

    let builder = AlwaysFailingBuilder::new("E: unmet dependencies");
    let runner = ScriptedRunner::with_output("");
    let fixer = ScriptedFixer::returning(vec![
        Some("FROM ubuntu:20.04\nRUN fix-1\n".to_string()),
        Some("FROM ubuntu:20.04\nRUN fix-2\n".to_string()),
        Some("FROM ubuntu:20.04\nRUN fix-3\n".to_string()),
    ]);
    let config = test_config(&["20.04"], 2, results.clone());

    let orchestrator = BuildRepairOrchestrator::new(&builder, &runner, &fixer, &config);
    orchestrator
        .run_matrix(tmp.path(), &["A1".to_string()], &OutcomeSink::new(&results))
        .await;

    // Original build plus one rebuild per repair attempt, capped at 2.
    assert_eq!(fixer.call_count(), 2);
    assert_eq!(builder.builds.load(Ordering::SeqCst), 3);

    let rows = read_rows(&results);
    assert_eq!(
        rows[1],
        "1,A1,18.04,20.04,0,0,0.00,E: unmet dependencies,\
         \"Attempted fixes via repair service, 2 attempt(s)\""
    );
}

#[tokio::test]
async fn image_tag_is_stable_across_repair_attempts() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path(), "Rosu S12", BASE_DOCKERFILE);
    let results = tmp.path().join("results.csv");

    let builder = ScriptedBuilder::failing_once("boom");
    let runner = ScriptedRunner::with_output("Tests Passed: 1\n");
    let fixer = ScriptedFixer::returning(vec![Some("FROM ubuntu:20.04\nRUN ok\n".to_string())]);
    let config = test_config(&["20.04"], 3, results.clone());

    let orchestrator = BuildRepairOrchestrator::new(&builder, &runner, &fixer, &config);
    orchestrator
        .run_matrix(tmp.path(), &["Rosu S12".to_string()], &OutcomeSink::new(&results))
        .await;

    let tags = builder.tags();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0], "rosu_s12:2004");
    assert_eq!(tags[0], tags[1]);
}

#[tokio::test]
async fn sequence_numbers_increase_and_bad_artifacts_emit_nothing() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path(), "A1", BASE_DOCKERFILE);
    // No extractable base version: the whole matrix is skipped for B2.
    write_artifact(tmp.path(), "B2", "FROM scratch\nRUN true\n");
    write_artifact(tmp.path(), "C3", BASE_DOCKERFILE);
    let results = tmp.path().join("results.csv");

    let builder = ScriptedBuilder::default();
    let runner = ScriptedRunner {
        outputs: Mutex::new(VecDeque::from([
            Ok("Tests Passed: 1".to_string()),
            Ok("Tests Passed: 1".to_string()),
            Ok("Tests Passed: 1".to_string()),
            Ok("Tests Passed: 1".to_string()),
        ])),
    };
    let fixer = ScriptedFixer::default();
    let config = test_config(&["20.04", "22.04"], 3, results.clone());

    let orchestrator = BuildRepairOrchestrator::new(&builder, &runner, &fixer, &config);
    let ids = catalog::resolve(tmp.path(), None).unwrap();
    let summary = orchestrator
        .run_matrix(tmp.path(), &ids, &OutcomeSink::new(&results))
        .await;

    assert_eq!(summary.artifacts_processed, 2);
    assert_eq!(summary.artifacts_skipped, 1);
    assert_eq!(summary.records_written, 4);

    let rows = read_rows(&results);
    assert_eq!(rows.len(), 5);
    let seqs: Vec<u64> = rows[1..]
        .iter()
        .map(|row| row.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
    assert!(rows[1..].iter().all(|row| !row.contains("B2")));
}

#[tokio::test]
async fn run_failure_is_recorded_with_zero_counts() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path(), "A1", BASE_DOCKERFILE);
    let results = tmp.path().join("results.csv");

    let builder = ScriptedBuilder::default();
    let runner = ScriptedRunner::failing("container exploded");
    let fixer = ScriptedFixer::default();
    let config = test_config(&["20.04"], 3, results.clone());

    let orchestrator = BuildRepairOrchestrator::new(&builder, &runner, &fixer, &config);
    orchestrator
        .run_matrix(tmp.path(), &["A1".to_string()], &OutcomeSink::new(&results))
        .await;

    let rows = read_rows(&results);
    assert_eq!(rows.len(), 2);
    let row = &rows[1];
    assert!(row.starts_with("1,A1,18.04,20.04,0,0,0.00,"));
    assert!(row.contains("container exploded"));
    // A run failure carries no repair note.
    assert!(row.ends_with(','));
}
