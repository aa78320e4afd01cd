//! Build-repair orchestration
//!
//! The core of reprodock: for each (artifact, target version) pair, derive a
//! Dockerfile variant, build it, and on failure loop through the external
//! repair service until the build succeeds, the retry ceiling is hit, or the
//! service yields nothing usable. Every terminal state produces exactly one
//! outcome record; every attempt persists its variant and a bounded build
//! log next to the artifact for audit.
//!
//! The retry loop is an explicit tagged state machine rather than ad-hoc
//! flags so the transitions stay exhaustiveness-checked:
//!
//! ```text
//! INIT -> BUILT_ORIGINAL -> { SUCCESS | REPAIRING(k) } -> TERMINAL
//! ```

use crate::catalog::{self, Artifact};
use crate::config::ReprodockConfig;
use crate::dockerfile;
use crate::engine::{BuildOutcome, ContainerRunner, ImageBuilder};
use crate::repair::DockerfileFixer;
use crate::results::{self, OutcomeRecord, OutcomeSink};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Per-pair attempt state. `Repairing(k)` means the k-th repair attempt is
/// about to consult the fixer, `k` in `1..=max_repair_retries`.
enum AttemptState {
    Init,
    BuiltOriginal(BuildOutcome),
    Repairing { attempt: u32, error_log: String },
    Terminal(Resolution),
}

/// Terminal state of the build-repair loop for one pair
#[derive(Debug, Clone)]
pub enum Resolution {
    /// An image exists under the pair's tag
    Success { repair_attempts: u32 },
    /// Retries exhausted; the last build error travels with the state
    Exhausted {
        last_error: String,
        repair_attempts: u32,
    },
    /// The fixer returned nothing usable; remaining retries short-circuit
    RepairUnavailable {
        last_error: String,
        repair_attempts: u32,
    },
}

/// Result fields for one terminal (artifact, version) attempt, before a
/// sequence number is assigned
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub passed: u32,
    pub failed: u32,
    pub pass_percentage: f64,
    pub error_details: String,
    pub repair_note: String,
}

/// Summary of one full matrix run
#[derive(Debug, Default)]
pub struct MatrixSummary {
    pub artifacts_processed: usize,
    pub artifacts_skipped: usize,
    pub records_written: u64,
}

/// Drives the build -> repair -> rebuild loop and the run -> parse -> record
/// sequence. The engine and fixer are injected so the whole machine runs
/// deterministically under test.
pub struct BuildRepairOrchestrator<'a> {
    builder: &'a dyn ImageBuilder,
    runner: &'a dyn ContainerRunner,
    fixer: &'a dyn DockerfileFixer,
    config: &'a ReprodockConfig,
}

impl<'a> BuildRepairOrchestrator<'a> {
    pub fn new(
        builder: &'a dyn ImageBuilder,
        runner: &'a dyn ContainerRunner,
        fixer: &'a dyn DockerfileFixer,
        config: &'a ReprodockConfig,
    ) -> Self {
        Self {
            builder,
            runner,
            fixer,
            config,
        }
    }

    /// Processes the full artifact x version matrix sequentially, appending
    /// one record per terminal state. Failures never cross artifacts.
    pub async fn run_matrix(
        &self,
        root: &Path,
        ids: &[String],
        sink: &OutcomeSink,
    ) -> MatrixSummary {
        let mut summary = MatrixSummary::default();
        let mut seq: u64 = 1;

        for id in ids {
            let artifact = match catalog::load(root, id, &self.config.base_image) {
                Ok(artifact) => artifact,
                Err(e) => {
                    // Missing Dockerfile or unextractable base version skips
                    // the whole version matrix for this artifact.
                    warn!(artifact = %id, "Skipping artifact: {}", e);
                    summary.artifacts_skipped += 1;
                    continue;
                }
            };

            summary.artifacts_processed += 1;

            for version in &self.config.versions {
                info!(artifact = %artifact.id, version = %version, "Processing pair");

                let Some(outcome) = self.probe_pair(&artifact, version).await else {
                    continue;
                };

                let record = OutcomeRecord {
                    seq,
                    artifact: artifact.id.clone(),
                    base_version: artifact.base_version.clone(),
                    target_version: version.clone(),
                    passed: outcome.passed,
                    failed: outcome.failed,
                    pass_percentage: outcome.pass_percentage,
                    error_details: outcome.error_details,
                    repair_note: outcome.repair_note,
                };

                match sink.append(&record) {
                    Ok(()) => {
                        seq += 1;
                        summary.records_written += 1;
                    }
                    Err(e) => error!(artifact = %artifact.id, version = %version, "{}", e),
                }
            }
        }

        summary
    }

    /// Runs one (artifact, version) pair to a terminal state and summarizes
    /// it. `None` means the pair was skipped before any build (empty variant
    /// or unwritable variant file) and no record is due.
    pub async fn probe_pair(&self, artifact: &Artifact, version: &str) -> Option<PairOutcome> {
        let variant = dockerfile::retarget(&artifact.dockerfile, &self.config.base_image, version);
        if variant.trim().is_empty() {
            warn!(
                artifact = %artifact.id,
                version = %version,
                "Derived Dockerfile is empty; skipping version"
            );
            return None;
        }

        let tag = dockerfile::image_tag(&artifact.id, version);
        let resolution = self.resolve_build(artifact, version, &tag, variant).await?;

        Some(match resolution {
            Resolution::Success { .. } => self.run_and_summarize(&tag).await,
            Resolution::Exhausted {
                last_error,
                repair_attempts,
            }
            | Resolution::RepairUnavailable {
                last_error,
                repair_attempts,
            } => {
                warn!(
                    artifact = %artifact.id,
                    version = %version,
                    attempts = repair_attempts,
                    "Build not recoverable"
                );
                PairOutcome {
                    passed: 0,
                    failed: 0,
                    pass_percentage: 0.0,
                    error_details: last_error,
                    repair_note: repair_note(repair_attempts),
                }
            }
        })
    }

    /// The build-repair state machine proper. Returns `None` only when the
    /// original variant file could not be written (nothing was attempted).
    async fn resolve_build(
        &self,
        artifact: &Artifact,
        version: &str,
        tag: &str,
        variant: String,
    ) -> Option<Resolution> {
        // Text of the most recently attempted variant; repair prompts always
        // carry this, not the original.
        let mut current_text = variant;
        let mut last_error = String::new();

        if let Err(e) = self.persist_variant(artifact, version, 0, &current_text) {
            error!(artifact = %artifact.id, version = %version, "Cannot write variant file: {}", e);
            return None;
        }

        let mut state = AttemptState::Init;

        loop {
            state = match state {
                AttemptState::Init => {
                    let outcome = self.build_attempt(artifact, version, tag, 0).await;
                    AttemptState::BuiltOriginal(outcome)
                }

                AttemptState::BuiltOriginal(outcome) => match outcome {
                    BuildOutcome::Success { .. } => {
                        info!(tag = %tag, "Original build succeeded");
                        AttemptState::Terminal(Resolution::Success { repair_attempts: 0 })
                    }
                    BuildOutcome::Failure { log, error } => {
                        last_error = error;
                        if self.config.max_repair_retries == 0 {
                            AttemptState::Terminal(Resolution::Exhausted {
                                last_error: last_error.clone(),
                                repair_attempts: 0,
                            })
                        } else {
                            AttemptState::Repairing {
                                attempt: 1,
                                error_log: self.log_tail_text(&log),
                            }
                        }
                    }
                },

                AttemptState::Repairing { attempt, error_log } => {
                    info!(
                        tag = %tag,
                        attempt,
                        max = self.config.max_repair_retries,
                        "Consulting repair service"
                    );

                    let Some(fixed) = self.fixer.repair(&current_text, &error_log).await else {
                        warn!(tag = %tag, "Repair service returned no usable content");
                        // Short-circuit: remaining retries are not consumed.
                        break Some(Resolution::RepairUnavailable {
                            last_error,
                            repair_attempts: attempt,
                        });
                    };

                    current_text = fixed;

                    if let Err(e) = self.persist_variant(artifact, version, attempt, &current_text)
                    {
                        error!(
                            artifact = %artifact.id,
                            version = %version,
                            "Cannot write repaired variant: {}",
                            e
                        );
                        break Some(Resolution::Exhausted {
                            last_error,
                            repair_attempts: attempt,
                        });
                    }

                    match self.build_attempt(artifact, version, tag, attempt).await {
                        BuildOutcome::Success { .. } => {
                            info!(tag = %tag, attempt, "Build succeeded after repair");
                            AttemptState::Terminal(Resolution::Success {
                                repair_attempts: attempt,
                            })
                        }
                        BuildOutcome::Failure { log, error } => {
                            warn!(tag = %tag, attempt, "Build failed after repair");
                            last_error = error;
                            if attempt < self.config.max_repair_retries {
                                tokio::time::sleep(self.config.retry_delay).await;
                                AttemptState::Repairing {
                                    attempt: attempt + 1,
                                    error_log: self.log_tail_text(&log),
                                }
                            } else {
                                AttemptState::Terminal(Resolution::Exhausted {
                                    last_error: last_error.clone(),
                                    repair_attempts: attempt,
                                })
                            }
                        }
                    }
                }

                AttemptState::Terminal(resolution) => break Some(resolution),
            };
        }
    }

    /// Builds one attempt's variant and persists its bounded log. An engine
    /// error is folded into a build failure: for this pair the build did not
    /// happen, and the error text is the diagnostic.
    async fn build_attempt(
        &self,
        artifact: &Artifact,
        version: &str,
        tag: &str,
        attempt: u32,
    ) -> BuildOutcome {
        let dockerfile_name = dockerfile::variant_file_name(version, attempt);
        let outcome = match self
            .builder
            .build(&artifact.dir, &dockerfile_name, tag)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => BuildOutcome::Failure {
                log: vec![e.to_string()],
                error: e.to_string(),
            },
        };

        let log_name = dockerfile::build_log_file_name(version, attempt);
        let tail = self.log_tail(outcome.log());
        if let Err(e) = fs::write(artifact.dir.join(&log_name), lines_to_text(tail)) {
            // Audit-only artifact; the attempt continues without it.
            warn!(artifact = %artifact.id, log = %log_name, "Cannot write build log: {}", e);
        }

        outcome
    }

    async fn run_and_summarize(&self, tag: &str) -> PairOutcome {
        match self.runner.run(tag).await {
            Ok(output) => {
                let summary = results::parse_test_results(&output, self.config.implicit_pass);
                info!(
                    tag = %tag,
                    passed = summary.passed,
                    failed = summary.failed,
                    "Test results"
                );
                PairOutcome {
                    passed: summary.passed,
                    failed: summary.failed,
                    pass_percentage: summary.pass_percentage,
                    error_details: String::new(),
                    repair_note: String::new(),
                }
            }
            Err(e) => {
                error!(tag = %tag, "Container run failed: {}", e);
                PairOutcome {
                    passed: 0,
                    failed: 0,
                    pass_percentage: 0.0,
                    error_details: e.to_string(),
                    repair_note: String::new(),
                }
            }
        }
    }

    fn persist_variant(
        &self,
        artifact: &Artifact,
        version: &str,
        attempt: u32,
        content: &str,
    ) -> std::io::Result<()> {
        let name = dockerfile::variant_file_name(version, attempt);
        fs::write(artifact.dir.join(&name), content)?;
        info!(artifact = %artifact.id, file = %name, "Wrote Dockerfile variant");
        Ok(())
    }

    fn log_tail<'l>(&self, log: &'l [String]) -> &'l [String] {
        &log[log.len().saturating_sub(self.config.log_tail)..]
    }

    fn log_tail_text(&self, log: &[String]) -> String {
        self.log_tail(log).join("\n")
    }
}

fn repair_note(attempts: u32) -> String {
    format!("Attempted fixes via repair service, {} attempt(s)", attempts)
}

fn lines_to_text(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}
