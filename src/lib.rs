//! reprodock - automated reproducibility probing for archived research artifacts
//!
//! Each artifact bundles a Dockerfile describing its runtime environment.
//! reprodock rebuilds that environment across a fixed matrix of base-OS
//! versions, consults an external LLM repair service when a build breaks,
//! runs the resulting image, and records every terminal outcome in an
//! append-only table for downstream analysis.
//!
//! # Core Concepts
//!
//! - **Artifact**: a catalog key plus a base Dockerfile, discovered as one
//!   subdirectory of the probe root
//! - **Variant**: the base Dockerfile with its `FROM` version retargeted,
//!   one per (artifact, version) attempt; repairs chain further variants
//! - **Build-repair loop**: an explicit per-pair state machine with a hard
//!   retry ceiling and short-circuit when the repair service yields nothing
//! - **Outcome record**: one durable CSV row per pair reaching a terminal
//!   state, with strictly increasing sequence numbers
//!
//! The container engine and the repair service are injected as capability
//! traits ([`engine::ImageBuilder`], [`engine::ContainerRunner`],
//! [`repair::DockerfileFixer`]), so the whole orchestration runs
//! deterministically under test without Docker or network access.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod dockerfile;
pub mod engine;
pub mod harness;
pub mod repair;
pub mod results;

pub use catalog::{Artifact, CatalogError};
pub use config::{ConfigError, ReprodockConfig};
pub use engine::{BuildOutcome, ContainerRunner, DockerEngine, EngineError, ImageBuilder};
pub use harness::{BuildRepairOrchestrator, MatrixSummary, PairOutcome, Resolution};
pub use repair::{DockerfileFixer, HuggingFaceFixer};
pub use results::{OutcomeRecord, OutcomeSink, TestSummary};

/// Crate version, from Cargo metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
