//! Dockerfile repair service abstraction
//!
//! After a failed build the orchestrator consults an opaque text-to-text
//! fixer with the failing Dockerfile and its error log. The contract is
//! deliberately forgiving: any transport failure, service-reported error or
//! empty payload degrades to `None`, which the caller interprets as "repair
//! unavailable". Returned content gets only a weak structural check; an
//! invalid Dockerfile is forwarded so the next build failure becomes the
//! real signal.

pub mod huggingface;

use async_trait::async_trait;
use tracing::warn;

pub use huggingface::HuggingFaceFixer;

/// Known preamble the service echoes before the repaired content
const FIXED_DELIMITER: &str = "Fixed Dockerfile:";

/// Trailing explanatory prose starts at one of these markers
const STOP_MARKERS: &[&str] = &["Note:", "Note that"];

/// A text-to-text Dockerfile repair service.
#[async_trait]
pub trait DockerfileFixer: Send + Sync {
    /// Requests a repaired Dockerfile for the failing content and error log.
    ///
    /// `None` means no usable content; this method never errors.
    async fn repair(&self, dockerfile: &str, error_log: &str) -> Option<String>;

    /// Human-readable name of the fixer
    fn name(&self) -> &str;
}

/// Extracts Dockerfile content from the service's free-text response.
///
/// Strips the `Fixed Dockerfile:` preamble if present, truncates trailing
/// prose at the stop markers and trims. Empty results become `None`.
pub fn extract_dockerfile(generated: &str) -> Option<String> {
    let text = generated.trim();
    if text.is_empty() {
        return None;
    }

    let mut fixed = match text.split_once(FIXED_DELIMITER) {
        Some((_, rest)) => rest.trim(),
        None => text,
    };

    for marker in STOP_MARKERS {
        if let Some((content, _)) = fixed.split_once(marker) {
            fixed = content.trim();
        }
    }

    if fixed.is_empty() {
        return None;
    }

    if !fixed.starts_with("FROM ") {
        warn!("Repaired Dockerfile does not start with 'FROM '; forwarding anyway");
    }

    Some(fixed.to_string())
}
