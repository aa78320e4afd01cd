//! Dockerfile variant derivation and naming conventions
//!
//! An artifact's base Dockerfile pins one OS version in its `FROM` directive.
//! Probing a target version means rewriting that directive, building under a
//! deterministic image tag, and persisting each derived variant next to the
//! original so failed attempts stay auditable.

use regex::Regex;

/// Extracts the version token from the first `FROM <base_image>:<version>`
/// directive, if any.
pub fn extract_base_version(dockerfile: &str, base_image: &str) -> Option<String> {
    let pattern = from_directive_pattern(base_image);
    pattern
        .captures(dockerfile)
        .map(|caps| caps[1].to_string())
}

/// Rewrites every `FROM <base_image>:<version>` directive to reference the
/// target version. Text without a matching directive is returned unchanged.
pub fn retarget(dockerfile: &str, base_image: &str, version: &str) -> String {
    let pattern = from_directive_pattern(base_image);
    pattern
        .replace_all(dockerfile, format!("FROM {}:{}", base_image, version))
        .into_owned()
}

/// Sanitizes a raw identifier into a valid image repository name:
/// anything outside `[a-zA-Z0-9_.-]` becomes `_`, then lowercased.
pub fn sanitize_image_tag(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Derives the image tag for an (artifact, version) pair.
///
/// The tag is stable across repair attempts so rebuilds overwrite the same
/// image instead of accumulating one per attempt.
pub fn image_tag(artifact: &str, version: &str) -> String {
    format!("{}:{}", sanitize_image_tag(artifact), strip_dots(version))
}

/// File name for the variant written before attempt `k`:
/// `Dockerfile_<version>` for the original, `Dockerfile_<version>_fixed_<k>`
/// for repair attempt k.
pub fn variant_file_name(version: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("Dockerfile_{}", version)
    } else {
        format!("Dockerfile_{}_fixed_{}", version, attempt)
    }
}

/// File name for the bounded build log of attempt `k`.
pub fn build_log_file_name(version: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("build_log_{}.txt", strip_dots(version))
    } else {
        format!("build_log_{}_fixed_{}.txt", strip_dots(version), attempt)
    }
}

fn strip_dots(version: &str) -> String {
    version.replace('.', "")
}

fn from_directive_pattern(base_image: &str) -> Regex {
    // The image name is escaped, so the pattern is always valid.
    Regex::new(&format!(r"FROM\s+{}:(\S+)", regex::escape(base_image))).unwrap()
}
