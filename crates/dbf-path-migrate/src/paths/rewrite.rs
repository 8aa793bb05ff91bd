//! Old-path to new-path mapping.
//!
//! [`resolve`] re-roots a stored path under the run's target base, keeping
//! everything after the installation anchor. It is pure and idempotent:
//! resolving an already resolved path returns it unchanged, so a batch can
//! be re-run after a partial failure.

use super::{normalize_separators, PathConfig, SEP};

/// Outcome of mapping one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    /// The path contained the anchor and was re-rooted.
    Rewritten(String),
    /// Blank, or no anchor found: the input passes through untouched.
    Unchanged,
}

impl TransformResult {
    /// The new path, or `original` for a pass-through.
    pub fn into_string(self, original: &str) -> String {
        match self {
            TransformResult::Rewritten(path) => path,
            TransformResult::Unchanged => original.to_string(),
        }
    }

    /// Whether the anchor was found.
    pub fn is_rewritten(&self) -> bool {
        matches!(self, TransformResult::Rewritten(_))
    }
}

/// Map `old_path` onto the target base of `config`.
///
/// Returns the input unchanged when it is blank or contains neither the base
/// path nor the anchor token.
pub fn resolve(old_path: &str, config: &PathConfig) -> String {
    transform(old_path, config).into_string(old_path)
}

/// Map `old_path`, reporting whether an anchor was found.
pub fn transform(old_path: &str, config: &PathConfig) -> TransformResult {
    let trimmed = old_path.trim();
    if trimmed.is_empty() {
        return TransformResult::Unchanged;
    }

    let normalized = normalize_separators(trimmed);

    // A path already under the target keeps its suffix as-is.
    let suffix = match config
        .suffix_after_target(&normalized)
        .or_else(|| config.suffix_after_anchor(&normalized))
    {
        Some(suffix) => suffix,
        None => return TransformResult::Unchanged,
    };

    let prefix = normalize_separators(&config.target_prefix());
    TransformResult::Rewritten(compose(&prefix, suffix))
}

fn compose(prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return prefix.to_string();
    }
    normalize_separators(&format!("{}{}{}", prefix, SEP, suffix))
}
