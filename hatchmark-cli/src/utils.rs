//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hatchmark_core::MatchPolicy;
use tracing_subscriber::EnvFilter;

/// Default journal location when neither `--ledger` nor the environment
/// override is set.
const DEFAULT_LEDGER_PATH: &str = "hatchmark-ledger.jsonl";

/// Initialize tracing from `RUST_LOG`, defaulting to warnings only so normal
/// command output stays clean.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the ledger path: flag, then `HATCHMARK_LEDGER`, then the default.
pub fn resolve_ledger_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("HATCHMARK_LEDGER").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH))
}

/// Resolve the similarity threshold: flag, then `HATCHMARK_MATCH_THRESHOLD`,
/// then the built-in default.
pub fn resolve_threshold(flag: Option<u32>) -> u32 {
    flag.or_else(|| {
        std::env::var("HATCHMARK_MATCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
    })
    .unwrap_or(MatchPolicy::DEFAULT_MAX_DISTANCE)
}

/// Read a whole file with a path-bearing error message.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Build the watermarked-copy path from the original file path.
///
/// Transforms `art.png` into `art.marked.png`.
pub fn build_marked_path(file: &Path) -> PathBuf {
    match file.extension().and_then(|e| e.to_str()) {
        Some(ext) => file.with_extension(format!("marked.{ext}")),
        None => file.with_extension("marked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_marked_path() {
        assert_eq!(
            build_marked_path(Path::new("image.png")),
            PathBuf::from("image.marked.png")
        );
        assert_eq!(
            build_marked_path(Path::new("photo.jpeg")),
            PathBuf::from("photo.marked.jpeg")
        );
        assert_eq!(
            build_marked_path(Path::new("noext")),
            PathBuf::from("noext.marked")
        );
    }

    #[test]
    fn test_resolve_threshold_flag_wins() {
        assert_eq!(resolve_threshold(Some(12)), 12);
        assert_eq!(resolve_threshold(None), MatchPolicy::DEFAULT_MAX_DISTANCE);
    }
}
