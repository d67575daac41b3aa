//! EA source handling: parameter extraction and instrumentation.

pub mod extract;
pub mod inject;

use std::path::{Path, PathBuf};

/// Sibling path the instrumented copy of an EA source is written to.
/// The original file is never modified.
pub fn instrumented_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ea".to_string());
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mq5".to_string());
    source.with_file_name(format!("{stem}_instrumented.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrumented_sibling_keeps_extension() {
        assert_eq!(
            instrumented_path(Path::new("/work/trend_ea.mq5")),
            PathBuf::from("/work/trend_ea_instrumented.mq5")
        );
    }
}
