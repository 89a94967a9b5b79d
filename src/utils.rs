//! General utility functions for cryunpack
//!
//! Path normalisation and glob matching shared by the archive reader and the DataForge
//! file-name search.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::Result;

/// Format a file size in human-readable form (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// Convert an archive path to the forward-slash form used for lookups
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Build a matcher over a union of glob patterns
///
/// `*` and `?` also match `/`, so `*.xml` finds XML files in any directory.
/// Bracket classes such as `[abc]` are supported.
pub fn create_glob_set<S: AsRef<str>>(patterns: &[S], case_insensitive: bool) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&normalize_path(pattern.as_ref()))
            .case_insensitive(case_insensitive)
            .literal_separator(false)
            .build()?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Turn a free-form command line filter into a glob
///
/// Text without wildcards is treated as a substring search.
pub fn filter_to_glob(filter: &str) -> String {
    if filter.contains(['*', '?', '[']) {
        filter.to_string()
    } else {
        format!("*{}*", filter)
    }
}
