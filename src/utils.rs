//! General utility functions for rcx
//!
//! This module contains common helper functions used across the library.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};

/// Format a byte count in human-readable form (B, KB, MB, GB)
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

/// Format an offset the way members are listed (`0x0010`)
pub fn format_offset(offset: u64) -> String {
    format!("{:#06X}", offset)
}

/// Parse an address given as `0x`-prefixed hex, or as plain hex digits
pub fn parse_address(text: &str) -> Result<u64> {
    let t = text.trim().replace(['_', '`'], "");
    let digits = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(&t);
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid address: {}", text))
}

/// Create a case-insensitive glob matcher for type and field names
///
/// Plain text without wildcards becomes `*text*` (substring search).
pub fn create_glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if !pattern.contains('*') && !pattern.contains('?') {
        format!("*{}*", pattern)
    } else {
        pattern.to_string()
    };

    let glob = GlobBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("Invalid pattern: {}", pattern))?;
    Ok(glob.compile_matcher())
}

/// Check if a name matches the optional filter
pub fn matches_filter(name: &str, matcher: Option<&GlobMatcher>) -> bool {
    match matcher {
        Some(m) => m.is_match(name),
        None => true,
    }
}
