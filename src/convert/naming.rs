//! Output file names derived from the profile's `outputFileName` pattern

use crate::types::Profile;
use std::path::Path;

/// Placeholder replaced with the input file's base name
pub const FILENAME_PLACEHOLDER: &str = "{filename}";

/// Output file name for one input file in per-file mode.
///
/// `ext` includes the leading dot and always wins over any extension written
/// in the pattern.
pub fn per_file_output_name(input: &Path, profile: &Profile, ext: &str) -> String {
    let base = base_name(input);
    match pattern(profile) {
        Some(pattern) if pattern.contains(FILENAME_PLACEHOLDER) => {
            let stem = strip_pattern_extension(pattern);
            format!("{}{}", stem.replace(FILENAME_PLACEHOLDER, &base), ext)
        }
        Some(_) => format!("{}_{}{}", base, profile.profile_name, ext),
        None => format!("{}{}", base, ext),
    }
}

/// Output file name for a merged batch.
///
/// A literal pattern is used as-is with its extension forced to `ext`; a
/// `{filename}` pattern has no single input to refer to, so it falls back to
/// `merged_<millis><ext>` like an unset pattern.
pub fn merged_output_name(profile: &Profile, ext: &str, epoch_millis: i64) -> String {
    match pattern(profile) {
        Some(pattern) if !pattern.contains(FILENAME_PLACEHOLDER) => {
            if pattern.to_lowercase().ends_with(&ext.to_lowercase()) {
                pattern.to_string()
            } else {
                match pattern.rfind('.') {
                    Some(idx) if idx > 0 => format!("{}{}", &pattern[..idx], ext),
                    _ => format!("{}{}", pattern, ext),
                }
            }
        }
        _ => format!("merged_{}{}", epoch_millis, ext),
    }
}

fn pattern(profile: &Profile) -> Option<&str> {
    profile
        .output_file_name
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

/// Input file name without its last extension
fn base_name(input: &Path) -> String {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name,
    }
}

/// Drop an extension that follows the last placeholder, so dots inside the
/// substituted base name are never mistaken for one
fn strip_pattern_extension(pattern: &str) -> &str {
    let tail_start = pattern
        .rfind(FILENAME_PLACEHOLDER)
        .map(|i| i + FILENAME_PLACEHOLDER.len())
        .unwrap_or(0);
    match pattern[tail_start..].rfind('.') {
        Some(dot) => &pattern[..tail_start + dot],
        None => pattern,
    }
}
