//! Profile store: load, validate and save conversion profiles as JSON
//!
//! Profiles are checked against the embedded JSON Schema before being
//! deserialized, so structural mistakes are reported with a path instead of a
//! serde message. Unknown fields are accepted and ignored.

use crate::error::{ConvertError, ConvertResult};
use crate::types::Profile;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Profiles found in a directory
#[derive(Debug, Default)]
pub struct ProfileDir {
    /// Successfully loaded profiles, sorted by file name
    pub loaded: Vec<(PathBuf, Profile)>,
    /// Files that could not be loaded
    pub rejected: Vec<(PathBuf, ConvertError)>,
}

impl ProfileDir {
    /// Find a loaded profile by its `profileName`
    pub fn find(&self, name: &str) -> Option<&Profile> {
        self.loaded
            .iter()
            .map(|(_, p)| p)
            .find(|p| p.profile_name == name)
    }
}

/// Load one profile from a JSON file
pub fn load_profile(path: &Path) -> ConvertResult<Profile> {
    let content = fs::read_to_string(path).map_err(|e| {
        ConvertError::Profile(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_profile(&content)
        .map_err(|e| ConvertError::Profile(format!("{}: {}", path.display(), e)))
}

/// Parse and validate a profile document
pub fn parse_profile(content: &str) -> ConvertResult<Profile> {
    let json: Value = serde_json::from_str(content)?;
    validate_against_schema(&json)?;
    let mut profile: Profile = serde_json::from_value(json)?;
    for mapping in &mut profile.columns {
        mapping.source = mapping.source.trim().to_string();
    }
    Ok(profile)
}

/// Load every `*.json` profile in a directory.
///
/// A missing directory yields an empty set. Files that fail to load are
/// collected in [`ProfileDir::rejected`] instead of failing the whole scan.
pub fn load_profile_dir(dir: &Path) -> ConvertResult<ProfileDir> {
    let mut found = ProfileDir::default();
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "profile directory does not exist");
        return Ok(found);
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("json"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    for path in paths {
        match load_profile(&path) {
            Ok(profile) => {
                debug!(profile = %profile.profile_name, "loaded profile");
                found.loaded.push((path, profile));
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable profile");
                found.rejected.push((path, e));
            }
        }
    }

    Ok(found)
}

/// Write a profile as pretty-printed JSON, creating parent directories
pub fn save_profile(profile: &Profile, path: &Path) -> ConvertResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(profile)?;
    fs::write(path, json).map_err(|e| {
        ConvertError::Profile(format!("Failed to write {}: {}", path.display(), e))
    })
}

/// Validate a profile document against the embedded JSON Schema
fn validate_against_schema(json: &Value) -> ConvertResult<()> {
    let schema_str = include_str!("../schema/profile.schema.json");
    let schema_value: Value = serde_json::from_str(schema_str)
        .map_err(|e| ConvertError::Profile(format!("Failed to parse schema: {}", e)))?;

    let compiled_schema = JSONSchema::compile(&schema_value)
        .map_err(|e| ConvertError::Profile(format!("Failed to compile schema: {}", e)))?;

    if let Err(errors) = compiled_schema.validate(json) {
        let error_messages: Vec<String> = errors
            .map(|e| format!("  - {} (at {})", e, e.instance_path))
            .collect();
        return Err(ConvertError::Profile(format!(
            "Schema validation failed:\n{}",
            error_messages.join("\n")
        )));
    }

    Ok(())
}
