//! Profile and result types shared by the readers, writers and the orchestrator

use crate::error::{ConvertError, ConvertResult};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One source row: trimmed header label → cell text
pub type RowMap = HashMap<String, String>;

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE
// ═══════════════════════════════════════════════════════════════════════════

/// Declarative transformation profile driving one conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub profile_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub version: String,
    #[serde(default)]
    pub columns: Vec<ColumnMapping>,
    #[serde(default)]
    pub calculations: Vec<Calculation>,
    #[serde(default)]
    pub options: OutputOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_name: Option<String>,
}

impl Profile {
    /// Create an empty profile with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            profile_name: name.into(),
            ..Default::default()
        }
    }

    /// Copy of this profile writing a different output format.
    pub fn with_output_format(&self, format: OutputFormat) -> Self {
        let mut profile = self.clone();
        profile.options.output_format = format;
        profile
    }

    /// Output header this profile produces when every mapped column is present
    pub fn output_column_names(&self) -> Vec<String> {
        let sources: Vec<String> = self.columns.iter().map(|c| c.source.clone()).collect();
        crate::convert::layout::ColumnLayout::resolve(self, &sources).header
    }

    /// Mapped columns flagged as part of the duplicate key, in declaration order
    pub fn unique_key_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|c| c.unique_key)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Advisory type hint for a mapped column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Date,
}

impl From<String> for ColumnType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "number" => ColumnType::Number,
            "date" => ColumnType::Date,
            _ => ColumnType::String,
        }
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        match value {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
        }
        .to_string()
    }
}

/// Source column → output column mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub unique_key: bool,
}

impl ColumnMapping {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn renamed(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique_key = true;
        self
    }

    /// Output header label; an empty target falls back to the source name
    pub fn output_name(&self) -> &str {
        match self.target.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.source,
        }
    }
}

/// Derived column computed per row from a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Calculation {
    pub new_column: String,
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Calculation {
    pub fn new(new_column: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            new_column: new_column.into(),
            formula: formula.into(),
            ..Default::default()
        }
    }

    pub fn after(mut self, anchor: impl Into<String>) -> Self {
        self.insert_after = Some(anchor.into());
        self
    }

    pub fn formatted(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputFormat {
    #[default]
    Csv,
    Xlsx,
}

impl OutputFormat {
    /// File extension including the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => ".csv",
            OutputFormat::Xlsx => ".xlsx",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Csv => "CSV",
            OutputFormat::Xlsx => "Excel",
        }
    }
}

impl From<String> for OutputFormat {
    fn from(value: String) -> Self {
        OutputFormat::from(value.as_str())
    }
}

impl From<&str> for OutputFormat {
    fn from(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("xlsx") {
            OutputFormat::Xlsx
        } else {
            OutputFormat::Csv
        }
    }
}

impl From<OutputFormat> for String {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
        .to_string()
    }
}

/// Reader and writer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputOptions {
    pub skip_empty_rows: bool,
    pub trim_whitespace: bool,
    pub output_encoding: String,
    pub delimiter: String,
    pub quote_all: bool,
    pub output_format: OutputFormat,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            skip_empty_rows: true,
            trim_whitespace: true,
            output_encoding: "UTF-8-BOM".to_string(),
            delimiter: ",".to_string(),
            quote_all: false,
            output_format: OutputFormat::Csv,
        }
    }
}

impl OutputOptions {
    /// Field delimiter as a single byte. Empty means comma.
    pub fn delimiter_byte(&self) -> ConvertResult<u8> {
        match self.delimiter.chars().next() {
            None => Ok(b','),
            Some(c) if c.is_ascii() => Ok(c as u8),
            Some(c) => Err(ConvertError::Profile(format!(
                "Delimiter must be a single ASCII character, got '{}'",
                c
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONVERSION RESULT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Success,
    Failed,
    Cancelled,
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConversionStatus::Success => "success",
            ConversionStatus::Failed => "failed",
            ConversionStatus::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Row accounting for one result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounters {
    pub input: u64,
    pub output: u64,
    pub duplicate: u64,
    pub empty: u64,
}

impl RowCounters {
    pub fn absorb(&mut self, other: &RowCounters) {
        self.input += other.input;
        self.output += other.output;
        self.duplicate += other.duplicate;
        self.empty += other.empty;
    }
}

/// Finalized outcome of converting one file, or one merged batch
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub input_file: PathBuf,
    pub output_file: Option<PathBuf>,
    pub input_rows: u64,
    pub output_rows: u64,
    pub duplicate_rows: u64,
    pub empty_rows: u64,
    pub status: ConversionStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl ConversionResult {
    /// Begin a result. It can only be finalized once, through [`PendingResult`].
    pub fn start(input_file: impl AsRef<Path>) -> PendingResult {
        PendingResult {
            input_file: input_file.as_ref().to_path_buf(),
            output_file: None,
            started_at: Local::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ConversionStatus::Success
    }

    pub fn file_name(&self) -> String {
        display_name(&self.input_file)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Elapsed time as `12s`, `3m 5s` or `1h 2m`
    pub fn duration_text(&self) -> String {
        let secs = self.duration().num_seconds().max(0);
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        }
    }
}

/// A result still being accumulated
#[derive(Debug)]
pub struct PendingResult {
    input_file: PathBuf,
    output_file: Option<PathBuf>,
    started_at: DateTime<Local>,
}

impl PendingResult {
    pub fn set_output(&mut self, path: impl AsRef<Path>) {
        self.output_file = Some(path.as_ref().to_path_buf());
    }

    pub fn succeed(self, counters: &RowCounters) -> ConversionResult {
        self.finish(counters, ConversionStatus::Success, None)
    }

    pub fn fail(self, counters: &RowCounters, message: impl Into<String>) -> ConversionResult {
        self.finish(counters, ConversionStatus::Failed, Some(message.into()))
    }

    pub fn cancel(self, counters: &RowCounters) -> ConversionResult {
        self.finish(counters, ConversionStatus::Cancelled, None)
    }

    fn finish(
        self,
        counters: &RowCounters,
        status: ConversionStatus,
        error_message: Option<String>,
    ) -> ConversionResult {
        ConversionResult {
            input_file: self.input_file,
            output_file: self.output_file,
            input_rows: counters.input,
            output_rows: counters.output,
            duplicate_rows: counters.duplicate,
            empty_rows: counters.empty,
            status,
            error_message,
            started_at: self.started_at,
            finished_at: Local::now(),
        }
    }
}

/// File name component of a path, for messages
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_defaults_from_minimal_json() {
        let profile: Profile = serde_json::from_str(r#"{"profileName": "p"}"#).unwrap();
        assert_eq!(profile.profile_name, "p");
        assert!(profile.options.skip_empty_rows);
        assert!(profile.options.trim_whitespace);
        assert_eq!(profile.options.output_encoding, "UTF-8-BOM");
        assert_eq!(profile.options.delimiter, ",");
        assert!(!profile.options.quote_all);
        assert_eq!(profile.options.output_format, OutputFormat::Csv);
    }

    #[test]
    fn test_profile_ignores_unknown_fields() {
        let json = r#"{
            "profileName": "sales",
            "author": "someone",
            "columns": [{"source": "Name", "target": "", "type": "weird", "extra": 1}],
            "options": {"outputFormat": "XLSX", "legacy": true}
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.columns[0].output_name(), "Name");
        assert_eq!(profile.columns[0].column_type, ColumnType::String);
        assert_eq!(profile.options.output_format, OutputFormat::Xlsx);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from("xlsx"), OutputFormat::Xlsx);
        assert_eq!(OutputFormat::from(" Xlsx "), OutputFormat::Xlsx);
        assert_eq!(OutputFormat::from("csv"), OutputFormat::Csv);
        assert_eq!(OutputFormat::from("txt"), OutputFormat::Csv);
        assert_eq!(OutputFormat::Xlsx.extension(), ".xlsx");
    }

    #[test]
    fn test_with_output_format_leaves_original() {
        let profile = Profile::new("p");
        let xlsx = profile.with_output_format(OutputFormat::Xlsx);
        assert_eq!(profile.options.output_format, OutputFormat::Csv);
        assert_eq!(xlsx.options.output_format, OutputFormat::Xlsx);
    }

    #[test]
    fn test_output_name_prefers_target() {
        let mapping = ColumnMapping::new("cust_nm").renamed("Customer");
        assert_eq!(mapping.output_name(), "Customer");
        assert_eq!(ColumnMapping::new("id").output_name(), "id");
    }

    #[test]
    fn test_delimiter_byte() {
        let mut options = OutputOptions::default();
        assert_eq!(options.delimiter_byte().unwrap(), b',');
        options.delimiter = "\t".to_string();
        assert_eq!(options.delimiter_byte().unwrap(), b'\t');
        options.delimiter = String::new();
        assert_eq!(options.delimiter_byte().unwrap(), b',');
        options.delimiter = "→".to_string();
        assert!(options.delimiter_byte().is_err());
    }

    #[test]
    fn test_pending_result_finalizes_counts() {
        let counters = RowCounters {
            input: 10,
            output: 7,
            duplicate: 2,
            empty: 1,
        };
        let mut pending = ConversionResult::start("in.csv");
        pending.set_output("out.csv");
        let result = pending.succeed(&counters);
        assert_eq!(result.status, ConversionStatus::Success);
        assert_eq!(result.output_rows, 7);
        assert_eq!(result.output_file, Some(PathBuf::from("out.csv")));
        assert!(result.error_message.is_none());

        let failed = ConversionResult::start("in.csv").fail(&counters, "boom");
        assert_eq!(failed.status, ConversionStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_duration_text() {
        let mut result = ConversionResult::start("a.csv").succeed(&RowCounters::default());
        result.finished_at = result.started_at + chrono::Duration::seconds(12);
        assert_eq!(result.duration_text(), "12s");
        result.finished_at = result.started_at + chrono::Duration::seconds(185);
        assert_eq!(result.duration_text(), "3m 5s");
        result.finished_at = result.started_at + chrono::Duration::seconds(3720);
        assert_eq!(result.duration_text(), "1h 2m");
    }

    #[test]
    fn test_counters_absorb() {
        let mut total = RowCounters::default();
        total.absorb(&RowCounters {
            input: 3,
            output: 2,
            duplicate: 1,
            empty: 0,
        });
        total.absorb(&RowCounters {
            input: 1,
            output: 0,
            duplicate: 0,
            empty: 1,
        });
        assert_eq!(total.input, 4);
        assert_eq!(total.empty, 1);
    }
}
