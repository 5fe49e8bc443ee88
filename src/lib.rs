//! Tabular - profile-driven CSV/Excel conversion
//!
//! This library converts delimited-text and spreadsheet files into a new
//! column layout described by a JSON profile: columns are selected and
//! renamed, duplicate rows are dropped by a composite key, and calculated
//! columns are derived per row from small formulas.
//!
//! # Features
//!
//! - Streaming readers and writers (memory does not grow with file size)
//! - CSV input with BOM detection and a legacy code page fallback
//! - Excel (.xlsx) input and constant-memory output
//! - Per-file or merged output, with shared de-duplication when merging
//! - Arithmetic formulas plus `LEFT`, `RIGHT` and `SUBSTR` text functions
//! - Background worker with progress events and cooperative cancellation
//!
//! # Example
//!
//! ```no_run
//! use royalbit_tabular::convert::{AlwaysContinue, Converter, NoProgress};
//! use royalbit_tabular::profile::load_profile;
//! use std::path::{Path, PathBuf};
//!
//! let profile = load_profile(Path::new("profiles/sales-report.json"))?;
//! let converter = Converter::new(profile).with_output_dir("out");
//!
//! let files = vec![PathBuf::from("jan.csv"), PathBuf::from("feb.xlsx")];
//! let report = converter.run(&files, true, &mut NoProgress, &mut AlwaysContinue);
//!
//! println!("{}", report.summary());
//! # Ok::<(), royalbit_tabular::error::ConvertError>(())
//! ```

pub mod cli;
pub mod convert;
pub mod core;
pub mod error;
pub mod profile;
pub mod reader;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use convert::{CancelHandle, Converter, RunReport, RunState};
pub use error::{ConvertError, ConvertResult};
pub use types::{
    Calculation, ColumnMapping, ConversionResult, ConversionStatus, OutputFormat, OutputOptions,
    Profile,
};
