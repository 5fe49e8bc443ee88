//! CLI command handlers

pub mod commands;

pub use commands::{check, convert, profiles, ConvertArgs, FormatArg, OnMissing};
