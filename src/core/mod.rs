//! Core evaluation logic

pub mod formula;

pub use formula::{evaluate, evaluate_calculation, extract_column_names, validate};
