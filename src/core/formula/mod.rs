//! Per-row formula engine
//!
//! A formula is either one of the text-extraction functions
//! (`LEFT`, `RIGHT`, `SUBSTR`/`MID`) applied to a single `${column}`, or an
//! arithmetic expression over `${column}` references. Failures never escape:
//! they are logged and the result is `"0"`.

pub mod evaluator;
pub mod format;
pub mod parser;
pub mod tokenizer;

pub use format::{apply_format, parse_number, render_number};

use crate::types::{Calculation, RowMap};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Value returned when a formula cannot be evaluated
pub const DEFAULT_RESULT: &str = "0";

struct Patterns {
    variable: Regex,
    left: Regex,
    right: Regex,
    substr: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            variable: Regex::new(r"\$\{([^}]+)\}")?,
            left: Regex::new(r"(?i)^LEFT\s*\(\s*\$\{([^}]+)\}\s*,\s*(\d+)\s*\)$")?,
            right: Regex::new(r"(?i)^RIGHT\s*\(\s*\$\{([^}]+)\}\s*,\s*(\d+)\s*\)$")?,
            substr: Regex::new(
                r"(?i)^(?:SUBSTR|MID)\s*\(\s*\$\{([^}]+)\}\s*,\s*(\d+)\s*,\s*(\d+)\s*\)$",
            )?,
        })
    }
}

fn patterns() -> Result<&'static Patterns, String> {
    static PATTERNS: OnceLock<Result<Patterns, String>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| Patterns::compile().map_err(|e| format!("Regex error: {}", e)))
        .as_ref()
        .map_err(Clone::clone)
}

/// Column names referenced as `${name}`, in first-occurrence order, without duplicates
pub fn extract_column_names(formula: &str) -> Vec<String> {
    let Ok(patterns) = patterns() else {
        return Vec::new();
    };
    collect_names(&patterns.variable, formula)
}

fn collect_names(variable: &Regex, formula: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in variable.captures_iter(formula) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Evaluate a calculation against a row, applying its format if any
pub fn evaluate_calculation(calc: &Calculation, row: &RowMap) -> String {
    let raw = evaluate(&calc.formula, row);
    match calc.format.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(fmt) => format_result(&raw, fmt),
        None => raw,
    }
}

/// Evaluate a formula against a row. Never fails; see [`DEFAULT_RESULT`].
pub fn evaluate(formula: &str, row: &RowMap) -> String {
    let trimmed = formula.trim();
    let outcome = patterns().and_then(|p| match evaluate_text_function(p, trimmed, row) {
        Some(text) => Ok(text),
        None => evaluate_arithmetic(p, trimmed, row).map(render_number),
    });

    match outcome {
        Ok(result) => result,
        Err(message) => {
            warn!(formula = %formula, error = %message, "formula evaluation failed");
            DEFAULT_RESULT.to_string()
        }
    }
}

/// Check that a formula can be evaluated, with every reference bound to 1
pub fn validate(formula: &str) -> bool {
    let trimmed = formula.trim();
    if trimmed.is_empty() {
        return false;
    }
    let Ok(p) = patterns() else {
        return false;
    };
    if p.left.is_match(trimmed) || p.right.is_match(trimmed) || p.substr.is_match(trimmed) {
        return true;
    }
    let probe: RowMap = collect_names(&p.variable, trimmed)
        .into_iter()
        .map(|name| (name, "1".to_string()))
        .collect();
    evaluate_arithmetic(p, trimmed, &probe).is_ok()
}

/// Apply a printf-style format to a numeric result; other text is returned as is.
pub fn format_result(raw: &str, fmt: &str) -> String {
    let Ok(value) = raw.trim().parse::<f64>() else {
        return raw.to_string();
    };
    match apply_format(fmt, value) {
        Ok(formatted) => formatted,
        Err(e) => {
            warn!(format = %fmt, error = %e, "ignoring unusable number format");
            raw.to_string()
        }
    }
}

fn evaluate_text_function(p: &Patterns, formula: &str, row: &RowMap) -> Option<String> {
    fn column<'r>(caps: &Captures<'_>, row: &'r RowMap) -> &'r str {
        row.get(&caps[1]).map(String::as_str).unwrap_or("")
    }
    fn count(caps: &Captures<'_>, group: usize) -> usize {
        caps[group].parse().unwrap_or(usize::MAX)
    }

    if let Some(caps) = p.left.captures(formula) {
        let n = count(&caps, 2);
        return Some(column(&caps, row).chars().take(n).collect());
    }

    if let Some(caps) = p.right.captures(formula) {
        let chars: Vec<char> = column(&caps, row).chars().collect();
        let n = count(&caps, 2).min(chars.len());
        return Some(chars[chars.len() - n..].iter().collect());
    }

    if let Some(caps) = p.substr.captures(formula) {
        let start = count(&caps, 2);
        let len = count(&caps, 3);
        return Some(column(&caps, row).chars().skip(start).take(len).collect());
    }

    None
}

/// Substitute `${name}` references with `v0, v1, ...` and evaluate
fn evaluate_arithmetic(p: &Patterns, formula: &str, row: &RowMap) -> Result<f64, String> {
    let names = collect_names(&p.variable, formula);
    let mut vars = HashMap::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let value = row.get(name).map(|v| parse_number(v)).unwrap_or(0.0);
        vars.insert(format!("v{}", i), value);
    }

    let expression = p.variable.replace_all(formula, |caps: &Captures<'_>| {
        let index = names.iter().position(|n| n == &caps[1]).unwrap_or(0);
        format!("v{}", index)
    });

    let tokens = tokenizer::tokenize(&expression).map_err(|e| e.to_string())?;
    let expr = parser::parse(tokens).map_err(|e| e.to_string())?;
    evaluator::evaluate(&expr, &vars).map_err(|e| e.to_string())
}
