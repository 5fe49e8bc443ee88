use crate::convert::{worker, ConfirmMissingColumns, Converter, ProgressEvent, RunReport, RunState};
use crate::core::formula;
use crate::error::{ConvertError, ConvertResult};
use crate::profile::{load_profile, load_profile_dir};
use crate::types::{display_name, ConversionResult, ConversionStatus, OutputFormat, Profile};
use crate::writer::csv::TextEncoding;
use clap::ValueEnum;
use colored::Colorize;
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// What to do when mapped columns are missing from a source header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OnMissing {
    /// Prompt on the terminal
    #[default]
    Ask,
    /// Convert without the missing columns
    Continue,
    /// Skip the file
    Abort,
}

/// Output format override
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Csv,
    Xlsx,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Xlsx => OutputFormat::Xlsx,
        }
    }
}

/// Arguments of the convert command
#[derive(Debug, Clone)]
pub struct ConvertArgs {
    pub files: Vec<PathBuf>,
    /// Profile file path, or a profile name looked up in `profile_dir`
    pub profile: String,
    pub profile_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub merge: bool,
    pub format: Option<FormatArg>,
    pub on_missing: OnMissing,
    pub verbose: bool,
}

/// Find a profile by file path, falling back to a `profileName` lookup
pub fn resolve_profile(spec: &str, profile_dir: &Path) -> ConvertResult<Profile> {
    let path = Path::new(spec);
    if path.is_file() {
        return load_profile(path);
    }

    let found = load_profile_dir(profile_dir)?;
    found.find(spec).cloned().ok_or_else(|| {
        ConvertError::Profile(format!(
            "Profile '{}' not found (not a file, and no profile with that name in {})",
            spec,
            profile_dir.display()
        ))
    })
}

/// Execute the convert command
pub fn convert(args: ConvertArgs) -> ConvertResult<RunReport> {
    let mut profile = resolve_profile(&args.profile, &args.profile_dir)?;
    if let Some(format) = args.format {
        profile = profile.with_output_format(format.into());
    }

    println!("{}", "🔄 Tabular - Converting files".bold().green());
    println!("   Profile: {}", profile.profile_name.bright_blue().bold());
    println!("   Files:   {}", args.files.len());
    println!("   Format:  {}", profile.options.output_format.name());
    if args.merge && args.files.len() > 1 {
        println!("   Mode:    {}", "merge".cyan());
    }
    if let Some(dir) = &args.output_dir {
        println!("   Output:  {}", dir.display());
    }
    println!();

    let mut converter = Converter::new(profile);
    if let Some(dir) = args.output_dir {
        converter = converter.with_output_dir(dir);
    }

    let handle = worker::spawn(converter, args.files, args.merge)?;
    let verbose = args.verbose;
    let mut progress = |event: ProgressEvent| print_event(&event, verbose);
    let mut confirm = TerminalConfirm(args.on_missing);
    let report = handle.wait_with(&mut progress, &mut confirm)?;

    print_report(&report);
    Ok(report)
}

fn print_event(event: &ProgressEvent, verbose: bool) {
    match event {
        ProgressEvent::FileStart { index, total, file } => {
            println!(
                "📄 [{}/{}] {}",
                index,
                total,
                display_name(file).bright_blue()
            );
        }
        ProgressEvent::Progress { rows, .. } => {
            if verbose {
                println!("   {} rows written...", rows);
            }
        }
        ProgressEvent::FileComplete { result, .. } => print_file_result(result),
        ProgressEvent::Error { message } => {
            if verbose {
                println!("   {} {}", "⚠️".yellow(), message.yellow());
            }
        }
        ProgressEvent::AllComplete { .. } => {}
    }
}

fn print_file_result(result: &ConversionResult) {
    match result.status {
        ConversionStatus::Success => println!(
            "   {} {} rows written ({} duplicates, {} empty) in {}",
            "✅".green(),
            result.output_rows,
            result.duplicate_rows,
            result.empty_rows,
            result.duration_text()
        ),
        ConversionStatus::Failed => println!(
            "   {} {}",
            "❌".red(),
            result.error_message.as_deref().unwrap_or("failed").red()
        ),
        ConversionStatus::Cancelled => println!("   {} cancelled", "⚠️".yellow()),
    }
}

fn print_report(report: &RunReport) {
    println!();
    match report.state {
        RunState::Completed => println!("{}", "✅ Conversion complete".bold().green()),
        RunState::Cancelled => println!("{}", "⚠️  Conversion cancelled".bold().yellow()),
        RunState::Failed => println!("{}", "❌ Conversion finished with errors".bold().red()),
    }
    for line in report.summary().to_string().lines() {
        println!("   {}", line);
    }

    let outputs: Vec<&PathBuf> = report
        .results
        .iter()
        .filter(|r| r.is_success())
        .filter_map(|r| r.output_file.as_ref())
        .collect();
    if !outputs.is_empty() {
        println!();
        for path in outputs {
            println!("   📁 {}", path.display());
        }
    }
}

/// Answers missing-column prompts according to `--on-missing`
struct TerminalConfirm(OnMissing);

impl ConfirmMissingColumns for TerminalConfirm {
    fn confirm(&mut self, file_name: &str, missing: &[String]) -> bool {
        println!(
            "   {} {} is missing mapped columns: {}",
            "⚠️".yellow(),
            file_name.bright_blue(),
            missing.join(", ").yellow()
        );
        match self.0 {
            OnMissing::Continue => true,
            OnMissing::Abort => false,
            OnMissing::Ask => {
                print!("   Continue without them? [y/N] ");
                let _ = io::stdout().flush();
                read_answer(&mut io::stdin().lock())
            }
        }
    }
}

/// `true` for a line starting with y/Y; end of input means no
fn read_answer(input: &mut dyn BufRead) -> bool {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
    }
}

/// Execute the profiles command - list every profile in a directory
pub fn profiles(dir: &Path) -> ConvertResult<()> {
    println!("{}", "📚 Tabular - Profiles".bold().green());
    println!("   Directory: {}\n", dir.display());

    let found = load_profile_dir(dir)?;
    if found.loaded.is_empty() && found.rejected.is_empty() {
        println!("{}", "⚠️  No profiles found".yellow());
        return Ok(());
    }

    for (path, profile) in &found.loaded {
        println!(
            "   {} ({})",
            profile.profile_name.bright_blue().bold(),
            display_name(path)
        );
        if !profile.description.is_empty() {
            println!("      {}", profile.description);
        }
        println!(
            "      {} columns, {} calculations → {}",
            profile.columns.len(),
            profile.calculations.len(),
            profile.options.output_format.name()
        );
    }

    if !found.rejected.is_empty() {
        println!();
        for (path, err) in &found.rejected {
            println!("   {} {}: {}", "❌".red(), display_name(path), err);
        }
    }

    println!(
        "\n   {} loaded, {} skipped",
        found.loaded.len(),
        found.rejected.len()
    );
    Ok(())
}

/// Execute the check command - validate formulas and preview the output header
pub fn check(spec: &str, profile_dir: &Path) -> ConvertResult<()> {
    println!("{}", "🔍 Tabular - Checking profile".bold().green());
    let profile = resolve_profile(spec, profile_dir)?;
    println!("   Profile: {}", profile.profile_name.bright_blue().bold());
    if !profile.version.is_empty() {
        println!("   Version: {}", profile.version);
    }
    println!();

    println!("{}", "📋 Output columns:".bold().cyan());
    for (i, name) in profile.output_column_names().iter().enumerate() {
        println!("   {:>3}. {}", i + 1, name);
    }

    let mut problems = Vec::new();

    if let Err(e) = profile.options.delimiter_byte() {
        problems.push(e.to_string());
    }
    if profile.options.output_format == OutputFormat::Csv {
        if let Err(e) = TextEncoding::from_label(&profile.options.output_encoding) {
            problems.push(e.to_string());
        }
    }

    if !profile.calculations.is_empty() {
        println!("\n{}", "🧮 Calculations:".bold().cyan());
        let mut known: HashSet<String> = profile
            .columns
            .iter()
            .flat_map(|c| [c.source.clone(), c.output_name().to_string()])
            .collect();

        for calc in &profile.calculations {
            if formula::validate(&calc.formula) {
                println!(
                    "   {} {} = {}",
                    "✅".green(),
                    calc.new_column.bright_blue(),
                    calc.formula
                );
            } else {
                println!(
                    "   {} {} = {}",
                    "❌".red(),
                    calc.new_column.bright_blue(),
                    calc.formula.red()
                );
                problems.push(format!("Invalid formula for '{}'", calc.new_column));
            }

            for name in formula::extract_column_names(&calc.formula) {
                if !known.contains(&name) {
                    println!(
                        "      {} references unknown column '{}'",
                        "⚠️".yellow(),
                        name
                    );
                }
            }
            known.insert(calc.new_column.clone());
        }
    }

    println!();
    if problems.is_empty() {
        println!("{}", "✅ Profile is valid".bold().green());
        Ok(())
    } else {
        for problem in &problems {
            println!("   {} {}", "❌".red(), problem);
        }
        Err(ConvertError::Profile(format!(
            "{} problem(s) found in profile '{}'",
            problems.len(),
            profile.profile_name
        )))
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
