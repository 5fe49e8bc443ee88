use clap::{Parser, Subcommand};
use royalbit_tabular::cli::{self, ConvertArgs, FormatArg, OnMissing};
use royalbit_tabular::convert::RunState;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tabular")]
#[command(about = "Profile-driven CSV/Excel conversion. Select, rename, de-duplicate, calculate.")]
#[command(long_about = "Tabular - profile-driven CSV/Excel conversion
Streaming reads and writes | CSV + XLSX | Per-file or merged output

COMMANDS:
  convert   - Convert files using a profile
  profiles  - List the profiles in a directory
  check     - Validate a profile's formulas and preview its output header

PROFILES:
  A profile is a JSON document that maps source columns to output columns,
  marks the columns forming the duplicate key, and declares calculated
  columns such as \"${qty} * ${unit_price}\" or \"LEFT(${customer}, 3)\".

EXAMPLES:
  tabular convert jan.csv feb.xlsx -p sales-report -o out/
  tabular convert *.csv -p profiles/sales-report.json --merge --format xlsx
  tabular check sales-report
  tabular profiles

LOGGING:
  Set RUST_LOG (e.g. RUST_LOG=royalbit_tabular=debug) for detailed logs on stderr.")]
#[command(version)]
struct Cli {
    /// Show progress details and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Convert one or more CSV/XLSX files using a profile.

Each input produces its own output file unless --merge is given, in which
case every input is appended to one output and duplicate keys are detected
across all of them.

OUTPUT NAMES:
  Taken from the profile's outputFileName. \"{filename}\" is replaced with the
  input's base name. Merged output without a usable name is written as
  merged_<timestamp>.csv (or .xlsx).

MISSING COLUMNS:
  When a source header lacks mapped columns, --on-missing decides:
    ask       prompt on the terminal (default; no answer means skip)
    continue  convert without those columns
    abort     skip the file

Exits with status 1 if any file failed.")]
    /// Convert files using a profile
    Convert {
        /// Input files (.csv or .xlsx)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Profile file, or the profileName of a profile in --profile-dir
        #[arg(short, long)]
        profile: String,

        /// Directory searched when --profile is a name
        #[arg(long, env = "TABULAR_PROFILE_DIR", default_value = "profiles")]
        profile_dir: PathBuf,

        /// Output directory (default: next to each input file)
        #[arg(short, long, env = "TABULAR_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Merge every input into a single output
        #[arg(short, long)]
        merge: bool,

        /// Override the profile's output format
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// What to do when mapped columns are missing
        #[arg(long, value_enum, default_value_t = OnMissing::Ask)]
        on_missing: OnMissing,
    },

    /// List the profiles in a directory
    Profiles {
        /// Profile directory
        #[arg(long, env = "TABULAR_PROFILE_DIR", default_value = "profiles")]
        dir: PathBuf,
    },

    /// Validate a profile's formulas and preview its output header
    Check {
        /// Profile file, or the profileName of a profile in --profile-dir
        profile: String,

        /// Directory searched when PROFILE is a name
        #[arg(long, env = "TABULAR_PROFILE_DIR", default_value = "profiles")]
        profile_dir: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "royalbit_tabular=debug"
    } else {
        "royalbit_tabular=warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert {
            files,
            profile,
            profile_dir,
            output_dir,
            merge,
            format,
            on_missing,
        } => {
            let report = cli::convert(ConvertArgs {
                files,
                profile,
                profile_dir,
                output_dir,
                merge,
                format,
                on_missing,
                verbose: cli.verbose,
            })?;
            if report.state != RunState::Completed {
                std::process::exit(1);
            }
        }

        Commands::Profiles { dir } => cli::profiles(&dir)?,

        Commands::Check {
            profile,
            profile_dir,
        } => cli::check(&profile, &profile_dir)?,
    }

    Ok(())
}
