// drg - alliance roster tracker (CLI)

mod exit_codes;
mod import;
mod members;
mod stats;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use drg_config::Settings;
use drg_io::SqliteStore;
use drg_recon::error::ConfigError;
use drg_recon::{ImportMode, ReconcileError, StoreError, ValidationError};

use exit_codes::{reconcile_exit_code, store_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "drg")]
#[command(about = "Track alliance members' rank, level and power across weekly imports")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Roster database (default: from settings, else <data dir>/drg/roster.db)
    #[arg(long, global = true, env = "DRG_DB")]
    db: Option<PathBuf>,

    /// Settings file (default: <config dir>/drg/settings.toml)
    #[arg(long, global = true, env = "DRG_CONFIG")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the roster database
    Init,

    /// Reconcile a weekly snapshot file into the roster
    #[command(after_help = "\
File format: key,name,rank,level,power (rank R1..R5).

Examples:
  drg import week12.csv
  drg import week12.csv --mode authoritative --header
  drg import week12.csv --record-changes --json")]
    Import {
        /// Snapshot CSV file
        file: PathBuf,

        /// merge keeps members absent from the file; authoritative deletes them
        #[arg(long)]
        mode: Option<ModeArg>,

        /// First line is a header
        #[arg(long, conflicts_with = "no_header")]
        header: bool,

        /// First line is data
        #[arg(long)]
        no_header: bool,

        /// Append a change log entry for every updated member
        #[arg(long)]
        record_changes: bool,

        /// Print the reconciliation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the roster (rank, then power, descending)
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show one member
    Show {
        key: String,

        #[arg(long)]
        json: bool,
    },

    /// Add a member by hand
    #[command(after_help = "\
Examples:
  drg add m42 \"Ada\" R2 14 1250000")]
    Add {
        key: String,
        name: String,
        rank: String,
        level: String,
        power: String,
    },

    /// Change a member's name, rank or current values
    #[command(after_help = "\
Examples:
  drg edit m42 --rank R3
  drg edit m42 --level 15 --power 1300000 --record-changes")]
    Edit {
        key: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        rank: Option<String>,

        #[arg(long)]
        level: Option<String>,

        #[arg(long)]
        power: Option<String>,

        /// Append a change log entry if anything changed
        #[arg(long)]
        record_changes: bool,
    },

    /// Remove a member and its change history
    Remove { key: String },

    /// Power and progress rankings
    Stats {
        /// Entries per view (default: from settings, else 5)
        #[arg(short = 'n', long = "top")]
        top: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Change log of one member, oldest first
    History {
        key: String,

        #[arg(long)]
        json: bool,
    },

    /// Write the roster as an importable CSV
    Export {
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Merge,
    Authoritative,
}

impl From<ModeArg> for ImportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Merge => ImportMode::Merge,
            ModeArg::Authoritative => ImportMode::Authoritative,
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn store(err: StoreError) -> Self {
        let hint = match &err {
            StoreError::Unavailable(msg) if msg.contains("not initialised") => {
                Some("run `drg init` to create the roster database".to_string())
            }
            _ => None,
        };
        Self { code: store_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn reconcile(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Store(e) => Self::store(e),
            other => Self::new(reconcile_exit_code(&other), other.to_string()),
        }
    }

    pub fn config(err: ConfigError) -> Self {
        Self::new(EXIT_CONFIG, err.to_string())
    }

    pub fn invalid(err: ValidationError) -> Self {
        Self::usage(err.to_string())
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Resolved settings plus the database path after CLI overrides.
pub struct Context {
    pub settings: Settings,
    pub db_path: PathBuf,
}

impl Context {
    fn resolve(config: Option<PathBuf>, db: Option<PathBuf>) -> Result<Self, CliError> {
        let config_path = config.unwrap_or_else(Settings::config_path);
        let settings = Settings::load_from(&config_path)
            .map_err(|e| CliError::config(e).with_hint(format!("check {}", config_path.display())))?;
        let db_path = db.unwrap_or_else(|| settings.database_path());
        Ok(Self { settings, db_path })
    }

    /// Open the initialised roster database.
    pub fn open_store(&self) -> Result<SqliteStore, CliError> {
        log::debug!("roster database: {}", self.db_path.display());
        SqliteStore::open(&self.db_path).map_err(CliError::store)
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("DRG_GIT_HASH"), ")",
        "\ntarget:  ", env!("DRG_TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    // stdout carries command output (and --json), so logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = Context::resolve(cli.config, cli.db)?;

    match cli.command {
        Commands::Init => cmd_init(&ctx),
        Commands::Import { file, mode, header, no_header, record_changes, json } => {
            let has_header = if header {
                Some(true)
            } else if no_header {
                Some(false)
            } else {
                None
            };
            import::cmd_import(
                &ctx,
                import::ImportArgs {
                    file,
                    mode: mode.map(ImportMode::from),
                    has_header,
                    record_changes,
                    json,
                },
            )
        }
        Commands::List { json } => members::cmd_list(&ctx, json),
        Commands::Show { key, json } => members::cmd_show(&ctx, &key, json),
        Commands::Add { key, name, rank, level, power } => {
            members::cmd_add(&ctx, &key, &name, &rank, &level, &power)
        }
        Commands::Edit { key, name, rank, level, power, record_changes } => members::cmd_edit(
            &ctx,
            &key,
            members::EditArgs { name, rank, level, power, record_changes },
        ),
        Commands::Remove { key } => members::cmd_remove(&ctx, &key),
        Commands::Stats { top, json } => stats::cmd_stats(&ctx, top, json),
        Commands::History { key, json } => members::cmd_history(&ctx, &key, json),
        Commands::Export { output } => members::cmd_export(&ctx, output),
    }
}

fn cmd_init(ctx: &Context) -> Result<(), CliError> {
    SqliteStore::create(&ctx.db_path).map_err(CliError::store)?;
    println!("roster database ready at {}", ctx.db_path.display());
    Ok(())
}

/// Serialize to pretty JSON on stdout.
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
