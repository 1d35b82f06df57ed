use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use firstwatch::cli::{analyze, compare, intel, maintenance, records, ModelArgs};
use firstwatch::config::Config;
use firstwatch::store::AnalysisStore;

#[derive(Parser)]
#[command(name = "firstwatch")]
#[command(about = "Forensic LLM analysis of PLC program files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "firstwatch.yaml")]
    config: String,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a PLC program file from a captured LLM response
    Analyze {
        /// Program file (L5X, AWL, SCL, ...)
        file: PathBuf,
        /// File holding the model's answer to the forensic prompt
        #[arg(long)]
        response: PathBuf,
        /// Store the result
        #[arg(long)]
        save: bool,
        /// Status recorded with a saved result
        #[arg(long, default_value = "complete")]
        status: String,
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Stored analyses
    Analysis {
        #[command(subcommand)]
        command: AnalysisCommands,
    },

    /// Stored baselines
    Baseline {
        #[command(subcommand)]
        command: BaselineCommands,
    },

    /// Compare a stored analysis against a stored baseline
    Compare {
        analysis_id: i64,
        baseline_id: i64,
        /// File holding the model's answer to the comparison prompt
        #[arg(long)]
        response: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Comparison history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// OT threat-intel feed
    Intel {
        #[command(subcommand)]
        command: IntelCommands,
    },

    /// Database maintenance
    Maintenance {
        #[command(subcommand)]
        command: MaintenanceCommands,
    },
}

#[derive(Subcommand)]
enum AnalysisCommands {
    /// List analyses, newest first
    List,
    /// Show one analysis
    Get { id: i64 },
    /// Delete an analysis
    Delete { id: i64 },
    /// Save an analysis payload
    Save {
        file_name: String,
        status: String,
        /// Payload as JSON
        json: String,
        /// Source path of the analysed file
        #[arg(long)]
        path: Option<String>,
    },
}

#[derive(Subcommand)]
enum BaselineCommands {
    /// List baselines, newest first
    List,
    /// Show one baseline
    Get { id: i64 },
    /// Delete a baseline
    Delete { id: i64 },
    /// Save a baseline
    Save {
        file_name: String,
        /// Name of the file when it was captured
        #[arg(long)]
        original_name: Option<String>,
        #[arg(long)]
        path: Option<String>,
        /// Payload as JSON
        #[arg(long)]
        json: Option<String>,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List comparisons, newest first
    List {
        #[arg(long)]
        analysis: Option<i64>,
        #[arg(long)]
        baseline: Option<i64>,
    },
    /// Show one comparison
    Get { id: i64 },
    /// Delete a comparison
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum IntelCommands {
    /// List entries, most recently retrieved first
    List,
    /// Store entries from a captured model answer
    Sync {
        #[arg(long)]
        response: PathBuf,
    },
    /// Time of the most recent sync
    LastSync,
    /// Update the analyst-curated fields of an entry
    Curate {
        id: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        site_relevance: Option<String>,
        #[arg(long)]
        response_notes: Option<String>,
        #[arg(long, default_value = "analyst")]
        user: String,
    },
    /// Delete every entry
    Clear,
}

#[derive(Subcommand)]
enum MaintenanceCommands {
    /// Write each analysis row id into its payload
    BackfillIds,
    /// Show the audit log, newest first
    Audit {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Delete all stored data
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("FIRSTWATCH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    // Load config
    let config = Config::load(&cli.config)?;

    // Initialize store
    let store = AnalysisStore::open(&config.database_path())?;

    match cli.command {
        Commands::Analyze {
            file,
            response,
            save,
            status,
            model,
        } => {
            analyze::run(&store, &config, &file, &response, save, &status, &model).await?;
        }
        Commands::Analysis { command } => match command {
            AnalysisCommands::List => records::list_analyses(&store)?,
            AnalysisCommands::Get { id } => records::get_analysis(&store, id)?,
            AnalysisCommands::Delete { id } => records::delete_analysis(&store, id)?,
            AnalysisCommands::Save {
                file_name,
                status,
                json,
                path,
            } => records::save_analysis(&store, &file_name, &status, &json, path.as_deref())?,
        },
        Commands::Baseline { command } => match command {
            BaselineCommands::List => records::list_baselines(&store)?,
            BaselineCommands::Get { id } => records::get_baseline(&store, id)?,
            BaselineCommands::Delete { id } => records::delete_baseline(&store, id)?,
            BaselineCommands::Save {
                file_name,
                original_name,
                path,
                json,
            } => records::save_baseline(
                &store,
                &file_name,
                original_name.as_deref(),
                path.as_deref(),
                json.as_deref(),
            )?,
        },
        Commands::Compare {
            analysis_id,
            baseline_id,
            response,
            model,
        } => {
            compare::run(&store, &config, analysis_id, baseline_id, &response, &model).await?;
        }
        Commands::History { command } => match command {
            HistoryCommands::List { analysis, baseline } => {
                compare::list_history(&store, analysis, baseline)?
            }
            HistoryCommands::Get { id } => compare::get_history(&store, id)?,
            HistoryCommands::Delete { id } => compare::delete_history(&store, id)?,
        },
        Commands::Intel { command } => match command {
            IntelCommands::List => intel::list(&store)?,
            IntelCommands::Sync { response } => intel::sync(&store, &config, &response).await?,
            IntelCommands::LastSync => intel::last_sync(&store)?,
            IntelCommands::Curate {
                id,
                tags,
                site_relevance,
                response_notes,
                user,
            } => intel::curate(
                &store,
                &id,
                tags,
                site_relevance.as_deref(),
                response_notes.as_deref(),
                &user,
            )?,
            IntelCommands::Clear => intel::clear(&store)?,
        },
        Commands::Maintenance { command } => match command {
            MaintenanceCommands::BackfillIds => maintenance::backfill_ids(&store)?,
            MaintenanceCommands::Audit { limit } => maintenance::audit(&store, limit)?,
            MaintenanceCommands::Reset { yes } => maintenance::reset(&store, yes)?,
        },
    }

    Ok(())
}
