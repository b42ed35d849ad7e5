use bookstore::cli::{self as prog_cli, Command, OutputMode};
use bookstore::config::AppConfig;
use bookstore::{Database, Session};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bookstore", version, about = "Bookstore catalog query runner", long_about = None)]
struct Cli {
    /// Path to a config file (TOML)
    #[arg(long, help = "Path to a config file (TOML). If omitted, discovered files and defaults are used.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Directory holding the database snapshot. Takes precedence over config/env.")]
    data_dir: Option<PathBuf>,
    #[arg(long, help = "Database name (default plp_bookstore)")]
    database: Option<String>,
    #[arg(long, help = "Collection name (default books)")]
    collection: Option<String>,
    #[arg(long, help = "Print one compact JSON object per result")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the fixed query sequence (seeds the collection first if it is empty)")]
    Run,
    #[command(about = "Load the bundled catalog, or a JSON array of books, into the collection")]
    Seed {
        #[arg(long, help = "JSON file with an array of book records")]
        file: Option<PathBuf>,
        #[arg(long, help = "Remove existing documents first")]
        reset: bool,
    },
    #[command(about = "Find documents matching a filter")]
    Find {
        #[arg(long, help = "Filter JSON (e.g., {\"published_year\": {\"$gt\": 2000}})")]
        filter: Option<String>,
        #[arg(long, help = "Projection fields comma-separated (e.g., title,author,-_id)")]
        project: Option<String>,
        #[arg(long, help = "Sort spec comma-separated; price:desc,title or -price,+title")]
        sort: Option<String>,
        #[arg(long, help = "Skip N results")]
        skip: Option<usize>,
        #[arg(long, help = "Limit results")]
        limit: Option<usize>,
    },
    #[command(name = "update-one", about = "Update the first document matching a filter")]
    UpdateOne {
        #[arg(long)]
        filter: String,
        #[arg(long, help = "Update JSON (e.g., {\"$set\": {\"price\": 17.99}})")]
        update: String,
    },
    #[command(name = "delete-one", about = "Delete the first document matching a filter")]
    DeleteOne {
        #[arg(long)]
        filter: String,
    },
    #[command(about = "Run an aggregation pipeline given as a JSON array of stages")]
    Aggregate {
        #[arg(long)]
        pipeline: String,
    },
    #[command(name = "create-index", about = "Create an index from a key document (e.g., {\"title\": 1})")]
    CreateIndex {
        #[arg(long)]
        keys: String,
    },
    #[command(about = "List indexes on the collection")]
    Indexes,
    #[command(about = "Show execution statistics for a filter")]
    Explain {
        #[arg(long)]
        filter: String,
    },
}

fn to_command(cmd: Commands, seed_file: Option<PathBuf>) -> Command {
    match cmd {
        Commands::Run => Command::Run { seed_file },
        Commands::Seed { file, reset } => Command::Seed { file: file.or(seed_file), reset },
        Commands::Find { filter, project, sort, skip, limit } => {
            Command::Find { filter_json: filter, project, sort, skip, limit }
        }
        Commands::UpdateOne { filter, update } => Command::UpdateOne { filter_json: filter, update_json: update },
        Commands::DeleteOne { filter } => Command::DeleteOne { filter_json: filter },
        Commands::Aggregate { pipeline } => Command::Aggregate { pipeline_json: pipeline },
        Commands::CreateIndex { keys } => Command::CreateIndex { keys_json: keys },
        Commands::Indexes => Command::Indexes,
        Commands::Explain { filter } => Command::Explain { filter_json: filter },
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = real_main(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn real_main(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let overrides = AppConfig {
        data_dir: cli.data_dir,
        database: cli.database,
        collection: cli.collection,
        ..AppConfig::default()
    };
    let (cfg, skipped) = AppConfig::load(overrides, cli.config.as_deref())?;
    bookstore::logger::configure_from_config(&cfg);
    for warning in skipped {
        log::warn!("{warning}");
    }
    log::info!("starting bookstore with {cfg:?}");

    let db = Database::open(&cfg.data_dir(), cfg.database())?;
    let session = Session::connect(&db, cfg.collection());
    let mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let cmd = to_command(cli.command, cfg.seed_file.clone());
    prog_cli::run_with_format(&db, &session, cmd, mode, &mut std::io::stdout().lock())
}
